use std::io;
use std::os::fd::RawFd;

use thiserror::Error;

/// Errors reported by a reactor backend.
///
/// Everything except [`Wait`](ReactorError::Wait) is a registration or
/// table error, locally recoverable by the caller. `Wait` is returned
/// only when the native multiplex call fails unrecoverably; the driver
/// decides whether that stops the program.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("fd {fd} is already registered")]
    AlreadyRegistered { fd: RawFd },

    #[error("too many sockets, the limit is {capacity}")]
    CapacityExceeded { capacity: usize },

    #[error("fd {fd} is beyond the descriptor-set limit of {limit}")]
    OutOfRange { fd: RawFd, limit: usize },

    #[error("fd {fd} is not registered")]
    NotFound { fd: RawFd },

    #[error("event for fd {fd} has already been removed")]
    AlreadyRemoved { fd: RawFd },

    #[error("multiplex call failed: {0}")]
    Wait(#[from] io::Error),
}
