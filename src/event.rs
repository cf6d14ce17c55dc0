//! Event vocabulary shared by both backends.
//!
//! An [`Interest`] describes which event kinds a registration wants
//! reported. A [`Readiness`] is the decoded answer for one descriptor
//! after a wait call returns. The translation between the generic types
//! and the native poll(2) bitmask lives here so both backends decode
//! readiness identically.

use std::os::fd::RawFd;

use crate::socket::{SocketKind, SocketRef};

/// The kinds of events a handler can be looked up for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Read,
    Write,
    Error,
}

/// The set of event kinds one registration currently wants reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
    pub error: bool,
}

impl Interest {
    pub const READ: Self = Self {
        read: true,
        write: false,
        error: false,
    };

    pub const WRITE: Self = Self {
        read: false,
        write: true,
        error: false,
    };

    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
        error: false,
    };

    pub const ERROR: Self = Self {
        read: false,
        write: false,
        error: true,
    };

    pub fn union(self, other: Self) -> Self {
        Self {
            read: self.read || other.read,
            write: self.write || other.write,
            error: self.error || other.error,
        }
    }

    pub fn is_empty(self) -> bool {
        !(self.read || self.write || self.error)
    }
}

/// Decoded readiness for one descriptor. All three may be true at once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

impl Readiness {
    pub fn any(self) -> bool {
        self.readable || self.writable || self.error
    }

    /// Decodes a poll(2) `revents` bitmask. Hangup and error conditions
    /// collapse into the single error flag.
    pub(crate) fn from_poll(revents: libc::c_short) -> Self {
        Self {
            readable: revents & libc::POLLIN != 0,
            writable: revents & libc::POLLOUT != 0,
            error: revents & (libc::POLLHUP | libc::POLLERR) != 0,
        }
    }
}

/// Translates an interest set into the native poll(2) request bitmask.
pub(crate) fn poll_events(interest: Interest) -> libc::c_short {
    let mut events = 0;
    if interest.read {
        events |= libc::POLLIN;
    }
    if interest.write {
        events |= libc::POLLOUT;
    }
    if interest.error {
        events |= libc::POLLHUP;
    }
    events
}

/// What a handler receives for one ready descriptor.
#[derive(Clone)]
pub struct Event {
    pub socket: SocketRef,
    pub fd: RawFd,
    pub socket_kind: SocketKind,
}
