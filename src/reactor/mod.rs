//! Reactor backends and the dispatch contract they share.
//!
//! Both backends implement [`Reactor`] so the driver can swap one for
//! the other without noticing: a bounded parallel-array backend over
//! poll(2) and an associative-table backend over select(2). The
//! per-descriptor dispatch rule and the timeout bookkeeping live here;
//! only descriptor storage and the native call differ per backend.

mod poll;
mod select;

pub use poll::PollReactor;
pub use select::SelectReactor;

use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use log::{trace, warn};

use crate::driver::Driver;
use crate::error::ReactorError;
use crate::event::{Event, EventKind, Interest, Readiness};
use crate::socket::SocketRef;

/// Uniform backend surface consumed by the driver. Teardown is `Drop`.
pub trait Reactor {
    fn register(&self, socket: &SocketRef, interest: Interest) -> Result<(), ReactorError>;

    fn update_interest(&self, socket: &SocketRef, interest: Interest) -> Result<(), ReactorError>;

    fn deregister(&self, socket: &SocketRef) -> Result<(), ReactorError>;

    /// Runs the wait loop until the driver's running flag clears
    /// (`Ok`) or the native call fails unrecoverably (`Err`).
    fn wait(&self, timeout: Option<Duration>) -> Result<(), ReactorError>;

    fn is_registered(&self, fd: RawFd) -> bool;

    /// Advertised maximum of simultaneously registered descriptors.
    fn max_sockets(&self) -> usize;
}

/// First-wait timeout derivation: a configured timeout of 0 means
/// "take it from the wait call's argument", `None` meaning infinite.
pub(crate) fn resolve_timeout(driver: &dyn Driver, timeout: Option<Duration>) {
    if driver.timeout_msec() == 0 {
        let msec = match timeout {
            None => -1,
            Some(timeout) => timeout.as_millis().min(i32::MAX as u128) as i32,
        };
        driver.set_timeout_msec(msec);
    }
}

/// Pending deferred tasks force a non-blocking poll.
pub(crate) fn effective_timeout_msec(driver: &dyn Driver) -> i32 {
    if driver.has_deferred_tasks() {
        0
    } else {
        driver.timeout_msec()
    }
}

/// Applies the per-descriptor dispatch rule to one readiness triple.
///
/// The removed flag is re-read before every sub-check rather than
/// cached: a handler invoked earlier in the batch may have deregistered
/// this very descriptor. An error condition co-occurring with read or
/// write readiness is folded into those dispatches instead of invoking
/// the error handler for the same underlying condition a second time.
pub(crate) fn dispatch(
    reactor: &dyn Reactor,
    driver: &dyn Driver,
    socket: &SocketRef,
    ready: Readiness,
) {
    if ready.readable && !socket.borrow().is_removed() {
        if ready.error {
            socket.borrow_mut().mark_hangup();
        }
        invoke(reactor, driver, socket, EventKind::Read);
    }

    if ready.writable && !socket.borrow().is_removed() {
        invoke(reactor, driver, socket, EventKind::Write);
    }

    if ready.error && !ready.readable && !ready.writable && !socket.borrow().is_removed() {
        invoke(reactor, driver, socket, EventKind::Error);
    }

    let fired_once = {
        let socket = socket.borrow();
        !socket.is_removed() && socket.is_once()
    };
    if fired_once {
        if let Err(err) = reactor.deregister(socket) {
            warn!("one-shot removal failed: {err}");
        }
    }
}

fn invoke(reactor: &dyn Reactor, driver: &dyn Driver, socket: &SocketRef, kind: EventKind) {
    let (fd, socket_kind) = {
        let socket = socket.borrow();
        (socket.fd(), socket.kind())
    };

    let Some(handler) = driver.handler(kind, socket_kind) else {
        warn!("no {kind:?} handler for {socket_kind:?} socket, fd={fd}");
        return;
    };

    trace!("event: fd={fd} kind={kind:?}");

    let event = Event {
        socket: Rc::clone(socket),
        fd,
        socket_kind,
    };
    if let Err(err) = handler(reactor, &event) {
        warn!("{kind:?} handler failed: fd={fd} error={err}");
    }
}
