use std::io;
use std::rc::Rc;

use crate::event::{Event, EventKind, Interest};
use crate::reactor::Reactor;
use crate::socket::{SocketKind, SocketRef};

/// Handler invoked for one decoded event. A failure is logged by the
/// dispatcher and aborts neither the batch nor the loop.
pub type Handler = Rc<dyn Fn(&dyn Reactor, &Event) -> io::Result<()>>;

/// The external reactor driver a backend is plugged into.
///
/// One driver instance drives exactly one backend on exactly one
/// thread; methods take `&self` and implementations keep their mutable
/// state behind `Cell`/`RefCell` so handlers running mid-dispatch can
/// reach back into the driver.
pub trait Driver {
    /// Keep-running flag, checked at the top of every wait round.
    fn running(&self) -> bool;

    /// Configured timeout in milliseconds. `0` means "not configured
    /// yet, derive from the first wait call's argument"; negative means
    /// infinite.
    fn timeout_msec(&self) -> i32;

    fn set_timeout_msec(&self, msec: i32);

    /// When true the next native call must poll without blocking so the
    /// deferred work runs promptly.
    fn has_deferred_tasks(&self) -> bool {
        false
    }

    /// Classifies a failed native multiplex call. A recoverable error
    /// makes the loop retry; anything else terminates the wait.
    fn is_recoverable(&self, err: &io::Error) -> bool {
        err.kind() == io::ErrorKind::Interrupted
    }

    /// Invoked exactly once when a wait call enters its loop.
    fn before_wait(&self) {}

    /// Optional hook at the start of every round.
    fn on_round_begin(&self) {}

    /// End-of-round callbacks; `timed_out` tells whether the round ended
    /// because the native call timed out with nothing ready.
    fn on_round_end(&self, timed_out: bool) {
        let _ = timed_out;
    }

    /// Handler lookup by event kind and socket type tag.
    fn handler(&self, kind: EventKind, socket: SocketKind) -> Option<Handler>;

    /// Generic event accounting, called together with the backend's own
    /// table mutations.
    fn on_register(&self, socket: &SocketRef, interest: Interest) {
        let _ = (socket, interest);
    }

    fn on_update(&self, socket: &SocketRef, interest: Interest) {
        let _ = (socket, interest);
    }

    fn on_deregister(&self, socket: &SocketRef) {
        let _ = socket;
    }
}
