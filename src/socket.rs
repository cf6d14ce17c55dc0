use std::cell::RefCell;
use std::os::fd::RawFd;
use std::rc::Rc;

use crate::event::Interest;

/// Type tag used by the external handler lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketKind {
    Tcp,
    Udp,
    Pipe,
}

/// Shared handle to a socket registration. The reactor runs
/// single-threaded, and handlers invoked mid-dispatch must be able to
/// mutate sockets that appear later in the same ready batch.
pub type SocketRef = Rc<RefCell<EventSocket>>;

/// The externally owned socket handle referenced by a registration.
///
/// The reactor never owns the descriptor's lifetime, only the
/// registration entry pointing at this handle. The `removed` flag is
/// true whenever the handle is not registered; within one dispatch
/// batch it is the guard against acting on a descriptor a handler has
/// already deregistered.
pub struct EventSocket {
    fd: RawFd,
    kind: SocketKind,
    interest: Interest,
    once: bool,
    removed: bool,
    hangup: bool,
}

impl EventSocket {
    pub fn new(fd: RawFd, kind: SocketKind) -> Self {
        Self {
            fd,
            kind,
            interest: Interest::default(),
            once: false,
            removed: true,
            hangup: false,
        }
    }

    pub fn shared(fd: RawFd, kind: SocketKind) -> SocketRef {
        Rc::new(RefCell::new(Self::new(fd, kind)))
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// True when the handle is not currently registered with a backend.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Marks the registration as a one-shot: it is deregistered
    /// automatically after its first delivered event.
    pub fn set_once(&mut self, once: bool) {
        self.once = once;
    }

    pub fn is_once(&self) -> bool {
        self.once
    }

    /// True once an error condition was observed alongside read
    /// readiness, so a read handler can tell a hangup-accompanied read
    /// from a clean one.
    pub fn hangup_observed(&self) -> bool {
        self.hangup
    }

    pub(crate) fn set_interest(&mut self, interest: Interest) {
        self.interest = interest;
    }

    pub(crate) fn mark_registered(&mut self) {
        self.removed = false;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
    }

    pub(crate) fn mark_hangup(&mut self) {
        self.hangup = true;
    }
}
