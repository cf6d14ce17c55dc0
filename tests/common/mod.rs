#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;

use vigil::{Driver, EventKind, Handler, Interest, SocketKind, SocketRef};

/// Test driver that records every hook and dispatch, and stops the wait
/// loop after a fixed number of rounds.
pub struct TestDriver {
    running: Cell<bool>,
    rounds_left: Cell<u32>,
    timeout_msec: Cell<i32>,
    deferred: Cell<bool>,
    dispatched: RefCell<Vec<(EventKind, RawFd)>>,
    round_ends: RefCell<Vec<bool>>,
    handlers: RefCell<HashMap<(EventKind, SocketKind), Handler>>,
    before_wait_calls: Cell<u32>,
    registered: Cell<i32>,
    forgiven_errors: Cell<u32>,
}

impl TestDriver {
    pub fn new(rounds: u32) -> Rc<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        Rc::new(Self {
            running: Cell::new(true),
            rounds_left: Cell::new(rounds),
            timeout_msec: Cell::new(0),
            deferred: Cell::new(false),
            dispatched: RefCell::new(Vec::new()),
            round_ends: RefCell::new(Vec::new()),
            handlers: RefCell::new(HashMap::new()),
            before_wait_calls: Cell::new(0),
            registered: Cell::new(0),
            forgiven_errors: Cell::new(0),
        })
    }

    /// Installs a handler that records its invocation and succeeds.
    pub fn record(self: &Rc<Self>, kind: EventKind, socket: SocketKind) {
        let driver = Rc::clone(self);
        self.install(
            kind,
            socket,
            Rc::new(move |_, event| {
                driver.dispatched.borrow_mut().push((kind, event.fd));
                Ok(())
            }),
        );
    }

    pub fn install(&self, kind: EventKind, socket: SocketKind, handler: Handler) {
        self.handlers.borrow_mut().insert((kind, socket), handler);
    }

    pub fn stop(&self) {
        self.running.set(false);
    }

    /// Re-arms the running flag for another wait call.
    pub fn resume(&self, rounds: u32) {
        self.rounds_left.set(rounds);
        self.running.set(true);
    }

    pub fn set_deferred(&self, deferred: bool) {
        self.deferred.set(deferred);
    }

    /// Classifies the next `count` native failures as recoverable,
    /// whatever their kind.
    pub fn forgive_errors(&self, count: u32) {
        self.forgiven_errors.set(count);
    }

    pub fn dispatched(&self) -> Vec<(EventKind, RawFd)> {
        self.dispatched.borrow().clone()
    }

    pub fn round_ends(&self) -> Vec<bool> {
        self.round_ends.borrow().clone()
    }

    pub fn before_wait_calls(&self) -> u32 {
        self.before_wait_calls.get()
    }

    /// Net count of bookkeeping registrations seen by the driver.
    pub fn accounted(&self) -> i32 {
        self.registered.get()
    }
}

impl Driver for TestDriver {
    fn running(&self) -> bool {
        self.running.get()
    }

    fn timeout_msec(&self) -> i32 {
        self.timeout_msec.get()
    }

    fn set_timeout_msec(&self, msec: i32) {
        self.timeout_msec.set(msec);
    }

    fn has_deferred_tasks(&self) -> bool {
        self.deferred.get()
    }

    fn is_recoverable(&self, err: &io::Error) -> bool {
        let left = self.forgiven_errors.get();
        if left > 0 {
            self.forgiven_errors.set(left - 1);
            return true;
        }
        err.kind() == io::ErrorKind::Interrupted
    }

    fn before_wait(&self) {
        self.before_wait_calls.set(self.before_wait_calls.get() + 1);
    }

    fn on_round_end(&self, timed_out: bool) {
        self.round_ends.borrow_mut().push(timed_out);
        let left = self.rounds_left.get().saturating_sub(1);
        self.rounds_left.set(left);
        if left == 0 {
            self.running.set(false);
        }
    }

    fn handler(&self, kind: EventKind, socket: SocketKind) -> Option<Handler> {
        self.handlers.borrow().get(&(kind, socket)).cloned()
    }

    fn on_register(&self, _socket: &SocketRef, _interest: Interest) {
        self.registered.set(self.registered.get() + 1);
    }

    fn on_deregister(&self, _socket: &SocketRef) {
        self.registered.set(self.registered.get() - 1);
    }
}

/// Unnamed pipe whose ends are closed on drop.
pub struct Pipe {
    pub read_fd: RawFd,
    pub write_fd: RawFd,
    write_closed: Cell<bool>,
}

impl Pipe {
    pub fn new() -> Self {
        let mut fds = [0; 2];
        let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(
            ret,
            0,
            "pipe creation failed: {}",
            io::Error::last_os_error()
        );
        Self {
            read_fd: fds[0],
            write_fd: fds[1],
            write_closed: Cell::new(false),
        }
    }

    /// Writes one byte so the read end reports readable.
    pub fn fill(&self) {
        let buf = [1u8];
        let ret = unsafe { libc::write(self.write_fd, buf.as_ptr() as *const _, 1) };
        assert_eq!(ret, 1, "pipe write failed: {}", io::Error::last_os_error());
    }

    /// Closes the write end; the read end then reports hangup.
    pub fn close_write(&self) {
        if !self.write_closed.replace(true) {
            unsafe { libc::close(self.write_fd) };
        }
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        unsafe { libc::close(self.read_fd) };
        self.close_write();
    }
}

/// Connected unix stream pair; each end is readable once the peer
/// writes and writable from the start.
pub struct SocketPair {
    pub left: RawFd,
    pub right: RawFd,
}

impl SocketPair {
    pub fn new() -> Self {
        let mut fds = [0; 2];
        let ret =
            unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
        assert_eq!(
            ret,
            0,
            "socketpair failed: {}",
            io::Error::last_os_error()
        );
        Self {
            left: fds[0],
            right: fds[1],
        }
    }

    /// Writes one byte into `right` so `left` reports readable.
    pub fn fill_left(&self) {
        let buf = [1u8];
        let ret = unsafe { libc::write(self.right, buf.as_ptr() as *const _, 1) };
        assert_eq!(
            ret,
            1,
            "socketpair write failed: {}",
            io::Error::last_os_error()
        );
    }
}

impl Drop for SocketPair {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.left);
            libc::close(self.right);
        }
    }
}
