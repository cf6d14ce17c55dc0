//! Associative-table backend over select(2).
//!
//! Descriptors live in a map keyed by fd; the three native descriptor
//! sets are rebuilt from the map on every round from each handle's
//! current interest, so an interest change needs no table surgery at
//! all. A watermark tracks the highest descriptor ever registered and
//! bounds the native scan range. It is never recomputed downward on
//! removal; that only costs scan range, never correctness.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use log::{trace, warn};

use crate::driver::Driver;
use crate::error::ReactorError;
use crate::event::{Interest, Readiness};
use crate::socket::SocketRef;

use super::{Reactor, dispatch, resolve_timeout};

/// fd_set wrapper. Every access is bounds-checked against `FD_SETSIZE`
/// before touching the native bitmask.
struct FdSet(libc::fd_set);

impl FdSet {
    fn new() -> Self {
        let mut raw: libc::fd_set = unsafe { mem::zeroed() };
        unsafe { libc::FD_ZERO(&mut raw) };
        Self(raw)
    }

    fn clear(&mut self) {
        unsafe { libc::FD_ZERO(&mut self.0) };
    }

    fn insert(&mut self, fd: RawFd) {
        if (fd as usize) < libc::FD_SETSIZE {
            unsafe { libc::FD_SET(fd, &mut self.0) };
        }
    }

    fn remove(&mut self, fd: RawFd) {
        if (fd as usize) < libc::FD_SETSIZE {
            unsafe { libc::FD_CLR(fd, &mut self.0) };
        }
    }

    fn contains(&self, fd: RawFd) -> bool {
        (fd as usize) < libc::FD_SETSIZE && unsafe { libc::FD_ISSET(fd, &self.0) }
    }

    fn as_mut_ptr(&mut self) -> *mut libc::fd_set {
        &mut self.0
    }
}

/// Associative-table backend over select(2).
pub struct SelectReactor {
    driver: Rc<dyn Driver>,
    state: RefCell<State>,
}

struct State {
    sockets: HashMap<RawFd, SocketRef>,
    read_set: FdSet,
    write_set: FdSet,
    error_set: FdSet,
    // Watermark: highest fd ever registered, monotonically non-decreasing.
    max_fd: RawFd,
}

impl SelectReactor {
    pub fn new(driver: Rc<dyn Driver>) -> Self {
        Self {
            driver,
            state: RefCell::new(State {
                sockets: HashMap::new(),
                read_set: FdSet::new(),
                write_set: FdSet::new(),
                error_set: FdSet::new(),
                max_fd: 0,
            }),
        }
    }
}

impl Reactor for SelectReactor {
    fn register(&self, socket: &SocketRef, interest: Interest) -> Result<(), ReactorError> {
        let fd = socket.borrow().fd();

        if fd as usize >= libc::FD_SETSIZE {
            warn!("max fd value is FD_SETSIZE({})", libc::FD_SETSIZE);
            return Err(ReactorError::OutOfRange {
                fd,
                limit: libc::FD_SETSIZE,
            });
        }

        {
            let mut state = self.state.borrow_mut();
            if state.sockets.contains_key(&fd) {
                warn!("fd#{fd} already exists");
                return Err(ReactorError::AlreadyRegistered { fd });
            }
            state.sockets.insert(fd, Rc::clone(socket));
            if fd > state.max_fd {
                state.max_fd = fd;
            }
        }

        {
            let mut socket = socket.borrow_mut();
            socket.set_interest(interest);
            socket.mark_registered();
        }

        trace!("add: fd={fd} interest={interest:?}");
        self.driver.on_register(socket, interest);
        Ok(())
    }

    fn update_interest(&self, socket: &SocketRef, interest: Interest) -> Result<(), ReactorError> {
        let fd = socket.borrow().fd();

        if !self.state.borrow().sockets.contains_key(&fd) {
            warn!("fd#{fd} not found");
            return Err(ReactorError::NotFound { fd });
        }

        // The interest lives on the handle and the sets are rebuilt from
        // it next round; presence was all the table had to validate.
        socket.borrow_mut().set_interest(interest);

        trace!("set: fd={fd} interest={interest:?}");
        self.driver.on_update(socket, interest);
        Ok(())
    }

    fn deregister(&self, socket: &SocketRef) -> Result<(), ReactorError> {
        let fd = socket.borrow().fd();

        if socket.borrow().is_removed() {
            warn!("failed to delete event fd#{fd}, it has already been removed");
            return Err(ReactorError::AlreadyRemoved { fd });
        }

        {
            let mut state = self.state.borrow_mut();
            if state.sockets.remove(&fd).is_none() {
                warn!("fd#{fd} not found");
                return Err(ReactorError::NotFound { fd });
            }
            // The accumulators are rebuilt next round anyway; clearing
            // now keeps an external inspector from seeing a stale bit.
            state.read_set.remove(fd);
            state.write_set.remove(fd);
            state.error_set.remove(fd);
        }

        socket.borrow_mut().mark_removed();
        self.driver.on_deregister(socket);
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<(), ReactorError> {
        let driver = self.driver.as_ref();
        resolve_timeout(driver, timeout);
        driver.before_wait();

        while driver.running() {
            driver.on_round_begin();

            let ret = {
                let mut state = self.state.borrow_mut();
                let State {
                    sockets,
                    read_set,
                    write_set,
                    error_set,
                    max_fd,
                } = &mut *state;

                read_set.clear();
                write_set.clear();
                error_set.clear();
                for (&fd, socket) in sockets.iter() {
                    let interest = socket.borrow().interest();
                    if interest.read {
                        read_set.insert(fd);
                    }
                    if interest.write {
                        write_set.insert(fd);
                    }
                    if interest.error {
                        error_set.insert(fd);
                    }
                }

                let mut timeout = select_timeout(driver);
                unsafe {
                    libc::select(
                        *max_fd + 1,
                        read_set.as_mut_ptr(),
                        write_set.as_mut_ptr(),
                        error_set.as_mut_ptr(),
                        &mut timeout,
                    )
                }
            };

            if ret < 0 {
                let err = io::Error::last_os_error();
                if !driver.is_recoverable(&err) {
                    warn!("select error: {err}");
                    return Err(ReactorError::Wait(err));
                }
            } else if ret == 0 {
                driver.on_round_end(true);
                continue;
            } else {
                // Ascending fd order over the watermark range; a
                // descriptor can be in range but not registered, those
                // are skipped. The sets now hold the native results.
                let batch: Vec<(SocketRef, Readiness)> = {
                    let state = self.state.borrow();
                    (0..=state.max_fd)
                        .filter_map(|fd| {
                            let socket = state.sockets.get(&fd)?;
                            let ready = Readiness {
                                readable: state.read_set.contains(fd),
                                writable: state.write_set.contains(fd),
                                error: state.error_set.contains(fd),
                            };
                            ready.any().then(|| (Rc::clone(socket), ready))
                        })
                        .collect()
                };

                for (socket, ready) in batch {
                    dispatch(self, driver, &socket, ready);
                }
            }

            driver.on_round_end(false);
        }

        Ok(())
    }

    fn is_registered(&self, fd: RawFd) -> bool {
        self.state.borrow().sockets.contains_key(&fd)
    }

    fn max_sockets(&self) -> usize {
        libc::FD_SETSIZE
    }
}

/// Concrete timeout for one select call: maximal duration when the
/// configured timeout is infinite, zero when deferred tasks are
/// pending, otherwise the millisecond value split into seconds and
/// microseconds.
fn select_timeout(driver: &dyn Driver) -> libc::timeval {
    let msec = driver.timeout_msec();
    if msec < 0 {
        libc::timeval {
            tv_sec: u32::MAX as libc::time_t,
            tv_usec: 0,
        }
    } else if driver.has_deferred_tasks() {
        libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        }
    } else {
        libc::timeval {
            tv_sec: (msec / 1000) as libc::time_t,
            tv_usec: ((msec % 1000) * 1000) as libc::suseconds_t,
        }
    }
}
