use std::cell::RefCell;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use log::{trace, warn};

use crate::driver::Driver;
use crate::error::ReactorError;
use crate::event::{Interest, Readiness, poll_events};
use crate::socket::SocketRef;

use super::{Reactor, dispatch, effective_timeout_msec, resolve_timeout};

/// Fixed-capacity backend over poll(2).
///
/// Registered sockets live in two parallel vectors: the handles and the
/// native `pollfd` request records. Index *i* of both always refers to
/// the same descriptor and the vectors are always the same length, so
/// the native call can hand the request records straight to the kernel.
pub struct PollReactor {
    driver: Rc<dyn Driver>,
    state: RefCell<State>,
}

struct State {
    capacity: usize,
    sockets: Vec<SocketRef>,
    pollfds: Vec<libc::pollfd>,
}

impl State {
    fn index_of(&self, fd: RawFd) -> Option<usize> {
        self.pollfds.iter().position(|pollfd| pollfd.fd == fd)
    }
}

impl PollReactor {
    /// Creates a backend that can hold at most `capacity` sockets.
    pub fn new(driver: Rc<dyn Driver>, capacity: usize) -> Self {
        Self {
            driver,
            state: RefCell::new(State {
                capacity,
                sockets: Vec::with_capacity(capacity),
                pollfds: Vec::with_capacity(capacity),
            }),
        }
    }
}

impl Reactor for PollReactor {
    fn register(&self, socket: &SocketRef, interest: Interest) -> Result<(), ReactorError> {
        let fd = socket.borrow().fd();

        {
            let mut state = self.state.borrow_mut();
            if state.index_of(fd).is_some() {
                warn!("fd#{fd} already exists");
                return Err(ReactorError::AlreadyRegistered { fd });
            }
            if state.sockets.len() == state.capacity {
                warn!("too many sockets, more than {}", state.capacity);
                return Err(ReactorError::CapacityExceeded {
                    capacity: state.capacity,
                });
            }

            state.sockets.push(Rc::clone(socket));
            state.pollfds.push(libc::pollfd {
                fd,
                events: poll_events(interest),
                revents: 0,
            });
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

        {
            let mut state = self.state.borrow_mut();
            let Some(index) = state.index_of(fd) else {
                warn!("fd#{fd} not found");
                return Err(ReactorError::NotFound { fd });
            };
            // Same translation as register; the entry does not move.
            state.pollfds[index].events = poll_events(interest);
        }

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
            let Some(index) = state.index_of(fd) else {
                warn!("fd#{fd} not found");
                return Err(ReactorError::NotFound { fd });
            };
            // Shift-left over the exact post-removal length; both
            // vectors stay aligned with no stale tail slot.
            state.sockets.remove(index);
            state.pollfds.remove(index);
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
                let len = state.pollfds.len();
                unsafe {
                    libc::poll(
                        state.pollfds.as_mut_ptr(),
                        len as libc::nfds_t,
                        effective_timeout_msec(driver),
                    )
                }
            };

            if ret < 0 {
                let err = io::Error::last_os_error();
                if !driver.is_recoverable(&err) {
                    warn!("poll error: {err}");
                    return Err(ReactorError::Wait(err));
                }
            } else if ret == 0 {
                driver.on_round_end(true);
                continue;
            } else {
                // Snapshot the ready entries before dispatching: handlers
                // may register or deregister sockets, compacting the
                // vectors under the iteration.
                let batch: Vec<(SocketRef, Readiness)> = {
                    let state = self.state.borrow();
                    state
                        .sockets
                        .iter()
                        .zip(&state.pollfds)
                        .map(|(socket, pollfd)| {
                            (Rc::clone(socket), Readiness::from_poll(pollfd.revents))
                        })
                        .filter(|(_, ready)| ready.any())
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
        self.state.borrow().index_of(fd).is_some()
    }

    fn max_sockets(&self) -> usize {
        self.state.borrow().capacity
    }
}
