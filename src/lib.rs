mod driver;
mod error;
mod event;
mod socket;

pub mod reactor;

pub use driver::{Driver, Handler};
pub use error::ReactorError;
pub use event::{Event, EventKind, Interest, Readiness};
pub use reactor::{PollReactor, Reactor, SelectReactor};
pub use socket::{EventSocket, SocketKind, SocketRef};
