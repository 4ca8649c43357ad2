// Library root - exports public API

pub mod chunking;
pub mod common;
pub mod events;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod store;
pub mod transport;

pub use common::{BeamConfig, Error, Result};
pub use events::{Observer, ReceiverEvent, SenderEvent};
pub use receiver::Receiver;
pub use sender::Sender;
