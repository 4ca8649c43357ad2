// Protocol module - message definitions and wire encoding

pub mod codec;
pub mod message;

pub use codec::{decode, encode};
pub use message::{Ack, Data, ErrorMsg, ErrorType, Hello, Message, Pull};
