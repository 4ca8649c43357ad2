// Observer events emitted by the Sender/Receiver engines, replacing
// the reference protocol's separate `on*` callbacks with a single
// event channel per engine.

use crate::chunking::AssembledFile;
use crate::common::error::Error;
use crate::store::ProgressSnapshot;

#[derive(Debug, Clone)]
pub enum SenderEvent {
    Handshake { session_id: String },
    Chunk(ProgressSnapshot),
    Done,
    Error(String),
}

#[derive(Debug, Clone)]
pub enum ReceiverEvent {
    Handshake { session_id: String },
    Chunk(ProgressSnapshot),
    Done(AssembledFile),
    Error(String),
}

impl From<&Error> for SenderEvent {
    fn from(err: &Error) -> Self {
        SenderEvent::Error(err.to_string())
    }
}

impl From<&Error> for ReceiverEvent {
    fn from(err: &Error) -> Self {
        ReceiverEvent::Error(err.to_string())
    }
}

/// Caller-supplied event sink. A `Vec`-backed implementation is handy
/// for tests; the CLI wires one that forwards to `indicatif`/`log`.
pub trait Observer<E> {
    fn notify(&mut self, event: E);
}

impl<E> Observer<E> for Vec<E> {
    fn notify(&mut self, event: E) {
        self.push(event);
    }
}
