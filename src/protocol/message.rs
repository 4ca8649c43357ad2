// Protocol message types
//
// Tagged variant with five arms; the wire form is a positional tuple
// whose first element is the numeric tag (`spec.md` §3).

use crate::common::types::{ChunkIndex, Party, SessionId};

pub const TAG_HELLO: u8 = 0;
pub const TAG_ACK: u8 = 1;
pub const TAG_PULL: u8 = 2;
pub const TAG_DATA: u8 = 3;
pub const TAG_ERROR: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    InvalidParty,
}

impl ErrorType {
    pub fn as_wire(&self) -> u8 {
        match self {
            ErrorType::InvalidParty => 0,
        }
    }

    pub fn from_wire(v: u8) -> Option<Self> {
        match v {
            0 => Some(ErrorType::InvalidParty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub session_id: SessionId,
    pub seq: u32,
    pub party: Party,
    pub proto_version: u8,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub total_chunks: u32,
    pub chunk_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub session_id: SessionId,
    pub seq: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pull {
    pub session_id: SessionId,
    pub seq: u32,
    pub chunk_index: ChunkIndex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub session_id: SessionId,
    pub seq: u32,
    pub chunk_index: ChunkIndex,
    pub next_chunk_index: ChunkIndex,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub error_type: ErrorType,
}

/// One protocol message. Five arms exactly, per `spec.md` §3's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello(Hello),
    Ack(Ack),
    Pull(Pull),
    Data(Data),
    Error(ErrorMsg),
}

impl Message {
    pub fn tag(&self) -> u8 {
        match self {
            Message::Hello(_) => TAG_HELLO,
            Message::Ack(_) => TAG_ACK,
            Message::Pull(_) => TAG_PULL,
            Message::Data(_) => TAG_DATA,
            Message::Error(_) => TAG_ERROR,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Message::Hello(m) => Some(&m.session_id),
            Message::Ack(m) => Some(&m.session_id),
            Message::Pull(m) => Some(&m.session_id),
            Message::Data(m) => Some(&m.session_id),
            Message::Error(_) => None,
        }
    }
}
