// Transform a typed Message into an opaque text frame (one QR code's
// worth of data) and back. `spec.md` §4.1.
//
// Wire shape: positional tuple, tag first, serialized with MessagePack
// and base64-encoded for display. Arity is exact per tag; anything else
// is a `ProtocolError`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rmpv::Value;

use crate::common::error::{Error, Result};
use crate::common::types::Party;
use crate::protocol::message::{
    Ack, Data, ErrorMsg, ErrorType, Hello, Message, Pull, TAG_ACK, TAG_DATA, TAG_ERROR, TAG_HELLO,
    TAG_PULL,
};

fn proto_err(msg: impl Into<String>) -> Error {
    Error::Protocol(msg.into())
}

fn to_tuple(msg: &Message) -> Value {
    let tag = Value::Integer(msg.tag().into());
    let fields: Vec<Value> = match msg {
        Message::Hello(m) => vec![
            Value::String(m.session_id.clone().into()),
            Value::Integer(m.seq.into()),
            Value::Integer(m.party.as_wire().into()),
            Value::Integer(m.proto_version.into()),
            Value::String(m.file_name.clone().into()),
            Value::Integer(m.file_size.into()),
            Value::String(m.mime_type.clone().into()),
            Value::Integer(m.total_chunks.into()),
            Value::Integer(m.chunk_size.into()),
        ],
        Message::Ack(m) => vec![
            Value::String(m.session_id.clone().into()),
            Value::Integer(m.seq.into()),
        ],
        Message::Pull(m) => vec![
            Value::String(m.session_id.clone().into()),
            Value::Integer(m.seq.into()),
            Value::Integer(m.chunk_index.into()),
        ],
        Message::Data(m) => vec![
            Value::String(m.session_id.clone().into()),
            Value::Integer(m.seq.into()),
            Value::Integer(m.chunk_index.into()),
            Value::Integer(m.next_chunk_index.into()),
            Value::Binary(m.payload.clone()),
        ],
        Message::Error(m) => vec![Value::Integer(m.error_type.as_wire().into())],
    };

    let mut tuple = Vec::with_capacity(1 + fields.len());
    tuple.push(tag);
    tuple.extend(fields);
    Value::Array(tuple)
}

/// Encode a message into a base64(MessagePack(tuple)) frame.
pub fn encode(msg: &Message) -> Result<String> {
    let value = to_tuple(msg);
    let bytes = rmp_serde::to_vec(&value)
        .map_err(|e| Error::SerializationError(format!("msgpack encode: {}", e)))?;
    Ok(BASE64.encode(bytes))
}

fn as_str(v: &Value, field: &str) -> Result<String> {
    v.as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| proto_err(format!("field `{}` is not a string", field)))
}

fn as_u64(v: &Value, field: &str) -> Result<u64> {
    v.as_u64()
        .ok_or_else(|| proto_err(format!("field `{}` is not an unsigned integer", field)))
}

fn as_i64(v: &Value, field: &str) -> Result<i64> {
    v.as_i64()
        .ok_or_else(|| proto_err(format!("field `{}` is not a signed integer", field)))
}

fn as_bytes(v: &Value, field: &str) -> Result<Vec<u8>> {
    v.as_slice()
        .map(|s| s.to_vec())
        .ok_or_else(|| proto_err(format!("field `{}` is not binary", field)))
}

fn expect_arity(elems: &[Value], expected: usize, tag: u8) -> Result<()> {
    if elems.len() != expected {
        return Err(proto_err(format!(
            "tag {} expects {} fields, got {}",
            tag,
            expected,
            elems.len()
        )));
    }
    Ok(())
}

/// Decode a base64(MessagePack(tuple)) frame into a typed Message.
pub fn decode(frame: &str) -> Result<Message> {
    let bytes = BASE64
        .decode(frame)
        .map_err(|e| proto_err(format!("invalid base64: {}", e)))?;
    let value: Value = rmp_serde::from_slice(&bytes)
        .map_err(|e| Error::DeserializationError(format!("msgpack decode: {}", e)))?;

    let elems = value
        .as_array()
        .ok_or_else(|| proto_err("frame is not a tuple"))?;

    if elems.is_empty() {
        return Err(proto_err("empty tuple"));
    }

    let tag = elems[0]
        .as_u64()
        .ok_or_else(|| proto_err("tag is not an unsigned integer"))? as u8;
    let rest = &elems[1..];

    match tag {
        TAG_HELLO => {
            expect_arity(rest, 9, tag)?;
            let party_raw = as_u64(&rest[2], "party")? as u8;
            let party = Party::from_wire(party_raw)
                .ok_or_else(|| proto_err(format!("unknown party value {}", party_raw)))?;
            Ok(Message::Hello(Hello {
                session_id: as_str(&rest[0], "session_id")?,
                seq: as_u64(&rest[1], "seq")? as u32,
                party,
                proto_version: as_u64(&rest[3], "proto_version")? as u8,
                file_name: as_str(&rest[4], "file_name")?,
                file_size: as_u64(&rest[5], "file_size")?,
                mime_type: as_str(&rest[6], "mime_type")?,
                total_chunks: as_u64(&rest[7], "total_chunks")? as u32,
                chunk_size: as_u64(&rest[8], "chunk_size")? as u32,
            }))
        }
        TAG_ACK => {
            expect_arity(rest, 2, tag)?;
            Ok(Message::Ack(Ack {
                session_id: as_str(&rest[0], "session_id")?,
                seq: as_u64(&rest[1], "seq")? as u32,
            }))
        }
        TAG_PULL => {
            expect_arity(rest, 3, tag)?;
            Ok(Message::Pull(Pull {
                session_id: as_str(&rest[0], "session_id")?,
                seq: as_u64(&rest[1], "seq")? as u32,
                chunk_index: as_i64(&rest[2], "chunk_index")? as i32,
            }))
        }
        TAG_DATA => {
            expect_arity(rest, 5, tag)?;
            Ok(Message::Data(Data {
                session_id: as_str(&rest[0], "session_id")?,
                seq: as_u64(&rest[1], "seq")? as u32,
                chunk_index: as_i64(&rest[2], "chunk_index")? as i32,
                next_chunk_index: as_i64(&rest[3], "next_chunk_index")? as i32,
                payload: as_bytes(&rest[4], "payload")?,
            }))
        }
        TAG_ERROR => {
            expect_arity(rest, 1, tag)?;
            let raw = as_u64(&rest[0], "error_type")? as u8;
            let error_type = ErrorType::from_wire(raw)
                .ok_or_else(|| proto_err(format!("unknown error type {}", raw)))?;
            Ok(Message::Error(ErrorMsg { error_type }))
        }
        other => Err(proto_err(format!("unknown tag {}", other))),
    }
}
