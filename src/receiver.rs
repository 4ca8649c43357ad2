// Receiver engine state machine. `spec.md` §4.6.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::chunking::{self, AssembledFile};
use crate::common::config::BeamConfig;
use crate::common::error::{Error, Result};
use crate::common::types::{EngineState, Party, PROTOCOL_VERSION};
use crate::events::{Observer, ReceiverEvent};
use crate::protocol::{decode, encode, Ack, ErrorMsg, ErrorType, Message, Pull};
use crate::session::random_local_seq;
use crate::store::{ProgressSnapshot, SessionStore};
use crate::transport::Writer;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct ReceiverSession {
    session_id: String,
    file_name: String,
    file_size: u64,
    mime_type: String,
    total_chunks: u32,
    chunk_table: BTreeMap<i32, Vec<u8>>,
    cursor: i32,
    started_time: u64,
    bytes_transferred: u64,
}

/// Drives one inbound file transfer: IDLE -> HANDSHAKE -> TRANSFER ->
/// DONE, with ERROR/CANCELLED sinks.
pub struct Receiver {
    session_store: SessionStore,
    state: EngineState,
    local_seq: u32,
    session: Option<ReceiverSession>,
}

impl Receiver {
    pub fn new(_config: BeamConfig, session_store: SessionStore) -> Result<Self> {
        Ok(Self {
            session_store,
            state: EngineState::Idle,
            local_seq: random_local_seq()?,
            session: None,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn receive(&mut self) -> Result<()> {
        if self.state != EngineState::Idle {
            return Err(Error::Protocol("receiver already started".into()));
        }
        self.state = EngineState::Handshake;
        log::info!("receiver: listening for HELLO");
        Ok(())
    }

    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            log::info!("receiver: cancelled");
            self.state = EngineState::Cancelled;
        }
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.local_seq;
        self.local_seq += 1;
        seq
    }

    pub fn handle_frame(
        &mut self,
        frame: &str,
        writer: &mut impl Writer,
        observer: &mut impl Observer<ReceiverEvent>,
    ) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }

        let message = decode(frame)?;
        let result = self.dispatch(message, writer, observer);
        if let Err(e) = &result {
            if !matches!(self.state, EngineState::Error) {
                self.state = EngineState::Error;
                observer.notify(ReceiverEvent::Error(e.to_string()));
            }
        }
        result
    }

    fn dispatch(
        &mut self,
        message: Message,
        writer: &mut impl Writer,
        observer: &mut impl Observer<ReceiverEvent>,
    ) -> Result<()> {
        match (&message, self.state) {
            (Message::Hello(hello), EngineState::Handshake) if self.session.is_none() => {
                if hello.party == Party::Receiver {
                    writer.write(&encode(&Message::Error(ErrorMsg {
                        error_type: ErrorType::InvalidParty,
                    }))?)?;
                    return Err(Error::InvalidParty("a receiver is already present".into()));
                }
                if hello.proto_version != PROTOCOL_VERSION {
                    return Err(Error::Protocol(format!(
                        "unsupported protocol version {}",
                        hello.proto_version
                    )));
                }

                self.session = Some(ReceiverSession {
                    session_id: hello.session_id.clone(),
                    file_name: hello.file_name.clone(),
                    file_size: hello.file_size,
                    mime_type: hello.mime_type.clone(),
                    total_chunks: hello.total_chunks,
                    chunk_table: BTreeMap::new(),
                    cursor: -1,
                    started_time: now_ms(),
                    bytes_transferred: 0,
                });

                let seq = self.next_seq();
                writer.write(&encode(&Message::Ack(Ack {
                    session_id: hello.session_id.clone(),
                    seq,
                }))?)?;
                observer.notify(ReceiverEvent::Handshake {
                    session_id: hello.session_id.clone(),
                });
                Ok(())
            }
            (Message::Ack(ack), EngineState::Handshake) => {
                let session_id = self.require_session_id(&ack.session_id)?;
                self.state = EngineState::Transfer;
                let total_chunks = self.session.as_ref().unwrap().total_chunks;
                if total_chunks == 0 {
                    self.finish(observer)?;
                    return Ok(());
                }
                self.session.as_mut().unwrap().cursor = 0;
                let seq = self.next_seq();
                writer.write(&encode(&Message::Pull(Pull {
                    session_id,
                    seq,
                    chunk_index: 0,
                }))?)?;
                Ok(())
            }
            (Message::Data(data), EngineState::Transfer) => {
                self.require_session_id(&data.session_id)?;
                let session = self.session.as_mut().expect("session set in TRANSFER");

                if data.chunk_index < 0
                    || (data.chunk_index as u32) >= session.total_chunks
                    || data.payload.is_empty()
                {
                    return Err(Error::InvalidChunk(format!(
                        "chunk {} invalid for {} total chunks",
                        data.chunk_index, session.total_chunks
                    )));
                }

                if !session.chunk_table.contains_key(&data.chunk_index) {
                    session.bytes_transferred += data.payload.len() as u64;
                }
                session.chunk_table.insert(data.chunk_index, data.payload.clone());

                let snapshot = self.progress_snapshot(data.chunk_index);
                if let Err(e) = self.session_store.save(Party::Receiver, &snapshot) {
                    log::warn!("session store write failed: {}", e);
                }
                observer.notify(ReceiverEvent::Chunk(snapshot));

                if data.next_chunk_index == -1 {
                    self.finish(observer)?;
                } else {
                    let session = self.session.as_mut().unwrap();
                    session.cursor = data.next_chunk_index;
                    let session_id = session.session_id.clone();
                    let cursor = session.cursor;
                    let seq = self.next_seq();
                    writer.write(&encode(&Message::Pull(Pull {
                        session_id,
                        seq,
                        chunk_index: cursor,
                    }))?)?;
                }
                Ok(())
            }
            (Message::Error(err), _) => Err(Error::InvalidParty(format!(
                "peer reported error {:?}",
                err.error_type
            ))),
            _ => Err(Error::Protocol(format!(
                "unexpected message for state {:?}",
                self.state
            ))),
        }
    }

    fn require_session_id(&self, candidate: &str) -> Result<String> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| Error::Protocol("no active session".into()))?;
        if candidate != session.session_id {
            return Err(Error::Protocol("session id mismatch".into()));
        }
        Ok(session.session_id.clone())
    }

    fn progress_snapshot(&self, current_chunk: i32) -> ProgressSnapshot {
        let session = self.session.as_ref().expect("session set");
        let elapsed_ms = now_ms().saturating_sub(session.started_time).max(1);
        let speed = session.bytes_transferred as f64 / (elapsed_ms as f64 / 1000.0);
        let remaining_bytes = session.file_size.saturating_sub(session.bytes_transferred);
        let eta_ms = if speed > 0.0 {
            (remaining_bytes as f64 / speed * 1000.0) as u64
        } else {
            0
        };
        let percent = if session.file_size == 0 {
            100.0
        } else {
            (session.bytes_transferred as f64 / session.file_size as f64) * 100.0
        };

        ProgressSnapshot {
            session_id: session.session_id.clone(),
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            current_chunk,
            total_chunks: session.total_chunks,
            percent_complete: percent,
            transfer_speed: speed,
            estimated_time_remaining: eta_ms,
            updated_time: now_ms(),
            started_time: session.started_time,
            bytes_transferred: session.bytes_transferred,
        }
    }

    fn finish(&mut self, observer: &mut impl Observer<ReceiverEvent>) -> Result<()> {
        let session = self.session.as_ref().expect("session set");
        for i in 0..session.total_chunks {
            if !session.chunk_table.contains_key(&(i as i32)) {
                return Err(Error::InvalidChunk(format!("missing chunk {}", i)));
            }
        }

        let ordered: Vec<Vec<u8>> = (0..session.total_chunks)
            .map(|i| session.chunk_table[&(i as i32)].clone())
            .collect();
        let assembled = chunking::assemble(ordered, session.file_name.clone(), session.mime_type.clone())?;

        if assembled.bytes.len() as u64 != session.file_size {
            return Err(Error::InvalidChunk(format!(
                "assembled size {} does not match declared size {}",
                assembled.bytes.len(),
                session.file_size
            )));
        }

        self.state = EngineState::Done;
        log::info!("receiver: DONE ({} bytes)", assembled.bytes.len());
        observer.notify(ReceiverEvent::Done(assembled));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::DEFAULT_CHUNK_SIZE;
    use crate::protocol::{Data, Hello};
    use crate::store::SessionStore;
    use tempfile::tempdir;

    fn make_receiver() -> (Receiver, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let session_store = SessionStore::new(dir.path().join("sessions"));
        let config = BeamConfig::new();
        (Receiver::new(config, session_store).unwrap(), dir)
    }

    struct RecordingWriter {
        frames: Vec<String>,
    }
    impl Writer for RecordingWriter {
        fn write(&mut self, frame: &str) -> Result<()> {
            self.frames.push(frame.to_string());
            Ok(())
        }
    }

    fn hello(session_id: &str, total_chunks: u32, chunk_size: u32, file_size: u64) -> Message {
        Message::Hello(Hello {
            session_id: session_id.to_string(),
            seq: 0,
            party: Party::Sender,
            proto_version: PROTOCOL_VERSION,
            file_name: "a.bin".into(),
            file_size,
            mime_type: "application/octet-stream".into(),
            total_chunks,
            chunk_size,
        })
    }

    #[test]
    fn hello_from_sender_is_acked() {
        let (mut receiver, _dir) = make_receiver();
        receiver.receive().unwrap();
        let mut writer = RecordingWriter { frames: Vec::new() };
        let mut events = Vec::new();

        let frame = encode(&hello("ABCDE", 1, DEFAULT_CHUNK_SIZE as u32, 10)).unwrap();
        receiver.handle_frame(&frame, &mut writer, &mut events).unwrap();

        assert_eq!(receiver.state(), EngineState::Handshake);
        assert!(matches!(decode(&writer.frames[0]).unwrap(), Message::Ack(_)));
        assert!(matches!(events[0], ReceiverEvent::Handshake { .. }));
    }

    #[test]
    fn hello_from_receiver_party_is_collision() {
        let (mut receiver, _dir) = make_receiver();
        receiver.receive().unwrap();
        let mut writer = RecordingWriter { frames: Vec::new() };
        let mut events = Vec::new();

        let mut msg = hello("ABCDE", 1, 64, 10);
        if let Message::Hello(h) = &mut msg {
            h.party = Party::Receiver;
        }
        let frame = encode(&msg).unwrap();
        let result = receiver.handle_frame(&frame, &mut writer, &mut events);

        assert!(result.is_err());
        assert!(matches!(decode(&writer.frames[0]).unwrap(), Message::Error(_)));
    }

    #[test]
    fn full_transfer_assembles_file() {
        let (mut receiver, _dir) = make_receiver();
        receiver.receive().unwrap();
        let mut writer = RecordingWriter { frames: Vec::new() };
        let mut events = Vec::new();

        let session_id = "ABCDE";
        let frame = encode(&hello(session_id, 2, 4, 7)).unwrap();
        receiver.handle_frame(&frame, &mut writer, &mut events).unwrap();

        let ack = encode(&Message::Ack(Ack { session_id: session_id.into(), seq: 0 })).unwrap();
        receiver.handle_frame(&ack, &mut writer, &mut events).unwrap();
        assert_eq!(receiver.state(), EngineState::Transfer);

        let data0 = encode(&Message::Data(Data {
            session_id: session_id.into(),
            seq: 1,
            chunk_index: 0,
            next_chunk_index: 1,
            payload: vec![1, 2, 3, 4],
        }))
        .unwrap();
        receiver.handle_frame(&data0, &mut writer, &mut events).unwrap();

        let data1 = encode(&Message::Data(Data {
            session_id: session_id.into(),
            seq: 2,
            chunk_index: 1,
            next_chunk_index: -1,
            payload: vec![5, 6, 7],
        }))
        .unwrap();
        receiver.handle_frame(&data1, &mut writer, &mut events).unwrap();

        assert_eq!(receiver.state(), EngineState::Done);
        match events.last() {
            Some(ReceiverEvent::Done(file)) => assert_eq!(file.bytes, vec![1, 2, 3, 4, 5, 6, 7]),
            _ => panic!("expected Done event"),
        }
    }

    #[test]
    fn out_of_range_chunk_is_invalid() {
        let (mut receiver, _dir) = make_receiver();
        receiver.receive().unwrap();
        let mut writer = RecordingWriter { frames: Vec::new() };
        let mut events = Vec::new();

        let session_id = "ABCDE";
        let frame = encode(&hello(session_id, 1, 4, 4)).unwrap();
        receiver.handle_frame(&frame, &mut writer, &mut events).unwrap();
        let ack = encode(&Message::Ack(Ack { session_id: session_id.into(), seq: 0 })).unwrap();
        receiver.handle_frame(&ack, &mut writer, &mut events).unwrap();

        let bad = encode(&Message::Data(Data {
            session_id: session_id.into(),
            seq: 1,
            chunk_index: 5,
            next_chunk_index: -1,
            payload: vec![1],
        }))
        .unwrap();
        let result = receiver.handle_frame(&bad, &mut writer, &mut events);
        assert!(result.is_err());
        assert_eq!(receiver.state(), EngineState::Error);
    }

    #[test]
    fn duplicate_data_for_same_chunk_is_idempotent() {
        let (mut receiver, _dir) = make_receiver();
        receiver.receive().unwrap();
        let mut writer = RecordingWriter { frames: Vec::new() };
        let mut events = Vec::new();

        let session_id = "ABCDE";
        let frame = encode(&hello(session_id, 2, 4, 7)).unwrap();
        receiver.handle_frame(&frame, &mut writer, &mut events).unwrap();
        let ack = encode(&Message::Ack(Ack { session_id: session_id.into(), seq: 0 })).unwrap();
        receiver.handle_frame(&ack, &mut writer, &mut events).unwrap();

        let data0 = encode(&Message::Data(Data {
            session_id: session_id.into(),
            seq: 1,
            chunk_index: 0,
            next_chunk_index: 0,
            payload: vec![1, 2, 3, 4],
        }))
        .unwrap();
        receiver.handle_frame(&data0, &mut writer, &mut events).unwrap();
        receiver.handle_frame(&data0, &mut writer, &mut events).unwrap();

        let snapshots: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ReceiverEvent::Chunk(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].bytes_transferred, 4);
        assert_eq!(snapshots[1].bytes_transferred, 4);
    }
}
