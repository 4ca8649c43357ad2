// Sender engine state machine. `spec.md` §4.5.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::chunking;
use crate::common::config::BeamConfig;
use crate::common::error::{Error, Result};
use crate::common::types::{EngineState, Party, NO_MORE_CHUNKS};
use crate::events::{Observer, SenderEvent};
use crate::protocol::{decode, encode, Ack, Data, ErrorType, Hello, Message};
use crate::session::{derive_session_id, random_local_seq};
use crate::store::{ChunkStore, ProgressSnapshot, SessionStore, StoredChunks};
use crate::transport::Writer;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct SenderSession {
    session_id: String,
    file_name: String,
    file_size: u64,
    mime_type: String,
    chunk_size: usize,
    total_chunks: u32,
    chunks: Vec<Vec<u8>>,
    sent_chunks: i32,
    started_time: u64,
    bytes_transferred: u64,
}

/// Drives one outbound file transfer: IDLE -> HANDSHAKE -> TRANSFER ->
/// DONE, with ERROR/CANCELLED sinks.
pub struct Sender {
    config: BeamConfig,
    chunk_store: ChunkStore,
    session_store: SessionStore,
    state: EngineState,
    local_seq: u32,
    session: Option<SenderSession>,
}

impl Sender {
    pub fn new(config: BeamConfig, chunk_store: ChunkStore, session_store: SessionStore) -> Result<Self> {
        Ok(Self {
            config,
            chunk_store,
            session_store,
            state: EngineState::Idle,
            local_seq: random_local_seq()?,
            session: None,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    /// Chunk `file_bytes`, store them best-effort for later resume, and
    /// send the initial HELLO.
    pub fn send(
        &mut self,
        writer: &mut impl Writer,
        file_name: &str,
        file_bytes: &[u8],
        mime_type: &str,
    ) -> Result<()> {
        if self.state != EngineState::Idle {
            return Err(Error::Protocol("sender already started".into()));
        }

        let chunks = chunking::chunk(file_bytes, self.config.chunk_size);
        let total_chunks = chunks.len() as u32;
        let session_id = derive_session_id(file_name, self.config.session_id_length);
        let file_size = file_bytes.len() as u64;

        if let Err(e) = self.chunk_store.store(
            file_name,
            file_size,
            mime_type,
            chunks.clone(),
            self.config.chunk_size,
        ) {
            log::warn!("chunk store write failed for {}: {}", file_name, e);
        }

        let started_time = now_ms();
        let snapshot = ProgressSnapshot {
            session_id: session_id.clone(),
            file_name: file_name.to_string(),
            file_size,
            current_chunk: -1,
            total_chunks,
            percent_complete: 0.0,
            transfer_speed: 0.0,
            estimated_time_remaining: 0,
            updated_time: started_time,
            started_time,
            bytes_transferred: 0,
        };
        if let Err(e) = self.session_store.save(Party::Sender, &snapshot) {
            log::warn!("session store write failed: {}", e);
        }

        self.session = Some(SenderSession {
            session_id: session_id.clone(),
            file_name: file_name.to_string(),
            file_size,
            mime_type: mime_type.to_string(),
            chunk_size: self.config.chunk_size,
            total_chunks,
            chunks,
            sent_chunks: -1,
            started_time,
            bytes_transferred: 0,
        });

        let seq = self.next_seq();
        let hello = Message::Hello(Hello {
            session_id,
            seq,
            party: Party::Sender,
            proto_version: crate::common::types::PROTOCOL_VERSION,
            file_name: file_name.to_string(),
            file_size,
            mime_type: mime_type.to_string(),
            total_chunks,
            chunk_size: self.config.chunk_size as u32,
        });
        writer.write(&encode(&hello)?)?;
        self.state = EngineState::Handshake;
        log::info!("sender: HANDSHAKE for {} ({} chunks)", file_name, total_chunks);
        Ok(())
    }

    /// Resume a previously stored, integrity-checked chunk set instead
    /// of re-chunking the file from scratch.
    pub fn send_resumable(&mut self, writer: &mut impl Writer, stored: StoredChunks) -> Result<()> {
        if self.state != EngineState::Idle {
            return Err(Error::Protocol("sender already started".into()));
        }
        crate::store::verify_integrity(&stored)?;

        let session_id = derive_session_id(&stored.file_name, self.config.session_id_length);
        let started_time = now_ms();

        self.session = Some(SenderSession {
            session_id: session_id.clone(),
            file_name: stored.file_name.clone(),
            file_size: stored.file_size,
            mime_type: stored.mime.clone(),
            chunk_size: stored.chunk_size,
            total_chunks: stored.total_chunks,
            chunks: stored.chunks,
            sent_chunks: -1,
            started_time,
            bytes_transferred: 0,
        });

        let seq = self.next_seq();
        let hello = Message::Hello(Hello {
            session_id,
            seq,
            party: Party::Sender,
            proto_version: crate::common::types::PROTOCOL_VERSION,
            file_name: stored.file_name,
            file_size: stored.file_size,
            mime_type: stored.mime,
            total_chunks: stored.total_chunks,
            chunk_size: stored.chunk_size as u32,
        });
        writer.write(&encode(&hello)?)?;
        self.state = EngineState::Handshake;
        Ok(())
    }

    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            log::info!("sender: cancelled");
            self.state = EngineState::Cancelled;
        }
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.local_seq;
        self.local_seq += 1;
        seq
    }

    /// Handle one inbound frame. Ignored once the engine has reached a
    /// terminal state.
    pub fn handle_frame(
        &mut self,
        frame: &str,
        writer: &mut impl Writer,
        observer: &mut impl Observer<SenderEvent>,
    ) -> Result<()> {
        if self.state.is_terminal() {
            return Ok(());
        }

        let message = decode(frame)?;
        let result = self.dispatch(message, writer, observer);
        if let Err(e) = &result {
            self.state = EngineState::Error;
            observer.notify(SenderEvent::Error(e.to_string()));
        }
        result
    }

    fn dispatch(
        &mut self,
        message: Message,
        writer: &mut impl Writer,
        observer: &mut impl Observer<SenderEvent>,
    ) -> Result<()> {
        let session_id = self
            .session
            .as_ref()
            .map(|s| s.session_id.clone())
            .ok_or_else(|| Error::Protocol("no active session".into()))?;

        match (&message, self.state) {
            (Message::Error(err), _) if err.error_type == ErrorType::InvalidParty => {
                return Err(Error::InvalidParty("peer reported invalid party".into()));
            }
            (Message::Ack(ack), EngineState::Handshake) => {
                if ack.session_id != session_id {
                    return Err(Error::Protocol("session id mismatch on ACK".into()));
                }
                self.state = EngineState::Transfer;
                let seq = self.next_seq();
                writer.write(&encode(&Message::Ack(Ack {
                    session_id: session_id.clone(),
                    seq,
                }))?)?;
                observer.notify(SenderEvent::Handshake {
                    session_id: session_id.clone(),
                });
                let total_chunks = self.session.as_ref().unwrap().total_chunks;
                if total_chunks == 0 {
                    self.finish(observer);
                }
                Ok(())
            }
            (Message::Pull(pull), EngineState::Transfer) => {
                if pull.session_id != session_id {
                    return Err(Error::Protocol("session id mismatch on PULL".into()));
                }
                self.handle_pull(pull.chunk_index, writer, observer)
            }
            _ => Err(Error::Protocol(format!(
                "unexpected message for state {:?}",
                self.state
            ))),
        }
    }

    fn handle_pull(
        &mut self,
        chunk_index: i32,
        writer: &mut impl Writer,
        observer: &mut impl Observer<SenderEvent>,
    ) -> Result<()> {
        let session = self.session.as_mut().expect("session set in TRANSFER");
        let session_id = session.session_id.clone();
        let seq = self.next_seq();

        let in_range = chunk_index >= 0 && (chunk_index as u32) < session.total_chunks;
        let (payload, next_chunk_index) = if in_range {
            let payload = session.chunks[chunk_index as usize].clone();
            let next = if (chunk_index as u32) + 1 == session.total_chunks {
                NO_MORE_CHUNKS
            } else {
                chunk_index + 1
            };
            (payload, next)
        } else {
            (Vec::new(), NO_MORE_CHUNKS)
        };

        writer.write(&encode(&Message::Data(Data {
            session_id: session_id.clone(),
            seq,
            chunk_index,
            next_chunk_index,
            payload: payload.clone(),
        }))?)?;

        if in_range {
            session.sent_chunks = chunk_index;
            session.bytes_transferred += payload.len() as u64;
            let snapshot = self.progress_snapshot(chunk_index);
            if let Err(e) = self.session_store.save(Party::Sender, &snapshot) {
                log::warn!("session store write failed: {}", e);
            }
            observer.notify(SenderEvent::Chunk(snapshot));
        }

        if next_chunk_index == NO_MORE_CHUNKS {
            self.finish(observer);
        }
        Ok(())
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

    fn finish(&mut self, observer: &mut impl Observer<SenderEvent>) {
        if let Some(session) = &self.session {
            if let Err(e) = self.chunk_store.delete(&session.file_name) {
                log::warn!("chunk store cleanup failed: {}", e);
            }
        }
        self.state = EngineState::Done;
        log::info!("sender: DONE");
        observer.notify(SenderEvent::Done);
    }
}
