// CLI entry point: a loopback demo of one end-to-end Beam transfer.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use beam::common::BeamConfig;
use beam::events::{Observer, ReceiverEvent, SenderEvent};
use beam::receiver::Receiver;
use beam::sender::Sender;
use beam::store::{ChunkStore, SessionStore};
use beam::transport::LoopbackTransport;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "beam")]
#[command(about = "Visual QR-code file-transfer protocol engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a complete send/receive transfer over an in-memory loopback
    /// channel, driving both engines in the same process.
    Demo {
        /// File to transfer
        file: String,

        /// Chunk size in bytes
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,
    },
}

struct ProgressObserver {
    bar: ProgressBar,
}

impl Observer<SenderEvent> for ProgressObserver {
    fn notify(&mut self, event: SenderEvent) {
        match event {
            SenderEvent::Handshake { session_id } => {
                log::info!("sender handshake complete, session {}", session_id);
            }
            SenderEvent::Chunk(snapshot) => {
                self.bar.set_position(snapshot.bytes_transferred);
            }
            SenderEvent::Done => {
                self.bar.finish_with_message("sent");
            }
            SenderEvent::Error(msg) => {
                self.bar.abandon_with_message(format!("error: {}", msg));
            }
        }
    }
}

impl Observer<ReceiverEvent> for ProgressObserver {
    fn notify(&mut self, event: ReceiverEvent) {
        match event {
            ReceiverEvent::Handshake { session_id } => {
                log::info!("receiver handshake complete, session {}", session_id);
            }
            ReceiverEvent::Chunk(snapshot) => {
                self.bar.set_position(snapshot.bytes_transferred);
            }
            ReceiverEvent::Done(file) => {
                self.bar.finish_with_message(format!("received {} bytes", file.bytes.len()));
            }
            ReceiverEvent::Error(msg) => {
                self.bar.abandon_with_message(format!("error: {}", msg));
            }
        }
    }
}

fn run_demo(file: &str, chunk_size: usize) -> Result<()> {
    let file_path = Path::new(file);
    let bytes = std::fs::read(file_path)?;
    let file_name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file.bin")
        .to_string();
    let mime_type = "application/octet-stream".to_string();

    let base = PathBuf::from(".beam-demo");
    let mut config = BeamConfig::new();
    config = config.with_chunk_size(chunk_size)?;
    config = config.with_store_dir(base.join("chunks"));
    config = config.with_session_store_dir(base.join("sessions"));

    let mut sender = Sender::new(
        config.clone(),
        ChunkStore::new(config.store_dir.clone()),
        SessionStore::new(config.session_store_dir.clone()),
    )?;
    let mut receiver = Receiver::new(
        config.clone(),
        SessionStore::new(config.session_store_dir.join("receiver-side")),
    )?;
    receiver.receive()?;

    let (mut sender_end, mut receiver_end) = LoopbackTransport::pair();

    let bar = ProgressBar::new(bytes.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let mut sender_observer = ProgressObserver { bar: bar.clone() };
    let mut receiver_observer = ProgressObserver { bar };

    sender.send(&mut sender_end, &file_name, &bytes, &mime_type)?;

    loop {
        let mut progressed = false;
        while let Some(frame) = receiver_end.poll_inbound() {
            receiver.handle_frame(&frame, &mut receiver_end, &mut receiver_observer)?;
            progressed = true;
        }
        while let Some(frame) = sender_end.poll_inbound() {
            sender.handle_frame(&frame, &mut sender_end, &mut sender_observer)?;
            progressed = true;
        }
        if !progressed {
            break;
        }
    }

    println!(
        "sender state: {:?}, receiver state: {:?}",
        sender.state(),
        receiver.state()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo { file, chunk_size } => run_demo(&file, chunk_size)?,
    }
    Ok(())
}
