// Common utilities and shared code

pub mod config;
pub mod error;
pub mod types;

pub use config::BeamConfig;
pub use error::{Error, Result};
pub use types::*;
