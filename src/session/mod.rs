// Session identity derivation.

pub mod identity;

pub use identity::{derive_session_id, random_local_seq};
