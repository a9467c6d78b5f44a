// ===============================
// src/lib.rs
// ===============================
pub mod domain;
pub mod venue;
pub mod error;
pub mod metrics;
pub mod sink;
pub mod contracts;
pub mod identity;
pub mod buffer;
pub mod reconcile;
pub mod positions;
pub mod handshake;
pub mod td_session;
pub mod md_session;
pub mod gateway;
pub mod config;
pub mod recorder;
pub mod mock;

pub use error::{SessionError, SessionResult};
pub use gateway::Gateway;
pub use sink::EventSink;
