//! # stemcast
//!
//! Dual-output synchronized streaming engine: delivers one audio program to
//! two independent wireless speakers at once, either by splitting a stereo
//! signal into left/right mono feeds or by routing custom combinations of
//! separated stems (vocals, drums, bass, other) to each speaker.
//!
//! **Architecture:** decode → (optional separation) → bus mixdown → sync
//! offset → two independent buffered transports behind a shared start
//! barrier.

pub mod audio;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;

pub use config::EngineConfig;
pub use error::{Error, Result};
