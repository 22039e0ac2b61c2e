//! Engine tuning configuration
//!
//! Compiled-in defaults, optionally overridden by a TOML file passed with
//! `--config`. Everything here bounds an operation that must not block
//! forever: retry budgets, backoff, and timeouts.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub transport: TransportConfig,
}

/// Per-transport tuning. Both transports share one config; their runtime
/// state is fully independent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    /// Connection attempts before giving up (initial connect and reconnect)
    pub connect_attempts: u32,

    /// Base delay for exponential backoff between connection attempts
    pub connect_backoff_ms: u64,

    /// Reconnect cycles tolerated for a single failing chunk write
    pub write_retries: u32,

    /// Frames handed to the link per write
    pub chunk_frames: usize,

    /// Jitter ring capacity in frames
    pub ring_capacity: usize,

    /// Upper bound on a single chunk write
    pub write_timeout_ms: u64,

    /// Upper bound on the end-of-stream flush
    pub flush_timeout_ms: u64,

    /// Upper bound on waiting for both transports to wind down
    pub teardown_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            connect_backoff_ms: 250,
            write_retries: 3,
            chunk_frames: 1024,
            ring_capacity: crate::engine::ring_buffer::DEFAULT_CAPACITY,
            write_timeout_ms: 10_000,
            flush_timeout_ms: 5_000,
            teardown_timeout_ms: 10_000,
        }
    }
}

impl TransportConfig {
    /// Backoff before the given 1-based attempt: base * 2^(attempt-1).
    pub fn backoff_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(6);
        std::time::Duration::from_millis(self.connect_backoff_ms.saturating_mul(factor))
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))
    }
}
