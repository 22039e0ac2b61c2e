//! Transport lifecycle events
//!
//! Control flows back from the transports to the orchestrator through these
//! events; the orchestrator never inspects a transport's internals.

use crate::audio::BusLabel;
use crate::error::Error;

/// State of one device transport, as reported to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
    Draining,
    Errored,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Streaming => "streaming",
            TransportState::Draining => "draining",
            TransportState::Errored => "errored",
        }
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by a transport task.
#[derive(Debug)]
pub struct TransportEvent {
    pub bus: BusLabel,
    pub kind: TransportEventKind,
}

#[derive(Debug)]
pub enum TransportEventKind {
    /// Connected and waiting on the start barrier
    Ready,

    /// First frame handed to the sink
    Started,

    /// Drained and closed cleanly (end of data or commanded stop)
    Finished,

    /// Retry budget exhausted; the transport has already closed its link
    Failed(Error),
}
