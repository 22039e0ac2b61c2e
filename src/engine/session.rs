//! Stream session aggregate
//!
//! The single explicitly-owned root for everything a run touches: source,
//! buses, offset, device bindings, and overall status. Only the orchestrator
//! mutates it; there is no ambient or static session state.

use crate::audio::types::{AudioSource, Bus, BusLabel};
use crate::engine::events::TransportState;
use std::sync::Arc;
use uuid::Uuid;

/// Overall session status, driven by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Starting,
    Streaming,
    Stopping,
    Failed,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Starting => "starting",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Stopping => "stopping",
            SessionStatus::Failed => "failed",
            SessionStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One device's place in the session.
#[derive(Debug, Clone)]
pub struct DeviceBinding {
    pub device_id: String,
    pub bus: BusLabel,
    pub state: TransportState,
}

impl DeviceBinding {
    pub fn new(device_id: impl Into<String>, bus: BusLabel) -> Self {
        Self {
            device_id: device_id.into(),
            bus,
            state: TransportState::Disconnected,
        }
    }
}

/// Aggregate root for one streaming run.
#[derive(Debug)]
pub struct StreamSession {
    pub id: Uuid,
    pub source: Arc<AudioSource>,
    pub offset_ms: i64,

    /// Final synced buses, read-only once set; each transport reads its own.
    pub bus_a: Arc<Bus>,
    pub bus_b: Arc<Bus>,

    pub binding_a: DeviceBinding,
    pub binding_b: DeviceBinding,

    pub status: SessionStatus,
}

impl StreamSession {
    pub fn new(
        source: Arc<AudioSource>,
        offset_ms: i64,
        bus_a: Bus,
        bus_b: Bus,
        left_device: impl Into<String>,
        right_device: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            offset_ms,
            bus_a: Arc::new(bus_a),
            bus_b: Arc::new(bus_b),
            binding_a: DeviceBinding::new(left_device, BusLabel::A),
            binding_b: DeviceBinding::new(right_device, BusLabel::B),
            status: SessionStatus::Idle,
        }
    }

    pub fn binding_mut(&mut self, bus: BusLabel) -> &mut DeviceBinding {
        match bus {
            BusLabel::A => &mut self.binding_a,
            BusLabel::B => &mut self.binding_b,
        }
    }

    pub fn bus(&self, bus: BusLabel) -> Arc<Bus> {
        match bus {
            BusLabel::A => Arc::clone(&self.bus_a),
            BusLabel::B => Arc::clone(&self.bus_b),
        }
    }
}
