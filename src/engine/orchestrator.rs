//! Stream orchestrator
//!
//! Top-level coordinator: sequences decoding, optional separation, mixing,
//! and sync, then drives both device transports through their lifecycle.
//! The start barrier releases only once both transports report `Connected`,
//! so the two speakers begin within the same instant the platform allows.
//!
//! Failure is fail-fast: the first `Errored` report stops the other
//! transport too — a single-speaker session is not a supported degraded
//! mode.

use crate::audio::{decode, Separator};
use crate::config::EngineConfig;
use crate::device::DeviceConnector;
use crate::engine::events::{TransportEvent, TransportEventKind};
use crate::engine::session::{SessionStatus, StreamSession};
use crate::engine::transport::{flag_raised, DeviceTransport};
use crate::engine::{mixer, resolver, sync};
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{error, info, warn};

/// How the two buses are composed from the source.
#[derive(Debug, Clone)]
pub enum MixMode {
    /// Deinterleave a stereo source into left/right feeds
    ChannelSplit,

    /// Separate into stems and route a selection to each speaker
    Stems { left: String, right: String },
}

/// Everything needed to run one session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub source_path: PathBuf,
    pub mode: MixMode,
    pub offset_ms: i64,
    pub left_device: String,
    pub right_device: String,
}

/// Coordinates one complete streaming session.
pub struct StreamOrchestrator {
    config: EngineConfig,
    connector: Arc<dyn DeviceConnector>,
    separator: Option<Arc<dyn Separator>>,
}

impl StreamOrchestrator {
    pub fn new(config: EngineConfig, connector: Arc<dyn DeviceConnector>) -> Self {
        Self {
            config,
            connector,
            separator: None,
        }
    }

    /// Required for stem mode; channel-split sessions never touch it.
    pub fn with_separator(mut self, separator: Arc<dyn Separator>) -> Self {
        self.separator = Some(separator);
        self
    }

    /// Run a session to completion. `shutdown` is the external interrupt
    /// (ctrl-c); raising it winds the session down cleanly.
    pub async fn run(
        &self,
        request: SessionRequest,
        shutdown: watch::Receiver<bool>,
    ) -> Result<StreamSession> {
        let session = self.prepare(&request).await?;
        self.stream(session, shutdown).await
    }

    /// Batch pre-processing: validate, decode, separate, mix, sync. No
    /// device is touched here, so failures leave no wireless state behind.
    async fn prepare(&self, request: &SessionRequest) -> Result<StreamSession> {
        // Validate stem selections before doing any expensive work.
        let selections = match &request.mode {
            MixMode::ChannelSplit => None,
            MixMode::Stems { left, right } => Some(resolver::resolve(left, right)?),
        };

        let path = request.source_path.clone();
        let source = tokio::task::spawn_blocking(move || decode::decode(&path))
            .await
            .map_err(|e| Error::Decode(format!("decoder task failed: {}", e)))??;
        let source = Arc::new(source);

        let (bus_a, bus_b) = match selections {
            None => mixer::split_channels(&source)?,
            Some((left_sel, right_sel)) => {
                let separator = self.separator.as_ref().ok_or_else(|| {
                    Error::Separation("stem mode requested but no separator configured".into())
                })?;
                let stems = separator.separate(&request.source_path, &source).await?;
                info!(
                    "Separated {} frames into stems; left={}, right={}",
                    stems.frames(),
                    left_sel,
                    right_sel
                );
                mixer::mix_stems(&stems, &left_sel, &right_sel)?
            }
        };

        let (bus_a, bus_b) = sync::apply(bus_a, bus_b, request.offset_ms);

        Ok(StreamSession::new(
            Arc::clone(&source),
            request.offset_ms,
            bus_a,
            bus_b,
            &request.left_device,
            &request.right_device,
        ))
    }

    /// Drive both transports: connect, barrier, stream, wind down.
    async fn stream(
        &self,
        mut session: StreamSession,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<StreamSession> {
        session.status = SessionStatus::Starting;
        info!(
            "Session {} starting: '{}' <- bus {}, '{}' <- bus {}",
            session.id,
            session.binding_a.device_id,
            session.bus_a.label,
            session.binding_b.device_id,
            session.bus_b.label
        );

        let (events_tx, mut events) = mpsc::channel::<TransportEvent>(16);
        let (start_tx, start_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);

        let (transport_a, state_a) = DeviceTransport::new(
            session.bus_a.clone(),
            session.binding_a.device_id.clone(),
            self.config.transport.clone(),
            Arc::clone(&self.connector),
            events_tx.clone(),
        );
        let (transport_b, state_b) = DeviceTransport::new(
            session.bus_b.clone(),
            session.binding_b.device_id.clone(),
            self.config.transport.clone(),
            Arc::clone(&self.connector),
            events_tx,
        );

        let handle_a = tokio::spawn(transport_a.run(start_rx.clone(), stop_rx.clone()));
        let handle_b = tokio::spawn(transport_b.run(start_rx, stop_rx));

        let mut ready = 0u8;
        let mut terminal = 0u8;
        let mut stopping = false;
        let mut first_error: Option<Error> = None;

        while terminal < 2 {
            tokio::select! {
                event = events.recv() => {
                    let Some(TransportEvent { bus, kind }) = event else {
                        // Both senders gone: the tasks are finished.
                        break;
                    };
                    match kind {
                        TransportEventKind::Ready => {
                            ready += 1;
                            info!("Device for bus {} connected ({}/2)", bus, ready);
                            if ready == 2 && !stopping {
                                info!("Both devices connected, releasing start barrier");
                                session.status = SessionStatus::Streaming;
                                let _ = start_tx.send(true);
                            }
                        }
                        TransportEventKind::Started => {
                            info!("Bus {} streaming", bus);
                        }
                        TransportEventKind::Finished => {
                            terminal += 1;
                            info!("Bus {} finished", bus);
                        }
                        TransportEventKind::Failed(e) => {
                            terminal += 1;
                            error!("Bus {} failed: {}", bus, e);
                            if first_error.is_none() {
                                first_error = Some(e);
                            }
                            if !stopping {
                                // Fail fast: a one-speaker session is not a
                                // supported degraded mode.
                                stopping = true;
                                session.status = SessionStatus::Stopping;
                                let _ = stop_tx.send(true);
                            }
                        }
                    }
                }
                _ = flag_raised(&mut shutdown), if !stopping => {
                    info!("Interrupt received, stopping both transports");
                    stopping = true;
                    session.status = SessionStatus::Stopping;
                    let _ = stop_tx.send(true);
                }
            }
        }

        // Bounded wait for both tasks to reach their final state.
        let teardown = Duration::from_millis(self.config.transport.teardown_timeout_ms);
        for (label, handle) in [("left", handle_a), ("right", handle_b)] {
            match timeout(teardown, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{} transport task panicked: {}", label, e),
                Err(_) => warn!("{} transport did not wind down within {:?}", label, teardown),
            }
        }

        session.binding_a.state = *state_a.borrow();
        session.binding_b.state = *state_b.borrow();

        match first_error {
            Some(e) => {
                session.status = SessionStatus::Failed;
                error!("Session {} failed: {}", session.id, e);
                Err(e)
            }
            None => {
                session.status = SessionStatus::Completed;
                info!("Session {} completed", session.id);
                Ok(session)
            }
        }
    }
}
