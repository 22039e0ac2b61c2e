//! Device transport state machine
//!
//! One transport per bus, both structurally identical:
//!
//! `Disconnected → Connecting → Connected → Streaming → Draining →
//! Disconnected(final)`, with `Errored` reachable from Connecting and
//! Streaming.
//!
//! The transport owns its link and jitter ring exclusively; the only
//! cross-transport coordination is the start signal it waits on while
//! `Connected`. Every exit path, error paths included, closes the link —
//! a handle is never abandoned open.

use crate::audio::types::Bus;
use crate::config::TransportConfig;
use crate::device::{DeviceConnector, DeviceLink};
use crate::engine::events::{TransportEvent, TransportEventKind, TransportState};
use crate::engine::ring_buffer::{BusDrainer, BusFiller, BusRingBuffer};
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Hold interval when the ring is momentarily empty mid-stream.
const HOLD_INTERVAL: Duration = Duration::from_millis(1);

/// How a transport run ended (internal; surfaced as events).
enum Exit {
    /// Drained and closed, end-of-data or commanded stop
    Finished,
    /// Retry budget exhausted
    Failed(Error),
}

/// Streams one bus to one device.
pub struct DeviceTransport {
    bus: Arc<Bus>,
    device_id: String,
    config: TransportConfig,
    connector: Arc<dyn DeviceConnector>,
    events: mpsc::Sender<TransportEvent>,
    state: watch::Sender<TransportState>,
}

impl DeviceTransport {
    pub fn new(
        bus: Arc<Bus>,
        device_id: impl Into<String>,
        config: TransportConfig,
        connector: Arc<dyn DeviceConnector>,
        events: mpsc::Sender<TransportEvent>,
    ) -> (Self, watch::Receiver<TransportState>) {
        let (state, state_rx) = watch::channel(TransportState::Disconnected);
        (
            Self {
                bus,
                device_id: device_id.into(),
                config,
                connector,
                events,
                state,
            },
            state_rx,
        )
    }

    /// Drive the full lifecycle. `start` releases streaming once both
    /// transports are connected; `stop` requests prompt wind-down.
    pub async fn run(self, start: watch::Receiver<bool>, stop: watch::Receiver<bool>) {
        let bus = self.bus.label;
        let exit = self.lifecycle(start, stop).await;
        match exit {
            Exit::Finished => {
                self.set_state(TransportState::Disconnected);
                self.emit(TransportEventKind::Finished).await;
            }
            Exit::Failed(e) => {
                self.set_state(TransportState::Errored);
                warn!("Transport {} ({}): {}", bus, self.device_id, e);
                // Link is already closed; report the terminal error.
                self.set_state(TransportState::Disconnected);
                self.emit(TransportEventKind::Failed(e)).await;
            }
        }
    }

    async fn lifecycle(
        &self,
        mut start: watch::Receiver<bool>,
        mut stop: watch::Receiver<bool>,
    ) -> Exit {
        // ── Connecting ──────────────────────────────────────────────
        self.set_state(TransportState::Connecting);
        let mut link = match self.connect_with_retry(&mut stop).await {
            Ok(Some(link)) => link,
            Ok(None) => return Exit::Finished, // stopped before connected
            Err(e) => return Exit::Failed(e),
        };

        // ── Connected: report readiness, hold at the start barrier ──
        self.set_state(TransportState::Connected);
        self.emit(TransportEventKind::Ready).await;

        tokio::select! {
            _ = flag_raised(&mut start) => {}
            _ = flag_raised(&mut stop) => {
                self.close_link(&mut link).await;
                return Exit::Finished;
            }
        }

        // ── Streaming ───────────────────────────────────────────────
        self.set_state(TransportState::Streaming);
        self.emit(TransportEventKind::Started).await;
        info!(
            "Transport {} streaming {} frames to '{}'",
            self.bus.label,
            self.bus.frames(),
            self.device_id
        );

        let (mut fill, mut drain) = BusRingBuffer::new(self.config.ring_capacity).split();
        let mut cursor = 0usize;
        let mut chunk = vec![0.0f32; self.config.chunk_frames.max(1)];

        let stream_result = loop {
            if is_raised(&stop) {
                break Ok(());
            }

            cursor += top_up(&mut fill, &self.bus.samples, cursor);

            let n = drain.pop(&mut chunk);
            if n == 0 {
                if cursor >= self.bus.samples.len() {
                    break Ok(()); // every frame handed to the sink
                }
                // Ring momentarily empty with data left: hold, never skip.
                tokio::time::sleep(HOLD_INTERVAL).await;
                continue;
            }

            match self.write_chunk(&mut link, &chunk[..n], &mut stop).await {
                Ok(true) => {}
                Ok(false) => break Ok(()), // stopped mid-write
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = stream_result {
            self.close_link(&mut link).await;
            return Exit::Failed(e);
        }

        // ── Draining ────────────────────────────────────────────────
        self.set_state(TransportState::Draining);
        self.drain(&mut link, &mut drain).await;
        self.close_link(&mut link).await;
        Exit::Finished
    }

    /// Connect with exponential backoff. `Ok(None)` means a stop arrived
    /// before a link was established.
    async fn connect_with_retry(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Option<Box<dyn DeviceLink>>> {
        let attempts = self.config.connect_attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            if is_raised(stop) {
                return Ok(None);
            }
            debug!(
                "Transport {} connecting to '{}' (attempt {}/{})",
                self.bus.label, self.device_id, attempt, attempts
            );
            match self
                .connector
                .connect(&self.device_id, self.bus.sample_rate)
                .await
            {
                Ok(link) => return Ok(Some(link)),
                Err(e) => {
                    warn!(
                        "Transport {} connect attempt {}/{} failed: {}",
                        self.bus.label, attempt, attempts, e
                    );
                    last_err = Some(e);
                    if attempt < attempts
                        && sleep_or_stop(self.config.backoff_for_attempt(attempt), stop).await
                    {
                        return Ok(None);
                    }
                }
            }
        }

        Err(Error::Connection(format!(
            "'{}' unreachable after {} attempts: {}",
            self.device_id,
            attempts,
            last_err.expect("at least one attempt failed")
        )))
    }

    /// Write one chunk, reconnecting on failure without dropping the chunk.
    ///
    /// Returns `Ok(false)` if a stop arrived mid-write. After a reconnect the
    /// whole chunk is rewritten; a frame is never skipped (the sink may hear
    /// a short repeat instead).
    async fn write_chunk(
        &self,
        link: &mut Box<dyn DeviceLink>,
        chunk: &[f32],
        stop: &mut watch::Receiver<bool>,
    ) -> Result<bool> {
        let mut failures = 0u32;

        loop {
            let attempt = timeout(
                Duration::from_millis(self.config.write_timeout_ms),
                link.write(chunk),
            );

            let err = tokio::select! {
                res = attempt => match res {
                    Ok(Ok(())) => return Ok(true),
                    Ok(Err(e)) => e,
                    Err(_) => Error::Stream(format!(
                        "write to '{}' timed out after {} ms",
                        self.device_id, self.config.write_timeout_ms
                    )),
                },
                _ = flag_raised(stop) => return Ok(false),
            };

            failures += 1;
            if failures > self.config.write_retries {
                return Err(Error::Stream(format!(
                    "'{}' failed {} consecutive writes: {}",
                    self.device_id, failures, err
                )));
            }

            warn!(
                "Transport {} write failure {}/{} on '{}': {}; reconnecting",
                self.bus.label, failures, self.config.write_retries, self.device_id, err
            );
            self.close_link(link).await;
            self.set_state(TransportState::Connecting);

            match self.connect_with_retry(stop).await {
                Ok(Some(new_link)) => {
                    *link = new_link;
                    self.set_state(TransportState::Streaming);
                }
                Ok(None) => return Ok(false),
                Err(e) => {
                    return Err(Error::Stream(format!(
                        "reconnect after write failure: {}",
                        e
                    )))
                }
            }
        }
    }

    /// Best-effort flush of buffered-but-unwritten frames, bounded by the
    /// flush timeout. Errors here are logged, not fatal: the session is
    /// already ending.
    async fn drain(&self, link: &mut Box<dyn DeviceLink>, ring: &mut BusDrainer) {
        let deadline = Duration::from_millis(self.config.flush_timeout_ms);
        let flushed = timeout(deadline, async {
            let mut chunk = vec![0.0f32; self.config.chunk_frames.max(1)];
            loop {
                let n = ring.pop(&mut chunk);
                if n == 0 {
                    break;
                }
                if link.write(&chunk[..n]).await.is_err() {
                    return false;
                }
            }
            link.flush().await.is_ok()
        })
        .await;

        match flushed {
            Ok(true) => debug!("Transport {} drained cleanly", self.bus.label),
            Ok(false) => warn!(
                "Transport {} sink failed during drain, discarding remainder",
                self.bus.label
            ),
            Err(_) => warn!(
                "Transport {} drain exceeded {} ms, discarding remainder",
                self.bus.label, self.config.flush_timeout_ms
            ),
        }
    }

    async fn close_link(&self, link: &mut Box<dyn DeviceLink>) {
        if let Err(e) = link.close().await {
            warn!(
                "Transport {} close of '{}' failed: {}",
                self.bus.label, self.device_id, e
            );
        }
    }

    fn set_state(&self, state: TransportState) {
        debug!(
            "Transport {} ({}): -> {}",
            self.bus.label, self.device_id, state
        );
        let _ = self.state.send(state);
    }

    async fn emit(&self, kind: TransportEventKind) {
        let _ = self
            .events
            .send(TransportEvent {
                bus: self.bus.label,
                kind,
            })
            .await;
    }
}

/// Copy as much of the bus as fits into the ring, returning frames consumed.
/// A zero return with data remaining is backpressure: the ring is full.
fn top_up(fill: &mut BusFiller, samples: &[f32], cursor: usize) -> usize {
    if cursor >= samples.len() {
        return 0;
    }
    fill.push(&samples[cursor..])
}

/// True if the flag is currently raised (or the sender is gone).
fn is_raised(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

/// Resolve once the flag is raised. A dropped sender counts as raised so an
/// orphaned transport winds down instead of hanging.
pub(crate) async fn flag_raised(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `dur`, returning early with `true` if a stop arrives.
async fn sleep_or_stop(dur: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(dur) => false,
        _ = flag_raised(stop) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_up_consumes_up_to_capacity() {
        let (mut fill, _drain) = BusRingBuffer::new(64).split();
        let samples = vec![0.5f32; 100];

        let consumed = top_up(&mut fill, &samples, 0);
        assert_eq!(consumed, 64);
        // Ring full: further top-ups are backpressured
        assert_eq!(top_up(&mut fill, &samples, consumed), 0);
    }

    #[test]
    fn test_top_up_at_end_of_bus() {
        let (mut fill, _drain) = BusRingBuffer::new(64).split();
        let samples = vec![0.5f32; 10];
        assert_eq!(top_up(&mut fill, &samples, 10), 0);
    }

    #[tokio::test]
    async fn test_flag_raised_on_set() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = tx.send(true);
        });
        flag_raised(&mut rx).await;
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_flag_raised_on_sender_drop() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        // Must resolve, not hang
        flag_raised(&mut rx).await;
    }

    #[tokio::test]
    async fn test_sleep_or_stop_interrupted() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        assert!(sleep_or_stop(Duration::from_secs(60), &mut rx).await);
    }
}
