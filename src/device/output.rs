//! cpal-backed device connector
//!
//! A paired wireless speaker surfaces as an OS audio output device, so the
//! "connection handle" here is a cpal output stream. cpal streams are not
//! `Send`, so each link runs a dedicated thread that owns the stream; the
//! async side talks to it through a lock-free SPSC ring. The audio callback
//! pops samples from the ring and the stream clock paces the producer: a
//! full ring means the sink has all the audio it can take, and `write`
//! waits.

use crate::device::{DeviceConnector, DeviceDescriptor, DeviceLink};
use crate::error::{Error, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate};
use ringbuf::{traits::*, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Default per-link ring capacity in samples (~186ms @ 44.1kHz)
const DEFAULT_LINK_BUFFER: usize = 8192;

/// Poll interval while waiting for ring space or drain
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Connector that opens OS audio output devices through cpal.
pub struct CpalConnector {
    link_buffer: usize,
}

impl Default for CpalConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalConnector {
    pub fn new() -> Self {
        Self {
            link_buffer: DEFAULT_LINK_BUFFER,
        }
    }

    pub fn with_link_buffer(mut self, samples: usize) -> Self {
        self.link_buffer = samples.max(64);
        self
    }
}

#[async_trait]
impl DeviceConnector for CpalConnector {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let host = cpal::default_host();
        let devices: Vec<DeviceDescriptor> = host
            .output_devices()
            .map_err(|e| Error::Connection(format!("cannot enumerate devices: {}", e)))?
            .filter_map(|d| d.name().ok())
            .map(|id| DeviceDescriptor { id })
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    async fn connect(&self, device_id: &str, sample_rate: u32) -> Result<Box<dyn DeviceLink>> {
        let (setup_tx, setup_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));

        let id = device_id.to_string();
        let rate = sample_rate;
        let capacity = self.link_buffer;
        let thread_stop = Arc::clone(&stop);
        let thread_failed = Arc::clone(&failed);

        // The stream must live on one thread for its whole lifetime.
        let thread = std::thread::Builder::new()
            .name(format!("cpal-link-{}", id))
            .spawn(move || {
                stream_thread(id, rate, capacity, setup_tx, thread_stop, thread_failed)
            })
            .map_err(|e| Error::Connection(format!("cannot spawn link thread: {}", e)))?;

        let producer = setup_rx
            .await
            .map_err(|_| Error::Connection("link thread died during setup".into()))??;

        info!("Connected to output device '{}'", device_id);
        Ok(Box::new(CpalLink {
            device_id: device_id.to_string(),
            producer,
            stop,
            failed,
            thread: Some(thread),
        }))
    }
}

/// Body of the per-link stream thread: open the device, run the stream,
/// park until told to stop, then drop the stream.
fn stream_thread(
    device_id: String,
    sample_rate: u32,
    capacity: usize,
    setup_tx: oneshot::Sender<Result<HeapProd<f32>>>,
    stop: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
) {
    let stream = match open_stream(&device_id, sample_rate, capacity, &failed) {
        Ok((stream, producer)) => {
            if setup_tx.send(Ok(producer)).is_err() {
                return; // connect() gave up
            }
            stream
        }
        Err(e) => {
            let _ = setup_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        error!("Failed to start stream on '{}': {}", device_id, e);
        failed.store(true, Ordering::Release);
    }

    while !stop.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(20));
    }
    drop(stream);
    debug!("Link thread for '{}' exited", device_id);
}

/// Find the device and build an output stream whose callback pops from a
/// fresh ring; returns the stream and the producer half for the link.
fn open_stream(
    device_id: &str,
    sample_rate: u32,
    capacity: usize,
    failed: &Arc<AtomicBool>,
) -> Result<(cpal::Stream, HeapProd<f32>)> {
    let host = cpal::default_host();
    let device = find_device(&host, device_id)?;

    // Need f32 output at the bus sample rate; prefer stereo, accept whatever
    // channel count the device offers (the mono sample is fanned out).
    let mut ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::Connection(format!("'{}': cannot query configs: {}", device_id, e)))?
        .filter(|r| {
            r.sample_format() == SampleFormat::F32
                && r.min_sample_rate().0 <= sample_rate
                && r.max_sample_rate().0 >= sample_rate
        })
        .collect();
    ranges.sort_by_key(|r| if r.channels() == 2 { 0 } else { 1 });

    let range = ranges.into_iter().next().ok_or_else(|| {
        Error::Connection(format!(
            "'{}' does not support {} Hz f32 output",
            device_id, sample_rate
        ))
    })?;

    let config = range.with_sample_rate(SampleRate(sample_rate)).config();
    let channels = config.channels as usize;

    debug!(
        "Opening '{}': {} Hz, {} channels",
        device_id, sample_rate, channels
    );

    let ring = HeapRb::<f32>::new(capacity);
    let (producer, mut consumer) = ring.split();

    let cb_failed = Arc::clone(failed);
    let err_id = device_id.to_string();
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _| {
                // Fan each mono sample out to every channel; silence on
                // underrun (the transport holds upstream, never skips).
                for frame in data.chunks_mut(channels) {
                    let sample = consumer.try_pop().unwrap_or(0.0);
                    frame.fill(sample);
                }
            },
            move |e| {
                error!("Stream error on '{}': {}", err_id, e);
                cb_failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| Error::Connection(format!("'{}': cannot open stream: {}", device_id, e)))?;

    Ok((stream, producer))
}

/// Find an output device by exact name, falling back to a case-insensitive
/// substring match.
fn find_device(host: &cpal::Host, device_id: &str) -> Result<cpal::Device> {
    let devices: Vec<cpal::Device> = host
        .output_devices()
        .map_err(|e| Error::Connection(format!("cannot enumerate devices: {}", e)))?
        .collect();

    if let Some(dev) = devices
        .iter()
        .position(|d| d.name().ok().as_deref() == Some(device_id))
    {
        return Ok(devices.into_iter().nth(dev).expect("index in range"));
    }

    let needle = device_id.to_lowercase();
    let pos = devices.iter().position(|d| {
        d.name()
            .map(|n| n.to_lowercase().contains(&needle))
            .unwrap_or(false)
    });

    match pos {
        Some(i) => {
            let dev = devices.into_iter().nth(i).expect("index in range");
            warn!(
                "No exact match for '{}', using '{}'",
                device_id,
                dev.name().unwrap_or_default()
            );
            Ok(dev)
        }
        None => Err(Error::Connection(format!(
            "output device '{}' not found",
            device_id
        ))),
    }
}

/// Connection handle for one cpal output stream.
struct CpalLink {
    device_id: String,
    producer: HeapProd<f32>,
    stop: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalLink {
    fn check_alive(&self) -> Result<()> {
        if self.failed.load(Ordering::Acquire) {
            return Err(Error::Stream(format!(
                "device '{}' reported a stream failure",
                self.device_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceLink for CpalLink {
    async fn write(&mut self, samples: &[f32]) -> Result<()> {
        let mut written = 0;
        while written < samples.len() {
            self.check_alive()?;
            written += self.producer.push_slice(&samples[written..]);
            if written < samples.len() {
                // Ring full: the sink is saturated, wait for the stream
                // clock to drain it.
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        while self.producer.occupied_len() > 0 {
            self.check_alive()?;
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let id = self.device_id.clone();
            let _ = tokio::task::spawn_blocking(move || {
                if handle.join().is_err() {
                    warn!("Link thread for '{}' panicked", id);
                }
            })
            .await;
            info!("Closed output device '{}'", self.device_id);
        }
        Ok(())
    }
}

impl Drop for CpalLink {
    fn drop(&mut self) {
        // Last-resort release; normal paths go through close().
        self.stop.store(true, Ordering::Release);
    }
}
