//! Shared test fixtures: scripted mock device connector and wav generation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stemcast::audio::types::AudioSource;
use stemcast::audio::{Separator, Stem, StemSet};
use stemcast::config::EngineConfig;
use stemcast::device::{DeviceConnector, DeviceDescriptor, DeviceLink};
use stemcast::error::{Error, Result};

/// Engine config with tiny budgets so failure paths resolve in milliseconds.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.transport.connect_attempts = 3;
    config.transport.connect_backoff_ms = 1;
    config.transport.write_retries = 2;
    config.transport.chunk_frames = 256;
    config.transport.ring_capacity = 1024;
    config.transport.write_timeout_ms = 1_000;
    config.transport.flush_timeout_ms = 1_000;
    config.transport.teardown_timeout_ms = 2_000;
    config
}

/// Scripted failure behavior for one mock device.
#[derive(Debug, Clone, Default)]
pub struct DeviceScript {
    /// Fail the first N connect attempts
    pub fail_connects: u32,

    /// Never connect successfully
    pub refuse_connects: bool,

    /// Zero-based write indices that fail (per device, across reconnects)
    pub failing_writes: Vec<usize>,

    /// All writes at or past this index fail
    pub fail_writes_from: Option<usize>,
}

#[derive(Default)]
struct DeviceRecord {
    connects: u32,
    closes: u32,
    writes: u32,
    samples: Vec<f32>,
}

/// In-memory device connector recording every collaborator call.
#[derive(Default)]
pub struct MockConnector {
    scripts: Mutex<HashMap<String, DeviceScript>>,
    records: Arc<Mutex<HashMap<String, DeviceRecord>>>,
    /// Every connect attempt, in arrival order
    connect_log: Mutex<Vec<String>>,
    open_links: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, device: &str, script: DeviceScript) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .insert(device.to_string(), script);
        Arc::clone(self)
    }

    pub fn connect_attempts(&self, device: &str) -> u32 {
        self.records
            .lock()
            .unwrap()
            .get(device)
            .map(|r| r.connects)
            .unwrap_or(0)
    }

    pub fn total_connect_calls(&self) -> usize {
        self.connect_log.lock().unwrap().len()
    }

    pub fn closes(&self, device: &str) -> u32 {
        self.records
            .lock()
            .unwrap()
            .get(device)
            .map(|r| r.closes)
            .unwrap_or(0)
    }

    /// Samples successfully written to the device, in order.
    pub fn written(&self, device: &str) -> Vec<f32> {
        self.records
            .lock()
            .unwrap()
            .get(device)
            .map(|r| r.samples.clone())
            .unwrap_or_default()
    }

    /// Links opened but never closed.
    pub fn leaked_links(&self) -> usize {
        self.open_links.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceConnector for MockConnector {
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok(self
            .scripts
            .lock()
            .unwrap()
            .keys()
            .map(|id| DeviceDescriptor { id: id.clone() })
            .collect())
    }

    async fn connect(&self, device_id: &str, _sample_rate: u32) -> Result<Box<dyn DeviceLink>> {
        self.connect_log.lock().unwrap().push(device_id.to_string());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(device_id)
            .cloned()
            .unwrap_or_default();

        let attempt = {
            let mut records = self.records.lock().unwrap();
            let record = records.entry(device_id.to_string()).or_default();
            record.connects += 1;
            record.connects
        };

        if script.refuse_connects || attempt <= script.fail_connects {
            return Err(Error::Connection(format!(
                "mock device '{}' refused connect attempt {}",
                device_id, attempt
            )));
        }

        self.open_links.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockLink {
            device_id: device_id.to_string(),
            script,
            records: Arc::clone(&self.records),
            open_links: Arc::clone(&self.open_links),
            closed: false,
        }))
    }
}

// Links must be 'static, so each one keeps its own Arc to the shared
// record map rather than borrowing from the connector.
struct MockLink {
    device_id: String,
    script: DeviceScript,
    records: Arc<Mutex<HashMap<String, DeviceRecord>>>,
    open_links: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl DeviceLink for MockLink {
    async fn write(&mut self, samples: &[f32]) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(self.device_id.clone()).or_default();

        let index = record.writes as usize;
        record.writes += 1;

        let scripted_fail = self.script.failing_writes.contains(&index)
            || self
                .script
                .fail_writes_from
                .is_some_and(|from| index >= from);
        if scripted_fail {
            return Err(Error::Stream(format!(
                "mock device '{}' dropped write {}",
                self.device_id, index
            )));
        }

        record.samples.extend_from_slice(samples);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.open_links.fetch_sub(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            records.entry(self.device_id.clone()).or_default().closes += 1;
        }
        Ok(())
    }
}

/// Separator returning synthetic constant-valued stems, recording calls.
pub struct MockSeparator {
    pub levels: HashMap<Stem, f32>,
    pub calls: AtomicUsize,
}

impl MockSeparator {
    pub fn new() -> Self {
        let mut levels = HashMap::new();
        levels.insert(Stem::Vocals, 0.1);
        levels.insert(Stem::Drums, 0.2);
        levels.insert(Stem::Bass, 0.3);
        levels.insert(Stem::Other, 0.4);
        Self {
            levels,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Separator for MockSeparator {
    async fn separate(&self, _path: &Path, source: &AudioSource) -> Result<StemSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let frames = source.frames();
        let buffers: HashMap<Stem, Vec<f32>> = self
            .levels
            .iter()
            .map(|(&stem, &level)| (stem, vec![level; frames]))
            .collect();
        StemSet::new(buffers, source.sample_rate)
    }
}

/// Write a stereo wav whose left channel is a ramp and right its negation.
/// Returns the file path; keep the TempDir alive for the test's duration.
pub fn stereo_fixture(dir: &tempfile::TempDir, frames: usize) -> PathBuf {
    let path = dir.path().join("source.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        let s = ((i % 1000) as i16) * 16;
        writer.write_sample(s).unwrap();
        writer.write_sample(-s).unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Write a mono wav fixture.
pub fn mono_fixture(dir: &tempfile::TempDir, frames: usize) -> PathBuf {
    let path = dir.path().join("mono.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample((i % 100) as i16).unwrap();
    }
    writer.finalize().unwrap();
    path
}
