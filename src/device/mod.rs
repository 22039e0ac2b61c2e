//! Device discovery and sink collaborator seams
//!
//! Discovery/pairing is represented as a stateless collaborator: explicit
//! identifiers in, explicit connection handles out. No global connection
//! table; each transport owns its link exclusively and must close it on every
//! exit path.

pub mod output;

use crate::error::Result;
use async_trait::async_trait;

pub use output::CpalConnector;

/// An output device as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Identifier accepted by `connect` (the OS device name)
    pub id: String,
}

/// Discovery and connection collaborator.
///
/// One connector serves both transports; each `connect` call returns an
/// independent link.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Enumerate available output devices.
    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open a connection to the named device for mono output at the given
    /// sample rate.
    ///
    /// # Errors
    /// `Error::Connection` if the device is unknown, refuses the link, or
    /// cannot play at that rate.
    async fn connect(&self, device_id: &str, sample_rate: u32) -> Result<Box<dyn DeviceLink>>;
}

/// An open connection to one output device.
///
/// `write` returns once the sink has accepted the frames; a slow sink
/// therefore exerts backpressure on the caller. The link must be closed
/// explicitly; implementations also release on drop as a last resort.
#[async_trait]
pub trait DeviceLink: Send {
    /// Write a chunk of mono samples to the sink.
    ///
    /// # Errors
    /// `Error::Stream` if the sink reports a disconnect or I/O failure.
    async fn write(&mut self, samples: &[f32]) -> Result<()>;

    /// Wait until the sink has played out everything accepted so far.
    async fn flush(&mut self) -> Result<()>;

    /// Close the connection. Idempotent.
    async fn close(&mut self) -> Result<()>;
}
