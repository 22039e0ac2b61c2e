//! Dual-output streaming engine
//!
//! Composition (mixer, sync), per-device transport, and the orchestrator
//! that ties a session together.

pub mod events;
pub mod mixer;
pub mod orchestrator;
pub mod resolver;
pub mod ring_buffer;
pub mod session;
pub mod sync;
pub mod transport;

pub use events::{TransportEvent, TransportEventKind, TransportState};
pub use orchestrator::{MixMode, SessionRequest, StreamOrchestrator};
pub use resolver::StemSelection;
pub use session::{DeviceBinding, SessionStatus, StreamSession};
pub use transport::DeviceTransport;
