//! MTP-Core: USB Media Transfer Protocol responder in Rust.
//!
//! This crate implements the device side of MTP for a portable media
//! player: the command/data/response transaction state machine, the
//! container codec and the operation handlers that expose a media index to
//! the host. A small host-side initiator drives it from tests and tools.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, response codes, container and dataset codec
//! - **Transport**: Endpoint driver abstraction (mock, loopback) and host transports (nusb)
//! - **State**: Transaction state machine context and operation handlers
//! - **Responder**: Event-driven orchestrator fed by transfer completions
//! - **Descriptor**: Interface/endpoint descriptors and endpoint allocation
//! - **Index / Platform**: Collaborators for the media index, battery and clock
//! - **Events**: Observer pattern for UI decoupling
//! - **Initiator**: Host-side client for probing and simulation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mtp_core::{
//!     LoopbackHost, MtpInitiator, ResponderConfig, StaticIndex, SystemPlatform, TracingObserver,
//! };
//!
//! let host = LoopbackHost::connect(
//!     StaticIndex::new(["/music/track.mp3"]),
//!     SystemPlatform::default(),
//!     ResponderConfig::default(),
//!     Arc::new(TracingObserver),
//! );
//! let mut initiator = MtpInitiator::new(host);
//! initiator.open_session(1).expect("open session");
//! let handles = initiator.object_handles(0xFFFF_FFFF).expect("list objects");
//! println!("{} objects", handles.len());
//! ```

pub mod config;
pub mod descriptor;
pub mod events;
pub mod index;
pub mod initiator;
pub mod platform;
pub mod protocol;
pub mod responder;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use config::{DeviceIdentity, ResponderConfig, StorageConfig};
pub use descriptor::{EndpointSet, MtpInterface};
pub use events::{
    LogLevel, NullObserver, RecordingObserver, ResponderEvent, ResponderObserver, TracingObserver,
};
pub use index::{IndexTag, ObjectIndex, StaticIndex};
pub use initiator::{DeviceInfo, InitiatorError, MtpInitiator, StorageInfo};
pub use platform::{FixedPlatform, Platform, SystemPlatform};
pub use protocol::{CodecError, MtpDateTime, ResponseCode};
pub use responder::MtpResponder;
pub use state::ResponderState;
pub use transport::{
    ControlRequest, EndpointDriver, LoopbackDriver, LoopbackHost, MockDriver, NusbTransport,
    TransferCompletion, TransportError, UsbTransport,
};
