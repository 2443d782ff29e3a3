//! USB Transport layer abstraction.
//!
//! Device side: [`EndpointDriver`] is the thin surface the responder needs
//! from a USB device controller driver (post transfers, stall endpoints,
//! answer on the control pipe). Completions come back as
//! [`TransferCompletion`] events fed into the responder.
//!
//! Host side: [`UsbTransport`] is a blocking bulk pipe used by the
//! initiator (nusb, loopback).

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("No MTP interface found")]
    NoMtpInterface,

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Unable to allocate {kind} {direction} endpoint")]
    EndpointUnavailable {
        kind: TransferKind,
        direction: Direction,
    },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Endpoint {0} is stalled")]
    Stalled(Endpoint),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Logical endpoints of the MTP interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Control,
    Interrupt,
    BulkIn,
    BulkOut,
}

impl Endpoint {
    /// Data direction of the endpoint (control is reported as IN).
    pub fn direction(&self) -> Direction {
        match self {
            Endpoint::BulkOut => Direction::Out,
            Endpoint::Control | Endpoint::Interrupt | Endpoint::BulkIn => Direction::In,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Control => write!(f, "EP0"),
            Endpoint::Interrupt => write!(f, "INT-IN"),
            Endpoint::BulkIn => write!(f, "BULK-IN"),
            Endpoint::BulkOut => write!(f, "BULK-OUT"),
        }
    }
}

/// Transfer direction, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device -> Host
    In,
    /// Host -> Device
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Bulk,
    Interrupt,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Bulk => write!(f, "bulk"),
            TransferKind::Interrupt => write!(f, "interrupt"),
        }
    }
}

/// Transfer-complete upcall from the device controller driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCompletion {
    pub endpoint: Endpoint,
    pub direction: Direction,
    /// Zero on success, driver-specific error otherwise.
    pub status: i32,
    /// Bytes actually transferred.
    pub length: usize,
}

impl TransferCompletion {
    pub fn new(endpoint: Endpoint, status: i32, length: usize) -> Self {
        Self {
            endpoint,
            direction: endpoint.direction(),
            status,
            length,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

/// Setup packet of a control request addressed to the MTP interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    /// wLength: bytes the host accepts in the data stage.
    pub length: u16,
}

impl ControlRequest {
    /// Class request to the interface, device-to-host when `length` is non-zero.
    pub fn class(request: u8, length: u16) -> Self {
        Self {
            request_type: if length > 0 { 0xA1 } else { 0x21 },
            request,
            value: 0,
            index: 0,
            length,
        }
    }
}

/// Device-side endpoint primitives.
///
/// `send` and `receive` only post the transfer; the driver reports the
/// outcome later through a [`TransferCompletion`].
pub trait EndpointDriver {
    /// Post `data` on an IN endpoint.
    fn send(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<(), TransportError>;

    /// Post a receive of up to `max_len` bytes on an OUT endpoint.
    fn receive(&mut self, endpoint: Endpoint, max_len: usize) -> Result<(), TransportError>;

    /// Set or clear the halt condition of an endpoint.
    fn stall(&mut self, endpoint: Endpoint, stalled: bool);

    /// Send the data stage of a control request.
    fn send_control(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Acknowledge the current control request.
    fn ack_control(&mut self);
}

/// Endpoint allocation at enumeration time.
pub trait EndpointAllocator {
    /// Request an endpoint, returning its address.
    fn request_endpoint(&mut self, kind: TransferKind, direction: Direction) -> Option<u8>;

    fn release_endpoint(&mut self, address: u8);
}

/// Abstract host-side USB transport interface.
///
/// This trait enables:
/// - Talking to real devices using nusb
/// - An in-process loopback against a responder
pub trait UsbTransport: Send + Sync {
    /// Write raw bytes to the bulk OUT endpoint.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read raw bytes from the bulk IN endpoint.
    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Class request to the MTP interface with a device-to-host data stage
    /// of up to `length` bytes.
    fn class_request_in(&self, request: u8, length: u16) -> Result<Vec<u8>, TransportError>;

    /// Class request to the MTP interface without a data stage.
    fn class_request_out(&self, request: u8) -> Result<(), TransportError>;

    /// Check if device is still connected.
    fn is_connected(&self) -> bool;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
