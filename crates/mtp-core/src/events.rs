//! Event system for UI decoupling.
//!
//! Allows CLI/GUI front-ends and tests to follow the responder without
//! tight coupling to the core logic.

use std::fmt;

use crate::protocol::{DataPhase, ResponseCode};
use crate::state::ResponderState;
use crate::transport::{Direction, Endpoint};

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Events emitted by the responder.
#[derive(Debug, Clone)]
pub enum ResponderEvent {
    /// Host configured the interface; the first receive is posted.
    ConnectionInitialized,
    /// Interface torn down.
    Disconnected,
    /// State changed.
    StateChanged {
        from: ResponderState,
        to: ResponderState,
    },
    /// Valid command block received.
    CommandReceived {
        code: u16,
        transaction_id: u32,
        params: Vec<u32>,
    },
    /// Operation rejected with a response code.
    OperationFailed {
        code: u16,
        response: ResponseCode,
        phase: DataPhase,
    },
    /// Response container posted.
    ResponseSent {
        response: ResponseCode,
        transaction_id: u32,
    },
    /// Protocol fault; endpoints stalled until device reset.
    Fault { error: ResponseCode },
    /// Device-reset control request processed.
    DeviceReset,
    /// Session opened or closed.
    SessionChanged { session_id: u32 },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// USB packet posted or completed.
    Packet {
        endpoint: Endpoint,
        direction: Direction,
        length: usize,
        data: Option<Vec<u8>>,
    },
}

impl fmt::Display for ResponderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponderEvent::ConnectionInitialized => write!(f, "connection initialized"),
            ResponderEvent::Disconnected => write!(f, "disconnected"),
            ResponderEvent::StateChanged { from, to } => write!(f, "{} -> {}", from, to),
            ResponderEvent::CommandReceived {
                code,
                transaction_id,
                params,
            } => write!(
                f,
                "command 0x{:04X} tid={} params={:X?}",
                code, transaction_id, params
            ),
            ResponderEvent::OperationFailed {
                code,
                response,
                phase,
            } => write!(f, "op 0x{:04X} failed: {} ({:?})", code, response, phase),
            ResponderEvent::ResponseSent {
                response,
                transaction_id,
            } => write!(f, "response {} tid={}", response, transaction_id),
            ResponderEvent::Fault { error } => write!(f, "fault: {}", error),
            ResponderEvent::DeviceReset => write!(f, "device reset"),
            ResponderEvent::SessionChanged { session_id } => {
                write!(f, "session 0x{:08X}", session_id)
            }
            ResponderEvent::Log { message, .. } => write!(f, "{}", message),
            ResponderEvent::Packet {
                endpoint,
                direction,
                length,
                ..
            } => write!(f, "{} {} {} bytes", endpoint, direction, length),
        }
    }
}

/// Observer trait for receiving responder events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait ResponderObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &ResponderEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl ResponderObserver for NullObserver {
    fn on_event(&self, _event: &ResponderEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl ResponderObserver for TracingObserver {
    fn on_event(&self, event: &ResponderEvent) {
        match event {
            ResponderEvent::ConnectionInitialized => {
                tracing::info!("MTP connection initialized");
            }
            ResponderEvent::Disconnected => {
                tracing::info!("MTP disconnected");
            }
            ResponderEvent::StateChanged { from, to } => {
                tracing::trace!(from = %from, to = %to, "State changed");
            }
            ResponderEvent::CommandReceived {
                code,
                transaction_id,
                params,
            } => {
                tracing::debug!(
                    code = %format!("0x{:04X}", code),
                    tid = transaction_id,
                    params = ?params,
                    "Command received"
                );
            }
            ResponderEvent::OperationFailed {
                code,
                response,
                phase,
            } => {
                tracing::info!(
                    code = %format!("0x{:04X}", code),
                    response = %response,
                    phase = ?phase,
                    "Operation failed"
                );
            }
            ResponderEvent::ResponseSent {
                response,
                transaction_id,
            } => {
                tracing::debug!(response = %response, tid = transaction_id, "Response sent");
            }
            ResponderEvent::Fault { error } => {
                tracing::error!(error = %error, "Protocol fault, waiting for device reset");
            }
            ResponderEvent::DeviceReset => {
                tracing::info!("Device reset");
            }
            ResponderEvent::SessionChanged { session_id } => {
                tracing::info!(session = %format!("0x{:08X}", session_id), "Session changed");
            }
            ResponderEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            ResponderEvent::Packet {
                endpoint,
                direction,
                length,
                ..
            } => {
                tracing::trace!(ep = %endpoint, dir = %direction, len = length, "USB Packet");
            }
        }
    }
}

/// Observer that keeps every event, for tests and front-ends that poll.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<ResponderEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ResponderEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ResponderObserver for RecordingObserver {
    fn on_event(&self, event: &ResponderEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
