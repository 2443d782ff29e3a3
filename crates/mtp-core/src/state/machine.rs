//! State machine implementation for the MTP responder.

use std::fmt;

use crate::protocol::{Command, Response, ResponseCode};

/// Phase of the current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponderState {
    /// Idle, a bulk-out receive is posted for the next command.
    #[default]
    WaitingForCommand,
    /// Command being dispatched.
    Busy,
    /// Data block posted on bulk-in; the response follows.
    SendingDataBlock,
    /// Response posted on bulk-in.
    SendingResponse,
    /// Waiting for the host's data block on bulk-out.
    ReceivingDataBlock,
    /// Bulk endpoints stalled until the host issues a device reset.
    ErrorWaitingReset,
}

impl fmt::Display for ResponderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponderState::WaitingForCommand => write!(f, "WAITING_FOR_COMMAND"),
            ResponderState::Busy => write!(f, "BUSY"),
            ResponderState::SendingDataBlock => write!(f, "SENDING_DATA_BLOCK"),
            ResponderState::SendingResponse => write!(f, "SENDING_RESPONSE"),
            ResponderState::ReceivingDataBlock => write!(f, "RECEIVING_DATA_BLOCK"),
            ResponderState::ErrorWaitingReset => write!(f, "ERROR_WAITING_RESET"),
        }
    }
}

/// Handler that consumes a received data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataHandler {
    /// SetDevicePropValue(FriendlyName)
    SetFriendlyName,
}

/// What to do once the host's data block arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveCompletion {
    /// Throw the data away and send the staged response.
    #[default]
    Discard,
    /// Validate the container and hand the payload to a handler.
    Handler(DataHandler),
}

/// MTP session bookkeeping. Id 0 means no session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    id: u32,
}

impl Session {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.id != 0
    }

    pub fn open(&mut self, id: u32) {
        self.id = id;
    }

    pub fn close(&mut self) {
        self.id = 0;
    }
}

/// State machine context holding all per-connection runtime state.
#[derive(Debug, Default)]
pub struct MachineContext {
    /// Current phase.
    pub state: ResponderState,
    pub session: Session,
    /// Command being processed.
    pub command: Command,
    /// Response staged for the current command.
    pub response: Response,
    /// Error latched on the last fault, reported by Get-Device-Status.
    pub error: Option<ResponseCode>,
    /// Pending receive continuation.
    pub receive: ReceiveCompletion,
    /// Current FriendlyName property value.
    pub friendly_name: String,
}

impl MachineContext {
    pub fn new(friendly_name: impl Into<String>) -> Self {
        Self {
            friendly_name: friendly_name.into(),
            ..Self::default()
        }
    }

    /// Transition to a new state, returning the previous one.
    pub fn goto_state(&mut self, new_state: ResponderState) -> ResponderState {
        tracing::debug!(from = %self.state, to = %new_state, "State transition");
        std::mem::replace(&mut self.state, new_state)
    }

    /// Stage a response with no parameters.
    pub fn set_response(&mut self, code: ResponseCode) {
        self.response = Response::new(code);
    }

    /// Status code for Get-Device-Status.
    pub fn device_status(&self) -> ResponseCode {
        match self.state {
            ResponderState::ErrorWaitingReset => {
                self.error.unwrap_or(ResponseCode::GENERAL_ERROR)
            }
            ResponderState::Busy => ResponseCode::DEVICE_BUSY,
            _ => ResponseCode::OK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let mut session = Session::default();
        assert!(!session.is_open());
        session.open(0xAABBCCDD);
        assert!(session.is_open());
        assert_eq!(session.id(), 0xAABBCCDD);
        session.close();
        assert_eq!(session.id(), 0);
    }

    #[test]
    fn test_device_status_by_state() {
        let mut ctx = MachineContext::new("player");
        assert_eq!(ctx.device_status(), ResponseCode::OK);

        ctx.goto_state(ResponderState::Busy);
        assert_eq!(ctx.device_status(), ResponseCode::DEVICE_BUSY);

        ctx.error = Some(ResponseCode::INVALID_DATASET);
        let prev = ctx.goto_state(ResponderState::ErrorWaitingReset);
        assert_eq!(prev, ResponderState::Busy);
        assert_eq!(ctx.device_status(), ResponseCode::INVALID_DATASET);

        ctx.goto_state(ResponderState::SendingResponse);
        assert_eq!(ctx.device_status(), ResponseCode::OK);
    }
}
