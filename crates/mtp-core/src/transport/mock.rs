//! Mock endpoint driver for testing.

use std::sync::{Arc, Mutex};

use super::traits::{
    Direction, Endpoint, EndpointAllocator, EndpointDriver, TransferKind, TransportError,
};

/// One call made on the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverAction {
    Send { endpoint: Endpoint, data: Vec<u8> },
    Receive { endpoint: Endpoint, max_len: usize },
    Stall { endpoint: Endpoint, stalled: bool },
    ControlSend(Vec<u8>),
    ControlAck,
}

/// Mock driver for unit testing state machine logic.
///
/// Clones share the same action log, so a test can keep one handle while
/// the responder owns another.
#[derive(Clone)]
pub struct MockDriver {
    /// Captured actions, oldest first.
    log: Arc<Mutex<Vec<DriverAction>>>,
    /// Whether posted transfers are accepted.
    connected: Arc<Mutex<bool>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Get all captured actions.
    pub fn actions(&self) -> Vec<DriverAction> {
        self.log.lock().unwrap().clone()
    }

    /// Get and clear all captured actions.
    pub fn take_actions(&self) -> Vec<DriverAction> {
        std::mem::take(&mut *self.log.lock().unwrap())
    }

    /// Payloads sent on the bulk IN endpoint.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                DriverAction::Send {
                    endpoint: Endpoint::BulkIn,
                    data,
                } => Some(data),
                _ => None,
            })
            .collect()
    }

    /// Current halt state of an endpoint, replayed from the log.
    pub fn is_stalled(&self, endpoint: Endpoint) -> bool {
        self.actions()
            .iter()
            .rev()
            .find_map(|a| match a {
                DriverAction::Stall {
                    endpoint: ep,
                    stalled,
                } if *ep == endpoint => Some(*stalled),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// Simulate the controller refusing new transfers.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    fn record(&self, action: DriverAction) {
        self.log.lock().unwrap().push(action);
    }

    fn check_connected(&self) -> Result<(), TransportError> {
        if *self.connected.lock().unwrap() {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointDriver for MockDriver {
    fn send(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<(), TransportError> {
        self.check_connected()?;
        self.record(DriverAction::Send {
            endpoint,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn receive(&mut self, endpoint: Endpoint, max_len: usize) -> Result<(), TransportError> {
        self.check_connected()?;
        self.record(DriverAction::Receive { endpoint, max_len });
        Ok(())
    }

    fn stall(&mut self, endpoint: Endpoint, stalled: bool) {
        self.record(DriverAction::Stall { endpoint, stalled });
    }

    fn send_control(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.check_connected()?;
        self.record(DriverAction::ControlSend(data.to_vec()));
        Ok(())
    }

    fn ack_control(&mut self) {
        self.record(DriverAction::ControlAck);
    }
}

/// Endpoint allocator handing out addresses from a fixed pool.
#[derive(Debug, Default)]
pub struct MockAllocator {
    /// Remaining endpoint numbers, handed out in order.
    pub free: Vec<u8>,
    /// Addresses released back by the caller.
    pub released: Vec<u8>,
}

impl MockAllocator {
    pub fn with_endpoints(numbers: &[u8]) -> Self {
        Self {
            free: numbers.to_vec(),
            released: Vec::new(),
        }
    }
}

impl EndpointAllocator for MockAllocator {
    fn request_endpoint(&mut self, _kind: TransferKind, direction: Direction) -> Option<u8> {
        if self.free.is_empty() {
            return None;
        }
        let number = self.free.remove(0);
        Some(match direction {
            Direction::In => number | 0x80,
            Direction::Out => number,
        })
    }

    fn release_endpoint(&mut self, address: u8) {
        self.released.push(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_action_capture() {
        let mut mock = MockDriver::new();
        let probe = mock.clone();
        mock.send(Endpoint::BulkIn, b"Hello").unwrap();
        mock.receive(Endpoint::BulkOut, 1024).unwrap();

        let actions = probe.actions();
        assert_eq!(actions.len(), 2);
        assert_eq!(probe.sent(), vec![b"Hello".to_vec()]);
        assert_eq!(
            actions[1],
            DriverAction::Receive {
                endpoint: Endpoint::BulkOut,
                max_len: 1024
            }
        );
    }

    #[test]
    fn test_mock_stall_state() {
        let mut mock = MockDriver::new();
        assert!(!mock.is_stalled(Endpoint::BulkIn));
        mock.stall(Endpoint::BulkIn, true);
        assert!(mock.is_stalled(Endpoint::BulkIn));
        mock.stall(Endpoint::BulkIn, false);
        assert!(!mock.is_stalled(Endpoint::BulkIn));
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockDriver::new();
        mock.disconnect();
        assert!(mock.send(Endpoint::BulkIn, b"test").is_err());
        mock.reconnect();
        assert!(mock.send(Endpoint::BulkIn, b"test").is_ok());
    }

    #[test]
    fn test_allocator_addresses() {
        let mut alloc = MockAllocator::with_endpoints(&[1, 2]);
        assert_eq!(alloc.request_endpoint(TransferKind::Bulk, Direction::In), Some(0x81));
        assert_eq!(alloc.request_endpoint(TransferKind::Bulk, Direction::Out), Some(0x02));
        assert_eq!(alloc.request_endpoint(TransferKind::Interrupt, Direction::In), None);
    }
}
