//! In-process loopback between a host-side initiator and a responder.
//!
//! [`LoopbackDriver`] is the device half: bulk-in sends are queued for the
//! host, a bulk-out receive marks the pipe ready. [`LoopbackHost`] is the
//! host half: a write becomes a bulk-out completion, a read drains queued
//! bulk-in data and completes the transfer once it has been fully read.
//! Reads shorter than a queued transfer split it into several packets.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use super::traits::{
    ControlRequest, Endpoint, EndpointDriver, TransferCompletion, TransportError, UsbTransport,
};
use crate::config::ResponderConfig;
use crate::events::ResponderObserver;
use crate::index::ObjectIndex;
use crate::platform::Platform;
use crate::responder::MtpResponder;

/// VID/PID the loopback reports (pid.codes test range).
pub const LOOPBACK_VENDOR_ID: u16 = 0x1209;
pub const LOOPBACK_PRODUCT_ID: u16 = 0x0001;

/// Bulk-in transfer posted by the device, partly read by the host.
#[derive(Debug)]
struct PendingIn {
    data: Vec<u8>,
    offset: usize,
}

/// Shared wire state between the two halves.
#[derive(Debug, Default)]
struct Bus {
    to_host: VecDeque<PendingIn>,
    /// Posted bulk-out receive size.
    out_posted: Option<usize>,
    stalled_in: bool,
    stalled_out: bool,
    control_data: Option<Vec<u8>>,
}

type SharedBus = Arc<Mutex<Bus>>;

fn lock(bus: &SharedBus) -> Result<MutexGuard<'_, Bus>, TransportError> {
    bus.lock().map_err(|_| TransportError::Disconnected)
}

/// Device half of the loopback.
#[derive(Debug, Clone, Default)]
pub struct LoopbackDriver {
    bus: SharedBus,
}

impl LoopbackDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointDriver for LoopbackDriver {
    fn send(&mut self, endpoint: Endpoint, data: &[u8]) -> Result<(), TransportError> {
        if endpoint != Endpoint::BulkIn {
            return Err(TransportError::WriteFailed(format!(
                "loopback cannot send on {}",
                endpoint
            )));
        }
        let mut bus = lock(&self.bus)?;
        bus.to_host.push_back(PendingIn {
            data: data.to_vec(),
            offset: 0,
        });
        trace!(len = data.len(), queued = bus.to_host.len(), "Bulk-in queued");
        Ok(())
    }

    fn receive(&mut self, endpoint: Endpoint, max_len: usize) -> Result<(), TransportError> {
        if endpoint != Endpoint::BulkOut {
            return Err(TransportError::ReadFailed(format!(
                "loopback cannot receive on {}",
                endpoint
            )));
        }
        lock(&self.bus)?.out_posted = Some(max_len);
        Ok(())
    }

    fn stall(&mut self, endpoint: Endpoint, stalled: bool) {
        if let Ok(mut bus) = self.bus.lock() {
            match endpoint {
                Endpoint::BulkIn => {
                    bus.stalled_in = stalled;
                    if stalled {
                        bus.to_host.clear();
                    }
                }
                Endpoint::BulkOut => bus.stalled_out = stalled,
                Endpoint::Control | Endpoint::Interrupt => {}
            }
        }
    }

    fn send_control(&mut self, data: &[u8]) -> Result<(), TransportError> {
        lock(&self.bus)?.control_data = Some(data.to_vec());
        Ok(())
    }

    fn ack_control(&mut self) {}
}

/// Responder type driven by a loopback.
pub type LoopbackResponder<I, P, O> = MtpResponder<LoopbackDriver, I, P, O>;

/// Host half of the loopback.
pub struct LoopbackHost<I, P, O>
where
    I: ObjectIndex,
    P: Platform,
    O: ResponderObserver,
{
    responder: Arc<Mutex<LoopbackResponder<I, P, O>>>,
    bus: SharedBus,
}

impl<I, P, O> LoopbackHost<I, P, O>
where
    I: ObjectIndex,
    P: Platform,
    O: ResponderObserver,
{
    /// Build a responder on a fresh bus and bring the connection up.
    pub fn connect(index: I, platform: P, config: ResponderConfig, observer: Arc<O>) -> Self {
        let driver = LoopbackDriver::new();
        let bus = driver.bus.clone();
        let mut responder = MtpResponder::with_observer(driver, index, platform, config, observer);
        responder.init_connection();
        Self {
            responder: Arc::new(Mutex::new(responder)),
            bus,
        }
    }

    /// Shared handle to the device side.
    pub fn responder(&self) -> Arc<Mutex<LoopbackResponder<I, P, O>>> {
        self.responder.clone()
    }

    fn with_responder<R>(
        &self,
        f: impl FnOnce(&mut LoopbackResponder<I, P, O>) -> R,
    ) -> Result<R, TransportError> {
        let mut responder = self
            .responder
            .lock()
            .map_err(|_| TransportError::Disconnected)?;
        Ok(f(&mut responder))
    }

    fn control(&self, request: u8, length: u16) -> Result<Vec<u8>, TransportError> {
        let req = ControlRequest::class(request, length);
        let handled = self.with_responder(|r| r.control_request(&req))?;
        let data = lock(&self.bus)?.control_data.take();
        if !handled {
            debug!(request = %format!("0x{:02X}", request), "Control request stalled");
            return Err(TransportError::Stalled(Endpoint::Control));
        }
        Ok(data.unwrap_or_default())
    }
}

impl<I, P, O> UsbTransport for LoopbackHost<I, P, O>
where
    I: ObjectIndex + Send,
    I::Cursor: Send,
    P: Platform + Send,
    O: ResponderObserver,
{
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        {
            let mut bus = lock(&self.bus)?;
            if bus.stalled_out {
                return Err(TransportError::Stalled(Endpoint::BulkOut));
            }
            let max_len = bus
                .out_posted
                .ok_or_else(|| TransportError::WriteFailed("no receive posted".into()))?;
            if data.len() > max_len {
                return Err(TransportError::WriteFailed(format!(
                    "{} bytes exceed the posted receive of {}",
                    data.len(),
                    max_len
                )));
            }
            bus.out_posted = None;
        }
        self.with_responder(|r| r.on_bulk_out(data, 0))?;
        Ok(data.len())
    }

    fn read(&self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let (chunk, completed) = {
            let mut bus = lock(&self.bus)?;
            if bus.stalled_in {
                return Err(TransportError::Stalled(Endpoint::BulkIn));
            }
            let pending = bus
                .to_host
                .front_mut()
                .ok_or_else(|| TransportError::ReadFailed("no bulk-in data pending".into()))?;
            let take = max_len.min(pending.data.len() - pending.offset);
            let chunk = pending.data[pending.offset..pending.offset + take].to_vec();
            pending.offset += take;
            let completed = if pending.offset >= pending.data.len() {
                bus.to_host.pop_front().map(|p| p.data.len())
            } else {
                None
            };
            (chunk, completed)
        };

        if let Some(length) = completed {
            self.with_responder(|r| {
                r.on_transfer_complete(TransferCompletion::new(Endpoint::BulkIn, 0, length))
            })?;
        }
        Ok(chunk)
    }

    fn class_request_in(&self, request: u8, length: u16) -> Result<Vec<u8>, TransportError> {
        self.control(request, length)
    }

    fn class_request_out(&self, request: u8) -> Result<(), TransportError> {
        self.control(request, 0).map(|_| ())
    }

    fn is_connected(&self) -> bool {
        self.with_responder(|r| r.is_active()).unwrap_or(false)
    }

    fn vendor_id(&self) -> u16 {
        LOOPBACK_VENDOR_ID
    }

    fn product_id(&self) -> u16 {
        LOOPBACK_PRODUCT_ID
    }
}
