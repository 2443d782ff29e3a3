//! MTP responder - drives the transaction state machine from USB events.
//!
//! The responder is fed one event at a time: transfer completions from the
//! device controller driver and class-specific control requests. Each
//! command walks command -> optional data block -> response; any protocol
//! violation stalls both bulk endpoints until the host sends a device reset.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, info, instrument, warn};

use crate::config::ResponderConfig;
use crate::events::{LogLevel, ResponderEvent, ResponderObserver, TracingObserver};
use crate::index::{CursorSlot, ObjectIndex};
use crate::platform::Platform;
use crate::protocol::constants::*;
use crate::protocol::{Command, ContainerHeader, ContainerType, ResponseCode};
use crate::state::handlers::{self, HandleResult, HandlerContext, OpResult};
use crate::state::machine::{MachineContext, ReceiveCompletion, ResponderState};
use crate::transport::{
    ControlRequest, Direction, Endpoint, EndpointDriver, TransferCompletion,
};

/// Bytes of a posted transfer copied into packet events.
const PACKET_PREVIEW: usize = 32;

/// MTP responder for one USB connection.
pub struct MtpResponder<D, I, P, O = TracingObserver>
where
    D: EndpointDriver,
    I: ObjectIndex,
    P: Platform,
    O: ResponderObserver,
{
    driver: D,
    index: I,
    platform: P,
    config: ResponderConfig,
    observer: Arc<O>,
    machine: MachineContext,
    cursor: CursorSlot<I::Cursor>,
    /// Bulk-out staging buffer.
    recv_buffer: Vec<u8>,
    /// Bulk-in staging buffer.
    send_buffer: Vec<u8>,
    active: bool,
    /// A bulk-out receive is outstanding.
    receive_posted: bool,
}

impl<D, I, P> MtpResponder<D, I, P, TracingObserver>
where
    D: EndpointDriver,
    I: ObjectIndex,
    P: Platform,
{
    /// Create a responder with the default tracing observer.
    pub fn new(driver: D, index: I, platform: P, config: ResponderConfig) -> Self {
        Self::with_observer(driver, index, platform, config, Arc::new(TracingObserver))
    }
}

impl<D, I, P, O> MtpResponder<D, I, P, O>
where
    D: EndpointDriver,
    I: ObjectIndex,
    P: Platform,
    O: ResponderObserver,
{
    /// Create a responder with a custom observer.
    pub fn with_observer(
        driver: D,
        index: I,
        platform: P,
        config: ResponderConfig,
        observer: Arc<O>,
    ) -> Self {
        let buffer_size = config
            .buffer_size
            .max(CONTAINER_HEADER_SIZE + 4 * MAX_PARAMETERS);
        Self {
            driver,
            index,
            platform,
            observer,
            machine: MachineContext::new(config.identity.friendly_name.clone()),
            cursor: CursorSlot::default(),
            recv_buffer: vec![0; buffer_size],
            send_buffer: vec![0; buffer_size],
            config,
            active: false,
            receive_posted: false,
        }
    }

    pub fn state(&self) -> ResponderState {
        self.machine.state
    }

    /// Open session id, 0 when none.
    pub fn session_id(&self) -> u32 {
        self.machine.session.id()
    }

    /// Error latched by the last fault.
    pub fn last_error(&self) -> Option<ResponseCode> {
        self.machine.error
    }

    pub fn friendly_name(&self) -> &str {
        &self.machine.friendly_name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Status code Get-Device-Status reports right now.
    pub fn device_status(&self) -> ResponseCode {
        self.machine.device_status()
    }

    /// Host selected the configuration: reset all state and wait for a command.
    #[instrument(skip(self))]
    pub fn init_connection(&mut self) {
        self.cursor.release(&mut self.index);
        self.machine.session.close();
        self.machine.error = None;
        self.machine.receive = ReceiveCompletion::Discard;
        self.active = true;
        self.receive_posted = false;
        self.goto(ResponderState::WaitingForCommand);
        self.emit(ResponderEvent::ConnectionInitialized);
        self.post_receive();
    }

    /// Interface torn down.
    pub fn disconnect(&mut self) {
        self.cursor.release(&mut self.index);
        self.active = false;
        self.receive_posted = false;
        self.emit(ResponderEvent::Disconnected);
    }

    /// Copy a bulk-out transfer into the receive buffer and complete it.
    pub fn on_bulk_out(&mut self, data: &[u8], status: i32) {
        let len = data.len().min(self.recv_buffer.len());
        self.recv_buffer[..len].copy_from_slice(&data[..len]);
        self.on_transfer_complete(TransferCompletion::new(Endpoint::BulkOut, status, len));
    }

    /// Transfer-complete upcall from the driver.
    pub fn on_transfer_complete(&mut self, completion: TransferCompletion) {
        if !self.active {
            debug!(ep = %completion.endpoint, "Completion while inactive");
            return;
        }
        match completion.endpoint {
            Endpoint::Control | Endpoint::Interrupt => return,
            Endpoint::BulkOut => self.receive_posted = false,
            Endpoint::BulkIn => {}
        }
        self.emit(ResponderEvent::Packet {
            endpoint: completion.endpoint,
            direction: completion.direction,
            length: completion.length,
            data: None,
        });

        let state = self.machine.state;
        match (state, completion.direction) {
            (ResponderState::WaitingForCommand, Direction::Out) => {
                self.handle_command(completion.length);
            }
            (ResponderState::SendingResponse, Direction::In) => {
                if !completion.is_ok() {
                    warn!(status = completion.status, "Response transfer error");
                }
                self.goto(ResponderState::WaitingForCommand);
                self.post_receive();
            }
            (ResponderState::SendingDataBlock, Direction::In) => {
                if !completion.is_ok() {
                    warn!(status = completion.status, "Data block transfer error");
                }
                self.send_response();
            }
            (ResponderState::ReceivingDataBlock, Direction::Out) => {
                if !completion.is_ok() {
                    warn!(status = completion.status, "Data block receive error");
                }
                self.finish_receive(completion.length);
            }
            (state, direction) => {
                self.emit(ResponderEvent::Log {
                    level: LogLevel::Debug,
                    message: format!("{} completion ignored in {}", direction, state),
                });
            }
        }
    }

    /// Class-specific control request. Returns true when handled.
    pub fn control_request(&mut self, req: &ControlRequest) -> bool {
        if req.request_type & USB_TYPE_MASK != USB_TYPE_CLASS {
            return false;
        }
        match req.request {
            USB_CTRL_CANCEL_REQUEST => {
                self.emit(ResponderEvent::Log {
                    level: LogLevel::Warn,
                    message: "Cancel request is not supported".to_string(),
                });
                self.fail_with(ResponseCode::DEVICE_BUSY);
                false
            }
            USB_CTRL_GET_EXT_EVT_DATA => {
                self.fail_with(ResponseCode::OPERATION_NOT_SUPPORTED);
                false
            }
            USB_CTRL_DEV_RESET_REQUEST => {
                self.device_reset();
                self.driver.ack_control();
                true
            }
            USB_CTRL_GET_DEV_STATUS => {
                if (req.length as usize) < DEVICE_STATUS_SIZE {
                    self.fail_with(ResponseCode::INVALID_DATASET);
                    return false;
                }
                let code = self.device_status();
                let mut status = [0u8; DEVICE_STATUS_SIZE];
                LittleEndian::write_u16(&mut status[0..2], DEVICE_STATUS_SIZE as u16);
                LittleEndian::write_u16(&mut status[2..4], code.value());
                debug!(status = %code, "Device status");
                if let Err(err) = self.driver.send_control(&status) {
                    warn!(error = %err, "Failed to send device status");
                    return false;
                }
                self.driver.ack_control();
                true
            }
            other => {
                debug!(request = %format!("0x{:02X}", other), "Unhandled class request");
                false
            }
        }
    }

    fn device_reset(&mut self) {
        info!("Device reset request");
        self.driver.stall(Endpoint::BulkIn, false);
        self.driver.stall(Endpoint::BulkOut, false);
        let had_session = self.machine.session.is_open();
        self.machine.session.close();
        self.machine.receive = ReceiveCompletion::Discard;
        self.goto(ResponderState::WaitingForCommand);
        self.emit(ResponderEvent::DeviceReset);
        if had_session {
            self.emit(ResponderEvent::SessionChanged { session_id: 0 });
        }
        if !self.receive_posted {
            self.post_receive();
        }
    }

    fn handle_command(&mut self, length: usize) {
        let available = length.min(self.recv_buffer.len());
        let command = match Command::parse(&self.recv_buffer[..available], length) {
            Ok(command) => command,
            Err(err) => {
                warn!(error = %err, len = length, "Malformed command block");
                self.fail_with(ResponseCode::INVALID_DATASET);
                return;
            }
        };

        self.emit(ResponderEvent::CommandReceived {
            code: command.code,
            transaction_id: command.transaction_id,
            params: command.params.as_slice().to_vec(),
        });
        self.machine.command = command;
        self.machine.set_response(ResponseCode::OK);
        self.goto(ResponderState::Busy);

        let next = self.run_handler(handlers::handle_command);
        self.advance(next);
    }

    /// Bulk-out completion while a data block was expected.
    fn finish_receive(&mut self, length: usize) {
        let handler = match std::mem::take(&mut self.machine.receive) {
            ReceiveCompletion::Discard => {
                self.send_response();
                return;
            }
            ReceiveCompletion::Handler(handler) => handler,
        };

        if let Err(reason) = self.check_data_block(length) {
            warn!(reason = %reason, "Data block does not match the command");
            self.fail_with(ResponseCode::INVALID_DATASET);
            return;
        }

        let recv = std::mem::take(&mut self.recv_buffer);
        let payload = &recv[ContainerHeader::SIZE..length];
        let next = self.run_handler(|ctx| handlers::complete_receive(ctx, handler, payload));
        self.recv_buffer = recv;
        self.advance(next);
    }

    fn check_data_block(&self, length: usize) -> Result<(), String> {
        let available = length.min(self.recv_buffer.len());
        let (header, _) = ContainerHeader::decode(&self.recv_buffer[..available], length)
            .map_err(|err| err.to_string())?;
        let command = &self.machine.command;
        if header.kind != ContainerType::Data {
            return Err(format!("container type {}", header.kind));
        }
        if header.code != command.code {
            return Err(format!("code 0x{:04X}", header.code));
        }
        if header.transaction_id != command.transaction_id {
            return Err(format!("transaction id {}", header.transaction_id));
        }
        Ok(())
    }

    /// Run a handler over the borrowed context, staging any rejection.
    fn run_handler<F>(&mut self, f: F) -> HandleResult
    where
        F: FnOnce(&mut HandlerContext<'_, I, P>) -> OpResult,
    {
        let session_before = self.machine.session.id();
        let mut ctx = HandlerContext {
            machine: &mut self.machine,
            index: &mut self.index,
            cursor: &mut self.cursor,
            platform: &self.platform,
            config: &self.config,
            block: &mut self.send_buffer,
        };
        let next = match f(&mut ctx) {
            Ok(next) => next,
            Err(rejection) => {
                self.observer.on_event(&ResponderEvent::OperationFailed {
                    code: ctx.machine.command.code,
                    response: rejection.code,
                    phase: rejection.phase,
                });
                handlers::stage_rejection(&mut ctx, rejection)
            }
        };
        let session_after = self.machine.session.id();
        if session_after != session_before {
            self.emit(ResponderEvent::SessionChanged {
                session_id: session_after,
            });
        }
        next
    }

    fn advance(&mut self, next: HandleResult) {
        match next {
            HandleResult::Respond => self.send_response(),
            HandleResult::SendData(len) => {
                self.goto(ResponderState::SendingDataBlock);
                self.post_send(len);
            }
            HandleResult::ReceiveData(completion) => {
                self.machine.receive = completion;
                self.goto(ResponderState::ReceivingDataBlock);
                self.post_receive();
            }
        }
    }

    fn send_response(&mut self) {
        let transaction_id = self.machine.command.transaction_id;
        let response = self.machine.response;
        let len = match response.encode_into(transaction_id, &mut self.send_buffer) {
            Ok(len) => len,
            Err(err) => {
                warn!(error = %err, "Failed to encode response");
                self.fail_with(ResponseCode::GENERAL_ERROR);
                return;
            }
        };
        self.goto(ResponderState::SendingResponse);
        self.emit(ResponderEvent::ResponseSent {
            response: response.code,
            transaction_id,
        });
        self.post_send(len);
    }

    fn post_send(&mut self, len: usize) {
        let data = &self.send_buffer[..len];
        self.observer.on_event(&ResponderEvent::Packet {
            endpoint: Endpoint::BulkIn,
            direction: Direction::In,
            length: len,
            data: Some(data[..len.min(PACKET_PREVIEW)].to_vec()),
        });
        if let Err(err) = self.driver.send(Endpoint::BulkIn, data) {
            warn!(error = %err, len, "Failed to post bulk-in transfer");
            self.emit(ResponderEvent::Log {
                level: LogLevel::Warn,
                message: format!("bulk-in post of {} bytes failed: {}", len, err),
            });
        }
    }

    fn post_receive(&mut self) {
        match self
            .driver
            .receive(Endpoint::BulkOut, self.recv_buffer.len())
        {
            Ok(()) => self.receive_posted = true,
            Err(err) => {
                warn!(error = %err, "Failed to post bulk-out receive");
                self.emit(ResponderEvent::Log {
                    level: LogLevel::Warn,
                    message: format!("bulk-out receive post failed: {}", err),
                });
            }
        }
    }

    /// Protocol fault: stall both bulk endpoints until a device reset.
    fn fail_with(&mut self, error: ResponseCode) {
        warn!(error = %error, "Stalling bulk endpoints");
        self.machine.error = Some(error);
        self.driver.stall(Endpoint::BulkIn, true);
        self.driver.stall(Endpoint::BulkOut, true);
        self.goto(ResponderState::ErrorWaitingReset);
        self.emit(ResponderEvent::Fault { error });
    }

    fn goto(&mut self, state: ResponderState) {
        let from = self.machine.goto_state(state);
        if from != state {
            self.emit(ResponderEvent::StateChanged { from, to: state });
        }
    }

    fn emit(&self, event: ResponderEvent) {
        self.observer.on_event(&event);
    }
}
