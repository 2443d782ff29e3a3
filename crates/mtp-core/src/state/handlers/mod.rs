//! Operation handlers - dispatch logic for each opcode.
//!
//! This module is split into submodules by functionality:
//! - `session`: OpenSession, CloseSession, ResetDevice
//! - `device`: DeviceInfo and device properties
//! - `storage`: storage ids and storage info
//! - `objects`: object enumeration and object metadata
//!
//! Handlers stage their result in the [`HandlerContext`] (response in the
//! machine context, data block in the send buffer) and tell the responder
//! which phase comes next. A rejected operation still answers through the
//! data phase the host expects for its opcode.

mod device;
mod objects;
mod session;
mod storage;

use tracing::warn;

use crate::config::ResponderConfig;
use crate::index::{CursorSlot, ObjectIndex};
use crate::platform::Platform;
use crate::protocol::{CodecError, DataBlockWriter, DataPhase, Operation, ResponseCode};
use crate::state::machine::{DataHandler, MachineContext, ReceiveCompletion};

/// Next phase after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleResult {
    /// Send the staged response.
    Respond,
    /// Send the staged data block of this many bytes, then the response.
    SendData(usize),
    /// Receive the host's data block.
    ReceiveData(ReceiveCompletion),
}

/// Operation refused with a response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub code: ResponseCode,
    pub phase: DataPhase,
}

impl Rejection {
    pub fn new(code: ResponseCode, phase: DataPhase) -> Self {
        Self { code, phase }
    }
}

impl From<CodecError> for Rejection {
    fn from(err: CodecError) -> Self {
        warn!(error = %err, "Data block could not be built");
        Self::new(ResponseCode::GENERAL_ERROR, DataPhase::Send)
    }
}

pub type OpResult = Result<HandleResult, Rejection>;

/// Handler context containing all resources one dispatch may touch.
pub struct HandlerContext<'a, I: ObjectIndex, P: Platform> {
    pub machine: &'a mut MachineContext,
    pub index: &'a mut I,
    pub cursor: &'a mut CursorSlot<I::Cursor>,
    pub platform: &'a P,
    pub config: &'a ResponderConfig,
    /// Send staging buffer.
    pub block: &'a mut [u8],
}

impl<'a, I: ObjectIndex, P: Platform> HandlerContext<'a, I, P> {
    fn want_params(&self, count: usize, phase: DataPhase) -> Result<(), Rejection> {
        self.want_params_range(count, count, phase)
    }

    fn want_params_range(&self, min: usize, max: usize, phase: DataPhase) -> Result<(), Rejection> {
        let n = self.machine.command.params.len();
        if n < min || n > max {
            return Err(Rejection::new(ResponseCode::INVALID_DATASET, phase));
        }
        Ok(())
    }

    fn want_session(&self, phase: DataPhase) -> Result<(), Rejection> {
        if !self.machine.session.is_open() {
            return Err(Rejection::new(ResponseCode::SESSION_NOT_OPEN, phase));
        }
        Ok(())
    }

    fn want_index(&self, phase: DataPhase) -> Result<(), Rejection> {
        if !self.index.is_usable() {
            return Err(Rejection::new(ResponseCode::DEVICE_BUSY, phase));
        }
        Ok(())
    }

    /// Start a data block answering the current command.
    fn start_block(&mut self) -> Result<DataBlockWriter<'_>, CodecError> {
        let command = self.machine.command;
        DataBlockWriter::start(self.block, command.code, command.transaction_id)
    }

    fn respond(&mut self, code: ResponseCode) -> OpResult {
        self.machine.set_response(code);
        Ok(HandleResult::Respond)
    }

    fn send_data(&mut self, len: usize) -> OpResult {
        self.machine.set_response(ResponseCode::OK);
        Ok(HandleResult::SendData(len))
    }
}

/// Dispatch the command staged in the machine context.
pub fn handle_command<I: ObjectIndex, P: Platform>(ctx: &mut HandlerContext<'_, I, P>) -> OpResult {
    let command = ctx.machine.command;
    let Some(op) = Operation::from_code(command.code) else {
        warn!(code = %format!("0x{:04X}", command.code), "Unknown command code");
        return Err(Rejection::new(
            ResponseCode::OPERATION_NOT_SUPPORTED,
            DataPhase::None,
        ));
    };
    let phase = op.data_phase();
    let params = command.params;

    match op {
        Operation::GetDeviceInfo => {
            ctx.want_params(0, phase)?;
            device::get_device_info(ctx)
        }
        Operation::OpenSession => {
            ctx.want_params(1, phase)?;
            session::open_session(ctx, params.get(0))
        }
        Operation::CloseSession => {
            ctx.want_params(0, phase)?;
            session::close_session(ctx)
        }
        Operation::GetStorageIds => {
            ctx.want_params(0, phase)?;
            ctx.want_session(phase)?;
            storage::get_storage_ids(ctx)
        }
        Operation::GetStorageInfo => {
            ctx.want_params(1, phase)?;
            ctx.want_session(phase)?;
            storage::get_storage_info(ctx, params.get(0))
        }
        Operation::GetNumObjects => {
            ctx.want_params_range(1, 3, phase)?;
            ctx.want_session(phase)?;
            ctx.want_index(phase)?;
            objects::get_num_objects(ctx, phase)
        }
        Operation::GetObjectHandles => {
            ctx.want_params_range(1, 3, phase)?;
            ctx.want_session(phase)?;
            ctx.want_index(phase)?;
            objects::get_object_handles(ctx, phase)
        }
        Operation::GetObjectInfo => {
            ctx.want_params(1, phase)?;
            ctx.want_session(phase)?;
            ctx.want_index(phase)?;
            objects::get_object_info(ctx, params.get(0))
        }
        Operation::GetObjectPropsSupported => {
            ctx.want_params(1, phase)?;
            ctx.want_session(phase)?;
            ctx.want_index(phase)?;
            objects::get_object_props_supported(ctx, params.get(0))
        }
        Operation::ResetDevice => {
            ctx.want_params(0, phase)?;
            session::reset_device(ctx)
        }
        Operation::GetDevicePropDesc => {
            ctx.want_params(1, phase)?;
            ctx.want_session(phase)?;
            device::get_device_prop(ctx, params.get(0), true)
        }
        Operation::GetDevicePropValue => {
            ctx.want_params(1, phase)?;
            ctx.want_session(phase)?;
            device::get_device_prop(ctx, params.get(0), false)
        }
        Operation::SetDevicePropValue => {
            ctx.want_params(1, phase)?;
            ctx.want_session(phase)?;
            device::set_device_prop(ctx, params.get(0))
        }
    }
}

/// Run the handler waiting on a received data block.
pub fn complete_receive<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    handler: DataHandler,
    payload: &[u8],
) -> OpResult {
    match handler {
        DataHandler::SetFriendlyName => device::store_friendly_name(ctx, payload),
    }
}

/// Stage the answer to a rejected operation.
///
/// The response carries the rejection code and no parameters. A send phase
/// still gets a header-only data block; a receive phase still drains the
/// host's data block.
pub fn stage_rejection<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    rejection: Rejection,
) -> HandleResult {
    ctx.machine.set_response(rejection.code);
    match rejection.phase {
        DataPhase::None => HandleResult::Respond,
        DataPhase::Send => match ctx.start_block() {
            Ok(block) => HandleResult::SendData(block.finish()),
            Err(err) => {
                warn!(error = %err, "No room for an empty data block");
                HandleResult::Respond
            }
        },
        DataPhase::Receive => HandleResult::ReceiveData(ReceiveCompletion::Discard),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Fixture;
    use super::*;
    use crate::protocol::constants::*;
    use crate::protocol::ContainerHeader;

    #[test]
    fn test_unknown_opcode_has_no_data_phase() {
        let mut fx = Fixture::new().with_session();
        let (result, rejection) = fx.run(MTP_OP_GET_OBJECT, &[1]);
        assert_eq!(result, HandleResult::Respond);
        assert_eq!(
            rejection.map(|r| r.code),
            Some(ResponseCode::OPERATION_NOT_SUPPORTED)
        );
    }

    #[test]
    fn test_wrong_param_count_is_invalid_dataset() {
        let mut fx = Fixture::new();
        let (result, rejection) = fx.run(MTP_OP_GET_DEV_INFO, &[1]);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE));
        assert_eq!(fx.machine.response.code, ResponseCode::INVALID_DATASET);
        assert_eq!(rejection.map(|r| r.phase), Some(DataPhase::Send));
    }

    #[test]
    fn test_session_required_sends_empty_block() {
        let mut fx = Fixture::new();
        let (result, _) = fx.run(MTP_OP_GET_STORAGE_IDS, &[]);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE));
        assert_eq!(fx.machine.response.code, ResponseCode::SESSION_NOT_OPEN);

        let header = ContainerHeader::peek(&fx.block).unwrap();
        assert_eq!(header.length as usize, ContainerHeader::SIZE);
        assert_eq!(header.code, MTP_OP_GET_STORAGE_IDS);
        assert_eq!(header.transaction_id, 0x42);
    }

    #[test]
    fn test_every_session_scoped_op_needs_session() {
        let battery = DEV_PROP_BATTERY_LEVEL as u32;
        let cases: &[(u16, &[u32], HandleResult)] = &[
            (MTP_OP_GET_STORAGE_IDS, &[], HandleResult::SendData(ContainerHeader::SIZE)),
            (MTP_OP_GET_STORAGE_INFO, &[MAIN_STORAGE_ID], HandleResult::SendData(ContainerHeader::SIZE)),
            (MTP_OP_GET_NUM_OBJECTS, &[ALL_STORAGES], HandleResult::Respond),
            (MTP_OP_GET_OBJECT_HANDLES, &[ALL_STORAGES], HandleResult::SendData(ContainerHeader::SIZE)),
            (MTP_OP_GET_OBJECT_INFO, &[1], HandleResult::SendData(ContainerHeader::SIZE)),
            (MTP_OP_GET_OBJ_PROPS_SUPPORTED, &[0x3000], HandleResult::SendData(ContainerHeader::SIZE)),
            (MTP_OP_GET_DEV_PROP_DESC, &[battery], HandleResult::SendData(ContainerHeader::SIZE)),
            (MTP_OP_GET_DEV_PROP_VALUE, &[battery], HandleResult::SendData(ContainerHeader::SIZE)),
            (
                MTP_OP_SET_DEV_PROP_VALUE,
                &[DEV_PROP_FRIENDLY_NAME as u32],
                HandleResult::ReceiveData(ReceiveCompletion::Discard),
            ),
        ];

        for (code, params, expected) in cases {
            let mut fx = Fixture::new();
            let (result, rejection) = fx.run(*code, params);
            assert_eq!(result, *expected, "0x{:04X}", code);
            assert_eq!(
                rejection.map(|r| r.code),
                Some(ResponseCode::SESSION_NOT_OPEN),
                "0x{:04X}",
                code
            );
            assert_eq!(fx.machine.response.code, ResponseCode::SESSION_NOT_OPEN);
            assert!(!fx.cursor.is_active(), "0x{:04X} touched the index", code);
        }
    }

    #[test]
    fn test_session_checked_after_param_count() {
        let mut fx = Fixture::new();
        fx.run(MTP_OP_GET_STORAGE_INFO, &[]);
        assert_eq!(fx.machine.response.code, ResponseCode::INVALID_DATASET);
    }

    #[test]
    fn test_unusable_index_reports_busy() {
        let mut fx = Fixture::new().with_session();
        fx.index.set_usable(false);
        let (result, _) = fx.run(MTP_OP_GET_OBJECT_HANDLES, &[ALL_STORAGES]);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE));
        assert_eq!(fx.machine.response.code, ResponseCode::DEVICE_BUSY);
        assert!(!fx.cursor.is_active());
    }

    #[test]
    fn test_set_prop_rejection_drains_data() {
        let mut fx = Fixture::new();
        let (result, _) = fx.run(MTP_OP_SET_DEV_PROP_VALUE, &[DEV_PROP_FRIENDLY_NAME as u32]);
        assert_eq!(
            result,
            HandleResult::ReceiveData(ReceiveCompletion::Discard)
        );
        assert_eq!(fx.machine.response.code, ResponseCode::SESSION_NOT_OPEN);
    }
}
