//! Object enumeration backed by the media index.

use tracing::{debug, warn};

use super::{HandlerContext, OpResult, Rejection};
use crate::index::{handle_to_idx_id, idx_id_to_handle, IndexTag, ObjectIndex};
use crate::platform::Platform;
use crate::protocol::constants::*;
use crate::protocol::{DataBlockWriter, DataPhase, ResponseCode};

/// Check the (storage, format, parent) filters of an enumeration request.
///
/// Only "no filter" is supported for format and parent.
fn check_filters<I: ObjectIndex, P: Platform>(
    ctx: &HandlerContext<'_, I, P>,
    phase: DataPhase,
) -> Result<(), Rejection> {
    let params = ctx.machine.command.params;
    if params.len() == 3 {
        let parent = params.get(2);
        if parent != 0 && parent != ALL_STORAGES {
            return Err(Rejection::new(ResponseCode::INVALID_OBJECT_HANDLE, phase));
        }
    }
    if params.len() >= 2 && params.get(1) != 0 {
        return Err(Rejection::new(
            ResponseCode::SPECIFICATION_BY_FORMAT_UNSUPPORTED,
            phase,
        ));
    }
    let storage_id = params.get(0);
    if storage_id != MAIN_STORAGE_ID && storage_id != ALL_STORAGES {
        return Err(Rejection::new(ResponseCode::INVALID_STORAGE_ID, phase));
    }
    Ok(())
}

/// Validates like GetObjectHandles, then always reports not supported.
pub(super) fn get_num_objects<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    phase: DataPhase,
) -> OpResult {
    check_filters(ctx, phase)?;
    ctx.cursor.ensure(&mut *ctx.index);
    debug!("GetNumObjects is not implemented");
    Err(Rejection::new(ResponseCode::OPERATION_NOT_SUPPORTED, phase))
}

pub(super) fn get_object_handles<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    phase: DataPhase,
) -> OpResult {
    check_filters(ctx, phase)?;

    let command = ctx.machine.command;
    let cursor = ctx.cursor.rewind(&mut *ctx.index);
    let mut w = DataBlockWriter::start(&mut *ctx.block, command.code, command.transaction_id)?;
    let mut handles = w.start_array()?;
    while let Some(idx_id) = ctx.index.get_next(cursor) {
        w.push_array_u32(&mut handles, idx_id_to_handle(idx_id))?;
    }
    let count = w.finish_array(handles);
    let len = w.finish();
    debug!(count, "Object handles listed");
    ctx.send_data(len)
}

pub(super) fn get_object_info<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    handle: u32,
) -> OpResult {
    if !ctx.config.object_info_enabled {
        return Err(Rejection::new(ResponseCode::DEVICE_BUSY, DataPhase::Send));
    }

    let command = ctx.machine.command;
    let cursor = ctx.cursor.ensure(&mut *ctx.index);
    let Some(filename) = ctx
        .index
        .retrieve(cursor, handle_to_idx_id(handle), IndexTag::Filename)
    else {
        warn!(handle = %format!("0x{:08X}", handle), "No index entry for object handle");
        return Err(Rejection::new(ResponseCode::GENERAL_ERROR, DataPhase::Send));
    };
    let now = ctx.platform.now();

    let mut w = DataBlockWriter::start(&mut *ctx.block, command.code, command.transaction_id)?;
    w.put_u32(MAIN_STORAGE_ID)?;
    w.put_u16(OBJ_FMT_UNDEFINED)?;
    // protection status
    w.put_u16(0)?;
    // compressed size
    w.put_u32(0)?;
    // thumbnail format, compressed size, width, height
    w.put_u16(0)?;
    w.put_u32(0)?;
    w.put_u32(0)?;
    w.put_u32(0)?;
    // image width, height, bit depth
    w.put_u32(0)?;
    w.put_u32(0)?;
    w.put_u32(0)?;
    // parent object, association type and description, sequence number
    w.put_u32(0)?;
    w.put_u16(0)?;
    w.put_u32(0)?;
    w.put_u32(0)?;
    w.put_string(&filename)?;
    w.put_date_time(&now)?;
    w.put_date_time(&now)?;
    // keywords
    w.put_string("")?;
    let len = w.finish();
    ctx.send_data(len)
}

pub(super) fn get_object_props_supported<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    format: u32,
) -> OpResult {
    debug!(format = %format!("0x{:04X}", format), "No object properties supported");
    let command = ctx.machine.command;
    let mut w = DataBlockWriter::start(&mut *ctx.block, command.code, command.transaction_id)?;
    let props = w.start_array()?;
    w.finish_array(props);
    let len = w.finish();
    ctx.send_data(len)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::super::HandleResult;
    use crate::protocol::constants::*;
    use crate::protocol::{ContainerHeader, DataPhase, DataReader, ResponseCode};

    #[test]
    fn test_handles_are_one_based() {
        let mut fx = Fixture::new().with_session();
        let (result, rejection) = fx.run(MTP_OP_GET_OBJECT_HANDLES, &[ALL_STORAGES, 0, 0]);
        assert!(rejection.is_none());
        let HandleResult::SendData(len) = result else {
            panic!("expected a data block");
        };
        let mut r = DataReader::new(fx.payload(len));
        assert_eq!(r.read_u32_array().unwrap(), vec![1, 2, 3]);
        assert_eq!(fx.machine.response.code, ResponseCode::OK);
    }

    #[test]
    fn test_handles_rewind_each_call() {
        let mut fx = Fixture::new().with_session();
        fx.run(MTP_OP_GET_OBJECT_HANDLES, &[MAIN_STORAGE_ID]);
        let (result, _) = fx.run(MTP_OP_GET_OBJECT_HANDLES, &[MAIN_STORAGE_ID]);
        let HandleResult::SendData(len) = result else {
            panic!("expected a data block");
        };
        let mut r = DataReader::new(fx.payload(len));
        assert_eq!(r.read_u32_array().unwrap().len(), 3);
        assert_eq!(fx.index.open_searches(), 1);
    }

    #[test]
    fn test_filter_validation_order() {
        let mut fx = Fixture::new().with_session();

        // bad parent wins over bad format and bad storage
        fx.run(MTP_OP_GET_OBJECT_HANDLES, &[7, 0x3001, 5]);
        assert_eq!(fx.machine.response.code, ResponseCode::INVALID_OBJECT_HANDLE);

        fx.run(MTP_OP_GET_OBJECT_HANDLES, &[7, 0x3001, ALL_STORAGES]);
        assert_eq!(
            fx.machine.response.code,
            ResponseCode::SPECIFICATION_BY_FORMAT_UNSUPPORTED
        );

        let (result, _) = fx.run(MTP_OP_GET_OBJECT_HANDLES, &[7]);
        assert_eq!(fx.machine.response.code, ResponseCode::INVALID_STORAGE_ID);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE));
    }

    #[test]
    fn test_num_objects_always_unsupported() {
        let mut fx = Fixture::new().with_session();
        let (result, rejection) = fx.run(MTP_OP_GET_NUM_OBJECTS, &[ALL_STORAGES]);
        assert_eq!(result, HandleResult::Respond);
        assert_eq!(rejection.map(|r| r.phase), Some(DataPhase::None));
        assert_eq!(fx.machine.response.code, ResponseCode::OPERATION_NOT_SUPPORTED);
        assert!(fx.cursor.is_active());

        fx.run(MTP_OP_GET_NUM_OBJECTS, &[ALL_STORAGES, 0x3000]);
        assert_eq!(
            fx.machine.response.code,
            ResponseCode::SPECIFICATION_BY_FORMAT_UNSUPPORTED
        );
    }

    #[test]
    fn test_enumeration_param_range() {
        let mut fx = Fixture::new().with_session();
        fx.run(MTP_OP_GET_OBJECT_HANDLES, &[]);
        assert_eq!(fx.machine.response.code, ResponseCode::INVALID_DATASET);
        fx.run(MTP_OP_GET_OBJECT_HANDLES, &[ALL_STORAGES, 0, 0, 0]);
        assert_eq!(fx.machine.response.code, ResponseCode::INVALID_DATASET);
    }

    #[test]
    fn test_object_info_disabled_reports_busy() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_GET_OBJECT_INFO, &[1]);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE));
        assert_eq!(fx.machine.response.code, ResponseCode::DEVICE_BUSY);
    }

    #[test]
    fn test_object_info_dataset() {
        let mut fx = Fixture::new().with_session();
        fx.config.object_info_enabled = true;
        let (result, _) = fx.run(MTP_OP_GET_OBJECT_INFO, &[2]);
        let HandleResult::SendData(len) = result else {
            panic!("expected a data block");
        };
        let mut r = DataReader::new(fx.payload(len));
        assert_eq!(r.read_u32().unwrap(), MAIN_STORAGE_ID);
        assert_eq!(r.read_u16().unwrap(), OBJ_FMT_UNDEFINED);
        assert_eq!(r.read_u16().unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), 0);
        assert_eq!(r.read_u16().unwrap(), 0);
        for _ in 0..6 {
            assert_eq!(r.read_u32().unwrap(), 0);
        }
        assert_eq!(r.read_u32().unwrap(), 0);
        assert_eq!(r.read_u16().unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), 0);
        assert_eq!(r.read_string().unwrap(), "/music/b.flac");
        assert_eq!(r.read_string().unwrap(), "20090517T083000");
        assert_eq!(r.read_string().unwrap(), "20090517T083000");
        assert_eq!(r.read_string().unwrap(), "");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_object_info_unknown_handle() {
        let mut fx = Fixture::new().with_session();
        fx.config.object_info_enabled = true;
        let (result, _) = fx.run(MTP_OP_GET_OBJECT_INFO, &[99]);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE));
        assert_eq!(fx.machine.response.code, ResponseCode::GENERAL_ERROR);
    }

    #[test]
    fn test_object_props_supported_empty() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_GET_OBJ_PROPS_SUPPORTED, &[0x3000]);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE + 4));
        assert_eq!(fx.payload(ContainerHeader::SIZE + 4), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_overflowing_handle_list_is_general_error() {
        let mut fx = Fixture::new().with_session();
        fx.index = crate::index::StaticIndex::new((0..400).map(|i| format!("/{}.mp3", i)));
        let (result, rejection) = fx.run(MTP_OP_GET_OBJECT_HANDLES, &[ALL_STORAGES]);
        assert_eq!(rejection.map(|r| r.code), Some(ResponseCode::GENERAL_ERROR));
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE));
    }
}
