//! Storage operations.
//!
//! A single synthetic storage is reported regardless of the media present.

use super::{HandlerContext, OpResult, Rejection};
use crate::index::ObjectIndex;
use crate::platform::Platform;
use crate::protocol::constants::*;
use crate::protocol::{DataBlockWriter, DataPhase, ResponseCode};

pub(super) fn get_storage_ids<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
) -> OpResult {
    let command = ctx.machine.command;
    let mut w = DataBlockWriter::start(&mut *ctx.block, command.code, command.transaction_id)?;
    let mut ids = w.start_array()?;
    w.push_array_u32(&mut ids, MAIN_STORAGE_ID)?;
    w.finish_array(ids);
    let len = w.finish();
    ctx.send_data(len)
}

pub(super) fn get_storage_info<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    storage_id: u32,
) -> OpResult {
    if storage_id != MAIN_STORAGE_ID {
        return Err(Rejection::new(
            ResponseCode::INVALID_STORAGE_ID,
            DataPhase::Send,
        ));
    }

    let command = ctx.machine.command;
    let storage = &ctx.config.storage;
    let mut w = DataBlockWriter::start(&mut *ctx.block, command.code, command.transaction_id)?;
    w.put_u16(STOR_TYPE_FIXED_RAM)?;
    w.put_u16(FS_TYPE_GENERIC_FLAT)?;
    w.put_u16(ACCESS_CAP_RO_WITHOUT)?;
    // max capacity, free space, free objects
    w.put_u64(0)?;
    w.put_u64(0)?;
    w.put_u32(0)?;
    w.put_string(&storage.description)?;
    w.put_string(&storage.volume_identifier)?;
    let len = w.finish();
    ctx.send_data(len)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::super::HandleResult;
    use crate::protocol::constants::*;
    use crate::protocol::{ContainerHeader, DataReader, ResponseCode};

    #[test]
    fn test_storage_ids_single_entry() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_GET_STORAGE_IDS, &[]);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE + 8));
        assert_eq!(
            fx.payload(ContainerHeader::SIZE + 8),
            &[1, 0, 0, 0, 0x01, 0x00, 0x01, 0x00]
        );
    }

    #[test]
    fn test_storage_info_fields() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_GET_STORAGE_INFO, &[MAIN_STORAGE_ID]);
        let HandleResult::SendData(len) = result else {
            panic!("expected a data block");
        };
        let mut r = DataReader::new(fx.payload(len));
        assert_eq!(r.read_u16().unwrap(), 0x0003);
        assert_eq!(r.read_u16().unwrap(), 0x0001);
        assert_eq!(r.read_u16().unwrap(), 0x0001);
        assert_eq!(r.read_u64().unwrap(), 0);
        assert_eq!(r.read_u64().unwrap(), 0);
        assert_eq!(r.read_u32().unwrap(), 0);
        assert_eq!(r.read_string().unwrap(), "Storage description missing");
        assert_eq!(r.read_string().unwrap(), "Volume identifier missing");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_storage_info_wrong_id() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_GET_STORAGE_INFO, &[0x0002_0001]);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE));
        assert_eq!(fx.machine.response.code, ResponseCode::INVALID_STORAGE_ID);

        fx.run(MTP_OP_GET_STORAGE_INFO, &[ALL_STORAGES]);
        assert_eq!(fx.machine.response.code, ResponseCode::INVALID_STORAGE_ID);
    }
}
