//! DeviceInfo and device property operations.

use tracing::{info, warn};

use super::{HandleResult, HandlerContext, OpResult, Rejection};
use crate::index::ObjectIndex;
use crate::platform::Platform;
use crate::protocol::constants::*;
use crate::protocol::{DataBlockWriter, DataPhase, DataReader, ResponseCode};
use crate::state::machine::{DataHandler, ReceiveCompletion};

pub(super) fn get_device_info<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
) -> OpResult {
    let command = ctx.machine.command;
    let identity = &ctx.config.identity;
    let mut w = DataBlockWriter::start(&mut *ctx.block, command.code, command.transaction_id)?;

    w.put_u16(STANDARD_VERSION)?;
    w.put_u32(VENDOR_EXTENSION_ID)?;
    w.put_u16(MTP_VERSION)?;
    w.put_string("")?;
    w.put_u16(FUNCTIONAL_MODE)?;
    w.put_u16_array(SUPPORTED_OPERATIONS)?;
    w.put_u16_array(SUPPORTED_EVENTS)?;
    w.put_u16_array(SUPPORTED_DEVICE_PROPERTIES)?;
    // capture formats, playback formats
    w.put_u16_array(&[])?;
    w.put_u16_array(&[])?;
    w.put_string(&identity.manufacturer)?;
    w.put_string(&identity.model)?;
    w.put_string(&identity.device_version)?;
    w.put_string(&identity.serial_number)?;

    let len = w.finish();
    ctx.send_data(len)
}

/// GetDevicePropDesc (`describe`) and GetDevicePropValue.
pub(super) fn get_device_prop<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    prop: u32,
    describe: bool,
) -> OpResult {
    let command = ctx.machine.command;
    let Some(prop) = supported_prop(prop) else {
        return Err(Rejection::new(
            ResponseCode::DEVICE_PROP_NOT_SUPPORTED,
            DataPhase::Send,
        ));
    };
    let mut w = DataBlockWriter::start(&mut *ctx.block, command.code, command.transaction_id)?;

    match prop {
        DEV_PROP_BATTERY_LEVEL => {
            let level = ctx.platform.battery_level();
            if describe {
                w.put_u16(prop)?;
                w.put_u16(TYPE_UINT8)?;
                w.put_u8(DEV_PROP_GET)?;
                w.put_u8(level)?;
            }
            w.put_u8(level)?;
            if describe {
                // range form: min, max, step
                w.put_u8(DEV_PROP_FORM_RANGE)?;
                w.put_u8(0)?;
                w.put_u8(100)?;
                w.put_u8(1)?;
            }
        }
        DEV_PROP_DATE_TIME => {
            let now = ctx.platform.now();
            if describe {
                w.put_u16(prop)?;
                w.put_u16(TYPE_STR)?;
                w.put_u8(DEV_PROP_GET)?;
                w.put_date_time(&now)?;
            }
            w.put_date_time(&now)?;
            if describe {
                w.put_u8(DEV_PROP_FORM_NONE)?;
            }
        }
        _ => {
            if describe {
                w.put_u16(prop)?;
                w.put_u16(TYPE_STR)?;
                w.put_u8(DEV_PROP_GET_SET)?;
                w.put_string(&ctx.config.identity.friendly_name)?;
            }
            w.put_string(&ctx.machine.friendly_name)?;
            if describe {
                w.put_u8(DEV_PROP_FORM_NONE)?;
            }
        }
    }

    let len = w.finish();
    ctx.send_data(len)
}

pub(super) fn set_device_prop<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    prop: u32,
) -> OpResult {
    match supported_prop(prop) {
        Some(DEV_PROP_FRIENDLY_NAME) => {
            ctx.machine.set_response(ResponseCode::OK);
            Ok(HandleResult::ReceiveData(ReceiveCompletion::Handler(
                DataHandler::SetFriendlyName,
            )))
        }
        Some(_) => Err(Rejection::new(ResponseCode::ACCESS_DENIED, DataPhase::Receive)),
        None => Err(Rejection::new(
            ResponseCode::DEVICE_PROP_NOT_SUPPORTED,
            DataPhase::Receive,
        )),
    }
}

/// Store the FriendlyName value carried by a SetDevicePropValue data block.
pub(super) fn store_friendly_name<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    payload: &[u8],
) -> OpResult {
    let mut reader = DataReader::new(payload);
    let name = match reader.read_string() {
        Ok(name) => name,
        Err(err) => {
            warn!(error = %err, "Rejected FriendlyName value");
            return Err(Rejection::new(
                ResponseCode::INVALID_DEVICE_PROP_VALUE,
                DataPhase::None,
            ));
        }
    };
    info!(name = %name, "FriendlyName changed");
    ctx.machine.friendly_name = name;
    ctx.respond(ResponseCode::OK)
}

fn supported_prop(prop: u32) -> Option<u16> {
    u16::try_from(prop)
        .ok()
        .filter(|p| SUPPORTED_DEVICE_PROPERTIES.contains(p))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::super::{complete_receive, HandleResult, HandlerContext};
    use crate::protocol::constants::*;
    use crate::protocol::{ContainerHeader, DataReader, ResponseCode};
    use crate::state::machine::{DataHandler, ReceiveCompletion};

    #[test]
    fn test_device_info_dataset() {
        let mut fx = Fixture::new();
        let (result, rejection) = fx.run(MTP_OP_GET_DEV_INFO, &[]);
        assert!(rejection.is_none());
        let HandleResult::SendData(len) = result else {
            panic!("expected a data block, got {:?}", result);
        };
        let header = ContainerHeader::peek(&fx.block).unwrap();
        assert_eq!(header.length as usize, len);
        assert_eq!(header.transaction_id, 0x42);

        let mut r = DataReader::new(fx.payload(len));
        assert_eq!(r.read_u16().unwrap(), 100);
        assert_eq!(r.read_u32().unwrap(), 0xFFFF_FFFF);
        assert_eq!(r.read_u16().unwrap(), 100);
        assert_eq!(r.read_string().unwrap(), "");
        assert_eq!(r.read_u16().unwrap(), 0);
        assert_eq!(r.read_u16_array().unwrap(), SUPPORTED_OPERATIONS);
        assert!(r.read_u16_array().unwrap().is_empty());
        assert_eq!(
            r.read_u16_array().unwrap(),
            vec![0x5001, 0x5011, 0xD402]
        );
        assert!(r.read_u16_array().unwrap().is_empty());
        assert!(r.read_u16_array().unwrap().is_empty());
        assert_eq!(r.read_string().unwrap(), "Rockbox.org");
        assert_eq!(r.read_string().unwrap(), "Rockbox media player");
        assert_eq!(r.read_string().unwrap(), "svn");
        assert_eq!(r.read_string().unwrap(), "0".repeat(41));
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_battery_desc_range_form() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_GET_DEV_PROP_DESC, &[DEV_PROP_BATTERY_LEVEL as u32]);
        let HandleResult::SendData(len) = result else {
            panic!("expected a data block");
        };
        assert_eq!(
            fx.payload(len),
            &[0x01, 0x50, 0x02, 0x00, 0x00, 73, 73, 0x01, 0, 100, 1]
        );
    }

    #[test]
    fn test_battery_value_only() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_GET_DEV_PROP_VALUE, &[DEV_PROP_BATTERY_LEVEL as u32]);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE + 1));
        assert_eq!(fx.payload(ContainerHeader::SIZE + 1), &[73]);
    }

    #[test]
    fn test_date_time_desc() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_GET_DEV_PROP_DESC, &[DEV_PROP_DATE_TIME as u32]);
        let HandleResult::SendData(len) = result else {
            panic!("expected a data block");
        };
        let mut r = DataReader::new(fx.payload(len));
        assert_eq!(r.read_u16().unwrap(), DEV_PROP_DATE_TIME);
        assert_eq!(r.read_u16().unwrap(), TYPE_STR);
        assert_eq!(r.read_u8().unwrap(), DEV_PROP_GET);
        assert_eq!(r.read_string().unwrap(), "20090517T083000");
        assert_eq!(r.read_string().unwrap(), "20090517T083000");
        assert_eq!(r.read_u8().unwrap(), DEV_PROP_FORM_NONE);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_friendly_name_desc_is_settable() {
        let mut fx = Fixture::new().with_session();
        fx.machine.friendly_name = "Kitchen".to_string();
        let (result, _) = fx.run(MTP_OP_GET_DEV_PROP_DESC, &[DEV_PROP_FRIENDLY_NAME as u32]);
        let HandleResult::SendData(len) = result else {
            panic!("expected a data block");
        };
        let mut r = DataReader::new(fx.payload(len));
        assert_eq!(r.read_u16().unwrap(), DEV_PROP_FRIENDLY_NAME);
        assert_eq!(r.read_u16().unwrap(), TYPE_STR);
        assert_eq!(r.read_u8().unwrap(), DEV_PROP_GET_SET);
        assert_eq!(r.read_string().unwrap(), "Rockbox media player");
        assert_eq!(r.read_string().unwrap(), "Kitchen");
        assert_eq!(r.read_u8().unwrap(), DEV_PROP_FORM_NONE);
    }

    #[test]
    fn test_unknown_prop_not_supported() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_GET_DEV_PROP_VALUE, &[0x5003]);
        assert_eq!(result, HandleResult::SendData(ContainerHeader::SIZE));
        assert_eq!(fx.machine.response.code, ResponseCode::DEVICE_PROP_NOT_SUPPORTED);

        fx.run(MTP_OP_GET_DEV_PROP_DESC, &[0x1_5001]);
        assert_eq!(fx.machine.response.code, ResponseCode::DEVICE_PROP_NOT_SUPPORTED);
    }

    #[test]
    fn test_set_read_only_prop_denied() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_SET_DEV_PROP_VALUE, &[DEV_PROP_BATTERY_LEVEL as u32]);
        assert_eq!(result, HandleResult::ReceiveData(ReceiveCompletion::Discard));
        assert_eq!(fx.machine.response.code, ResponseCode::ACCESS_DENIED);
    }

    #[test]
    fn test_set_friendly_name_stores_value() {
        let mut fx = Fixture::new().with_session();
        let (result, _) = fx.run(MTP_OP_SET_DEV_PROP_VALUE, &[DEV_PROP_FRIENDLY_NAME as u32]);
        assert_eq!(
            result,
            HandleResult::ReceiveData(ReceiveCompletion::Handler(DataHandler::SetFriendlyName))
        );

        // "Den" as an MTP string: 4 units including NUL
        let payload = [4, b'D', 0, b'e', 0, b'n', 0, 0, 0];
        let mut ctx = HandlerContext {
            machine: &mut fx.machine,
            index: &mut fx.index,
            cursor: &mut fx.cursor,
            platform: &fx.platform,
            config: &fx.config,
            block: &mut fx.block,
        };
        let result = complete_receive(&mut ctx, DataHandler::SetFriendlyName, &payload);
        assert_eq!(result, Ok(HandleResult::Respond));
        assert_eq!(fx.machine.friendly_name, "Den");
        assert_eq!(fx.machine.response.code, ResponseCode::OK);
    }

    #[test]
    fn test_set_friendly_name_rejects_garbage() {
        let mut fx = Fixture::new().with_session();
        let mut ctx = HandlerContext {
            machine: &mut fx.machine,
            index: &mut fx.index,
            cursor: &mut fx.cursor,
            platform: &fx.platform,
            config: &fx.config,
            block: &mut fx.block,
        };
        let result = complete_receive(&mut ctx, DataHandler::SetFriendlyName, &[9, b'x']);
        assert_eq!(
            result.map_err(|r| r.code),
            Err(ResponseCode::INVALID_DEVICE_PROP_VALUE)
        );
        assert_eq!(fx.machine.friendly_name, "Rockbox media player");
    }
}
