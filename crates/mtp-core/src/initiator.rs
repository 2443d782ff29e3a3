//! Host-side MTP initiator.
//!
//! Issues commands over a [`UsbTransport`], collects the optional data
//! container and the response, and decodes the common datasets.

use thiserror::Error;
use tracing::{debug, instrument};

use crate::protocol::constants::*;
use crate::protocol::{
    CodecError, Command, ContainerHeader, ContainerType, DataBlockWriter, DataReader, Response,
    ResponseCode,
};
use crate::transport::{TransportError, UsbTransport};

/// Size of each bulk-in read.
const READ_CHUNK: usize = 512;

#[derive(Error, Debug)]
pub enum InitiatorError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Malformed container: {0}")]
    Codec(#[from] CodecError),

    #[error("Operation 0x{op:04X} failed: {code}")]
    Response { op: u16, code: ResponseCode },

    #[error("Transaction id mismatch: expected {expected}, got {actual}")]
    TransactionMismatch { expected: u32, actual: u32 },

    #[error("Unexpected {0} container")]
    UnexpectedContainer(ContainerType),
}

/// Result of one transaction.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub response: Response,
    /// Payload of the data container, header stripped.
    pub data: Option<Vec<u8>>,
}

/// Decoded DeviceInfo dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub standard_version: u16,
    pub vendor_extension_id: u32,
    pub mtp_version: u16,
    pub vendor_extension_desc: String,
    pub functional_mode: u16,
    pub operations: Vec<u16>,
    pub events: Vec<u16>,
    pub device_properties: Vec<u16>,
    pub capture_formats: Vec<u16>,
    pub playback_formats: Vec<u16>,
    pub manufacturer: String,
    pub model: String,
    pub device_version: String,
    pub serial_number: String,
}

impl DeviceInfo {
    pub fn parse(payload: &[u8]) -> Result<Self, CodecError> {
        let mut r = DataReader::new(payload);
        Ok(Self {
            standard_version: r.read_u16()?,
            vendor_extension_id: r.read_u32()?,
            mtp_version: r.read_u16()?,
            vendor_extension_desc: r.read_string()?,
            functional_mode: r.read_u16()?,
            operations: r.read_u16_array()?,
            events: r.read_u16_array()?,
            device_properties: r.read_u16_array()?,
            capture_formats: r.read_u16_array()?,
            playback_formats: r.read_u16_array()?,
            manufacturer: r.read_string()?,
            model: r.read_string()?,
            device_version: r.read_string()?,
            serial_number: r.read_string()?,
        })
    }
}

/// Decoded StorageInfo dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    pub storage_type: u16,
    pub filesystem_type: u16,
    pub access_capability: u16,
    pub max_capacity: u64,
    pub free_space: u64,
    pub free_objects: u32,
    pub description: String,
    pub volume_identifier: String,
}

impl StorageInfo {
    pub fn parse(payload: &[u8]) -> Result<Self, CodecError> {
        let mut r = DataReader::new(payload);
        Ok(Self {
            storage_type: r.read_u16()?,
            filesystem_type: r.read_u16()?,
            access_capability: r.read_u16()?,
            max_capacity: r.read_u64()?,
            free_space: r.read_u64()?,
            free_objects: r.read_u32()?,
            description: r.read_string()?,
            volume_identifier: r.read_string()?,
        })
    }
}

/// MTP initiator over a host transport.
pub struct MtpInitiator<T: UsbTransport> {
    transport: T,
    next_transaction_id: u32,
}

impl<T: UsbTransport> MtpInitiator<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_transaction_id: 1,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one transaction, optionally sending `data_out` as the data phase.
    #[instrument(skip_all, fields(code = %format!("0x{:04X}", code)))]
    pub fn transact(
        &mut self,
        code: u16,
        params: &[u32],
        data_out: Option<&[u8]>,
    ) -> Result<Transaction, InitiatorError> {
        let transaction_id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);

        let command = Command::new(code, transaction_id, params)?;
        self.transport.write(&command.to_bytes())?;

        if let Some(payload) = data_out {
            let mut block = vec![0u8; ContainerHeader::SIZE + payload.len()];
            let mut w = DataBlockWriter::start(&mut block, code, transaction_id)?;
            w.put_bytes(payload)?;
            w.finish();
            self.transport.write(&block)?;
        }

        let mut data = None;
        loop {
            let container = self.read_container()?;
            let header = ContainerHeader::peek(&container)?;
            if header.transaction_id != transaction_id {
                return Err(InitiatorError::TransactionMismatch {
                    expected: transaction_id,
                    actual: header.transaction_id,
                });
            }
            match header.kind {
                ContainerType::Data => {
                    let (_, payload) = ContainerHeader::decode(&container, container.len())?;
                    debug!(len = payload.len(), "Data block received");
                    data = Some(payload.to_vec());
                }
                ContainerType::Response => {
                    let (response, _) = Response::parse(&container, container.len())?;
                    debug!(response = %response.code, "Response received");
                    return Ok(Transaction { response, data });
                }
                other => return Err(InitiatorError::UnexpectedContainer(other)),
            }
        }
    }

    /// Read one container, reassembling it from as many reads as needed.
    fn read_container(&self) -> Result<Vec<u8>, InitiatorError> {
        let mut buf = self.transport.read(READ_CHUNK)?;
        let header = ContainerHeader::peek(&buf)?;
        let total = header.length as usize;
        while buf.len() < total {
            let more = self.transport.read(READ_CHUNK.min(total - buf.len()))?;
            if more.is_empty() {
                return Err(TransportError::ReadFailed("short container".into()).into());
            }
            buf.extend_from_slice(&more);
        }
        Ok(buf)
    }

    fn expect_ok(
        &mut self,
        code: u16,
        params: &[u32],
        data_out: Option<&[u8]>,
    ) -> Result<Transaction, InitiatorError> {
        let tx = self.transact(code, params, data_out)?;
        if !tx.response.code.is_ok() {
            return Err(InitiatorError::Response {
                op: code,
                code: tx.response.code,
            });
        }
        Ok(tx)
    }

    fn expect_data(&mut self, code: u16, params: &[u32]) -> Result<Vec<u8>, InitiatorError> {
        let tx = self.expect_ok(code, params, None)?;
        Ok(tx.data.unwrap_or_default())
    }

    pub fn open_session(&mut self, session_id: u32) -> Result<(), InitiatorError> {
        self.expect_ok(MTP_OP_OPEN_SESSION, &[session_id], None)
            .map(|_| ())
    }

    pub fn close_session(&mut self) -> Result<(), InitiatorError> {
        self.expect_ok(MTP_OP_CLOSE_SESSION, &[], None).map(|_| ())
    }

    pub fn device_info(&mut self) -> Result<DeviceInfo, InitiatorError> {
        let payload = self.expect_data(MTP_OP_GET_DEV_INFO, &[])?;
        Ok(DeviceInfo::parse(&payload)?)
    }

    pub fn storage_ids(&mut self) -> Result<Vec<u32>, InitiatorError> {
        let payload = self.expect_data(MTP_OP_GET_STORAGE_IDS, &[])?;
        Ok(DataReader::new(&payload).read_u32_array()?)
    }

    pub fn storage_info(&mut self, storage_id: u32) -> Result<StorageInfo, InitiatorError> {
        let payload = self.expect_data(MTP_OP_GET_STORAGE_INFO, &[storage_id])?;
        Ok(StorageInfo::parse(&payload)?)
    }

    pub fn object_handles(&mut self, storage_id: u32) -> Result<Vec<u32>, InitiatorError> {
        let payload = self.expect_data(MTP_OP_GET_OBJECT_HANDLES, &[storage_id, 0, 0])?;
        Ok(DataReader::new(&payload).read_u32_array()?)
    }

    /// Raw value of a device property.
    pub fn device_prop_value(&mut self, prop: u16) -> Result<Vec<u8>, InitiatorError> {
        self.expect_data(MTP_OP_GET_DEV_PROP_VALUE, &[prop as u32])
    }

    pub fn battery_level(&mut self) -> Result<u8, InitiatorError> {
        let value = self.device_prop_value(DEV_PROP_BATTERY_LEVEL)?;
        Ok(DataReader::new(&value).read_u8()?)
    }

    pub fn date_time(&mut self) -> Result<String, InitiatorError> {
        let value = self.device_prop_value(DEV_PROP_DATE_TIME)?;
        Ok(DataReader::new(&value).read_string()?)
    }

    pub fn friendly_name(&mut self) -> Result<String, InitiatorError> {
        let value = self.device_prop_value(DEV_PROP_FRIENDLY_NAME)?;
        Ok(DataReader::new(&value).read_string()?)
    }

    pub fn set_friendly_name(&mut self, name: &str) -> Result<(), InitiatorError> {
        let mut block = vec![0u8; ContainerHeader::SIZE + 1 + 2 * 256];
        let mut w = DataBlockWriter::start(&mut block, 0, 0)?;
        w.put_string(name)?;
        let len = w.finish();
        let value = &block[ContainerHeader::SIZE..len];
        self.expect_ok(
            MTP_OP_SET_DEV_PROP_VALUE,
            &[DEV_PROP_FRIENDLY_NAME as u32],
            Some(value),
        )
        .map(|_| ())
    }

    /// Get-Device-Status class request.
    pub fn device_status(&self) -> Result<ResponseCode, InitiatorError> {
        let bytes = self
            .transport
            .class_request_in(USB_CTRL_GET_DEV_STATUS, DEVICE_STATUS_SIZE as u16)?;
        let mut r = DataReader::new(&bytes);
        let _length = r.read_u16()?;
        Ok(ResponseCode::from_u16(r.read_u16()?))
    }

    /// Device-Reset class request.
    pub fn reset(&self) -> Result<(), InitiatorError> {
        self.transport.class_request_out(USB_CTRL_DEV_RESET_REQUEST)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::ResponderConfig;
    use crate::events::NullObserver;
    use crate::index::StaticIndex;
    use crate::platform::FixedPlatform;
    use crate::protocol::MtpDateTime;
    use crate::transport::LoopbackHost;

    type Host = LoopbackHost<StaticIndex, FixedPlatform, NullObserver>;

    fn initiator(files: &[&str]) -> MtpInitiator<Host> {
        let platform = FixedPlatform {
            battery_level: 64,
            time: MtpDateTime {
                year: 2024,
                month: 2,
                day: 29,
                hour: 23,
                minute: 59,
                second: 58,
            },
        };
        MtpInitiator::new(LoopbackHost::connect(
            StaticIndex::new(files.iter().copied()),
            platform,
            ResponderConfig::default(),
            Arc::new(NullObserver),
        ))
    }

    #[test]
    fn test_full_browse_session() {
        let mut init = initiator(&["/music/one.mp3", "/music/two.mp3", "/music/three.mp3"]);

        let info = init.device_info().unwrap();
        assert_eq!(info.manufacturer, "Rockbox.org");
        assert_eq!(info.operations, SUPPORTED_OPERATIONS);
        assert_eq!(info.device_properties, SUPPORTED_DEVICE_PROPERTIES);

        init.open_session(1).unwrap();
        assert_eq!(init.storage_ids().unwrap(), vec![MAIN_STORAGE_ID]);

        let storage = init.storage_info(MAIN_STORAGE_ID).unwrap();
        assert_eq!(storage.storage_type, STOR_TYPE_FIXED_RAM);
        assert_eq!(storage.max_capacity, 0);

        assert_eq!(init.object_handles(ALL_STORAGES).unwrap(), vec![1, 2, 3]);
        assert_eq!(init.battery_level().unwrap(), 64);
        assert_eq!(init.date_time().unwrap(), "20240229T235958");
        init.close_session().unwrap();
    }

    #[test]
    fn test_error_response_surfaces_code() {
        let mut init = initiator(&[]);
        let err = init.storage_ids().unwrap_err();
        assert!(matches!(
            err,
            InitiatorError::Response {
                op: MTP_OP_GET_STORAGE_IDS,
                code: ResponseCode::SESSION_NOT_OPEN
            }
        ));

        init.open_session(5).unwrap();
        let err = init.open_session(6).unwrap_err();
        assert!(matches!(
            err,
            InitiatorError::Response {
                code: ResponseCode::SESSION_ALREADY_OPEN,
                ..
            }
        ));
    }

    #[test]
    fn test_set_friendly_name_roundtrip() {
        let mut init = initiator(&[]);
        init.open_session(1).unwrap();
        assert_eq!(init.friendly_name().unwrap(), "Rockbox media player");
        init.set_friendly_name("Garage").unwrap();
        assert_eq!(init.friendly_name().unwrap(), "Garage");
    }

    #[test]
    fn test_status_and_reset() {
        let init = initiator(&[]);
        assert_eq!(init.device_status().unwrap(), ResponseCode::OK);
        init.reset().unwrap();
        assert_eq!(init.device_status().unwrap(), ResponseCode::OK);
    }

    #[test]
    fn test_large_handle_list_spans_reads() {
        let names: Vec<String> = (0..200).map(|i| format!("/t{}.ogg", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut init = initiator(&refs);
        init.open_session(1).unwrap();
        let handles = init.object_handles(MAIN_STORAGE_ID).unwrap();
        assert_eq!(handles.len(), 200);
        assert_eq!(handles.last(), Some(&200));
    }
}
