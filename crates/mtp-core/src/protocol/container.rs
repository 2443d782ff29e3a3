//! Generic container framing for MTP.
//!
//! Every MTP transfer on the bulk pipes starts with a 12-byte header
//! (`length`, `type`, `code`, `transaction_id`, all little-endian) followed
//! by an operation-defined payload.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Cursor;
use thiserror::Error;

use super::codes::ResponseCode;
use super::constants::{CONTAINER_HEADER_SIZE, MAX_PARAMETERS};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Declared length {declared} does not match transfer length {actual}")]
    LengthMismatch { declared: u32, actual: usize },
    #[error("Unknown container type 0x{0:04X}")]
    UnknownType(u16),
    #[error("Unexpected container type: expected {expected}, got {actual}")]
    UnexpectedType {
        expected: ContainerType,
        actual: ContainerType,
    },
    #[error("Parameter payload of {0} bytes is not a multiple of 4")]
    MisalignedParameters(usize),
    #[error("Too many parameters: {0} (max 5)")]
    TooManyParameters(usize),
    #[error("Data block exceeds buffer capacity of {capacity} bytes")]
    BufferFull { capacity: usize },
    #[error("Malformed string")]
    MalformedString,
}

/// Container type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ContainerType {
    Command = 1,
    Data = 2,
    Response = 3,
    Event = 4,
}

impl TryFrom<u16> for ContainerType {
    type Error = CodecError;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::Command),
            2 => Ok(Self::Data),
            3 => Ok(Self::Response),
            4 => Ok(Self::Event),
            other => Err(CodecError::UnknownType(other)),
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerType::Command => write!(f, "Command"),
            ContainerType::Data => write!(f, "Data"),
            ContainerType::Response => write!(f, "Response"),
            ContainerType::Event => write!(f, "Event"),
        }
    }
}

/// Generic container header (12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub length: u32,
    pub kind: ContainerType,
    pub code: u16,
    pub transaction_id: u32,
}

impl ContainerHeader {
    pub const SIZE: usize = CONTAINER_HEADER_SIZE;

    /// Read just the header fields, without checking `length`.
    pub fn peek(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < Self::SIZE {
            return Err(CodecError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            length: LittleEndian::read_u32(&data[0..4]),
            kind: ContainerType::try_from(LittleEndian::read_u16(&data[4..6]))?,
            code: LittleEndian::read_u16(&data[6..8]),
            transaction_id: LittleEndian::read_u32(&data[8..12]),
        })
    }

    /// Decode the header of a received transfer and return it with the payload.
    ///
    /// `transfer_len` is the number of bytes the USB transfer actually
    /// delivered; it must equal the declared container length.
    pub fn decode(data: &[u8], transfer_len: usize) -> Result<(Self, &[u8]), CodecError> {
        if transfer_len < Self::SIZE || data.len() < transfer_len {
            return Err(CodecError::BufferTooSmall {
                expected: Self::SIZE.max(transfer_len),
                actual: data.len().min(transfer_len),
            });
        }
        let declared = LittleEndian::read_u32(&data[0..4]);
        if declared as usize != transfer_len {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: transfer_len,
            });
        }
        let header = Self::peek(data)?;
        Ok((header, &data[Self::SIZE..transfer_len]))
    }

    /// Write the header into the first 12 bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<(), CodecError> {
        if buf.len() < Self::SIZE {
            return Err(CodecError::BufferTooSmall {
                expected: Self::SIZE,
                actual: buf.len(),
            });
        }
        LittleEndian::write_u32(&mut buf[0..4], self.length);
        LittleEndian::write_u16(&mut buf[4..6], self.kind as u16);
        LittleEndian::write_u16(&mut buf[6..8], self.code);
        LittleEndian::write_u32(&mut buf[8..12], self.transaction_id);
        Ok(())
    }
}

/// Bounded list of up to five u32 parameters.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamList {
    values: [u32; MAX_PARAMETERS],
    len: usize,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(values: &[u32]) -> Result<Self, CodecError> {
        if values.len() > MAX_PARAMETERS {
            return Err(CodecError::TooManyParameters(values.len()));
        }
        let mut list = Self::new();
        list.values[..values.len()].copy_from_slice(values);
        list.len = values.len();
        Ok(list)
    }

    /// Parse a parameter payload; its length must be a multiple of 4.
    pub fn parse(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() % 4 != 0 {
            return Err(CodecError::MisalignedParameters(payload.len()));
        }
        let count = payload.len() / 4;
        if count > MAX_PARAMETERS {
            return Err(CodecError::TooManyParameters(count));
        }
        let mut list = Self::new();
        let mut cursor = Cursor::new(payload);
        for slot in list.values.iter_mut().take(count) {
            *slot = cursor
                .read_u32::<LittleEndian>()
                .map_err(|_| CodecError::MisalignedParameters(payload.len()))?;
        }
        list.len = count;
        Ok(list)
    }

    pub fn push(&mut self, value: u32) -> Result<(), CodecError> {
        if self.len == MAX_PARAMETERS {
            return Err(CodecError::TooManyParameters(self.len + 1));
        }
        self.values[self.len] = value;
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Parameter `index`, or 0 when absent.
    pub fn get(&self, index: usize) -> u32 {
        self.as_slice().get(index).copied().unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.values[..self.len]
    }
}

impl fmt::Debug for ParamList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.as_slice().iter().map(|v| format!("0x{:08X}", v)))
            .finish()
    }
}

/// Command container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Command {
    pub code: u16,
    pub transaction_id: u32,
    pub params: ParamList,
}

impl Command {
    pub fn new(code: u16, transaction_id: u32, params: &[u32]) -> Result<Self, CodecError> {
        Ok(Self {
            code,
            transaction_id,
            params: ParamList::from_slice(params)?,
        })
    }

    /// Parse a command block received in a transfer of `transfer_len` bytes.
    pub fn parse(data: &[u8], transfer_len: usize) -> Result<Self, CodecError> {
        let (header, payload) = ContainerHeader::decode(data, transfer_len)?;
        if header.kind != ContainerType::Command {
            return Err(CodecError::UnexpectedType {
                expected: ContainerType::Command,
                actual: header.kind,
            });
        }
        Ok(Self {
            code: header.code,
            transaction_id: header.transaction_id,
            params: ParamList::parse(payload)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_block(
            ContainerType::Command,
            self.code,
            self.transaction_id,
            &self.params,
        )
    }
}

/// Response container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub code: ResponseCode,
    pub params: ParamList,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(ResponseCode::OK)
    }
}

impl Response {
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code,
            params: ParamList::new(),
        }
    }

    /// Encoded size of this response container.
    pub fn encoded_len(&self) -> usize {
        ContainerHeader::SIZE + 4 * self.params.len()
    }

    /// Encode the response for `transaction_id` into `buf`, returning the length.
    pub fn encode_into(&self, transaction_id: u32, buf: &mut [u8]) -> Result<usize, CodecError> {
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(CodecError::BufferFull {
                capacity: buf.len(),
            });
        }
        ContainerHeader {
            length: len as u32,
            kind: ContainerType::Response,
            code: self.code.value(),
            transaction_id,
        }
        .write_to(buf)?;
        for (i, &p) in self.params.as_slice().iter().enumerate() {
            let at = ContainerHeader::SIZE + 4 * i;
            LittleEndian::write_u32(&mut buf[at..at + 4], p);
        }
        Ok(len)
    }

    /// Parse a response container, returning it with its transaction id.
    pub fn parse(data: &[u8], transfer_len: usize) -> Result<(Self, u32), CodecError> {
        let (header, payload) = ContainerHeader::decode(data, transfer_len)?;
        if header.kind != ContainerType::Response {
            return Err(CodecError::UnexpectedType {
                expected: ContainerType::Response,
                actual: header.kind,
            });
        }
        let response = Self {
            code: ResponseCode::from_u16(header.code),
            params: ParamList::parse(payload)?,
        };
        Ok((response, header.transaction_id))
    }
}

fn encode_block(kind: ContainerType, code: u16, transaction_id: u32, params: &ParamList) -> Vec<u8> {
    let len = ContainerHeader::SIZE + 4 * params.len();
    let mut buf = Vec::with_capacity(len);
    // Writes into a Vec cannot fail.
    let _ = buf.write_u32::<LittleEndian>(len as u32);
    let _ = buf.write_u16::<LittleEndian>(kind as u16);
    let _ = buf.write_u16::<LittleEndian>(code);
    let _ = buf.write_u32::<LittleEndian>(transaction_id);
    for &p in params.as_slice() {
        let _ = buf.write_u32::<LittleEndian>(p);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        let cmd = Command::new(0x1002, 1, &[0xAABBCCDD]).unwrap();
        let bytes = cmd.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &[16, 0, 0, 0]);
        assert_eq!(&bytes[4..6], &[1, 0]);

        let parsed = Command::parse(&bytes, bytes.len()).unwrap();
        assert_eq!(parsed.code, 0x1002);
        assert_eq!(parsed.transaction_id, 1);
        assert_eq!(parsed.params.as_slice(), &[0xAABBCCDD]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let bytes = Command::new(0x1001, 7, &[]).unwrap().to_bytes();
        let mut padded = bytes.clone();
        padded.extend_from_slice(&[0; 4]);
        assert_eq!(
            Command::parse(&padded, padded.len()),
            Err(CodecError::LengthMismatch {
                declared: 12,
                actual: 16
            })
        );
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(matches!(
            ContainerHeader::decode(&[0u8; 8], 8),
            Err(CodecError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_misaligned_parameters() {
        let mut bytes = Command::new(0x1005, 3, &[1]).unwrap().to_bytes();
        bytes.truncate(14);
        LittleEndian::write_u32(&mut bytes[0..4], 14);
        assert_eq!(
            Command::parse(&bytes, 14),
            Err(CodecError::MisalignedParameters(2))
        );
    }

    #[test]
    fn test_too_many_parameters() {
        assert_eq!(
            ParamList::from_slice(&[1, 2, 3, 4, 5, 6]),
            Err(CodecError::TooManyParameters(6))
        );
        let mut bytes = vec![0u8; 12 + 24];
        ContainerHeader {
            length: 36,
            kind: ContainerType::Command,
            code: 0x1007,
            transaction_id: 9,
        }
        .write_to(&mut bytes)
        .unwrap();
        assert_eq!(
            Command::parse(&bytes, 36),
            Err(CodecError::TooManyParameters(6))
        );
    }

    #[test]
    fn test_data_block_is_not_a_command() {
        let mut bytes = [0u8; 12];
        ContainerHeader {
            length: 12,
            kind: ContainerType::Data,
            code: 0x1001,
            transaction_id: 1,
        }
        .write_to(&mut bytes)
        .unwrap();
        assert!(matches!(
            Command::parse(&bytes, 12),
            Err(CodecError::UnexpectedType { .. })
        ));
    }

    #[test]
    fn test_response_encode() {
        let mut resp = Response::new(ResponseCode::OK);
        resp.params.push(42).unwrap();
        let mut buf = [0u8; 32];
        let len = resp.encode_into(0x10, &mut buf).unwrap();
        assert_eq!(len, 16);

        let (parsed, tid) = Response::parse(&buf, len).unwrap();
        assert_eq!(tid, 0x10);
        assert_eq!(parsed.code, ResponseCode::OK);
        assert_eq!(parsed.params.as_slice(), &[42]);
    }

    #[test]
    fn test_param_list_bounds() {
        let mut params = ParamList::new();
        for i in 0..5 {
            params.push(i).unwrap();
        }
        assert!(params.push(5).is_err());
        assert_eq!(params.get(4), 4);
        assert_eq!(params.get(7), 0);
    }
}
