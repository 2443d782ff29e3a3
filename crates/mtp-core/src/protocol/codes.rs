//! Response codes and operation identification.
//!
//! Response codes travel in the `code` field of response containers and in
//! the Get-Device-Status answer. Operations are matched by their opcode and
//! carry the data-phase shape the host expects for them.

use std::fmt;

use super::constants::*;

/// MTP response code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(u16);

impl ResponseCode {
    pub const OK: Self = Self(0x2001);
    pub const GENERAL_ERROR: Self = Self(0x2002);
    pub const SESSION_NOT_OPEN: Self = Self(0x2003);
    pub const OPERATION_NOT_SUPPORTED: Self = Self(0x2005);
    pub const INVALID_STORAGE_ID: Self = Self(0x2008);
    pub const INVALID_OBJECT_HANDLE: Self = Self(0x2009);
    pub const DEVICE_PROP_NOT_SUPPORTED: Self = Self(0x200A);
    pub const ACCESS_DENIED: Self = Self(0x200F);
    pub const SPECIFICATION_BY_FORMAT_UNSUPPORTED: Self = Self(0x2014);
    pub const DEVICE_BUSY: Self = Self(0x2019);
    pub const INVALID_DEVICE_PROP_VALUE: Self = Self(0x201C);
    pub const SESSION_ALREADY_OPEN: Self = Self(0x201E);
    pub const INVALID_DATASET: Self = Self(0x2023);

    pub const fn from_u16(v: u16) -> Self {
        Self(v)
    }

    /// Raw value.
    pub const fn value(&self) -> u16 {
        self.0
    }

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }

    /// Symbolic name, if this is one of the codes the responder emits.
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            Self::OK => "OK",
            Self::GENERAL_ERROR => "GeneralError",
            Self::SESSION_NOT_OPEN => "SessionNotOpen",
            Self::OPERATION_NOT_SUPPORTED => "OperationNotSupported",
            Self::INVALID_STORAGE_ID => "InvalidStorageID",
            Self::INVALID_OBJECT_HANDLE => "InvalidObjectHandle",
            Self::DEVICE_PROP_NOT_SUPPORTED => "DevicePropNotSupported",
            Self::ACCESS_DENIED => "AccessDenied",
            Self::SPECIFICATION_BY_FORMAT_UNSUPPORTED => "SpecificationByFormatUnsupported",
            Self::DEVICE_BUSY => "DeviceBusy",
            Self::INVALID_DEVICE_PROP_VALUE => "InvalidDevicePropValue",
            Self::SESSION_ALREADY_OPEN => "SessionAlreadyOpen",
            Self::INVALID_DATASET => "InvalidDataset",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Debug for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "ResponseCode(0x{:04X} {})", self.0, name),
            None => write!(f, "ResponseCode(0x{:04X})", self.0),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

/// Shape of the data phase the host expects between command and response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPhase {
    /// Command is answered by a response only.
    None,
    /// Device sends a data block before the response.
    Send,
    /// Host sends a data block before the response.
    Receive,
}

/// Operations the responder dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetDeviceInfo,
    OpenSession,
    CloseSession,
    GetStorageIds,
    GetStorageInfo,
    GetNumObjects,
    GetObjectHandles,
    GetObjectInfo,
    ResetDevice,
    GetDevicePropDesc,
    GetDevicePropValue,
    SetDevicePropValue,
    GetObjectPropsSupported,
}

impl Operation {
    pub fn from_code(code: u16) -> Option<Self> {
        let op = match code {
            MTP_OP_GET_DEV_INFO => Self::GetDeviceInfo,
            MTP_OP_OPEN_SESSION => Self::OpenSession,
            MTP_OP_CLOSE_SESSION => Self::CloseSession,
            MTP_OP_GET_STORAGE_IDS => Self::GetStorageIds,
            MTP_OP_GET_STORAGE_INFO => Self::GetStorageInfo,
            MTP_OP_GET_NUM_OBJECTS => Self::GetNumObjects,
            MTP_OP_GET_OBJECT_HANDLES => Self::GetObjectHandles,
            MTP_OP_GET_OBJECT_INFO => Self::GetObjectInfo,
            MTP_OP_RESET_DEVICE => Self::ResetDevice,
            MTP_OP_GET_DEV_PROP_DESC => Self::GetDevicePropDesc,
            MTP_OP_GET_DEV_PROP_VALUE => Self::GetDevicePropValue,
            MTP_OP_SET_DEV_PROP_VALUE => Self::SetDevicePropValue,
            MTP_OP_GET_OBJ_PROPS_SUPPORTED => Self::GetObjectPropsSupported,
            _ => return None,
        };
        Some(op)
    }

    /// Data phase the host waits for, whether the operation succeeds or not.
    pub fn data_phase(&self) -> DataPhase {
        match self {
            Self::OpenSession | Self::CloseSession | Self::ResetDevice | Self::GetNumObjects => {
                DataPhase::None
            }
            Self::SetDevicePropValue => DataPhase::Receive,
            Self::GetDeviceInfo
            | Self::GetStorageIds
            | Self::GetStorageInfo
            | Self::GetObjectHandles
            | Self::GetObjectInfo
            | Self::GetDevicePropDesc
            | Self::GetDevicePropValue
            | Self::GetObjectPropsSupported => DataPhase::Send,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_code_names() {
        assert_eq!(ResponseCode::OK.to_string(), "OK");
        assert_eq!(ResponseCode::from_u16(0x201E), ResponseCode::SESSION_ALREADY_OPEN);
        assert_eq!(ResponseCode::from_u16(0x2FFF).to_string(), "0x2FFF");
        assert!(ResponseCode::OK.is_ok());
        assert!(!ResponseCode::DEVICE_BUSY.is_ok());
    }

    #[test]
    fn test_advertised_operations_dispatch() {
        for &code in SUPPORTED_OPERATIONS {
            if code == MTP_OP_GET_OBJECT {
                // Advertised but not dispatched.
                assert!(Operation::from_code(code).is_none());
            } else {
                assert!(Operation::from_code(code).is_some(), "0x{:04X}", code);
            }
        }
        for code in [
            MTP_OP_RESET_DEVICE,
            MTP_OP_GET_DEV_PROP_DESC,
            MTP_OP_GET_DEV_PROP_VALUE,
            MTP_OP_SET_DEV_PROP_VALUE,
        ] {
            assert!(SUPPORTED_OPERATIONS.contains(&code));
        }
    }

    #[test]
    fn test_data_phases() {
        assert_eq!(Operation::GetNumObjects.data_phase(), DataPhase::None);
        assert_eq!(Operation::GetObjectHandles.data_phase(), DataPhase::Send);
        assert_eq!(Operation::SetDevicePropValue.data_phase(), DataPhase::Receive);
    }
}
