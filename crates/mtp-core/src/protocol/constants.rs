//! Protocol constants from the MTP 1.0 / PTP (ISO 15740) specifications.

// ============================================================================
// Interface Identification
// ============================================================================

/// Still Image Capture device class (PTP/MTP)
pub const USB_CLASS_STILL_IMAGE: u8 = 0x06;
/// MTP interface subclass
pub const USB_MTP_SUBCLASS: u8 = 0x01;
/// MTP interface protocol
pub const USB_MTP_PROTO: u8 = 0x01;

// ============================================================================
// Container Layout
// ============================================================================

/// Generic container header: u32 length, u16 type, u16 code, u32 transaction id
pub const CONTAINER_HEADER_SIZE: usize = 12;

/// Maximum number of parameters in a command or response container
pub const MAX_PARAMETERS: usize = 5;

/// Default size of each staging buffer (one per direction)
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

// ============================================================================
// Operation Codes (Host -> Device)
// ============================================================================

pub const MTP_OP_GET_DEV_INFO: u16 = 0x1001;
pub const MTP_OP_OPEN_SESSION: u16 = 0x1002;
pub const MTP_OP_CLOSE_SESSION: u16 = 0x1003;
pub const MTP_OP_GET_STORAGE_IDS: u16 = 0x1004;
pub const MTP_OP_GET_STORAGE_INFO: u16 = 0x1005;
pub const MTP_OP_GET_NUM_OBJECTS: u16 = 0x1006;
pub const MTP_OP_GET_OBJECT_HANDLES: u16 = 0x1007;
pub const MTP_OP_GET_OBJECT_INFO: u16 = 0x1008;
pub const MTP_OP_GET_OBJECT: u16 = 0x1009;
pub const MTP_OP_RESET_DEVICE: u16 = 0x1010;
pub const MTP_OP_GET_DEV_PROP_DESC: u16 = 0x1014;
pub const MTP_OP_GET_DEV_PROP_VALUE: u16 = 0x1015;
pub const MTP_OP_SET_DEV_PROP_VALUE: u16 = 0x1016;
pub const MTP_OP_GET_OBJ_PROPS_SUPPORTED: u16 = 0x9801;

/// Operations advertised in the DeviceInfo dataset.
pub const SUPPORTED_OPERATIONS: &[u16] = &[
    MTP_OP_GET_DEV_INFO,
    MTP_OP_OPEN_SESSION,
    MTP_OP_CLOSE_SESSION,
    MTP_OP_GET_STORAGE_IDS,
    MTP_OP_GET_STORAGE_INFO,
    MTP_OP_GET_NUM_OBJECTS,
    MTP_OP_GET_OBJECT_HANDLES,
    MTP_OP_GET_OBJECT_INFO,
    MTP_OP_GET_OBJECT,
    MTP_OP_RESET_DEVICE,
    MTP_OP_GET_DEV_PROP_DESC,
    MTP_OP_GET_DEV_PROP_VALUE,
    MTP_OP_SET_DEV_PROP_VALUE,
    MTP_OP_GET_OBJ_PROPS_SUPPORTED,
];

/// Events advertised in the DeviceInfo dataset (none).
pub const SUPPORTED_EVENTS: &[u16] = &[];

// ============================================================================
// Device Properties
// ============================================================================

pub const DEV_PROP_BATTERY_LEVEL: u16 = 0x5001;
pub const DEV_PROP_DATE_TIME: u16 = 0x5011;
pub const DEV_PROP_FRIENDLY_NAME: u16 = 0xD402;

pub const SUPPORTED_DEVICE_PROPERTIES: &[u16] = &[
    DEV_PROP_BATTERY_LEVEL,
    DEV_PROP_DATE_TIME,
    DEV_PROP_FRIENDLY_NAME,
];

/// Get/Set flag values in a DevicePropDesc dataset
pub const DEV_PROP_GET: u8 = 0x00;
pub const DEV_PROP_GET_SET: u8 = 0x01;

/// Form flag values in a DevicePropDesc dataset
pub const DEV_PROP_FORM_NONE: u8 = 0x00;
pub const DEV_PROP_FORM_RANGE: u8 = 0x01;

// Datatype codes
pub const TYPE_UINT8: u16 = 0x0002;
pub const TYPE_STR: u16 = 0xFFFF;

// ============================================================================
// Storage
// ============================================================================

/// The only storage reported to the host.
pub const MAIN_STORAGE_ID: u32 = 0x0001_0001;
/// Wildcard used by the host to mean "every storage".
pub const ALL_STORAGES: u32 = 0xFFFF_FFFF;

pub const STOR_TYPE_FIXED_RAM: u16 = 0x0003;
pub const FS_TYPE_GENERIC_FLAT: u16 = 0x0001;
pub const ACCESS_CAP_RO_WITHOUT: u16 = 0x0001;

pub const OBJ_FMT_UNDEFINED: u16 = 0x3000;

// ============================================================================
// DeviceInfo fixed fields
// ============================================================================

pub const STANDARD_VERSION: u16 = 100;
pub const VENDOR_EXTENSION_ID: u32 = 0xFFFF_FFFF;
pub const MTP_VERSION: u16 = 100;
pub const FUNCTIONAL_MODE: u16 = 0x0000;

// ============================================================================
// Class-specific Control Requests
// ============================================================================

pub const USB_TYPE_MASK: u8 = 0x60;
pub const USB_TYPE_CLASS: u8 = 0x20;

pub const USB_CTRL_CANCEL_REQUEST: u8 = 0x64;
pub const USB_CTRL_GET_EXT_EVT_DATA: u8 = 0x65;
pub const USB_CTRL_DEV_RESET_REQUEST: u8 = 0x66;
pub const USB_CTRL_GET_DEV_STATUS: u8 = 0x67;

/// Size of the Get-Device-Status answer: u16 length + u16 code
pub const DEVICE_STATUS_SIZE: usize = 4;

// ============================================================================
// Standard Descriptors
// ============================================================================

pub const USB_DT_INTERFACE: u8 = 0x04;
pub const USB_DT_ENDPOINT: u8 = 0x05;
pub const USB_ENDPOINT_XFER_BULK: u8 = 0x02;
pub const USB_ENDPOINT_XFER_INT: u8 = 0x03;

pub const INTERFACE_DESCRIPTOR_SIZE: usize = 9;
pub const ENDPOINT_DESCRIPTOR_SIZE: usize = 7;

/// Interrupt endpoint max packet size and polling interval
pub const INT_ENDPOINT_MAX_PACKET: u16 = 8;
pub const INT_ENDPOINT_INTERVAL: u8 = 8;
