//! Transport layer module.

pub mod loopback;
pub mod mock;
pub mod nusb;
pub mod traits;

pub use loopback::{LoopbackDriver, LoopbackHost};
pub use mock::{MockAllocator, MockDriver};
pub use self::nusb::NusbTransport;
pub use traits::{
    ControlRequest, Direction, Endpoint, EndpointAllocator, EndpointDriver, TransferCompletion,
    TransferKind, TransportError, UsbTransport,
};
