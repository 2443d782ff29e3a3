//! Protocol module - MTP container and dataset definitions.

pub mod codec;
pub mod codes;
pub mod constants;
pub mod container;

pub use codec::{ArrayMark, DataBlockWriter, DataReader, MtpDateTime};
pub use codes::{DataPhase, Operation, ResponseCode};
pub use constants::*;
pub use container::{CodecError, Command, ContainerHeader, ContainerType, ParamList, Response};
