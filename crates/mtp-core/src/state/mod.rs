//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::{HandleResult, HandlerContext, Rejection, handle_command};
pub use machine::{DataHandler, MachineContext, ReceiveCompletion, ResponderState, Session};
