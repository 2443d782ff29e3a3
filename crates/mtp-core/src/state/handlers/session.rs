//! Session operations: OpenSession, CloseSession, ResetDevice.

use tracing::info;

use super::{HandlerContext, OpResult, Rejection};
use crate::index::ObjectIndex;
use crate::platform::Platform;
use crate::protocol::{DataPhase, ResponseCode};

pub(super) fn open_session<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    session_id: u32,
) -> OpResult {
    if ctx.machine.session.is_open() {
        return Err(Rejection::new(
            ResponseCode::SESSION_ALREADY_OPEN,
            DataPhase::None,
        ));
    }
    info!(session_id = %format!("0x{:08X}", session_id), "Session opened");
    ctx.machine.session.open(session_id);
    ctx.respond(ResponseCode::OK)
}

pub(super) fn close_session<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
) -> OpResult {
    end_session(ctx, "Session closed")
}

/// ResetDevice closes the session like CloseSession.
pub(super) fn reset_device<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
) -> OpResult {
    end_session(ctx, "Session closed by ResetDevice")
}

fn end_session<I: ObjectIndex, P: Platform>(
    ctx: &mut HandlerContext<'_, I, P>,
    message: &str,
) -> OpResult {
    if !ctx.machine.session.is_open() {
        return Err(Rejection::new(
            ResponseCode::SESSION_NOT_OPEN,
            DataPhase::None,
        ));
    }
    info!(session_id = %format!("0x{:08X}", ctx.machine.session.id()), "{}", message);
    ctx.machine.session.close();
    ctx.respond(ResponseCode::OK)
}
