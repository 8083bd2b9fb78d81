//! Liveness endpoint (`GET /o/ping`).

use crate::context::RequestContext;

pub fn respond(ctx: &RequestContext) {
    ctx.coordinator.write_message(200, "pong");
}
