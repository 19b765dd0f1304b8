use axum::http::StatusCode;

use epro_core::UserId;

use crate::app::errors;
use crate::context::ActorContext;
use crate::middleware::ACTOR_HEADER;

/// Status changes are always attributed, so they need the actor header.
pub fn required_actor(ctx: &ActorContext) -> Result<UserId, axum::response::Response> {
    ctx.actor().ok_or_else(|| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "actor_required",
            format!("the {ACTOR_HEADER} header is required for this operation"),
        )
    })
}
