//! Bearer-token auth middleware, grounded on `gateway::auth::auth_middleware`.
//!
//! Unlike the teacher (which always generates and persists a token file),
//! the token here comes from `EngineConfig::gateway.auth_token`: an empty
//! token disables auth entirely, for local-only setups that don't expose
//! the port beyond loopback.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use super::routes::GatewayState;

pub async fn auth_middleware(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.auth_token.is_empty() {
        return Ok(next.run(request).await);
    }

    let provided = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    match provided {
        Some(token) if token == state.auth_token => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}
