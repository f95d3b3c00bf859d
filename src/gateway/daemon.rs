//! Router assembly and port-fallback binding, grounded on
//! `gateway::daemon::start_gateway`/`bind_with_fallback`.

use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use super::{
    auth::auth_middleware,
    routes::{create_job, get_job, health, job_runs, list_jobs, post_event, remove_job, run_job, status, update_job, GatewayState},
    ws::ws_handler,
};

const MAX_PORT_ATTEMPTS: u16 = 10;

fn build_router(state: GatewayState) -> Router {
    let protected = Router::new()
        .route("/api/v1/cron/jobs", get(list_jobs).post(create_job))
        .route("/api/v1/cron/jobs/{id}", get(get_job).patch(update_job).delete(remove_job))
        .route("/api/v1/cron/jobs/{id}/run", axum::routing::post(run_job))
        .route("/api/v1/cron/jobs/{id}/runs", get(job_runs))
        .route("/api/v1/cron/status", get(status))
        .route("/api/v1/events", axum::routing::post(post_event))
        .route("/api/v1/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state);

    let public = Router::new().route("/api/v1/health", get(health));

    Router::new().merge(public).merge(protected).layer(CorsLayer::permissive())
}

/// Start the gateway: binds to `bind_addr`, falling back to subsequent
/// ports on the same host if it's taken, up to [`MAX_PORT_ATTEMPTS`]. Blocks
/// until the server shuts down.
pub async fn start_gateway(state: GatewayState, bind_addr: &str) -> Result<(), String> {
    let addr: SocketAddr = bind_addr.parse().map_err(|e| format!("invalid bind address {bind_addr}: {e}"))?;
    let app = build_router(state);

    let listener = bind_with_fallback(addr).await?;
    let local = listener.local_addr().map_err(|e| e.to_string())?;
    tracing::info!(addr = %local, "gatehoused listening");

    axum::serve(listener, app).await.map_err(|e| format!("daemon error: {e}"))
}

async fn bind_with_fallback(addr: SocketAddr) -> Result<TcpListener, String> {
    for offset in 0..MAX_PORT_ATTEMPTS {
        let candidate = SocketAddr::new(addr.ip(), addr.port() + offset);
        match TcpListener::bind(candidate).await {
            Ok(listener) => return Ok(listener),
            Err(_) if offset + 1 < MAX_PORT_ATTEMPTS => continue,
            Err(e) => {
                return Err(format!(
                    "could not bind to any port in {}-{}: {e}",
                    addr.port(),
                    addr.port() + MAX_PORT_ATTEMPTS - 1
                ));
            }
        }
    }
    unreachable!()
}
