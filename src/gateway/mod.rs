//! Local HTTP+WebSocket API (§6 "Engine-exposed surface"), grounded on
//! `gateway::{mod,daemon,routes,auth,ws}.rs`: the same route table and
//! bearer-token auth, generalised from agent-session management onto the
//! job-catalog CRUD/run/status surface this engine exposes.

#[cfg(feature = "gateway")]
pub mod auth;
#[cfg(feature = "gateway")]
pub mod daemon;
#[cfg(feature = "gateway")]
pub mod routes;
#[cfg(feature = "gateway")]
pub mod ws;

#[cfg(feature = "gateway")]
pub use daemon::start_gateway;
#[cfg(feature = "gateway")]
pub use routes::GatewayState;
