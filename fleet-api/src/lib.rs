//! REST surface for the fleet control plane.
//!
//! One router, three zones: public auth/health endpoints, the
//! unauthenticated (optionally shared-secret-guarded) sync surface the
//! sidecar agents speak, and the bearer-token management API.

pub mod dto;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use routes::create_router;
pub use server::{run_server, start_background_server};
pub use state::{ApiConfig, AppState};
