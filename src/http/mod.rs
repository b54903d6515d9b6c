//! HTTP API server for controlling and observing the call
//!
//! - POST /call/start - Start the call
//! - POST /call/stop - Stop the call
//! - GET /call/status - Current call status
//! - GET /settings - Volume settings
//! - PUT /settings - Update volume settings
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
