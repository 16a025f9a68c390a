//! HTTP API for device clients
//!
//! - POST /calls - Create a call
//! - GET /calls/:call_id - Fetch one call
//! - GET /groups/:group_id/calls - Group poll (open and recently ended calls)
//! - POST /calls/:call_id/{respond,connect,leave,end} - Lifecycle actions
//! - POST /calls/:call_id/recording/{start,stop,hide,unhide,disable}
//! - GET/POST /calls/:call_id/recording/segments - List or upload segments
//! - GET /media/* - Stored segment files
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
