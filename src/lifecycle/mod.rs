//! Call Lifecycle Controller
//!
//! Creates calls, applies participant actions, and moves calls through
//! `ringing -> active -> ended` (or `ringing -> missed`).

mod controller;
mod sweeper;

pub use controller::{CallController, LeaveOutcome, RespondAction};
pub use sweeper::{ExpirySweeper, SweeperHandle};
