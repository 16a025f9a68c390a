use crate::service::CallService;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CallService>,
    /// Where uploaded client segments are written before normalisation
    pub staging_dir: PathBuf,
    /// Root served under `/media`
    pub media_dir: PathBuf,
}

impl AppState {
    pub fn new(service: Arc<CallService>, staging_dir: PathBuf, media_dir: PathBuf) -> Self {
        Self {
            service,
            staging_dir,
            media_dir,
        }
    }
}
