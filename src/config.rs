use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Fixed reconciliation poll cadence for every device
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub calls: CallsConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallsConfig {
    /// How long a call may ring before invitees are marked missed
    pub ring_timeout_secs: u64,
    pub expiry_sweep_interval_secs: u64,
    /// How long terminated calls stay in group polls
    pub recently_ended_window_secs: u64,
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            ring_timeout_secs: 45,
            expiry_sweep_interval_secs: 5,
            recently_ended_window_secs: 60,
        }
    }
}

impl CallsConfig {
    pub fn ring_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ring_timeout_secs as i64)
    }

    pub fn recently_ended_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.recently_ended_window_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub storage_path: String,
    /// Raw captures and uploads waiting for normalisation
    pub staging_path: String,
    /// Length of each server-side segment before rotating
    pub segment_duration_secs: u64,
    /// Groups that have recording turned off
    pub disabled_groups: Vec<String>,
    /// group id -> members allowed to hide or disable recordings
    pub moderators: HashMap<String, Vec<String>>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            storage_path: "~/.callvault/recordings".to_string(),
            staging_path: "~/.callvault/staging".to_string(),
            segment_duration_secs: 300,
            disabled_groups: Vec::new(),
            moderators: HashMap::new(),
        }
    }
}

impl RecordingConfig {
    pub fn storage_dir(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(expand_path(&self.storage_path)?))
    }

    pub fn staging_dir(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(expand_path(&self.staging_path)?))
    }

    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs(self.segment_duration_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: "~/.callvault/calls".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn dir(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(expand_path(&self.path)?))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// NATS server URL; events are not published when unset
    pub nats_url: Option<String>,
}

fn expand_path(path: &str) -> Result<String> {
    Ok(shellexpand::full(path)?.into_owned())
}

impl Config {
    /// Load `path` (any format the config crate knows, extension optional)
    /// and apply `CALLVAULT__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CALLVAULT").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
