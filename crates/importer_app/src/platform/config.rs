use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use importer_core::{CoreSettings, PollPolicy};
use importer_engine::ServiceSettings;
use importer_logging::{importer_info, importer_warn};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILENAME: &str = "importer.ron";

/// Everything the binary reads from `importer.ron`. Absent fields keep their
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server_url: String,
    pub poll_interval_ms: u64,
    pub notice_ttl_ms: u64,
    /// `None` keeps polling through failures indefinitely.
    pub max_consecutive_poll_failures: Option<u32>,
    pub max_upload_bytes: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub max_response_bytes: u64,
    /// Base for ticket links, e.g. `https://example.atlassian.net`.
    pub ticket_browse_base: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let core = CoreSettings::default();
        let service = ServiceSettings::default();
        Self {
            server_url: service.base_url,
            poll_interval_ms: 1_000,
            notice_ttl_ms: core.notice_ttl.as_millis() as u64,
            max_consecutive_poll_failures: core.poll_policy.max_consecutive_failures,
            max_upload_bytes: core.max_upload_bytes,
            connect_timeout_ms: service.connect_timeout.as_millis() as u64,
            request_timeout_ms: service.request_timeout.as_millis() as u64,
            max_response_bytes: service.max_response_bytes,
            ticket_browse_base: None,
        }
    }
}

impl AppConfig {
    pub fn core_settings(&self) -> CoreSettings {
        CoreSettings {
            max_upload_bytes: self.max_upload_bytes,
            notice_ttl: Duration::from_millis(self.notice_ttl_ms),
            poll_policy: PollPolicy {
                max_consecutive_failures: self.max_consecutive_poll_failures,
            },
        }
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            base_url: self.server_url.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            max_response_bytes: self.max_response_bytes,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Reads the config from `explicit`, or `./importer.ron` when none is given.
/// A missing file yields defaults; an unreadable or invalid one is logged and
/// also yields defaults.
pub fn load(explicit: Option<&Path>) -> AppConfig {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME));

    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if explicit.is_some() {
                importer_warn!("Config file {:?} not found; using defaults", path);
            }
            return AppConfig::default();
        }
        Err(err) => {
            importer_warn!("Failed to read config from {:?}: {}", path, err);
            return AppConfig::default();
        }
    };

    match ron::from_str(&content) {
        Ok(config) => {
            importer_info!("Loaded config from {:?}", path);
            config
        }
        Err(err) => {
            importer_warn!("Failed to parse config from {:?}: {}", path, err);
            AppConfig::default()
        }
    }
}
