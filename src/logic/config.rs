//! Agent configuration
//!
//! Snapshot of the environment taken at startup. Components receive the
//! pieces they need instead of reading env vars themselves, so tests can
//! build a config by hand.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Directory watched for new files
    pub watch_dir: Option<PathBuf>,
    /// Explicit collector URL (`MAIWARE_SERVER_URL`)
    pub server_url: Option<String>,
    /// Explicit collector host (`MAIWARE_SERVER_HOST`)
    pub server_host: Option<String>,
    pub server_port: u16,
    /// Where the last-known-good collector is persisted
    pub last_known_path: Option<PathBuf>,
    pub scan_delay: Duration,
    pub skip_upload: bool,
    pub ai_app_url: String,
    pub ai_dir: PathBuf,
    pub python: String,
    pub dashboard_url: Option<String>,
    pub dashboard_api_key: Option<String>,
    pub heartbeat_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            watch_dir: constants::get_watch_dir(),
            server_url: constants::get_server_url(),
            server_host: constants::get_server_host(),
            server_port: constants::get_server_port(),
            last_known_path: dirs::home_dir().map(|home| home.join(constants::LAST_KNOWN_FILE_NAME)),
            scan_delay: constants::get_scan_delay(),
            skip_upload: constants::is_upload_skipped(),
            ai_app_url: constants::get_ai_app_url(),
            ai_dir: constants::get_ai_dir(),
            python: constants::get_python(),
            dashboard_url: constants::get_dashboard_url(),
            dashboard_api_key: constants::get_dashboard_api_key(),
            heartbeat_interval: constants::HEARTBEAT_INTERVAL,
        }
    }
}

impl AgentConfig {
    /// `http://localhost:{port}`, used when nothing else answers
    pub fn default_base_url(&self) -> String {
        format!("http://localhost:{}", self.server_port)
    }

    pub fn log_summary(&self) {
        log::info!("Configuration:");
        match &self.watch_dir {
            Some(dir) => log::info!("  Watch dir: {}", dir.display()),
            None => log::info!("  Watch dir: (none)"),
        }
        log::info!("  Collector port: {}", self.server_port);
        if let Some(url) = &self.server_url {
            log::info!("  Collector URL override: {}", url);
        }
        log::info!("  Scan delay: {}ms", self.scan_delay.as_millis());
        log::info!("  AI app push: {}", if self.skip_upload { "disabled" } else { self.ai_app_url.as_str() });
        log::info!("  Model dir: {}", self.ai_dir.display());
        if let Some(url) = &self.dashboard_url {
            log::info!("  Dashboard: {}", url);
        }
    }
}
