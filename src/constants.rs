//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Every value can be overridden from the environment (or a `.env` file).

use std::time::Duration;

/// Default collector port
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// UDP port collectors listen on for discovery broadcasts
pub const BROADCAST_PORT: u16 = 3001;

/// Token sent in discovery broadcasts
pub const DISCOVERY_MESSAGE: &str = "MAIWARE_SERVER_DISCOVERY";

/// Service name collectors answer discovery with
pub const DISCOVERY_SERVICE_NAME: &str = "mAIware-server";

/// Container gateway alias probed as a static candidate
pub const DOCKER_HOST_CANDIDATE: &str = "http://host.docker.internal:3000";

/// Last-octet sweep on the agent's own /24
pub const GATEWAY_SUFFIXES: &[&str] = &["1", "10", "20", "50", "100", "254"];

/// File name (under the home directory) of the last-known-good collector record
pub const LAST_KNOWN_FILE_NAME: &str = ".maiware-server.json";

/// Local AI app endpoint receiving raw file pushes
pub const DEFAULT_AI_APP_URL: &str = "http://localhost:1234/scan";

/// Files at or above this size skip the network push entirely (50 GiB)
pub const FILE_SIZE_THRESHOLD: u64 = 50 * 1024 * 1024 * 1024;

/// Default artificial scan delay (milliseconds)
pub const DEFAULT_SCAN_DELAY_MS: u64 = 10_000;

/// Disassembly byte window
pub const DISASM_MAX_BYTES: usize = 1024;

/// Disassembly instruction cap
pub const DISASM_MAX_INSNS: usize = 200;

// Timeouts and intervals
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5);
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(3);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2 * 60);
pub const BROADCAST_LISTEN_WINDOW: Duration = Duration::from_millis(1500);
pub const BROADCAST_CACHE_TTL: Duration = Duration::from_secs(30);
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(15);
pub const CLASSIFIER_TIMEOUT: Duration = Duration::from_secs(120);
pub const WRITE_STABILITY_THRESHOLD: Duration = Duration::from_secs(2);
pub const WRITE_STABILITY_POLL: Duration = Duration::from_millis(100);
pub const AUX_PUSH_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DASHBOARD_TIMEOUT: Duration = Duration::from_secs(5);
pub const DASHBOARD_FLUSH_INTERVAL: Duration = Duration::from_secs(3);

/// Events per dashboard batch
pub const DASHBOARD_BATCH_SIZE: usize = 10;

/// Upload attempts per scan result
pub const UPLOAD_RETRIES: u32 = 3;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Interpret "1", "true", "yes", "on" (any case) as true
pub fn normalize_boolean(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Explicit collector URL override
pub fn get_server_url() -> Option<String> {
    non_empty_var("MAIWARE_SERVER_URL")
}

/// Explicit collector host override
pub fn get_server_host() -> Option<String> {
    non_empty_var("MAIWARE_SERVER_HOST")
}

/// Collector port
pub fn get_server_port() -> u16 {
    non_empty_var("MAIWARE_SERVER_PORT")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SERVER_PORT)
}

/// Agent id override
pub fn get_agent_id() -> Option<String> {
    non_empty_var("MAIWARE_AGENT_ID")
}

/// Agent IP override
pub fn get_agent_ip() -> Option<String> {
    non_empty_var("MAIWARE_AGENT_IP")
}

/// Whether the raw-file push to the AI app is disabled
pub fn is_upload_skipped() -> bool {
    non_empty_var("MAIWARE_SKIP_UPLOAD")
        .map(|s| normalize_boolean(&s))
        .unwrap_or(false)
}

/// Scan delay, negative values clamp to zero
pub fn get_scan_delay() -> Duration {
    let ms = non_empty_var("MAIWARE_SCAN_DELAY_MS")
        .and_then(|s| s.parse::<i64>().ok())
        .map(|v| v.max(0) as u64)
        .unwrap_or(DEFAULT_SCAN_DELAY_MS);
    Duration::from_millis(ms)
}

/// Directory to watch, defaults to the user's downloads folder
pub fn get_watch_dir() -> Option<std::path::PathBuf> {
    non_empty_var("MAIWARE_WATCH_DIR")
        .map(std::path::PathBuf::from)
        .or_else(dirs::download_dir)
}

/// Directory holding predict_single.py
pub fn get_ai_dir() -> std::path::PathBuf {
    non_empty_var("MAIWARE_AI_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("../mAIware---AI"))
}

/// Python interpreter used for the model backend
pub fn get_python() -> String {
    non_empty_var("MAIWARE_PYTHON").unwrap_or_else(|| "python".to_string())
}

/// Local AI app push endpoint
pub fn get_ai_app_url() -> String {
    non_empty_var("MAIWARE_AI_APP_URL").unwrap_or_else(|| DEFAULT_AI_APP_URL.to_string())
}

/// Optional dashboard event endpoint
pub fn get_dashboard_url() -> Option<String> {
    non_empty_var("MAIWARE_DASHBOARD_URL")
}

/// Optional dashboard bearer key
pub fn get_dashboard_api_key() -> Option<String> {
    non_empty_var("MAIWARE_DASHBOARD_API_KEY")
}
