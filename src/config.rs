//! Service configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Largest accepted mirror request body (the URL itself).
pub const MAX_URL_BODY_BYTES: usize = 8192;

/// Extra time granted to a whole HTTP request on top of the render timeout.
pub const REQUEST_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Read-only configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listen port.
    pub port: u16,

    /// Ceiling for `/print` bodies and for pages fetched by `/mirror`.
    pub max_body_bytes: usize,

    /// Deadline for one converter run.
    pub render_timeout: Duration,

    /// Deadline for one mirror fetch, redirects included.
    pub fetch_timeout: Duration,

    /// Path to the wkhtmltopdf binary.
    pub wkhtmltopdf_path: PathBuf,

    /// Whether rendered documents may link out to the network.
    pub allow_net: bool,

    /// Local paths the converter may read.
    pub allowlist_paths: Vec<PathBuf>,

    /// CORS origins (empty = allow all).
    pub cors_origins: Vec<String>,

    /// Emit JSON log lines.
    pub json_logs: bool,

    /// Max bytes of `/print` payload attached to the request log (0 = off).
    pub payload_log_max_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            max_body_bytes: 2_000_000,
            render_timeout: Duration::from_millis(30_000),
            fetch_timeout: Duration::from_millis(15_000),
            wkhtmltopdf_path: PathBuf::from("wkhtmltopdf"),
            allow_net: false,
            allowlist_paths: Vec::new(),
            cors_origins: Vec::new(),
            json_logs: false,
            payload_log_max_bytes: 4096,
        }
    }
}

impl Config {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup. Missing, empty or
    /// unparseable values fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Self {
            port: parse_or(get("PORT"), defaults.port),
            max_body_bytes: parse_or(get("MAX_BODY_BYTES"), defaults.max_body_bytes),
            render_timeout: get("RENDER_TIMEOUT_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.render_timeout),
            fetch_timeout: get("FETCH_TIMEOUT_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch_timeout),
            wkhtmltopdf_path: get("WKHTMLTOPDF_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.wkhtmltopdf_path),
            allow_net: get("ALLOW_NET")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.allow_net),
            allowlist_paths: get("ALLOWLIST_PATHS")
                .map(|v| split_list(&v).into_iter().map(PathBuf::from).collect())
                .unwrap_or_default(),
            cors_origins: get("CORS_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            json_logs: get("JSON_LOGS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.json_logs),
            payload_log_max_bytes: parse_or(
                get("PAYLOAD_LOG_MAX_BYTES"),
                defaults.payload_log_max_bytes,
            ),
        }
    }

    /// Deadline for a whole HTTP request.
    pub fn request_timeout(&self) -> Duration {
        self.render_timeout + REQUEST_TIMEOUT_GRACE
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
