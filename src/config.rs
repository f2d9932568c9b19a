use crate::core::db::ConnectionParams;
use crate::core::{DashError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure parsed from a TOML file.
///
/// Every section and field is optional; missing values fall back to the
/// defaults below.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: ConnectionParams,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Address the dashboard listens on.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8501
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where log files are written.
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("log_data")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            dir: default_log_dir(),
        }
    }
}

/// What happens when a database operation fails during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log, close the connection, and exit the process
    Terminate,
    /// Log and show the error in the page
    Report,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::Terminate
    }
}

/// Dashboard behaviour.
#[derive(Debug, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub on_error: ErrorPolicy,
    /// Rows shown per page of the data grid
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Seconds a session may stay idle before it is dropped
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_page_size() -> usize {
    50
}

fn default_session_ttl_secs() -> u64 {
    30 * 60
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            on_error: ErrorPolicy::default(),
            page_size: default_page_size(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = tabledash::config::load_config("config.toml").expect("Failed to load config");
/// println!("{}", config.server.socket_addr());
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| {
        DashError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
    })?;
    parse_config(&content)
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| DashError::Config(e.to_string()))
}

/// `<config_dir>/tabledash/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tabledash").join("config.toml"))
}

/// Loads the file at `path`, or the default location when it exists, or
/// falls back to built-in defaults.
pub fn resolve_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => match default_config_path() {
            Some(p) if p.is_file() => load_config(p),
            _ => Ok(Config::default()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
[database]
path = "/var/lib/tabledash/cnc_data.db"
encoding = "UTF-16le"
strict_identifiers = true

[server]
port = 9000

[logging]
dir = "/var/log/tabledash"

[dashboard]
on_error = "report"
page_size = 20
session_ttl_secs = 300
"#;

    #[test]
    fn test_load_config_from_str() {
        let config = parse_config(SAMPLE_CONFIG).expect("Failed to parse sample config");
        assert_eq!(config.database.path, "/var/lib/tabledash/cnc_data.db");
        assert_eq!(config.database.encoding, "UTF-16le");
        assert!(config.database.strict_identifiers);
        assert!(config.database.create_if_missing);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.dir, PathBuf::from("/var/log/tabledash"));
        assert_eq!(config.dashboard.on_error, ErrorPolicy::Report);
        assert_eq!(config.dashboard.page_size, 20);
        assert_eq!(config.dashboard.session_ttl_secs, 300);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.database, ConnectionParams::default());
        assert_eq!(config.server.socket_addr(), "127.0.0.1:8501");
        assert_eq!(config.logging.dir, PathBuf::from("log_data"));
        assert_eq!(config.dashboard.on_error, ErrorPolicy::Terminate);
        assert_eq!(config.dashboard.session_ttl_secs, 1800);
    }

    #[test]
    fn test_invalid_config() {
        let err = parse_config("[dashboard]\non_error = \"explode\"").unwrap_err();
        assert!(matches!(err, DashError::Config(_)));
        assert!(load_config("/nonexistent/tabledash.toml").is_err());
    }
}
