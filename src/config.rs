//! Configuration module for feedwatch.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{FeedwatchError, Result};

/// Control server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Host address to bind.
    #[serde(default = "default_control_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_control_port")]
    pub port: u16,
    /// Maximum number of concurrent control connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Shared secret a client must send before anything else (empty = open).
    #[serde(default)]
    pub token: String,
}

fn default_control_host() -> String {
    "127.0.0.1".to_string()
}

fn default_control_port() -> u16 {
    7878
}

fn default_max_connections() -> usize {
    8
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: default_control_host(),
            port: default_control_port(),
            max_connections: default_max_connections(),
            token: String::new(),
        }
    }
}

/// Browser configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Chrome or Chromium binary to launch; empty means auto-detect.
    #[serde(default)]
    pub executable: String,
    /// DevTools endpoint of an already running browser. When set, sessions
    /// open tabs in that browser instead of launching their own.
    #[serde(default)]
    pub debugging_url: String,
    /// Run the browser without a window.
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Disable the Chrome sandbox (needed in most containers).
    #[serde(default)]
    pub no_sandbox: bool,
    /// How long to wait for a launched browser to come up, in seconds.
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,
    /// Timeout for a single DevTools request in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_headless() -> bool {
    true
}

fn default_launch_timeout() -> u64 {
    20
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: String::new(),
            debugging_url: String::new(),
            headless: default_headless(),
            no_sandbox: false,
            launch_timeout_secs: default_launch_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BrowserConfig {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Monitor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between two poll ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Deadline for each presence wait while fetching a snapshot.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Deadline for the page to report ready after a refresh.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
    /// Pause after the priming scroll/zoom so lazy content can load.
    #[serde(default = "default_priming_settle")]
    pub priming_settle_ms: u64,
    /// Pause after the priming refresh.
    #[serde(default = "default_refresh_settle")]
    pub refresh_settle_ms: u64,
    /// CSS selector matching one feed entry.
    #[serde(default = "default_entry_selector")]
    pub entry_selector: String,
    /// CSS selector that marks entry links as readable.
    #[serde(default = "default_link_marker_selector")]
    pub link_marker_selector: String,
    /// Number of leading link characters forming an item id.
    #[serde(default = "default_id_prefix_len")]
    pub id_prefix_len: usize,
    /// Where the diagnostic screenshot of a failed tick is written.
    #[serde(default = "default_diagnostic_path")]
    pub diagnostic_path: String,
}

fn default_tick_interval() -> u64 {
    15
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_ready_timeout() -> u64 {
    10
}

fn default_priming_settle() -> u64 {
    2000
}

fn default_refresh_settle() -> u64 {
    3000
}

fn default_entry_selector() -> String {
    ".listing-age.sub-title".to_string()
}

fn default_link_marker_selector() -> String {
    ".date-ago".to_string()
}

fn default_id_prefix_len() -> usize {
    41 // https://www.grailed.com/listings/12345678
}

fn default_diagnostic_path() -> String {
    "screenie.png".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            fetch_timeout_secs: default_fetch_timeout(),
            ready_timeout_secs: default_ready_timeout(),
            priming_settle_ms: default_priming_settle(),
            refresh_settle_ms: default_refresh_settle(),
            entry_selector: default_entry_selector(),
            link_marker_selector: default_link_marker_selector(),
            id_prefix_len: default_id_prefix_len(),
            diagnostic_path: default_diagnostic_path(),
        }
    }
}

impl MonitorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn priming_settle(&self) -> Duration {
        Duration::from_millis(self.priming_settle_ms)
    }

    pub fn refresh_settle(&self) -> Duration {
        Duration::from_millis(self.refresh_settle_ms)
    }
}

/// Notification configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotifyConfig {
    /// Discord-compatible webhook URL; empty disables the webhook sink.
    #[serde(default)]
    pub webhook_url: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/feedwatch.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Control server configuration.
    #[serde(default)]
    pub control: ControlConfig,
    /// Browser configuration.
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Monitor configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Notification configuration.
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FeedwatchError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FeedwatchError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FEEDWATCH_TOKEN`: control connection secret
    /// - `FEEDWATCH_WEBHOOK_URL`: notification webhook
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("FEEDWATCH_TOKEN") {
            if !token.is_empty() {
                self.control.token = token;
            }
        }
        if let Ok(url) = std::env::var("FEEDWATCH_WEBHOOK_URL") {
            if !url.is_empty() {
                self.notify.webhook_url = url;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.control.max_connections == 0 {
            return Err(FeedwatchError::Validation(
                "control.max_connections must be greater than zero".to_string(),
            ));
        }
        if self.monitor.tick_interval_secs == 0 {
            return Err(FeedwatchError::Validation(
                "monitor.tick_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.monitor.id_prefix_len == 0 {
            return Err(FeedwatchError::Validation(
                "monitor.id_prefix_len must be greater than zero".to_string(),
            ));
        }
        if self.monitor.entry_selector.trim().is_empty() {
            return Err(FeedwatchError::Validation(
                "monitor.entry_selector must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.control.host, "127.0.0.1");
        assert_eq!(config.control.port, 7878);
        assert_eq!(config.control.max_connections, 8);
        assert!(config.control.token.is_empty());

        assert!(config.browser.executable.is_empty());
        assert!(config.browser.debugging_url.is_empty());
        assert!(config.browser.headless);
        assert!(!config.browser.no_sandbox);
        assert_eq!(config.browser.launch_timeout(), Duration::from_secs(20));
        assert_eq!(config.browser.request_timeout(), Duration::from_secs(30));

        assert_eq!(config.monitor.tick_interval(), Duration::from_secs(15));
        assert_eq!(config.monitor.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.monitor.ready_timeout(), Duration::from_secs(10));
        assert_eq!(config.monitor.priming_settle(), Duration::from_secs(2));
        assert_eq!(config.monitor.refresh_settle(), Duration::from_secs(3));
        assert_eq!(config.monitor.entry_selector, ".listing-age.sub-title");
        assert_eq!(config.monitor.link_marker_selector, ".date-ago");
        assert_eq!(config.monitor.id_prefix_len, 41);
        assert_eq!(config.monitor.diagnostic_path, "screenie.png");

        assert!(config.notify.webhook_url.is_empty());

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/feedwatch.log");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[control]
host = "0.0.0.0"
port = 9000
max_connections = 2
token = "s3cret"

[browser]
executable = "/usr/bin/chromium"
debugging_url = "http://127.0.0.1:9222"
headless = false
no_sandbox = true
launch_timeout_secs = 60
request_timeout_secs = 15

[monitor]
tick_interval_secs = 30
fetch_timeout_secs = 5
ready_timeout_secs = 7
priming_settle_ms = 500
refresh_settle_ms = 750
entry_selector = ".feed-item"
link_marker_selector = ".age"
id_prefix_len = 36
diagnostic_path = "diag/last.png"

[notify]
webhook_url = "https://discord.com/api/webhooks/1/abc"

[logging]
level = "debug"
file = "custom/feedwatch.log"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.control.host, "0.0.0.0");
        assert_eq!(config.control.port, 9000);
        assert_eq!(config.control.max_connections, 2);
        assert_eq!(config.control.token, "s3cret");

        assert_eq!(config.browser.executable, "/usr/bin/chromium");
        assert_eq!(config.browser.debugging_url, "http://127.0.0.1:9222");
        assert!(!config.browser.headless);
        assert!(config.browser.no_sandbox);
        assert_eq!(config.browser.launch_timeout_secs, 60);
        assert_eq!(config.browser.request_timeout_secs, 15);

        assert_eq!(config.monitor.tick_interval_secs, 30);
        assert_eq!(config.monitor.priming_settle(), Duration::from_millis(500));
        assert_eq!(config.monitor.entry_selector, ".feed-item");
        assert_eq!(config.monitor.id_prefix_len, 36);
        assert_eq!(config.monitor.diagnostic_path, "diag/last.png");

        assert_eq!(
            config.notify.webhook_url,
            "https://discord.com/api/webhooks/1/abc"
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[monitor]
tick_interval_secs = 60
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.monitor.tick_interval_secs, 60);
        assert_eq!(config.monitor.fetch_timeout_secs, 10);
        assert_eq!(config.control.port, 7878);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.control.port, 7878);
        assert_eq!(config.monitor.id_prefix_len, 41);
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        assert!(result.is_err());
        if let Err(FeedwatchError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(FeedwatchError::Io(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[control]\nport = 7000\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.control.port, 7000);
    }

    #[test]
    fn test_apply_env_overrides() {
        let original_token = std::env::var("FEEDWATCH_TOKEN").ok();
        let original_url = std::env::var("FEEDWATCH_WEBHOOK_URL").ok();

        std::env::set_var("FEEDWATCH_TOKEN", "env-token");
        std::env::set_var("FEEDWATCH_WEBHOOK_URL", "");

        let mut config = Config::default();
        config.notify.webhook_url = "https://example.com/hook".to_string();
        config.apply_env_overrides();

        assert_eq!(config.control.token, "env-token");
        // Empty values never override
        assert_eq!(config.notify.webhook_url, "https://example.com/hook");

        match original_token {
            Some(val) => std::env::set_var("FEEDWATCH_TOKEN", val),
            None => std::env::remove_var("FEEDWATCH_TOKEN"),
        }
        match original_url {
            Some(val) => std::env::set_var("FEEDWATCH_WEBHOOK_URL", val),
            None => std::env::remove_var("FEEDWATCH_WEBHOOK_URL"),
        }
    }

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.monitor.tick_interval_secs = 0;

        let result = config.validate();
        if let Err(FeedwatchError::Validation(msg)) = result {
            assert!(msg.contains("tick_interval_secs"));
        } else {
            panic!("Expected Validation error");
        }
    }

    #[test]
    fn test_validate_zero_connections() {
        let mut config = Config::default();
        config.control.max_connections = 0;
        assert!(matches!(
            config.validate(),
            Err(FeedwatchError::Validation(ref msg)) if msg.contains("max_connections")
        ));
    }

    #[test]
    fn test_validate_zero_prefix_and_empty_selector() {
        let mut config = Config::default();
        config.monitor.id_prefix_len = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.entry_selector = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
