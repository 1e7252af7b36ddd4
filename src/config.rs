//! Environment-driven configuration.
//!
//! | Variable           | Meaning                                          | Default       |
//! |--------------------|--------------------------------------------------|---------------|
//! | `APP_ID`           | GitHub App id                                    | required      |
//! | `PRIVATE_KEY`      | PEM private key; literal `\n` become newlines    |               |
//! | `PRIVATE_KEY_PATH` | file holding the PEM key, if `PRIVATE_KEY` unset |               |
//! | `WEBHOOK_SECRET`   | webhook HMAC secret                              | `development` |
//! | `WEBHOOK_PATH`     | path webhooks are POSTed to                      | `/`           |
//! | `PORT`             | HTTP port                                        | `3000`        |
//! | `LOG_LEVEL`        | see [`crate::logging`]                           | `info`        |
//! | `LOG_FORMAT`       | see [`crate::logging`]                           | `short`       |
//! | `PLUGINS`          | comma-separated built-in plugin names            | none          |
//! | `GHE_HOST`         | GitHub Enterprise host, e.g. `ghe.example.com`   | github.com    |

use std::path::PathBuf;

use thiserror::Error;

use crate::auth::{AppCredential, AuthError};
use crate::logging::{LogFormat, LogLevel};
use crate::types::AppId;
use crate::webhooks::WebhookSecret;

pub const DEFAULT_WEBHOOK_SECRET: &str = "development";
pub const DEFAULT_WEBHOOK_PATH: &str = "/";
pub const DEFAULT_PORT: u16 = 3000;

/// Errors found while reading configuration. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read private key from {}: {source}", .path.display())]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid private key: {0}")]
    InvalidKey(#[source] AuthError),

    #[error("invalid log level '{0}' (expected trace, debug, info, warn, error or fatal)")]
    InvalidLogLevel(String),

    #[error("invalid log format '{0}' (expected short, long, simple, json or bunyan)")]
    InvalidLogFormat(String),
}

/// Everything the binary needs to start.
#[derive(Clone)]
pub struct AppConfig {
    pub app_id: AppId,
    private_key: Vec<u8>,
    pub webhook_secret: WebhookSecret,
    pub webhook_path: String,
    pub port: u16,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    pub plugins: Vec<String>,
    pub ghe_host: Option<String>,
}

impl AppConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which returns a variable's value
    /// or `None` when unset. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let app_id = get("APP_ID").ok_or(ConfigError::Missing("APP_ID"))?;
        let app_id = app_id
            .trim()
            .parse::<u64>()
            .map(AppId)
            .map_err(|e| ConfigError::Invalid {
                var: "APP_ID",
                value: app_id.clone(),
                reason: e.to_string(),
            })?;

        let private_key = match (get("PRIVATE_KEY"), get("PRIVATE_KEY_PATH")) {
            (Some(key), _) => key.replace("\\n", "\n").into_bytes(),
            (None, Some(path)) => {
                let path = PathBuf::from(path);
                std::fs::read(&path).map_err(|source| ConfigError::ReadKey { path, source })?
            }
            (None, None) => return Err(ConfigError::Missing("PRIVATE_KEY or PRIVATE_KEY_PATH")),
        };

        let port = match get("PORT") {
            Some(port) => port.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: "PORT",
                value: port.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let webhook_path = get("WEBHOOK_PATH").unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string());
        if !webhook_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                var: "WEBHOOK_PATH",
                value: webhook_path,
                reason: "must start with '/'".to_string(),
            });
        }

        let log_level = get("LOG_LEVEL")
            .map(|l| l.parse::<LogLevel>())
            .transpose()?
            .unwrap_or_default();
        let log_format = get("LOG_FORMAT")
            .map(|f| f.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();

        let plugins = get("PLUGINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            app_id,
            private_key,
            webhook_secret: WebhookSecret::from(
                get("WEBHOOK_SECRET").unwrap_or_else(|| DEFAULT_WEBHOOK_SECRET.to_string()),
            ),
            webhook_path,
            port,
            log_level,
            log_format,
            plugins,
            ghe_host: get("GHE_HOST"),
        })
    }

    /// Parses the private key into a signing credential.
    pub fn credential(&self) -> Result<AppCredential, ConfigError> {
        AppCredential::from_pem(self.app_id, &self.private_key).map_err(ConfigError::InvalidKey)
    }

    /// The REST API root: `https://{GHE_HOST}/api/v3` or `None` for github.com.
    pub fn api_base_uri(&self) -> Option<String> {
        self.ghe_host
            .as_ref()
            .map(|host| format!("https://{}/api/v3", host.trim_end_matches('/')))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("app_id", &self.app_id)
            .field("private_key", &"<redacted>")
            .field("webhook_secret", &self.webhook_secret)
            .field("webhook_path", &self.webhook_path)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("plugins", &self.plugins)
            .field("ghe_host", &self.ghe_host)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_PRIVATE_KEY;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config =
            AppConfig::from_lookup(lookup(&[("APP_ID", "12"), ("PRIVATE_KEY", TEST_PRIVATE_KEY)]))
                .unwrap();

        assert_eq!(config.app_id, AppId(12));
        assert_eq!(config.webhook_secret, WebhookSecret::from(DEFAULT_WEBHOOK_SECRET));
        assert_eq!(config.webhook_path, "/");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_format, LogFormat::Short);
        assert!(config.plugins.is_empty());
        assert_eq!(config.api_base_uri(), None);
        assert_eq!(config.credential().unwrap().app_id(), AppId(12));
    }

    #[test]
    fn escaped_newlines_in_key_are_restored() {
        let escaped = TEST_PRIVATE_KEY.replace('\n', "\\n");
        let config =
            AppConfig::from_lookup(lookup(&[("APP_ID", "1"), ("PRIVATE_KEY", escaped.as_str())])).unwrap();
        assert!(config.credential().is_ok());
    }

    #[test]
    fn key_can_be_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_PRIVATE_KEY.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config =
            AppConfig::from_lookup(lookup(&[("APP_ID", "1"), ("PRIVATE_KEY_PATH", path.as_str())])).unwrap();
        assert!(config.credential().is_ok());
    }

    #[test]
    fn missing_key_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.pem");
        let err = AppConfig::from_lookup(lookup(&[
            ("APP_ID", "1"),
            ("PRIVATE_KEY_PATH", path.to_str().unwrap()),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ReadKey { .. }));
    }

    #[test]
    fn invalid_key_fails_when_parsed() {
        let config =
            AppConfig::from_lookup(lookup(&[("APP_ID", "1"), ("PRIVATE_KEY", "not a key")])).unwrap();
        assert!(matches!(config.credential(), Err(ConfigError::InvalidKey(_))));
    }

    #[test]
    fn required_variables() {
        let err = AppConfig::from_lookup(lookup(&[("PRIVATE_KEY", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("APP_ID")));

        let err = AppConfig::from_lookup(lookup(&[("APP_ID", "1"), ("PRIVATE_KEY", "")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn rejects_bad_values() {
        let base = [("PRIVATE_KEY", "k")];
        let with = |extra: (&'static str, &'static str)| {
            let mut vars = base.to_vec();
            vars.push(("APP_ID", "1"));
            vars.push(extra);
            AppConfig::from_lookup(lookup(&vars))
        };

        assert!(matches!(
            AppConfig::from_lookup(lookup(&[("APP_ID", "abc"), ("PRIVATE_KEY", "k")])),
            Err(ConfigError::Invalid { var: "APP_ID", .. })
        ));
        assert!(matches!(with(("PORT", "99999")), Err(ConfigError::Invalid { var: "PORT", .. })));
        assert!(matches!(
            with(("WEBHOOK_PATH", "hooks")),
            Err(ConfigError::Invalid { var: "WEBHOOK_PATH", .. })
        ));
        assert!(matches!(with(("LOG_LEVEL", "loud")), Err(ConfigError::InvalidLogLevel(_))));
        assert!(matches!(with(("LOG_FORMAT", "xml")), Err(ConfigError::InvalidLogFormat(_))));
    }

    #[test]
    fn reads_optional_settings() {
        let config = AppConfig::from_lookup(lookup(&[
            ("APP_ID", "1"),
            ("PRIVATE_KEY", "k"),
            ("WEBHOOK_SECRET", "s3cret"),
            ("WEBHOOK_PATH", "/hooks"),
            ("PORT", "8080"),
            ("LOG_LEVEL", "debug"),
            ("LOG_FORMAT", "json"),
            ("PLUGINS", "event-logger, stale ,"),
            ("GHE_HOST", "ghe.example.com"),
        ]))
        .unwrap();

        assert_eq!(config.webhook_secret, WebhookSecret::from("s3cret"));
        assert_eq!(config.webhook_path, "/hooks");
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.plugins, vec!["event-logger", "stale"]);
        assert_eq!(config.api_base_uri().as_deref(), Some("https://ghe.example.com/api/v3"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig::from_lookup(lookup(&[
            ("APP_ID", "1"),
            ("PRIVATE_KEY", TEST_PRIVATE_KEY),
            ("WEBHOOK_SECRET", "hunter2"),
        ]))
        .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
