//! Process-wide logging setup.
//!
//! `LOG_LEVEL` takes `trace`, `debug`, `info`, `warn`, `error` or `fatal`;
//! `LOG_FORMAT` takes `short`, `long`, `simple`, `json` or `bunyan`. When
//! `RUST_LOG` is set it overrides the level with a full filter directive.

use std::fmt;
use std::str::FromStr;

use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::ConfigError;
use crate::robot::panic_message;

/// Minimum severity that gets logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Same as `Error`; tracing has no separate fatal level.
    Fatal,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Fatal => f.write_str("fatal"),
            other => f.write_str(other.directive()),
        }
    }
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact single-line output.
    #[default]
    Short,
    /// Full output with targets, source locations and thread ids.
    Long,
    /// Level and message only.
    Simple,
    /// One JSON object per line.
    Json,
    /// JSON with span fields flattened into each line.
    Bunyan,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(LogFormat::Short),
            "long" => Ok(LogFormat::Long),
            "simple" => Ok(LogFormat::Simple),
            "json" => Ok(LogFormat::Json),
            "bunyan" => Ok(LogFormat::Bunyan),
            other => Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
    }
}

fn format_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    let base = tracing_subscriber::fmt::layer();
    match format {
        LogFormat::Short => base.compact().with_target(false).boxed(),
        LogFormat::Long => base
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .boxed(),
        LogFormat::Simple => base.without_time().with_target(false).boxed(),
        LogFormat::Json => base.json().boxed(),
        LogFormat::Bunyan => base
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    }
}

/// Builds the filter: `RUST_LOG` if set and valid, else `level`.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(level: LogLevel, format: LogFormat) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(format_layer(format))
        .with(env_filter(level))
        .try_init()
}

/// Routes panics from any thread through tracing at `error` level.
///
/// Handler panics are also caught and reported by the dispatcher; this hook
/// makes sure panics elsewhere (server, runtime) end up in the same sink.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            location = %location,
            "Panic: {}",
            panic_message(info.payload())
        );
    }));
}
