//! Structured logging setup.
//!
//! Filters come from `RUST_LOG` when set, otherwise from the configured
//! directives. The output format is picked with `LOG_FORMAT`
//! (`pretty`, `compact` or `json`); `LOG_JSON=1` is accepted as a shorthand.

use std::str::FromStr;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Default directives: engine crates at `info`, WebSocket internals quieter.
pub const DEFAULT_FILTER: &str = "info,tungstenite=warn,tokio_tungstenite=warn";

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line, with file, line and thread ids
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter directives (e.g. "info", "capture=debug,transport=trace")
    pub filter: String,
    pub format: LogFormat,
    /// Log span open/close, useful when following a reconnect loop
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::default(),
            span_events: false,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_span_events(mut self, span_events: bool) -> Self {
        self.span_events = span_events;
        self
    }

    /// Reads `RUST_LOG`, `LOG_FORMAT`, `LOG_JSON` and `LOG_SPANS`.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Ok(filter) = std::env::var("RUST_LOG") {
            config.filter = filter;
        }
        config.format = match std::env::var("LOG_FORMAT") {
            Ok(format) => format.parse().unwrap_or_default(),
            Err(_) if env_flag("LOG_JSON") => LogFormat::Json,
            Err(_) => LogFormat::default(),
        };
        config.span_events = env_flag("LOG_SPANS");
        config
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Installs the global subscriber. Later calls keep the first one.
pub fn init_tracing(config: TracingConfig) {
    let env_filter = EnvFilter::try_new(&config.filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(span_events)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .is_ok(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_span_events(span_events))
            .try_init()
            .is_ok(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_span_events(span_events).with_target(true))
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::debug!(filter = %config.filter, format = ?config.format, "Tracing initialized");
    }
}

pub fn init_tracing_from_env() {
    init_tracing(TracingConfig::from_env());
}
