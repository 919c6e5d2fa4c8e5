//! Tracing setup and runtime log control.
//!
//! `init_tracing` installs a registry with a reloadable `EnvFilter` and an
//! optional JSON or pretty console layer. The returned [`TracingLogControl`]
//! backs the writable `LogLevel` and `LogTarget` manager properties.

use crate::ports::outbound::LogControl;
use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{
    fmt as tracing_fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Telemetry failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Init(String),

    #[error("failed to reload log filter: {0}")]
    Reload(String),

    #[error("invalid log level '{0}'")]
    InvalidLevel(String),

    #[error("invalid log target '{0}'")]
    InvalidTarget(String),
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the init log line
    pub service_name: String,

    /// Initial filter directive (e.g. `info` or `manager_gateway=debug`)
    pub log_level: String,

    /// Whether to write logs to the console at all
    pub console_output: bool,

    /// Whether console logs are JSON formatted
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "manager-gateway".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OTEL_SERVICE_NAME`: Service name (default: manager-gateway)
    /// - `GATEWAY_LOG_LEVEL` or `RUST_LOG`: Filter directive (default: info)
    /// - `GATEWAY_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `GATEWAY_JSON_LOGS`: Enable JSON logs (default: false)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            service_name: lookup("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: lookup("GATEWAY_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_level),
            console_output: lookup("GATEWAY_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.console_output),
            json_logs: lookup("GATEWAY_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.json_logs),
        }
    }
}

/// Syslog-style severity, as exposed by the `LogLevel` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Emerg,
    Alert,
    Crit,
    Err,
    Warning,
    Notice,
    Info,
    Debug,
}

impl LogLevel {
    const NAMES: [(LogLevel, &'static str); 8] = [
        (LogLevel::Emerg, "emerg"),
        (LogLevel::Alert, "alert"),
        (LogLevel::Crit, "crit"),
        (LogLevel::Err, "err"),
        (LogLevel::Warning, "warning"),
        (LogLevel::Notice, "notice"),
        (LogLevel::Info, "info"),
        (LogLevel::Debug, "debug"),
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        Self::NAMES[*self as usize].1
    }

    /// `EnvFilter` directive for this severity.
    #[must_use]
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Emerg | LogLevel::Alert | LogLevel::Crit | LogLevel::Err => "error",
            LogLevel::Warning => "warn",
            LogLevel::Notice | LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    /// Closest severity for a tracing directive; unknown input maps to info.
    #[must_use]
    pub fn from_directive(directive: &str) -> Self {
        match directive.trim().to_lowercase().as_str() {
            "error" => LogLevel::Err,
            "warn" => LogLevel::Warning,
            "debug" | "trace" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts names (`warning`) and numeric levels (`4`).
impl FromStr for LogLevel {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, TelemetryError> {
        if let Ok(n) = s.parse::<usize>() {
            return Self::NAMES
                .get(n)
                .map(|(level, _)| *level)
                .ok_or_else(|| TelemetryError::InvalidLevel(s.to_string()));
        }
        Self::NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(level, _)| *level)
            .ok_or_else(|| TelemetryError::InvalidLevel(s.to_string()))
    }
}

/// Where manager logs go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTarget {
    Console,
    Kmsg,
    Journal,
    JournalOrKmsg,
    Syslog,
    SyslogOrKmsg,
    Auto,
    Safe,
    Null,
}

impl LogTarget {
    const NAMES: [(LogTarget, &'static str); 9] = [
        (LogTarget::Console, "console"),
        (LogTarget::Kmsg, "kmsg"),
        (LogTarget::Journal, "journal"),
        (LogTarget::JournalOrKmsg, "journal-or-kmsg"),
        (LogTarget::Syslog, "syslog"),
        (LogTarget::SyslogOrKmsg, "syslog-or-kmsg"),
        (LogTarget::Auto, "auto"),
        (LogTarget::Safe, "safe"),
        (LogTarget::Null, "null"),
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        Self::NAMES[*self as usize].1
    }
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogTarget {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, TelemetryError> {
        Self::NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(target, _)| *target)
            .ok_or_else(|| TelemetryError::InvalidTarget(s.to_string()))
    }
}

/// `LogControl` over the installed tracing subscriber.
pub struct TracingLogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    state: Mutex<(LogLevel, LogTarget)>,
}

impl LogControl for TracingLogControl {
    fn level(&self) -> LogLevel {
        self.state.lock().0
    }

    fn set_level(&self, level: LogLevel) -> Result<(), TelemetryError> {
        let filter = EnvFilter::try_new(level.directive())
            .map_err(|e| TelemetryError::Reload(e.to_string()))?;
        self.handle
            .reload(filter)
            .map_err(|e| TelemetryError::Reload(e.to_string()))?;
        self.state.lock().0 = level;
        tracing::info!(level = %level, "Log level changed");
        Ok(())
    }

    fn target(&self) -> LogTarget {
        self.state.lock().1
    }

    fn set_target(&self, target: LogTarget) -> Result<(), TelemetryError> {
        self.state.lock().1 = target;
        tracing::info!(target_name = %target, "Log target changed");
        Ok(())
    }
}

impl fmt::Debug for TracingLogControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingLogControl")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<TracingLogControl, TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Init(e.to_string()))?;
    let (filter_layer, handle) = reload::Layer::new(filter);
    let registry = tracing_subscriber::registry().with(filter_layer);

    let installed = match (config.console_output, config.json_logs) {
        (false, _) => registry.try_init(),
        (true, true) => registry
            .with(
                tracing_fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        (true, false) => registry
            .with(
                tracing_fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .try_init(),
    };
    installed.map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        json = config.json_logs,
        "Tracing initialized"
    );

    Ok(TracingLogControl {
        handle,
        state: Mutex::new((LogLevel::from_directive(&config.log_level), LogTarget::Auto)),
    })
}

/// `LogControl` that only records values.
#[derive(Debug)]
pub struct InMemoryLogControl {
    state: Mutex<(LogLevel, LogTarget)>,
}

impl InMemoryLogControl {
    #[must_use]
    pub fn new(level: LogLevel, target: LogTarget) -> Self {
        Self {
            state: Mutex::new((level, target)),
        }
    }
}

impl Default for InMemoryLogControl {
    fn default() -> Self {
        Self::new(LogLevel::Info, LogTarget::Auto)
    }
}

impl LogControl for InMemoryLogControl {
    fn level(&self) -> LogLevel {
        self.state.lock().0
    }

    fn set_level(&self, level: LogLevel) -> Result<(), TelemetryError> {
        self.state.lock().0 = level;
        Ok(())
    }

    fn target(&self) -> LogTarget {
        self.state.lock().1
    }

    fn set_target(&self, target: LogTarget) -> Result<(), TelemetryError> {
        self.state.lock().1 = target;
        Ok(())
    }
}
