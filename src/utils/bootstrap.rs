//! Bootstrap utilities for the complaint-sync binary.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};

/// Filter used when COMPLAINT_SYNC_LOG is unset.
///
/// The socket and HTTP stacks log every frame and request at debug level;
/// the watcher only wants their warnings.
pub const DEFAULT_LOG_FILTER: &str = "info,tungstenite=warn,tokio_tungstenite=warn,reqwest=warn,hyper=warn";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    /// Parse a COMPLAINT_SYNC_LOG_FORMAT value. Unknown values fall back to text.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }

    fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV_VAR).ok().as_deref())
    }
}

/// Initialize tracing for the watcher.
///
/// Filter comes from COMPLAINT_SYNC_LOG (default [`DEFAULT_LOG_FILTER`]);
/// COMPLAINT_SYNC_LOG_FORMAT=json switches to JSON lines with span context.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_target(true))
            .init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}
