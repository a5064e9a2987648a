//! Per-component configuration sections.

use std::time::Duration;

use complaint_sync_client::{HttpStoreConfig, WsChannelConfig};
use serde::Deserialize;

// ============================================================================
// REST backend
// ============================================================================

/// REST backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API base URL. Default: `http://localhost:3000/api`.
    pub base_url: String,
    /// Bearer token for REST calls and the push channel. None = anonymous.
    pub auth_token: Option<String>,
    /// Per-request timeout in seconds. Default: 30.
    pub timeout_secs: u64,
    /// Pair every bulk fetch with the backend's aggregate. Default: false.
    pub include_aggregate: bool,
    /// Retry idempotent reads on transient failures. Default: true.
    pub retry_reads: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            auth_token: None,
            timeout_secs: 30,
            include_aggregate: false,
            retry_reads: true,
        }
    }
}

impl ApiConfig {
    pub fn to_store_config(&self) -> HttpStoreConfig {
        let config = HttpStoreConfig::new(&self.base_url)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_include_aggregate(self.include_aggregate)
            .with_retry_reads(self.retry_reads);
        match &self.auth_token {
            Some(token) => config.with_auth_token(token),
            None => config,
        }
    }
}

// ============================================================================
// Push channel
// ============================================================================

/// Push-event channel configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// WebSocket URL. Default: `ws://localhost:3000`.
    pub url: String,
    /// First reconnect delay in milliseconds. Default: 1000.
    pub reconnect_min_delay_ms: u64,
    /// Reconnect delay ceiling in milliseconds. Default: 30000.
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before giving up. 0 = forever. Default: 0.
    pub max_reconnect_attempts: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000".to_string(),
            reconnect_min_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 0,
        }
    }
}

impl ChannelConfig {
    pub fn to_channel_config(&self) -> WsChannelConfig {
        WsChannelConfig::new(&self.url)
            .with_reconnect_delays(
                Duration::from_millis(self.reconnect_min_delay_ms),
                Duration::from_millis(self.reconnect_max_delay_ms),
            )
            .with_max_reconnect_attempts(self.max_reconnect_attempts)
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Live-sync behaviour.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fallback bulk-fetch interval in seconds. Default: 30.
    pub poll_interval_secs: u64,
    /// Deadline for a status change round trip in seconds. Default: 15.
    pub status_change_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            status_change_timeout_secs: 15,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn status_change_timeout(&self) -> Duration {
        Duration::from_secs(self.status_change_timeout_secs)
    }
}
