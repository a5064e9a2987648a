//! complaint-sync: live complaint watcher
//!
//! Runs a [`LiveSync`] against the configured backend and logs every applied
//! snapshot revision until Ctrl-C.
//!
//! ## Architecture
//! ```text
//! [REST API] ----fetch/poll----> [complaint-sync] --> log
//! [Push server] --events------->        |
//! ```
//!
//! ## Configuration
//! - First argument: optional path to a YAML config file
//! - COMPLAINT_SYNC_CONFIG: config file path
//! - COMPLAINT_SYNC__API__BASE_URL, COMPLAINT_SYNC__CHANNEL__URL, ...: overrides
//! - COMPLAINT_SYNC_LOG: tracing filter (default: info, socket/HTTP crates at warn)
//! - COMPLAINT_SYNC_LOG_FORMAT: `text` (default) or `json`

use std::sync::Arc;

use tracing::{error, info};

use complaint_sync::config::Config;
use complaint_sync::utils::bootstrap::init_tracing;
use complaint_sync::{ComplaintQuery, LiveSync, LiveSyncConfig};
use complaint_sync_client::{ComplaintStatus, HttpRemoteStore, WsEventChannel};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        api = %config.api.base_url,
        channel = %config.channel.url,
        "Starting complaint-sync"
    );

    let remote = Arc::new(HttpRemoteStore::new(config.api.to_store_config())?);
    let channel = Arc::new(WsEventChannel::new(config.channel.to_channel_config()));
    let sync = LiveSync::new(remote, channel, LiveSyncConfig::from(&config.sync));

    sync.start(config.auth_token()).await?;

    let mut updates = sync.subscribe();
    let pending = ComplaintQuery::new().with_status(ComplaintStatus::Pending);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                info!(
                    revision = snapshot.revision,
                    records = snapshot.records.len(),
                    pending = pending.apply(&snapshot).len(),
                    total = snapshot.aggregate.total,
                    aggregate_source = ?snapshot.aggregate_source,
                    sync_error = ?snapshot.sync_error,
                    "Snapshot updated"
                );
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown requested");
                break;
            }
        }
    }

    sync.teardown().await;
    Ok(())
}
