//! Behaviour tests for the reconciliation core and the live-sync facade.
//!
//! Runs against in-memory doubles, so no backend is needed:
//!
//! ```bash
//! cargo test --test reconciliation --features test-utils
//! ```

mod steps;

use cucumber::World;
use steps::reconcile::CoreWorld;
use steps::live_sync::LiveSyncWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running Reconciliation Core Scenarios ===\n");
    CoreWorld::cucumber()
        .fail_on_skipped()
        .run("tests/reconciliation/features/reconciliation.feature")
        .await;

    println!("\n=== Running Live Sync Scenarios ===\n");
    LiveSyncWorld::cucumber()
        .fail_on_skipped()
        .run("tests/reconciliation/features/live_sync.feature")
        .await;
}
