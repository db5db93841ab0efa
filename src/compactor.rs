use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::observability::WAL_COMPACTIONS_TOTAL;
use crate::store::{MemoryStore, StoreError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once enough appends pile up.
pub async fn run_compactor(store: Arc<MemoryStore>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&store, threshold).await {
            error!("WAL compaction failed: {e}");
        }
    }
}

/// Compact when appends since the last compaction reach `threshold`.
/// Returns whether a compaction ran.
pub async fn compact_if_due(store: &MemoryStore, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    store.compact_wal().await?;
    metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
    info!("compacted WAL after {appends} appends");
    Ok(true)
}
