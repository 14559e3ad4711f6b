use tracing::{debug, info};

use super::{StoreError, WalStore};

/// Compact once `threshold` appends have piled up since the last rewrite.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(store: &WalStore, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        debug!("compactor skip: {appends} appends < {threshold}");
        return Ok(false);
    }
    store.compact().await?;
    info!("compacted after {appends} appends");
    Ok(true)
}
