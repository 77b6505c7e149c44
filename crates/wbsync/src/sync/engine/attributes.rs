use tokio_util::sync::CancellationToken;

use crate::catalog::{AttributeKind, Attributes, CatalogClient};
use crate::error::{Result, SyncError};

use super::super::progress::{ProgressCallback, SyncProgress, emit};

/// Fetch every map in `kinds` into one snapshot.
///
/// Maps are requested for all ids. The first failure aborts the load.
pub(super) async fn load_attributes(
    catalog: &CatalogClient,
    kinds: &[AttributeKind],
    cancel: &CancellationToken,
    on_progress: Option<&ProgressCallback>,
) -> Result<Attributes> {
    let mut attributes = Attributes::default();

    for &kind in kinds {
        let map = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            map = catalog.fetch(kind, &[]) => map?,
        };

        let count = map.len();
        tracing::debug!(attribute = kind.name(), count, "Loaded attribute map");
        emit(
            on_progress,
            SyncProgress::AttributesLoaded {
                attribute: kind.name(),
                count,
            },
        );
        attributes.insert(map);
    }

    Ok(attributes)
}
