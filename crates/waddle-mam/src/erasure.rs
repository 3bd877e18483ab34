//! Archive erasure on account deletion.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cancel::run_cancellable;
use crate::metrics;
use crate::store::ArchiveStore;
use crate::MamError;

/// Deletes the archive of a removed account.
pub struct ArchiveEraser {
    store: Arc<dyn ArchiveStore>,
    /// Log failures instead of blocking the account deletion
    best_effort: bool,
}

impl ArchiveEraser {
    pub fn new(store: Arc<dyn ArchiveStore>, best_effort: bool) -> Self {
        Self { store, best_effort }
    }

    /// Delete the whole archive of `username`.
    ///
    /// A failure is returned so that the account deletion does not complete,
    /// unless the eraser runs in best-effort mode.
    #[instrument(skip(self, cancel))]
    pub async fn on_user_deleted(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<(), MamError> {
        match run_cancellable(cancel, self.store.delete_archive(username)).await {
            Ok(deleted) => {
                metrics::record_erased(true);
                info!(archive_id = username, deleted, "Archive erased");
                Ok(())
            }
            Err(e) => {
                metrics::record_erased(false);
                if self.best_effort {
                    warn!(archive_id = username, error = %e, "Archive erasure failed, continuing");
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }
}
