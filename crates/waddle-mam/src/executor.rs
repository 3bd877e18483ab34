//! Query execution: fetch, validate, page.

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::cancel::run_cancellable;
use crate::hooks::{MamEvent, MamHooks};
use crate::paging::{select_page, Page, PageRequest};
use crate::store::ArchiveStore;
use crate::types::{ArchiveMetadata, ArchivedMessage, Filters};
use crate::MamError;

/// Runs archive queries against the store.
pub struct QueryExecutor {
    store: Arc<dyn ArchiveStore>,
    hooks: Arc<MamHooks>,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn ArchiveStore>, hooks: Arc<MamHooks>) -> Self {
        Self { store, hooks }
    }

    /// Fetch the records matching `filters` and select the requested page.
    ///
    /// Fails with item-not-found when some requested ids are missing, or
    /// when an id anchor is set and nothing matched. A missing anchor and an
    /// anchor with no matching neighbours are reported the same way.
    #[instrument(skip(self, filters, page, cancel), fields(archive = %archive_id))]
    pub async fn execute(
        &self,
        archive_id: &str,
        filters: &Filters,
        page: &PageRequest,
        flip_page: bool,
        cancel: &CancellationToken,
    ) -> Result<Page<ArchivedMessage>, MamError> {
        let messages = run_cancellable(cancel, self.store.fetch_messages(archive_id, filters)).await?;

        self.hooks
            .run(&MamEvent::ArchiveQueried {
                archive_id: archive_id.to_string(),
                filters: filters.clone(),
            })
            .await?;

        if !filters.ids.is_empty() {
            let requested: HashSet<&str> = filters.ids.iter().map(String::as_str).collect();
            if messages.len() != requested.len() {
                return Err(MamError::item_not_found(format!(
                    "{} of {} requested messages not found",
                    requested.len() - messages.len().min(requested.len()),
                    requested.len()
                )));
            }
        }

        if filters.has_anchor() && messages.is_empty() {
            return Err(MamError::item_not_found("No messages around the requested anchor"));
        }

        let page = select_page(messages, page, |m| m.id.as_str())?;
        debug!(
            count = page.result.count,
            complete = page.result.complete,
            flip_page,
            "Selected archive page"
        );

        Ok(if flip_page { page.flip() } else { page })
    }

    /// Oldest and newest records of an archive.
    #[instrument(skip(self, cancel))]
    pub async fn metadata(
        &self,
        archive_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ArchiveMetadata>, MamError> {
        run_cancellable(cancel, self.store.fetch_metadata(archive_id)).await
    }
}
