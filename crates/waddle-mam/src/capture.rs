//! Archive capture pipeline.
//!
//! Runs once a routing decision has been made for a message. Chat and normal
//! messages with a body are persisted into the sender's archive (when the
//! sender is local) and into the recipient's archive (when the recipient is
//! local). Each copy is inserted and the archive trimmed to its capacity in a
//! single store transaction.

use chrono::Utc;
use minidom::Element;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use xmpp_parsers::message::{Message, MessageType};

use crate::cancel::run_cancellable;
use crate::flow::MessageFlow;
use crate::hooks::{MamEvent, MamHooks};
use crate::hosts::LocalHosts;
use crate::metrics;
use crate::stanza_id::{add_stanza_id, stanza_id};
use crate::store::{ArchiveStore, StoreError};
use crate::types::{ArchivedIds, ArchivedMessage};
use crate::MamError;

/// Whether a message belongs in an archive.
///
/// Only chat and normal messages carrying a body qualify; chat states,
/// receipts and other bodiless messages are never archived.
pub fn is_archivable(message: &Message) -> bool {
    matches!(message.type_, MessageType::Chat | MessageType::Normal) && !message.bodies.is_empty()
}

/// Persists routed messages into account archives.
pub struct ArchiveCapture {
    queue_size: usize,
    hosts: LocalHosts,
    store: Arc<dyn ArchiveStore>,
    hooks: Arc<MamHooks>,
}

impl ArchiveCapture {
    pub fn new(
        queue_size: usize,
        hosts: LocalHosts,
        store: Arc<dyn ArchiveStore>,
        hooks: Arc<MamHooks>,
    ) -> Self {
        Self {
            queue_size,
            hosts,
            store,
            hooks,
        }
    }

    /// Archive a routed message.
    ///
    /// Returns the archive ids of the stored copies. A storage failure aborts
    /// the remaining copies and is returned to the caller; delivery of the
    /// message itself is not affected.
    #[instrument(skip_all, fields(kind = flow.kind(), id = ?flow.message().id))]
    pub async fn on_message_routed(
        &self,
        flow: &MessageFlow,
        cancel: &CancellationToken,
    ) -> Result<ArchivedIds, MamError> {
        let message = flow.message();
        let mut ids = ArchivedIds::default();

        if !is_archivable(message) {
            return Ok(ids);
        }
        let (Some(from), Some(to)) = (message.from.as_ref(), message.to.as_ref()) else {
            debug!("Skipping archive of unaddressed message");
            return Ok(ids);
        };

        if self.hosts.is_local(from) {
            if let Some(node) = from.node() {
                let id = Uuid::new_v4().to_string();
                let mut sent = message.clone();
                add_stanza_id(&mut sent, &id, &from.to_bare().to_string());

                self.archive(&sent, node.as_str(), &id, "sent", cancel).await?;
                ids.sent = Some(id);
            }
        }

        if self.hosts.is_local(to) {
            if let Some(node) = to.node() {
                let by = to.to_bare().to_string();
                let mut received = message.clone();
                let id = match stanza_id(&received, &by) {
                    Some(id) => id,
                    None => {
                        let id = Uuid::new_v4().to_string();
                        add_stanza_id(&mut received, &id, &by);
                        id
                    }
                };

                self.archive(&received, node.as_str(), &id, "received", cancel).await?;
                ids.received = Some(id);
            }
        }

        Ok(ids)
    }

    async fn archive(
        &self,
        message: &Message,
        archive_id: &str,
        id: &str,
        direction: &str,
        cancel: &CancellationToken,
    ) -> Result<(), MamError> {
        let record = ArchivedMessage {
            archive_id: archive_id.to_string(),
            id: id.to_string(),
            from: message.from.as_ref().map(|j| j.to_string()).unwrap_or_default(),
            to: message.to.as_ref().map(|j| j.to_string()).unwrap_or_default(),
            payload: String::from(&Element::from(message.clone())),
            timestamp: Utc::now(),
        };

        let evicted = self.persist(&record, cancel).await?;

        metrics::record_archived(direction, evicted);
        debug!(archive_id, id, direction, evicted, "Archived message");

        self.hooks
            .run(&MamEvent::MessageArchived {
                archive_id: archive_id.to_string(),
                message: record,
            })
            .await
    }

    /// Insert a record and trim its archive in one transaction.
    ///
    /// Returns the number of evicted records.
    async fn persist(
        &self,
        record: &ArchivedMessage,
        cancel: &CancellationToken,
    ) -> Result<u64, MamError> {
        if cancel.is_cancelled() {
            return Err(MamError::Cancelled);
        }

        let mut tx = self.store.begin().await?;

        let written = run_cancellable(cancel, async {
            tx.insert_message(record).await?;
            let evicted = tx
                .delete_oldest_messages(&record.archive_id, self.queue_size)
                .await?;
            Ok::<u64, StoreError>(evicted)
        })
        .await;

        match written {
            Ok(evicted) => {
                tx.commit().await?;
                Ok(evicted)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Failed to roll back archive transaction");
                }
                warn!(archive_id = %record.archive_id, error = %e, "Archive transaction rolled back");
                Err(e)
            }
        }
    }
}
