//! Archive event observers.
//!
//! Other modules (push notifications, offline storage, search indexing) react
//! to archive activity by registering a [`MamHook`]. Hooks run synchronously
//! within the triggering operation, sorted by ascending priority, and any hook
//! error fails that operation.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::types::{ArchivedMessage, Filters};
use crate::MamError;

/// Priority for hooks that must observe events before everyone else.
pub const HIGHEST_PRIORITY: i32 = i32::MIN;

/// Priority used when a hook has no ordering requirement.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Priority for hooks that must run last.
pub const LOWEST_PRIORITY: i32 = i32::MAX;

/// Event emitted by the archive.
#[derive(Debug, Clone)]
pub enum MamEvent {
    /// A message copy was persisted
    MessageArchived {
        /// Archive the copy was stored in
        archive_id: String,
        /// The persisted record
        message: ArchivedMessage,
    },
    /// An archive was queried
    ArchiveQueried {
        /// Queried archive
        archive_id: String,
        /// Filters of the query
        filters: Filters,
    },
}

impl MamEvent {
    /// Archive the event refers to.
    pub fn archive_id(&self) -> &str {
        match self {
            Self::MessageArchived { archive_id, .. } | Self::ArchiveQueried { archive_id, .. } => {
                archive_id
            }
        }
    }

    /// Short label for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageArchived { .. } => "message_archived",
            Self::ArchiveQueried { .. } => "archive_queried",
        }
    }
}

/// Observer of archive events.
#[async_trait]
pub trait MamHook: Send + Sync + 'static {
    /// Unique name, used for removal.
    fn name(&self) -> &str;

    /// Lower values run first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Handle an event. An error aborts the operation that emitted it.
    async fn handle(&self, event: &MamEvent) -> Result<(), MamError>;
}

/// Ordered list of registered hooks.
#[derive(Default)]
pub struct MamHooks {
    hooks: RwLock<Vec<Arc<dyn MamHook>>>,
}

impl MamHooks {
    /// Create an empty hook list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook, keeping the list sorted by priority.
    ///
    /// Hooks with equal priority run in registration order.
    pub fn register(&self, hook: Arc<dyn MamHook>) {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        debug!(hook = hook.name(), priority = hook.priority(), "Registering MAM hook");
        hooks.push(hook);
        hooks.sort_by_key(|h| h.priority());
    }

    /// Remove a hook by name. Returns whether a hook was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut hooks = self.hooks.write().unwrap_or_else(|e| e.into_inner());
        let before = hooks.len();
        hooks.retain(|h| h.name() != name);
        before != hooks.len()
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run all hooks in order, stopping at the first failure.
    pub async fn run(&self, event: &MamEvent) -> Result<(), MamError> {
        let snapshot: Vec<Arc<dyn MamHook>> = self
            .hooks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for hook in snapshot {
            if let Err(e) = hook.handle(event).await {
                warn!(
                    hook = hook.name(),
                    event = event.name(),
                    archive_id = event.archive_id(),
                    error = %e,
                    "MAM hook failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}
