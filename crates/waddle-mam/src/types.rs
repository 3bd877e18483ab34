//! Archive data model shared by the capture and query paths.

use chrono::{DateTime, NaiveDateTime, Utc};
use jid::Jid;
use serde::{Deserialize, Serialize};

/// Fixed UTC timestamp format used by MAM form fields and metadata replies.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A message copy persisted in an account archive.
///
/// Records are immutable once inserted. Insertion order is tracked by the
/// store itself; `id` is an opaque lookup token and carries no ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedMessage {
    /// Local part of the archive owner's address
    pub archive_id: String,
    /// Archive identifier assigned at capture time
    pub id: String,
    /// Sender address as seen on the wire
    pub from: String,
    /// Recipient address as seen on the wire
    pub to: String,
    /// Serialized message stanza
    pub payload: String,
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
}

impl ArchivedMessage {
    /// Bare form of the sender address.
    pub fn from_bare(&self) -> &str {
        bare_address(&self.from)
    }

    /// Bare form of the recipient address.
    pub fn to_bare(&self) -> &str {
        bare_address(&self.to)
    }
}

/// Conjunctive archive filters built from a submitted query form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    /// Inclusive lower timestamp bound
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper timestamp bound
    pub end: Option<DateTime<Utc>>,
    /// Correspondent address (bare matches any resource)
    pub with: Option<Jid>,
    /// Only messages archived before this id
    pub before_id: Option<String>,
    /// Only messages archived after this id
    pub after_id: Option<String>,
    /// Explicit set of message ids
    pub ids: Vec<String>,
}

impl Filters {
    /// Whether a before-id or after-id anchor was requested.
    pub fn has_anchor(&self) -> bool {
        self.before_id.is_some() || self.after_id.is_some()
    }
}

/// Oldest and newest record markers of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveMetadata {
    pub start_id: String,
    pub start_timestamp: DateTime<Utc>,
    pub end_id: String,
    pub end_timestamp: DateTime<Utc>,
}

/// Archive ids assigned while capturing one routed message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchivedIds {
    /// Id of the copy stored in the sender's archive
    pub sent: Option<String>,
    /// Id of the copy stored in the recipient's archive
    pub received: Option<String>,
}

/// Strip the resource part of an address.
pub fn bare_address(address: &str) -> &str {
    address.split('/').next().unwrap_or(address)
}

/// Format a timestamp with [`DATE_TIME_FORMAT`].
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(DATE_TIME_FORMAT).to_string()
}

/// Parse a timestamp written with [`DATE_TIME_FORMAT`].
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT).map(|naive| naive.and_utc())
}
