//! # waddle-mam
//!
//! Message Archive Management (XEP-0313) for Waddle Social.
//!
//! Every local account keeps a bounded, insertion-ordered archive of the chat
//! messages it sent and received. Clients browse their archive with filtered,
//! cursor-paged queries.
//!
//! ## Architecture
//!
//! - **Stanza-ID Assigner**: annotates inbound messages for local recipients
//!   with a `<stanza-id/>` (XEP-0359) at receipt time
//! - **Capture Pipeline**: persists sender and recipient copies after routing,
//!   trimming each archive to its capacity in the same transaction
//! - **Query Executor**: parses the query form and RSM set (XEP-0059), fetches
//!   and pages the archive, and delivers forwarded results plus a `<fin/>`
//! - **Erasure Handler**: deletes the archive of a removed account
//! - **Store**: libSQL-backed [`store::ArchiveStore`]
//!
//! The server embeds the module through [`Mam`] and supplies a
//! [`StanzaRouter`] for outbound delivery.

pub mod cancel;
pub mod capture;
pub mod config;
pub mod erasure;
pub mod executor;
pub mod flow;
pub mod form;
pub mod hooks;
pub mod hosts;
pub mod metrics;
pub mod paging;
pub mod query;
pub mod router;
pub mod rsm;
pub mod service;
pub mod stanza_id;
pub mod store;
pub mod telemetry;

mod error;
mod types;

pub use config::MamConfig;
pub use error::{build_error_iq, MamError, StanzaErrorCondition, StanzaErrorType};
pub use flow::MessageFlow;
pub use hooks::{MamEvent, MamHook, MamHooks};
pub use hosts::LocalHosts;
pub use paging::{Page, PageCursor, PageRequest, PageResult};
pub use router::StanzaRouter;
pub use service::{IqOutcome, Mam};
pub use store::{ArchiveStore, ArchiveTransaction, LibSqlArchiveStore, StoreError};
pub use types::*;
