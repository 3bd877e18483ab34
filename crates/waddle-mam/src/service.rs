//! The MAM module as seen by the server.
//!
//! [`Mam`] wires the capture and query components together and exposes the
//! entry points the session and routing layers call: message receipt, message
//! routing, account deletion and IQ processing.

use jid::{BareJid, Jid};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use xmpp_parsers::iq::{Iq, IqType};

use crate::capture::ArchiveCapture;
use crate::config::MamConfig;
use crate::erasure::ArchiveEraser;
use crate::error::{build_error_iq, StanzaErrorCondition};
use crate::executor::QueryExecutor;
use crate::flow::MessageFlow;
use crate::hooks::MamHooks;
use crate::hosts::LocalHosts;
use crate::metrics;
use crate::query::{
    build_fin_iq, build_form_fields_iq, build_metadata_iq, build_result_message, parse_request,
    ArchiveQuery, MamRequest, MAM_EXTENDED_NS, MAM_NS,
};
use crate::router::StanzaRouter;
use crate::stanza_id::StanzaIdAssigner;
use crate::store::ArchiveStore;
use crate::types::ArchivedIds;
use crate::MamError;

/// Module name.
pub const MODULE_NAME: &str = "mam";

/// Result of processing a MAM IQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IqOutcome {
    /// A metadata or form reply was sent
    Replied,
    /// Archive messages were delivered and the query finished.
    ///
    /// The session layer records that its client has requested the archive.
    ArchiveQueried {
        archive_id: String,
        count: usize,
        complete: bool,
    },
    /// The request was answered with an error stanza
    Rejected(StanzaErrorCondition),
    /// A result or error IQ; these are never answered
    Ignored,
}

/// Message Archive Management module (XEP-0313).
pub struct Mam {
    assigner: StanzaIdAssigner,
    capture: ArchiveCapture,
    executor: QueryExecutor,
    eraser: ArchiveEraser,
    hooks: Arc<MamHooks>,
    router: Arc<dyn StanzaRouter>,
}

impl Mam {
    /// Create the module over a store and a delivery router.
    pub fn new(
        config: &MamConfig,
        store: Arc<dyn ArchiveStore>,
        router: Arc<dyn StanzaRouter>,
    ) -> Self {
        let hosts = LocalHosts::new(config.local_domains.iter().cloned());
        let hooks = Arc::new(MamHooks::new());

        Self {
            assigner: StanzaIdAssigner::new(hosts.clone()),
            capture: ArchiveCapture::new(config.queue_size, hosts, store.clone(), hooks.clone()),
            executor: QueryExecutor::new(store.clone(), hooks.clone()),
            eraser: ArchiveEraser::new(store, config.erase_best_effort),
            hooks,
            router,
        }
    }

    pub fn name(&self) -> &'static str {
        MODULE_NAME
    }

    /// Features advertised on account disco#info.
    pub fn account_features(&self) -> Vec<&'static str> {
        vec![MAM_NS, MAM_EXTENDED_NS]
    }

    /// Whether the module handles IQs of `namespace`.
    ///
    /// Archives belong to accounts, so server-targeted IQs are never claimed.
    pub fn matches_namespace(&self, namespace: &str, server_target: bool) -> bool {
        !server_target && namespace == MAM_NS
    }

    /// Observers of archive events.
    pub fn hooks(&self) -> &Arc<MamHooks> {
        &self.hooks
    }

    /// Annotate an inbound message before any delivery decision.
    pub fn on_message_received(&self, flow: MessageFlow) -> MessageFlow {
        self.assigner.on_message_received(flow)
    }

    /// Archive a message after it has been routed.
    pub async fn on_message_routed(
        &self,
        flow: &MessageFlow,
        cancel: &CancellationToken,
    ) -> Result<ArchivedIds, MamError> {
        self.capture.on_message_routed(flow, cancel).await
    }

    /// Erase the archive of a deleted account.
    pub async fn on_user_deleted(
        &self,
        username: &str,
        cancel: &CancellationToken,
    ) -> Result<(), MamError> {
        self.eraser.on_user_deleted(username, cancel).await
    }

    /// Process a MAM IQ and send its replies through the router.
    ///
    /// Forbidden, malformed and not-found requests are answered with an error
    /// stanza and reported as [`IqOutcome::Rejected`]. Storage failures,
    /// cancellation and hook failures are answered with
    /// `internal-server-error` and returned as errors. Result and error IQs
    /// get no reply at all (RFC 6120 Section 8.2.3).
    #[instrument(skip_all, fields(id = %iq.id, from = ?iq.from))]
    pub async fn process_iq(
        &self,
        iq: &Iq,
        cancel: &CancellationToken,
    ) -> Result<IqOutcome, MamError> {
        if matches!(iq.payload, IqType::Result(_) | IqType::Error(_)) {
            debug!("Ignoring MAM result or error IQ");
            return Ok(IqOutcome::Ignored);
        }

        let start = Instant::now();
        let result = self.handle_iq(iq, cancel).await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(outcome) => {
                metrics::record_query("success", latency_ms);
                Ok(outcome)
            }
            Err(e) if e.is_client_error() => {
                metrics::record_query("rejected", latency_ms);
                debug!(error = %e, "MAM request rejected");

                let condition = e.condition();
                self.router
                    .route_iq(build_error_iq(iq, condition, Some(&e.to_string())))
                    .await?;
                Ok(IqOutcome::Rejected(condition))
            }
            Err(e) => {
                metrics::record_query("error", latency_ms);
                warn!(error = %e, "MAM request failed");

                if !matches!(e, MamError::Delivery(_)) {
                    let reply = build_error_iq(iq, e.condition(), None);
                    if let Err(route_err) = self.router.route_iq(reply).await {
                        warn!(error = %route_err, "Failed to deliver MAM error reply");
                    }
                }
                Err(e)
            }
        }
    }

    async fn handle_iq(&self, iq: &Iq, cancel: &CancellationToken) -> Result<IqOutcome, MamError> {
        let requester = iq
            .from
            .as_ref()
            .ok_or_else(|| MamError::forbidden("Missing requester address"))?;
        let requester_bare = requester.to_bare();
        let owner = match iq.to.as_ref() {
            Some(to) => to.to_bare(),
            None => requester_bare.clone(),
        };

        if owner != requester_bare {
            return Err(MamError::forbidden(format!(
                "{} cannot access the archive of {}",
                requester_bare, owner
            )));
        }
        let archive_id = owner
            .node()
            .map(|node| node.as_str().to_string())
            .ok_or_else(|| MamError::forbidden("Archives belong to accounts"))?;

        match parse_request(iq)? {
            MamRequest::Metadata => {
                let metadata = self.executor.metadata(&archive_id, cancel).await?;
                self.router
                    .route_iq(build_metadata_iq(iq, metadata.as_ref()))
                    .await?;
                info!(archive_id = %archive_id, "Archive metadata requested");
                Ok(IqOutcome::Replied)
            }
            MamRequest::FormFields => {
                self.router.route_iq(build_form_fields_iq(iq)).await?;
                debug!(archive_id = %archive_id, "Archive form fields requested");
                Ok(IqOutcome::Replied)
            }
            MamRequest::Query(query) => {
                self.send_archive_messages(iq, requester, &owner, archive_id, query, cancel)
                    .await
            }
        }
    }

    async fn send_archive_messages(
        &self,
        iq: &Iq,
        requester: &Jid,
        owner: &BareJid,
        archive_id: String,
        query: ArchiveQuery,
        cancel: &CancellationToken,
    ) -> Result<IqOutcome, MamError> {
        let page = self
            .executor
            .execute(&archive_id, &query.filters, &query.page, query.flip_page, cancel)
            .await?;

        let owner = Jid::from(owner.clone());
        for record in &page.items {
            let message = build_result_message(query.query_id.as_deref(), &owner, requester, record)?;
            // Result messages are best effort; the fin reply marks completion.
            if let Err(e) = self.router.route_message(message).await {
                warn!(archive_id = %archive_id, id = %record.id, error = %e, "Failed to deliver archive result");
            }
        }

        self.router.route_iq(build_fin_iq(iq, &page.result)).await?;

        info!(
            archive_id = %archive_id,
            count = page.result.count,
            complete = page.result.complete,
            "Archive messages requested"
        );

        Ok(IqOutcome::ArchiveQueried {
            archive_id,
            count: page.result.count,
            complete: page.result.complete,
        })
    }
}
