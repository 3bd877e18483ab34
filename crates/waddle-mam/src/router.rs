//! Outbound delivery contract.

use async_trait::async_trait;
use xmpp_parsers::iq::Iq;
use xmpp_parsers::message::Message;

use crate::MamError;

/// Delivery subsystem used to send query results and replies.
///
/// Implemented by the server's stanza router; the archive never talks to
/// connections directly.
#[async_trait]
pub trait StanzaRouter: Send + Sync {
    /// Deliver a message stanza.
    async fn route_message(&self, message: Message) -> Result<(), MamError>;

    /// Deliver an IQ stanza.
    async fn route_iq(&self, iq: Iq) -> Result<(), MamError>;
}
