//! Unique and stable stanza ids (XEP-0359).
//!
//! Messages addressed to a local account receive a
//! `<stanza-id xmlns='urn:xmpp:sid:0' by='user@domain' id='...'/>` annotation
//! at receipt time. The recipient's client sees it on delivery and the capture
//! pipeline reuses it as the archive id of the recipient copy.

use minidom::Element;
use tracing::debug;
use uuid::Uuid;
use xmpp_parsers::message::Message;

use crate::flow::MessageFlow;
use crate::hosts::LocalHosts;
use crate::query::STANZA_ID_NS;

/// Annotates inbound messages with archive ids.
#[derive(Debug, Clone)]
pub struct StanzaIdAssigner {
    hosts: LocalHosts,
}

impl StanzaIdAssigner {
    pub fn new(hosts: LocalHosts) -> Self {
        Self { hosts }
    }

    /// Annotate the message carried by an inbound flow.
    pub fn on_message_received(&self, flow: MessageFlow) -> MessageFlow {
        flow.map(|message| self.assign(message))
    }

    /// Return the message with a fresh stanza-id if its recipient is local.
    ///
    /// Any stanza-id already claiming to be issued by the recipient is
    /// removed first, so remote senders cannot inject archive ids.
    pub fn assign(&self, mut message: Message) -> Message {
        let Some(to) = message.to.as_ref() else {
            return message;
        };
        if !self.hosts.is_local(to) {
            return message;
        }

        let by = to.to_bare().to_string();
        let id = Uuid::new_v4().to_string();

        remove_stanza_ids(&mut message, &by);
        add_stanza_id(&mut message, &id, &by);

        debug!(id = %id, by = %by, "Assigned stanza-id");
        message
    }
}

/// Add a stanza-id extension to a message.
///
/// ```xml
/// <stanza-id xmlns='urn:xmpp:sid:0' id='archive-id' by='juliet@capulet.lit'/>
/// ```
pub fn add_stanza_id(message: &mut Message, id: &str, by: &str) {
    let stanza_id = Element::builder("stanza-id", STANZA_ID_NS)
        .attr("id", id)
        .attr("by", by)
        .build();
    message.payloads.push(stanza_id);
}

/// Find the stanza-id issued by `by`, if any.
pub fn stanza_id(message: &Message, by: &str) -> Option<String> {
    message
        .payloads
        .iter()
        .filter(|p| p.is("stanza-id", STANZA_ID_NS))
        .find(|p| p.attr("by") == Some(by))
        .and_then(|p| p.attr("id"))
        .map(|id| id.to_string())
}

fn remove_stanza_ids(message: &mut Message, by: &str) {
    message
        .payloads
        .retain(|p| !(p.is("stanza-id", STANZA_ID_NS) && p.attr("by") == Some(by)));
}
