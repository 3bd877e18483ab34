//! Test utilities for driving the archive module end to end.
//!
//! Provides a recording router, a harness wiring [`Mam`] to an in-memory
//! libSQL store, and helpers to build and inspect MAM stanzas.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use minidom::Element;
use tokio_util::sync::CancellationToken;
use waddle_mam::{
    ArchiveStore, ArchivedIds, LibSqlArchiveStore, Mam, MamConfig, MamError, MessageFlow,
    StanzaRouter,
};
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::message::{Body, Message, MessageType};
use xmpp_parsers::stanza_error::DefinedCondition;

pub const MAM_NS: &str = "urn:xmpp:mam:2";
pub const RSM_NS: &str = "http://jabber.org/protocol/rsm";

/// Router that records every stanza handed to it.
#[derive(Default)]
pub struct RecordingRouter {
    messages: Mutex<Vec<Message>>,
    iqs: Mutex<Vec<Iq>>,
    /// Reject result messages
    pub fail_messages: bool,
}

impl RecordingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_messages() -> Self {
        Self {
            fail_messages: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn iqs(&self) -> Vec<Iq> {
        self.iqs.lock().unwrap().clone()
    }

    pub fn last_iq(&self) -> Iq {
        self.iqs.lock().unwrap().last().cloned().expect("no IQ routed")
    }

    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
        self.iqs.lock().unwrap().clear();
    }
}

#[async_trait]
impl StanzaRouter for RecordingRouter {
    async fn route_message(&self, message: Message) -> Result<(), MamError> {
        if self.fail_messages {
            return Err(MamError::delivery("recipient offline"));
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }

    async fn route_iq(&self, iq: Iq) -> Result<(), MamError> {
        self.iqs.lock().unwrap().push(iq);
        Ok(())
    }
}

/// The module under test with its collaborators.
pub struct Harness {
    pub mam: Mam,
    pub router: Arc<RecordingRouter>,
    pub store: LibSqlArchiveStore,
}

pub fn config(queue_size: usize) -> MamConfig {
    MamConfig {
        queue_size,
        local_domains: vec!["capulet.lit".to_string(), "montague.lit".to_string()],
        ..MamConfig::default()
    }
}

pub async fn harness(queue_size: usize) -> Harness {
    let store = LibSqlArchiveStore::open_in_memory().await.unwrap();
    let router = Arc::new(RecordingRouter::new());
    let mam = Mam::new(&config(queue_size), Arc::new(store.clone()), router.clone());
    Harness { mam, router, store }
}

pub fn harness_with(
    queue_size: usize,
    store: Arc<dyn ArchiveStore>,
    router: Arc<RecordingRouter>,
) -> Mam {
    Mam::new(&config(queue_size), store, router)
}

pub fn chat(from: &str, to: &str, body: &str) -> Message {
    let mut message = Message::new(Some(to.parse().unwrap()));
    message.from = Some(from.parse().unwrap());
    message.type_ = MessageType::Chat;
    message.bodies.insert(String::new(), Body(body.to_string()));
    message
}

/// Run a message through receipt and routing, returning the delivered copy.
pub async fn deliver(mam: &Mam, message: Message) -> (Message, ArchivedIds) {
    let flow = mam.on_message_received(MessageFlow::C2s(message));
    let ids = mam
        .on_message_routed(&flow, &CancellationToken::new())
        .await
        .unwrap();
    (flow.into_message(), ids)
}

pub fn iq_set(from: &str, to: Option<&str>, payload: &str) -> Iq {
    Iq {
        from: Some(from.parse().unwrap()),
        to: to.map(|t| t.parse().unwrap()),
        id: "q1".to_string(),
        payload: IqType::Set(payload.parse().unwrap()),
    }
}

pub fn iq_get(from: &str, to: Option<&str>, payload: &str) -> Iq {
    Iq {
        from: Some(from.parse().unwrap()),
        to: to.map(|t| t.parse().unwrap()),
        id: "q1".to_string(),
        payload: IqType::Get(payload.parse().unwrap()),
    }
}

/// A MAM query with the given form fields and RSM children.
pub fn query(fields: &str, rsm: &str, extra: &str) -> String {
    format!(
        "<query xmlns='urn:xmpp:mam:2' queryid='f27'>\
           <x xmlns='jabber:x:data' type='submit'>\
             <field var='FORM_TYPE' type='hidden'><value>urn:xmpp:mam:2</value></field>\
             {}\
           </x>\
           <set xmlns='http://jabber.org/protocol/rsm'>{}</set>\
           {}\
         </query>",
        fields, rsm, extra
    )
}

/// The `<result/>` element of a MAM result message.
pub fn result_element(message: &Message) -> &Element {
    message
        .payloads
        .iter()
        .find(|p| p.is("result", MAM_NS))
        .expect("no result element")
}

/// Archive ids carried by result messages, in delivery order.
pub fn result_ids(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| result_element(m).attr("id").unwrap().to_string())
        .collect()
}

/// Paging summary of a fin reply.
#[derive(Debug, PartialEq, Eq)]
pub struct Fin {
    pub complete: bool,
    pub first: Option<String>,
    pub last: Option<String>,
    pub count: usize,
}

pub fn fin(iq: &Iq) -> Fin {
    let IqType::Result(Some(fin)) = &iq.payload else {
        panic!("expected fin result, got {:?}", iq.payload);
    };
    assert!(fin.is("fin", MAM_NS));
    let set = fin.get_child("set", RSM_NS).expect("no rsm set");

    Fin {
        complete: fin.attr("complete") == Some("true"),
        first: set.get_child("first", RSM_NS).map(|e| e.text()),
        last: set.get_child("last", RSM_NS).map(|e| e.text()),
        count: set
            .get_child("count", RSM_NS)
            .map(|e| e.text().parse().unwrap())
            .unwrap_or(0),
    }
}

pub fn error_condition(iq: &Iq) -> DefinedCondition {
    match &iq.payload {
        IqType::Error(err) => err.defined_condition.clone(),
        other => panic!("expected error reply, got {:?}", other),
    }
}
