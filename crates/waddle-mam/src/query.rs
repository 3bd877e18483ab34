//! MAM request parsing and response formatting.
//!
//! Handles XEP-0313 IQ stanzas addressed to an account archive. Paging uses
//! Result Set Management per XEP-0059.

use jid::Jid;
use minidom::Element;
use tracing::debug;
use uuid::Uuid;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::message::{Message, MessageType};

use crate::form::{build_query_form, filters_from_form};
use crate::paging::{PageRequest, PageResult};
use crate::rsm::{build_set, parse_set};
use crate::store::StoreError;
use crate::types::{format_timestamp, ArchiveMetadata, ArchivedMessage, Filters};
use crate::MamError;

/// MAM XML namespace (XEP-0313 v2).
pub const MAM_NS: &str = "urn:xmpp:mam:2";

/// Extended MAM feature (ids, before-id/after-id, metadata).
pub const MAM_EXTENDED_NS: &str = "urn:xmpp:mam:2#extended";

/// Result Set Management namespace (XEP-0059).
pub const RSM_NS: &str = "http://jabber.org/protocol/rsm";

/// Data Forms namespace.
pub const DATA_FORMS_NS: &str = "jabber:x:data";

/// Stanza ID namespace (XEP-0359).
pub const STANZA_ID_NS: &str = "urn:xmpp:sid:0";

/// Forward namespace (XEP-0297).
pub const FORWARD_NS: &str = "urn:xmpp:forward:0";

/// Delay namespace (XEP-0203).
pub const DELAY_NS: &str = "urn:xmpp:delay";

/// A parsed MAM request.
#[derive(Debug, Clone, PartialEq)]
pub enum MamRequest {
    /// `<metadata/>` in an IQ get
    Metadata,
    /// `<query/>` in an IQ get, asking for the supported form fields
    FormFields,
    /// `<query/>` in an IQ set
    Query(ArchiveQuery),
}

/// An archive query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveQuery {
    /// Client-chosen id echoed in every result
    pub query_id: Option<String>,
    pub filters: Filters,
    pub page: PageRequest,
    /// Return the page in reverse order
    pub flip_page: bool,
}

/// Parse a MAM request from an IQ stanza.
///
/// Expected query format:
/// ```xml
/// <iq type='set' id='query1'>
///   <query xmlns='urn:xmpp:mam:2' queryid='f27'>
///     <x xmlns='jabber:x:data' type='submit'>
///       <field var='FORM_TYPE' type='hidden'>
///         <value>urn:xmpp:mam:2</value>
///       </field>
///       <field var='with'><value>juliet@capulet.lit</value></field>
///     </x>
///     <set xmlns='http://jabber.org/protocol/rsm'>
///       <max>10</max>
///       <after>28482-98726-73623</after>
///     </set>
///     <flip-page/>
///   </query>
/// </iq>
/// ```
pub fn parse_request(iq: &Iq) -> Result<MamRequest, MamError> {
    match &iq.payload {
        IqType::Get(elem) if elem.is("metadata", MAM_NS) => Ok(MamRequest::Metadata),
        IqType::Get(elem) if elem.is("query", MAM_NS) => Ok(MamRequest::FormFields),
        IqType::Set(elem) if elem.is("query", MAM_NS) => parse_query(elem).map(MamRequest::Query),
        _ => Err(MamError::bad_request("Unsupported MAM request")),
    }
}

fn parse_query(query_elem: &Element) -> Result<ArchiveQuery, MamError> {
    let mut query = ArchiveQuery {
        query_id: query_elem.attr("queryid").map(|s| s.to_string()),
        ..Default::default()
    };

    for child in query_elem.children() {
        if child.is("x", DATA_FORMS_NS) {
            query.filters = filters_from_form(child)?;
        } else if child.is("set", RSM_NS) {
            query.page = parse_set(child)?;
        } else if child.name() == "flip-page" {
            query.flip_page = true;
        }
    }

    debug!(query_id = ?query.query_id, query = ?query, "Parsed MAM query");
    Ok(query)
}

/// Build a single MAM result message.
///
/// ```xml
/// <message id='aeb213' from='juliet@capulet.lit' to='juliet@capulet.lit/chamber'>
///   <result xmlns='urn:xmpp:mam:2' queryid='f27' id='28482-98726-73623'>
///     <forwarded xmlns='urn:xmpp:forward:0'>
///       <delay xmlns='urn:xmpp:delay' stamp='2010-07-10T23:08:25Z'/>
///       <message xmlns='jabber:client' from='romeo@montague.lit/orchard'
///                to='juliet@capulet.lit/balcony' type='chat'>
///         <body>Call me but love, and I'll be new baptized;</body>
///       </message>
///     </forwarded>
///   </result>
/// </message>
/// ```
pub fn build_result_message(
    query_id: Option<&str>,
    from: &Jid,
    to: &Jid,
    archived: &ArchivedMessage,
) -> Result<Message, MamError> {
    let inner_msg: Element = archived.payload.parse().map_err(|e| {
        StoreError::Serialization(format!("Stored message {} is not XML: {}", archived.id, e))
    })?;

    let delay = Element::builder("delay", DELAY_NS)
        .attr("stamp", format_timestamp(&archived.timestamp))
        .build();

    let forwarded = Element::builder("forwarded", FORWARD_NS)
        .append(delay)
        .append(inner_msg)
        .build();

    let mut result_builder = Element::builder("result", MAM_NS).attr("id", archived.id.as_str());
    if let Some(query_id) = query_id {
        result_builder = result_builder.attr("queryid", query_id);
    }
    let result = result_builder.append(forwarded).build();

    let mut msg = Message::new(Some(to.clone()));
    msg.from = Some(from.clone());
    msg.id = Some(Uuid::new_v4().to_string());
    msg.type_ = MessageType::Normal;
    msg.payloads.push(result);

    Ok(msg)
}

/// Build the MAM fin (completion) IQ response.
///
/// ```xml
/// <iq type='result' id='query1'>
///   <fin xmlns='urn:xmpp:mam:2' complete='true'>
///     <set xmlns='http://jabber.org/protocol/rsm'>
///       <first index='0'>28482-98726-73623</first>
///       <last>09af3-cc343-b409f</last>
///       <count>5</count>
///     </set>
///   </fin>
/// </iq>
/// ```
pub fn build_fin_iq(original_iq: &Iq, result: &PageResult) -> Iq {
    let fin = Element::builder("fin", MAM_NS)
        .attr("complete", if result.complete { "true" } else { "false" })
        .append(build_set(result))
        .build();

    result_iq(original_iq, fin)
}

/// Build the archive metadata response.
///
/// ```xml
/// <metadata xmlns='urn:xmpp:mam:2'>
///   <start id='YWxwaGEg' timestamp='2008-08-22T21:09:04Z'/>
///   <end id='b21lZ2Eg' timestamp='2020-04-20T14:34:21Z'/>
/// </metadata>
/// ```
///
/// An empty archive yields an empty `<metadata/>` element.
pub fn build_metadata_iq(original_iq: &Iq, metadata: Option<&ArchiveMetadata>) -> Iq {
    let mut builder = Element::builder("metadata", MAM_NS);

    if let Some(metadata) = metadata {
        let start = Element::builder("start", MAM_NS)
            .attr("id", metadata.start_id.as_str())
            .attr("timestamp", format_timestamp(&metadata.start_timestamp))
            .build();
        let end = Element::builder("end", MAM_NS)
            .attr("id", metadata.end_id.as_str())
            .attr("timestamp", format_timestamp(&metadata.end_timestamp))
            .build();
        builder = builder.append(start).append(end);
    }

    result_iq(original_iq, builder.build())
}

/// Build the form discovery response.
pub fn build_form_fields_iq(original_iq: &Iq) -> Iq {
    let query = Element::builder("query", MAM_NS)
        .append(build_query_form())
        .build();

    result_iq(original_iq, query)
}

fn result_iq(original_iq: &Iq, payload: Element) -> Iq {
    Iq {
        from: original_iq.to.clone(),
        to: original_iq.from.clone(),
        id: original_iq.id.clone(),
        payload: IqType::Result(Some(payload)),
    }
}
