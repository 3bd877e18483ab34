//! MAM query forms (XEP-0313 Section 4.1, XEP-0004 data forms).

use jid::Jid;
use minidom::Element;
use tracing::debug;

use crate::query::{DATA_FORMS_NS, MAM_NS};
use crate::types::{parse_timestamp, Filters};
use crate::MamError;

/// Build archive filters from a submitted query form.
///
/// ```xml
/// <x xmlns='jabber:x:data' type='submit'>
///   <field var='FORM_TYPE' type='hidden'>
///     <value>urn:xmpp:mam:2</value>
///   </field>
///   <field var='start'><value>2010-06-07T00:00:00Z</value></field>
///   <field var='with'><value>juliet@capulet.lit</value></field>
/// </x>
/// ```
///
/// The form must be of type `submit` and declare `FORM_TYPE` as the MAM
/// namespace. Unknown fields are ignored and empty values count as absent.
pub fn filters_from_form(form: &Element) -> Result<Filters, MamError> {
    if form.attr("type") != Some("submit") {
        return Err(MamError::bad_request("MAM form must be of type submit"));
    }

    let mut form_type = None;
    let mut filters = Filters::default();

    for field in form.children().filter(|c| c.is("field", DATA_FORMS_NS)) {
        let var = field.attr("var").unwrap_or("");
        let values: Vec<String> = field
            .children()
            .filter(|c| c.name() == "value")
            .map(|v| v.text())
            .filter(|v| !v.is_empty())
            .collect();
        let value = values.first();

        match var {
            "FORM_TYPE" => form_type = value.cloned(),
            "start" => {
                if let Some(v) = value {
                    filters.start = Some(parse_field_timestamp("start", v)?);
                }
            }
            "end" => {
                if let Some(v) = value {
                    filters.end = Some(parse_field_timestamp("end", v)?);
                }
            }
            "with" => {
                if let Some(v) = value {
                    let with: Jid = v
                        .parse()
                        .map_err(|e| MamError::bad_request(format!("Invalid with {}: {}", v, e)))?;
                    filters.with = Some(with);
                }
            }
            "before-id" => filters.before_id = value.cloned(),
            "after-id" => filters.after_id = value.cloned(),
            "ids" => {
                for id in values {
                    if !filters.ids.contains(&id) {
                        filters.ids.push(id);
                    }
                }
            }
            _ => {}
        }
    }

    if form_type.as_deref() != Some(MAM_NS) {
        return Err(MamError::bad_request(format!(
            "Unexpected form type: {}",
            form_type.as_deref().unwrap_or("none")
        )));
    }

    debug!(filters = ?filters, "Parsed MAM query form");
    Ok(filters)
}

fn parse_field_timestamp(var: &str, value: &str) -> Result<chrono::DateTime<chrono::Utc>, MamError> {
    parse_timestamp(value)
        .map_err(|e| MamError::bad_request(format!("Invalid {} timestamp {}: {}", var, value, e)))
}

/// Build the query form advertised to clients.
pub fn build_query_form() -> Element {
    let form_type = Element::builder("field", DATA_FORMS_NS)
        .attr("var", "FORM_TYPE")
        .attr("type", "hidden")
        .append(
            Element::builder("value", DATA_FORMS_NS)
                .append(MAM_NS)
                .build(),
        )
        .build();

    let ids = Element::builder("field", DATA_FORMS_NS)
        .attr("var", "ids")
        .attr("type", "list-multi")
        .append(
            Element::builder("validate", "http://jabber.org/protocol/xdata-validate")
                .attr("datatype", "xs:string")
                .append(Element::builder("open", "http://jabber.org/protocol/xdata-validate").build())
                .build(),
        )
        .build();

    Element::builder("x", DATA_FORMS_NS)
        .attr("type", "form")
        .append(form_type)
        .append(field("with", "jid-single"))
        .append(field("start", "text-single"))
        .append(field("end", "text-single"))
        .append(field("before-id", "text-single"))
        .append(field("after-id", "text-single"))
        .append(ids)
        .build()
}

fn field(var: &str, field_type: &str) -> Element {
    Element::builder("field", DATA_FORMS_NS)
        .attr("var", var)
        .attr("type", field_type)
        .build()
}
