//! Result Set Management elements (XEP-0059).

use minidom::Element;

use crate::paging::{PageCursor, PageRequest, PageResult};
use crate::query::RSM_NS;
use crate::MamError;

/// Parse a `<set xmlns='http://jabber.org/protocol/rsm'/>` paging request.
///
/// ```xml
/// <set xmlns='http://jabber.org/protocol/rsm'>
///   <max>10</max>
///   <after>28482-98726-73623</after>
/// </set>
/// ```
///
/// An empty `<before/>` requests the last page. At most one of `after`,
/// `before` and `index` may be present.
pub fn parse_set(set: &Element) -> Result<PageRequest, MamError> {
    let mut request = PageRequest::default();
    let mut cursors = 0;

    for child in set.children() {
        match child.name() {
            "max" => {
                request.max = Some(parse_number(&child.text(), "max")?);
            }
            "after" => {
                let text = child.text();
                if text.is_empty() {
                    return Err(MamError::bad_request("Empty RSM <after/>"));
                }
                request.cursor = PageCursor::After(text);
                cursors += 1;
            }
            "before" => {
                let text = child.text();
                request.cursor = if text.is_empty() {
                    PageCursor::Last
                } else {
                    PageCursor::Before(text)
                };
                cursors += 1;
            }
            "index" => {
                request.cursor = PageCursor::Index(parse_number(&child.text(), "index")?);
                cursors += 1;
            }
            _ => {}
        }
    }

    if cursors > 1 {
        return Err(MamError::bad_request("Conflicting RSM paging cursors"));
    }

    Ok(request)
}

fn parse_number(text: &str, name: &str) -> Result<usize, MamError> {
    text.trim()
        .parse()
        .map_err(|_| MamError::bad_request(format!("Invalid RSM <{}/>: {}", name, text)))
}

/// Build the `<set/>` summary for a page.
///
/// ```xml
/// <set xmlns='http://jabber.org/protocol/rsm'>
///   <first index='0'>28482-98726-73623</first>
///   <last>09af3-cc343-b409f</last>
///   <count>5</count>
/// </set>
/// ```
pub fn build_set(result: &PageResult) -> Element {
    let mut set_builder = Element::builder("set", RSM_NS);

    if let Some(ref first) = result.first {
        let first_elem = Element::builder("first", RSM_NS)
            .attr("index", result.first_index.unwrap_or(0).to_string())
            .append(first.clone())
            .build();
        set_builder = set_builder.append(first_elem);
    }

    if let Some(ref last) = result.last {
        let last_elem = Element::builder("last", RSM_NS)
            .append(last.clone())
            .build();
        set_builder = set_builder.append(last_elem);
    }

    let count_elem = Element::builder("count", RSM_NS)
        .append(result.count.to_string())
        .build();

    set_builder.append(count_elem).build()
}
