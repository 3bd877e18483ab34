//! Error types for the archive module.

use std::collections::BTreeMap;
use thiserror::Error;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::stanza_error::{DefinedCondition, ErrorType, StanzaError};

use crate::store::StoreError;

/// Archive module errors.
#[derive(Debug, Error)]
pub enum MamError {
    /// Malformed query form, timestamp or paging request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Requester does not own the archive
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing ids, paging anchor or page
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Archive store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// The caller cancelled the operation or its deadline expired
    #[error("Operation cancelled")]
    Cancelled,

    /// Reply could not be handed to the router
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// An observer rejected an archive event
    #[error("Hook {hook} failed: {reason}")]
    Hook {
        /// Observer name
        hook: String,
        /// Failure description
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MamError {
    /// Create a new bad-request error.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a new forbidden error.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a new item-not-found error.
    pub fn item_not_found(msg: impl Into<String>) -> Self {
        Self::ItemNotFound(msg.into())
    }

    /// Create a new delivery error.
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Create a new hook error.
    pub fn hook(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Hook {
            hook: hook.into(),
            reason: reason.into(),
        }
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Stanza error condition reported to the requester.
    pub fn condition(&self) -> StanzaErrorCondition {
        match self {
            Self::BadRequest(_) => StanzaErrorCondition::BadRequest,
            Self::Forbidden(_) => StanzaErrorCondition::Forbidden,
            Self::ItemNotFound(_) => StanzaErrorCondition::ItemNotFound,
            Self::Storage(_)
            | Self::Cancelled
            | Self::Delivery(_)
            | Self::Hook { .. }
            | Self::Config(_) => StanzaErrorCondition::InternalServerError,
        }
    }

    /// Whether the error is answered to the requester and not propagated.
    ///
    /// Validation, authorization and not-found conditions have no side
    /// effects; everything else is a failure of the triggering flow.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::BadRequest(_) | Self::Forbidden(_) | Self::ItemNotFound(_)
        )
    }
}

/// Stanza error conditions surfaced by the archive (RFC 6120 Section 8.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaErrorCondition {
    /// Malformed request
    BadRequest,
    /// Permission denied
    Forbidden,
    /// Internal server error
    InternalServerError,
    /// Item not found
    ItemNotFound,
}

impl StanzaErrorCondition {
    /// Get the element name for this condition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::Forbidden => "forbidden",
            Self::InternalServerError => "internal-server-error",
            Self::ItemNotFound => "item-not-found",
        }
    }

    /// Error type that accompanies this condition.
    pub fn error_type(&self) -> StanzaErrorType {
        match self {
            Self::BadRequest => StanzaErrorType::Modify,
            Self::Forbidden => StanzaErrorType::Auth,
            Self::InternalServerError => StanzaErrorType::Wait,
            Self::ItemNotFound => StanzaErrorType::Cancel,
        }
    }

    fn as_parsers(&self) -> DefinedCondition {
        match self {
            Self::BadRequest => DefinedCondition::BadRequest,
            Self::Forbidden => DefinedCondition::Forbidden,
            Self::InternalServerError => DefinedCondition::InternalServerError,
            Self::ItemNotFound => DefinedCondition::ItemNotFound,
        }
    }
}

impl std::fmt::Display for StanzaErrorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// XMPP stanza error types (RFC 6120 Section 8.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaErrorType {
    /// Retry after providing credentials
    Auth,
    /// Do not retry (unrecoverable error)
    Cancel,
    /// Retry after changing the data sent
    Modify,
    /// Retry after waiting (temporary error)
    Wait,
}

impl StanzaErrorType {
    /// Get the type attribute value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Cancel => "cancel",
            Self::Modify => "modify",
            Self::Wait => "wait",
        }
    }

    fn as_parsers(&self) -> ErrorType {
        match self {
            Self::Auth => ErrorType::Auth,
            Self::Cancel => ErrorType::Cancel,
            Self::Modify => ErrorType::Modify,
            Self::Wait => ErrorType::Wait,
        }
    }
}

impl std::fmt::Display for StanzaErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build an IQ error reply for the given condition.
///
/// `text` becomes the `<text xml:lang='en'/>` child; without it the error
/// carries only the condition.
pub fn build_error_iq(original_iq: &Iq, condition: StanzaErrorCondition, text: Option<&str>) -> Iq {
    let stanza_error = match text {
        Some(text) => StanzaError::new(
            condition.error_type().as_parsers(),
            condition.as_parsers(),
            "en",
            text,
        ),
        None => StanzaError {
            type_: condition.error_type().as_parsers(),
            by: None,
            defined_condition: condition.as_parsers(),
            texts: BTreeMap::new(),
            other: None,
            alternate_address: None,
        },
    };

    Iq {
        from: original_iq.to.clone(),
        to: original_iq.from.clone(),
        id: original_iq.id.clone(),
        payload: IqType::Error(stanza_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conditions() {
        assert_eq!(
            MamError::bad_request("bad form").condition(),
            StanzaErrorCondition::BadRequest
        );
        assert_eq!(
            MamError::forbidden("not yours").condition(),
            StanzaErrorCondition::Forbidden
        );
        assert_eq!(
            MamError::item_not_found("missing").condition(),
            StanzaErrorCondition::ItemNotFound
        );
        assert_eq!(
            MamError::Cancelled.condition(),
            StanzaErrorCondition::InternalServerError
        );
        assert_eq!(
            MamError::Storage(StoreError::Database("disk full".into())).condition(),
            StanzaErrorCondition::InternalServerError
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(MamError::bad_request("x").is_client_error());
        assert!(MamError::item_not_found("x").is_client_error());
        assert!(!MamError::Cancelled.is_client_error());
        assert!(!MamError::delivery("router gone").is_client_error());
    }

    #[test]
    fn test_condition_strings() {
        assert_eq!(StanzaErrorCondition::ItemNotFound.as_str(), "item-not-found");
        assert_eq!(StanzaErrorCondition::Forbidden.error_type().as_str(), "auth");
        assert_eq!(StanzaErrorCondition::BadRequest.error_type().as_str(), "modify");
    }

    #[test]
    fn test_build_error_iq_swaps_addresses() {
        let iq = Iq {
            from: Some("juliet@capulet.lit/balcony".parse().unwrap()),
            to: Some("juliet@capulet.lit".parse().unwrap()),
            id: "q1".to_string(),
            payload: IqType::Get(minidom::Element::builder("query", "urn:xmpp:mam:2").build()),
        };

        let reply = build_error_iq(&iq, StanzaErrorCondition::Forbidden, None);
        assert_eq!(reply.id, "q1");
        assert_eq!(reply.to, iq.from);
        assert_eq!(reply.from, iq.to);
        match reply.payload {
            IqType::Error(err) => {
                assert_eq!(err.defined_condition, DefinedCondition::Forbidden);
                assert_eq!(err.type_, ErrorType::Auth);
                assert!(err.texts.is_empty());
            }
            _ => panic!("expected error payload"),
        }
    }

    #[test]
    fn test_build_error_iq_text() {
        let iq = Iq {
            from: Some("juliet@capulet.lit/balcony".parse().unwrap()),
            to: Some("juliet@capulet.lit".parse().unwrap()),
            id: "q2".to_string(),
            payload: IqType::Set(minidom::Element::builder("query", "urn:xmpp:mam:2").build()),
        };

        let reply = build_error_iq(&iq, StanzaErrorCondition::BadRequest, Some("Invalid max"));
        let IqType::Error(err) = reply.payload else {
            panic!("expected error payload");
        };
        assert_eq!(err.texts.len(), 1);
        assert_eq!(err.texts.values().next().map(String::as_str), Some("Invalid max"));

        let elem = minidom::Element::from(err);
        let text = elem
            .get_child("text", "urn:ietf:params:xml:ns:xmpp-stanzas")
            .expect("text child");
        assert_eq!(text.text(), "Invalid max");
    }
}
