//! Delivery path a message arrived on.

use xmpp_parsers::message::Message;

/// A message together with the kind of stream that carried it.
///
/// The archive treats both paths the same way; the tag is kept so that hook
/// ordering and logging can tell client traffic from federated traffic.
#[derive(Debug, Clone)]
pub enum MessageFlow {
    /// Received from a locally connected client
    C2s(Message),
    /// Received from a remote server
    S2s(Message),
}

impl MessageFlow {
    /// The carried message.
    pub fn message(&self) -> &Message {
        match self {
            Self::C2s(message) | Self::S2s(message) => message,
        }
    }

    /// Consume the flow and return the carried message.
    pub fn into_message(self) -> Message {
        match self {
            Self::C2s(message) | Self::S2s(message) => message,
        }
    }

    /// Replace the carried message, keeping the flow kind.
    pub fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(Message) -> Message,
    {
        match self {
            Self::C2s(message) => Self::C2s(f(message)),
            Self::S2s(message) => Self::S2s(f(message)),
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::C2s(_) => "c2s",
            Self::S2s(_) => "s2s",
        }
    }
}
