use log::warn;
use serde_json::Value;

pub const NO_REPLY_MESSAGE: &str = "Sorry, I could not generate a response.";

/// The shapes a provider result is known to arrive in, in precedence order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderReply {
    Text(String),
    Response(String),
    Description(String),
    NestedResponse(String),
    /// Unrecognized shape, kept whole so nothing is lost.
    Raw(Value),
    Missing,
}

impl ProviderReply {
    pub fn classify(result: Option<Value>) -> Self {
        let value = match result {
            None | Some(Value::Null) => return ProviderReply::Missing,
            Some(Value::String(text)) => return ProviderReply::Text(text),
            Some(value) => value,
        };

        if let Some(text) = field_text(value.get("response")) {
            ProviderReply::Response(text)
        } else if let Some(text) = field_text(value.get("description")) {
            ProviderReply::Description(text)
        } else if let Some(text) =
            field_text(value.get("result").and_then(|result| result.get("response")))
        {
            ProviderReply::NestedResponse(text)
        } else {
            ProviderReply::Raw(value)
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ProviderReply::Text(text)
            | ProviderReply::Response(text)
            | ProviderReply::Description(text)
            | ProviderReply::NestedResponse(text) => text,
            ProviderReply::Raw(value) => {
                warn!("Unrecognized provider result shape, returning it verbatim");
                value.to_string()
            }
            ProviderReply::Missing => NO_REPLY_MESSAGE.to_string(),
        }
    }
}

/// Flattens whatever the provider returned into the text shown in the chat.
pub fn normalize_reply(result: Option<Value>) -> String {
    ProviderReply::classify(result).into_text()
}

// Empty strings and nulls count as absent; other non-strings are rendered as JSON.
fn field_text(field: Option<&Value>) -> Option<String> {
    match field? {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
