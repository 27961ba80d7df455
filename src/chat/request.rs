use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;

use crate::config::HistoryImages;
use crate::error::ChatError;
use crate::web::models::{ChatRequest, ContentPart, MessageContent, Role, Turn};

/// A validated `data:image/<subtype>;base64,<payload>` URL.
#[derive(Debug)]
pub struct ImageDataUrl<'a> {
    url: &'a str,
    mime: &'a str,
    decoded_len: usize,
}

impl<'a> ImageDataUrl<'a> {
    pub fn parse(url: &'a str) -> Result<Self, ChatError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| ChatError::InvalidImage("expected a data URL".to_string()))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| ChatError::InvalidImage("data URL has no payload".to_string()))?;
        let mime = meta.strip_suffix(";base64").ok_or_else(|| {
            ChatError::InvalidImage("data URL must be base64 encoded".to_string())
        })?;
        if !mime.starts_with("image/") || mime.len() == "image/".len() {
            return Err(ChatError::InvalidImage(format!(
                "unsupported media type `{}`",
                mime
            )));
        }
        let decoded = STANDARD
            .decode(payload.trim())
            .map_err(|e| ChatError::InvalidImage(format!("bad base64 payload: {}", e)))?;
        if decoded.is_empty() {
            return Err(ChatError::InvalidImage("image is empty".to_string()));
        }

        Ok(Self {
            url,
            mime,
            decoded_len: decoded.len(),
        })
    }

    pub fn as_str(&self) -> &'a str {
        self.url
    }

    pub fn mime(&self) -> &'a str {
        self.mime
    }

    pub fn decoded_len(&self) -> usize {
        self.decoded_len
    }
}

/// Builds the message list sent to the model: the system prompt, the
/// resent history, then the current user turn.
pub fn build_messages(
    request: &ChatRequest,
    system_prompt: &str,
    history_images: HistoryImages,
) -> Result<Vec<Turn>, ChatError> {
    let prompt = request
        .prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty());
    let image = request
        .image
        .as_deref()
        .filter(|i| !i.is_empty())
        .map(ImageDataUrl::parse)
        .transpose()?;

    let mut parts = Vec::with_capacity(2);
    if let Some(prompt) = prompt {
        parts.push(ContentPart::text(prompt));
    }
    if let Some(image) = &image {
        debug!(
            "Attaching {} image ({} bytes decoded)",
            image.mime(),
            image.decoded_len()
        );
        parts.push(ContentPart::image(image.as_str()));
    }
    if parts.is_empty() {
        return Err(ChatError::EmptyInput);
    }

    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(Turn::text(Role::System, system_prompt));
    messages.extend(
        request
            .history
            .iter()
            .filter_map(|turn| carry_forward(turn, history_images)),
    );
    messages.push(Turn {
        role: Role::User,
        content: MessageContent::Parts(parts),
    });

    Ok(messages)
}

/// Returns `None` when nothing of the entry survives.
fn carry_forward(turn: &Turn, history_images: HistoryImages) -> Option<Turn> {
    let parts = match &turn.content {
        MessageContent::Text(_) => return Some(turn.clone()),
        MessageContent::Parts(parts) => parts,
    };

    match history_images {
        HistoryImages::Drop => {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } if !text.is_empty() => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(Turn::text(turn.role, text.join("\n")))
            }
        }
        HistoryImages::Keep => {
            let kept: Vec<ContentPart> = parts
                .iter()
                .filter(|part| match part {
                    ContentPart::Text { text } => !text.is_empty(),
                    ContentPart::ImageUrl { image_url } => !image_url.url.is_empty(),
                    ContentPart::Unknown => false,
                })
                .cloned()
                .collect();
            if kept.is_empty() {
                None
            } else {
                Some(Turn {
                    role: turn.role,
                    content: MessageContent::Parts(kept),
                })
            }
        }
    }
}
