use thiserror::Error;

pub const EMPTY_INPUT_MESSAGE: &str = "Please say something or upload an image.";

/// Everything that can go wrong while answering a chat turn. None of these
/// are fatal: each one ends up as text in the chat.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no prompt or image supplied")]
    EmptyInput,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}

impl ChatError {
    /// Text shown to the user in place of a model reply.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::EmptyInput => EMPTY_INPUT_MESSAGE.to_string(),
            other => format!("Error: {}", other),
        }
    }
}
