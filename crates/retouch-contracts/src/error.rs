//! Failure taxonomy shared by the editor clients and the edit session.

use thiserror::Error;

use crate::modes::{EditMode, StyleOption};

pub const NO_IMAGE_FALLBACK_MESSAGE: &str =
    "The AI model did not return an image. Please adjust your prompt and try again.";

#[derive(Debug, Error)]
pub enum EditError {
    /// Credential missing; raised before any network attempt.
    #[error("{0}")]
    Configuration(String),

    #[error("Invalid encoded image: {0}")]
    InvalidEncoding(String),

    /// An input image could not be turned into a request payload.
    #[error("Invalid base64 image data: {0}")]
    InvalidImage(String),

    #[error("Unsupported file type '{0}'. Please select an image file.")]
    UnsupportedFileType(String),

    #[error("Please upload an image first.")]
    MissingSourceImage,

    #[error("{}", .0.missing_parameter_hint())]
    MissingParameter(EditMode),

    #[error("Unknown style '{0}'. Choose one of: {labels}", labels = StyleOption::labels().join(", "))]
    UnknownStyle(String),

    #[error("An edit is already in progress.")]
    Busy,

    /// The session was cleared or given a new original while the call ran.
    #[error("The edit finished after the session was reset and was discarded.")]
    Discarded,

    /// Transport or service-level failure of the remote call.
    #[error("Failed to communicate with the AI model: {0}")]
    RemoteService(String),

    /// The call succeeded but no image came back. `explanation` holds whatever
    /// text the model returned instead.
    #[error("{}", .explanation.as_deref().unwrap_or(NO_IMAGE_FALLBACK_MESSAGE))]
    NoImageProduced { explanation: Option<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EditError {
    /// True for failures caught before any request could be issued.
    pub fn is_local(&self) -> bool {
        !matches!(
            self,
            EditError::RemoteService(_)
                | EditError::NoImageProduced { .. }
                | EditError::Discarded
        )
    }
}
