//! Shared types for the retouch editor: edit modes, prompt templates, the
//! image codec, edit history, errors, chat intents and the event log.

pub mod chat;
pub mod codec;
pub mod error;
pub mod events;
pub mod history;
pub mod modes;
pub mod prompts;

pub use codec::{EncodedImage, ImageFile};
pub use error::EditError;
pub use history::EditHistory;
pub use modes::{EditMode, StyleOption};
pub use prompts::build_prompt;
