//! Remote image editing and the edit session that drives it.

pub mod config;
pub mod editor;
pub mod session;

pub use config::EditorConfig;
pub use editor::{DryrunEditor, GeminiEditor, ImageEditor};
pub use session::{EditSession, ImageSource, PendingEdit, SessionPhase, SessionSnapshot};
