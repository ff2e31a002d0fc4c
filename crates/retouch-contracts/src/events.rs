//! Session event log: one JSON object per line, tagged by `type`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::modes::EditMode;

/// Stands in for an image in the log; payloads are never written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFingerprint {
    pub sha256: String,
    pub bytes: usize,
    pub mime_type: String,
}

impl ImageFingerprint {
    pub fn new(bytes: &[u8], mime_type: &str) -> Self {
        Self {
            sha256: hex::encode(Sha256::digest(bytes)),
            bytes: bytes.len(),
            mime_type: mime_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Rejected by the session before the editor was called.
    Validation,
    /// The editor refused the request before sending it.
    Request,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted,
    ImageUploaded {
        name: String,
        image: ImageFingerprint,
    },
    GenerateStarted {
        mode: EditMode,
        history_index: i64,
        source: ImageFingerprint,
    },
    GenerateSucceeded {
        mode: EditMode,
        image: ImageFingerprint,
        history_len: usize,
    },
    GenerateFailed {
        mode: EditMode,
        stage: FailureStage,
        error: String,
    },
    Undo {
        history_index: i64,
    },
    Redo {
        history_index: i64,
    },
    SessionCleared,
}

#[derive(Serialize)]
struct EventLine<'a> {
    ts: String,
    session_id: &'a str,
    #[serde(flatten)]
    event: &'a SessionEvent,
}

/// Appends [`SessionEvent`]s to a JSONL file under a fixed session id.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: PathBuf,
    session_id: String,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Writes one line; the file and its parent directory are created on
    /// first use.
    pub fn emit(&self, event: &SessionEvent) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(&EventLine {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            session_id: &self.session_id,
            event,
        })?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?
            .write_all(line.as_bytes())?;
        Ok(())
    }
}
