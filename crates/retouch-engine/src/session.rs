use std::collections::BTreeMap;
use std::path::PathBuf;

use retouch_contracts::codec::{self, EncodedImage, ImageFile};
use retouch_contracts::error::EditError;
use retouch_contracts::events::{EventWriter, FailureStage, ImageFingerprint, SessionEvent};
use retouch_contracts::history::EditHistory;
use retouch_contracts::modes::{EditMode, StyleOption};
use retouch_contracts::prompts::build_prompt;
use serde::Serialize;
use uuid::Uuid;

use crate::editor::ImageEditor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Generating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    None,
    Original,
    History,
}

/// A validated request handed out by [`EditSession::begin_generate`].
#[derive(Debug, Clone)]
pub struct PendingEdit {
    pub mode: EditMode,
    pub instruction: String,
    pub source: ImageFile,
    epoch: u64,
}

/// Read-only view of the session for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub active_mode: EditMode,
    pub parameters: BTreeMap<EditMode, String>,
    pub original_name: Option<String>,
    pub current_source: ImageSource,
    pub current_mime_type: Option<String>,
    pub history_len: usize,
    pub history_index: i64,
    pub can_undo: bool,
    pub can_redo: bool,
    pub can_generate: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Edit state for one original image: history with undo/redo, the selected
/// mode, per-mode text, and the single in-flight generation.
#[derive(Debug)]
pub struct EditSession {
    original: Option<ImageFile>,
    history: EditHistory,
    active_mode: EditMode,
    parameters: BTreeMap<EditMode, String>,
    phase: SessionPhase,
    error: Option<String>,
    epoch: u64,
    events: Option<EventWriter>,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSession {
    pub fn new() -> Self {
        Self {
            original: None,
            history: EditHistory::new(),
            active_mode: EditMode::default(),
            parameters: default_parameters(),
            phase: SessionPhase::Idle,
            error: None,
            epoch: 0,
            events: None,
        }
    }

    /// Same as [`EditSession::new`] but appends events to `path` under a fresh
    /// session id.
    pub fn with_event_log(path: impl Into<PathBuf>) -> Self {
        let writer = EventWriter::new(path, Uuid::new_v4().to_string());
        let session = Self {
            events: Some(writer),
            ..Self::new()
        };
        session.record(SessionEvent::SessionStarted);
        session
    }

    pub fn session_id(&self) -> Option<&str> {
        self.events.as_ref().map(EventWriter::session_id)
    }

    pub fn original(&self) -> Option<&ImageFile> {
        self.original.as_ref()
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn active_mode(&self) -> EditMode {
        self.active_mode
    }

    pub fn parameter(&self, mode: EditMode) -> &str {
        self.parameters
            .get(&mode)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == SessionPhase::Generating
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn current_image(&self) -> Option<&EncodedImage> {
        self.history
            .current()
            .or_else(|| self.original.as_ref().map(|file| &file.encoded))
    }

    /// History entries get a synthesized name and MIME type.
    pub fn current_image_file(&self) -> Option<ImageFile> {
        match self.history.current() {
            Some(encoded) => Some(ImageFile::from_encoded(encoded.clone())),
            None => self.original.clone(),
        }
    }

    /// Starts a fresh edit chain for `file`. An undecodable file is rejected
    /// and the session is left as it was.
    pub fn upload(&mut self, file: ImageFile) -> Result<(), EditError> {
        let image = fingerprint_source(&file)?;
        self.record(SessionEvent::ImageUploaded {
            name: file.name.clone(),
            image,
        });
        self.original = Some(file);
        self.history.clear();
        self.error = None;
        self.reset_in_flight();
        Ok(())
    }

    pub fn select_mode(&mut self, mode: EditMode) {
        self.active_mode = mode;
    }

    pub fn set_parameter(&mut self, mode: EditMode, text: impl Into<String>) {
        self.parameters.insert(mode, text.into());
    }

    /// Validates the current state and enters `Generating`.
    ///
    /// Validation failures are recorded as the session error and leave the
    /// session idle.
    pub fn begin_generate(&mut self) -> Result<PendingEdit, EditError> {
        if self.is_loading() {
            return Err(EditError::Busy);
        }
        self.error = None;
        let prepared = match self.prepare() {
            Ok(prepared) => prepared,
            Err(err) => {
                self.error = Some(err.to_string());
                self.record(SessionEvent::GenerateFailed {
                    mode: self.active_mode,
                    stage: FailureStage::Validation,
                    error: err.to_string(),
                });
                return Err(err);
            }
        };
        let Prepared {
            source,
            instruction,
            fingerprint,
        } = prepared;
        self.phase = SessionPhase::Generating;
        self.record(SessionEvent::GenerateStarted {
            mode: self.active_mode,
            history_index: self.history.position(),
            source: fingerprint,
        });
        Ok(PendingEdit {
            mode: self.active_mode,
            instruction,
            source,
            epoch: self.epoch,
        })
    }

    /// Applies the outcome of a call started with `begin_generate` and returns
    /// to `Idle`. Results arriving after an upload or clear are dropped.
    pub fn complete_generate(
        &mut self,
        pending: PendingEdit,
        outcome: Result<EncodedImage, EditError>,
    ) -> Result<&EncodedImage, EditError> {
        if pending.epoch != self.epoch || !self.is_loading() {
            return Err(EditError::Discarded);
        }
        self.epoch += 1;
        self.phase = SessionPhase::Idle;
        let outcome = outcome.and_then(|image| {
            let (bytes, mime_type) = codec::decode(&image).map_err(|err| {
                EditError::RemoteService(format!("editor returned an unusable image: {err}"))
            })?;
            Ok((image, ImageFingerprint::new(&bytes, &mime_type)))
        });
        match outcome {
            Ok((image, fingerprint)) => {
                self.error = None;
                self.record(SessionEvent::GenerateSucceeded {
                    mode: pending.mode,
                    image: fingerprint,
                    history_len: self.history.index().map(|idx| idx + 2).unwrap_or(1),
                });
                Ok(self.history.push(image))
            }
            Err(err) => {
                self.error = Some(err.to_string());
                let stage = if err.is_local() {
                    FailureStage::Request
                } else {
                    FailureStage::Remote
                };
                self.record(SessionEvent::GenerateFailed {
                    mode: pending.mode,
                    stage,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Sends the current image and the active mode's instruction to `editor`.
    pub fn generate(&mut self, editor: &dyn ImageEditor) -> Result<&EncodedImage, EditError> {
        let pending = self.begin_generate()?;
        let outcome =
            editor.edit_image(&pending.instruction, std::slice::from_ref(&pending.source));
        self.complete_generate(pending, outcome)
    }

    pub fn undo(&mut self) -> bool {
        let moved = self.history.undo();
        if moved {
            self.record(SessionEvent::Undo {
                history_index: self.history.position(),
            });
        }
        moved
    }

    pub fn redo(&mut self) -> bool {
        let moved = self.history.redo();
        if moved {
            self.record(SessionEvent::Redo {
                history_index: self.history.position(),
            });
        }
        moved
    }

    pub fn clear_all(&mut self) {
        self.original = None;
        self.history.clear();
        self.active_mode = EditMode::default();
        self.parameters = default_parameters();
        self.error = None;
        self.reset_in_flight();
        self.record(SessionEvent::SessionCleared);
    }

    pub fn can_generate(&self) -> bool {
        !self.is_loading() && self.prepare().is_ok()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let current_source = if self.history.current().is_some() {
            ImageSource::History
        } else if self.original.is_some() {
            ImageSource::Original
        } else {
            ImageSource::None
        };
        SessionSnapshot {
            active_mode: self.active_mode,
            parameters: self.parameters.clone(),
            original_name: self.original.as_ref().map(|file| file.name.clone()),
            current_source,
            current_mime_type: self.current_image_file().map(|file| file.mime_type),
            history_len: self.history.len(),
            history_index: self.history.position(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            can_generate: self.can_generate(),
            is_loading: self.is_loading(),
            error: self.error.clone(),
        }
    }

    fn prepare(&self) -> Result<Prepared, EditError> {
        let source = self
            .current_image_file()
            .ok_or(EditError::MissingSourceImage)?;
        let fingerprint = fingerprint_source(&source)?;
        let mode = self.active_mode;
        let param = self.parameter(mode).trim();
        let instruction = if mode.requires_text() {
            if param.is_empty() {
                return Err(EditError::MissingParameter(mode));
            }
            build_prompt(mode, Some(param))
        } else if mode == EditMode::Stylize && !param.is_empty() {
            if StyleOption::parse(param).is_none() {
                return Err(EditError::UnknownStyle(param.to_string()));
            }
            build_prompt(mode, Some(param))
        } else {
            build_prompt(mode, None)
        };
        Ok(Prepared {
            source,
            instruction,
            fingerprint,
        })
    }

    fn reset_in_flight(&mut self) {
        if self.is_loading() {
            self.epoch += 1;
        }
        self.phase = SessionPhase::Idle;
    }

    fn record(&self, event: SessionEvent) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit(&event) {
            eprintln!("retouch: event log write failed: {err:#}");
        }
    }
}

fn default_parameters() -> BTreeMap<EditMode, String> {
    EditMode::ALL
        .into_iter()
        .map(|mode| {
            let initial = if mode == EditMode::Stylize {
                StyleOption::NinetiesLook.label().to_string()
            } else {
                String::new()
            };
            (mode, initial)
        })
        .collect()
}

struct Prepared {
    source: ImageFile,
    instruction: String,
    fingerprint: ImageFingerprint,
}

fn fingerprint_source(file: &ImageFile) -> Result<ImageFingerprint, EditError> {
    let (bytes, mime_type) = codec::decode(&file.encoded)
        .map_err(|err| EditError::InvalidImage(format!("{} ({err})", file.name)))?;
    Ok(ImageFingerprint::new(&bytes, &mime_type))
}
