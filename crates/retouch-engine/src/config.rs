use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

const DEFAULT_TIMEOUT_S: f64 = 90.0;
const MIN_TIMEOUT_S: f64 = 15.0;
const MAX_TIMEOUT_S: f64 = 300.0;

/// Connection settings for the remote editor, passed in explicitly so that
/// nothing below the CLI reads the process environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            request_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_S),
        }
    }
}

impl EditorConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::default().with_api_key(Some(api_key.into()))
    }

    /// `GEMINI_API_KEY` (or `GOOGLE_API_KEY`), `GEMINI_API_BASE`,
    /// `RETOUCH_IMAGE_MODEL`, `RETOUCH_REQUEST_TIMEOUT`.
    pub fn from_env() -> Self {
        let api_key = non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"));
        let mut config = Self::default().with_api_key(api_key);
        if let Some(base) = non_empty_env("GEMINI_API_BASE") {
            config = config.with_api_base(base);
        }
        if let Some(model) = non_empty_env("RETOUCH_IMAGE_MODEL") {
            config = config.with_model(model);
        }
        if let Some(timeout) = non_empty_env("RETOUCH_REQUEST_TIMEOUT") {
            config.request_timeout = timeout_from_text(&timeout);
        }
        config
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let normalized = api_base.into().trim().trim_end_matches('/').to_string();
        if !normalized.is_empty() {
            self.api_base = normalized;
        }
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into().trim().to_string();
        if !model.is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = clamp_timeout(timeout.as_secs_f64());
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn timeout_from_text(raw: &str) -> Duration {
    let seconds = raw.trim().parse::<f64>().unwrap_or(DEFAULT_TIMEOUT_S);
    clamp_timeout(seconds)
}

fn clamp_timeout(seconds: f64) -> Duration {
    let seconds = if seconds.is_finite() {
        seconds.clamp(MIN_TIMEOUT_S, MAX_TIMEOUT_S)
    } else {
        DEFAULT_TIMEOUT_S
    };
    Duration::from_secs_f64(seconds)
}
