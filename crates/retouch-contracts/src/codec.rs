//! Self-describing image strings (`data:<mime>;base64,<payload>`) and the
//! image files built from them.

use std::fmt;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::EditError;

pub const DEFAULT_MIME_TYPE: &str = "image/png";
pub const EDITED_IMAGE_NAME: &str = "edited_image.png";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Validates `raw` before wrapping it.
    pub fn parse(raw: impl Into<String>) -> Result<Self, EditError> {
        let image = Self(raw.into());
        decode(&image)?;
        Ok(image)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for EncodedImage {
    type Error = EditError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<EncodedImage> for String {
    fn from(image: EncodedImage) -> Self {
        image.0
    }
}

impl fmt::Display for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn encode(bytes: &[u8], mime_type: &str) -> EncodedImage {
    EncodedImage(format!("data:{mime_type};base64,{}", BASE64.encode(bytes)))
}

/// Wraps a payload that is already base64 text, as returned by the model.
/// The payload is not checked; run the result through [`decode`] or
/// [`EncodedImage::parse`] before trusting it.
pub fn encode_base64_payload(payload: &str, mime_type: &str) -> EncodedImage {
    EncodedImage(format!("data:{mime_type};base64,{}", payload.trim()))
}

fn split(encoded: &str) -> Result<(&str, &str), EditError> {
    let Some(rest) = encoded.strip_prefix("data:") else {
        return Err(EditError::InvalidEncoding(
            "missing data: scheme prefix".to_string(),
        ));
    };
    let Some((header, payload)) = rest.split_once(',') else {
        return Err(EditError::InvalidEncoding(
            "missing comma separator".to_string(),
        ));
    };
    let base64_marked = header
        .split(';')
        .skip(1)
        .any(|param| param.trim().eq_ignore_ascii_case("base64"));
    if !base64_marked {
        return Err(EditError::InvalidEncoding(
            "missing ;base64 marker".to_string(),
        ));
    }
    if payload.trim().is_empty() {
        return Err(EditError::InvalidEncoding("missing payload".to_string()));
    }
    Ok((header, payload))
}

pub fn decode(encoded: &EncodedImage) -> Result<(Vec<u8>, String), EditError> {
    let (header, payload) = split(encoded.as_str())?;
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .map_err(|err| EditError::InvalidEncoding(format!("payload is not base64: {err}")))?;
    Ok((bytes, mime_from_header(header)))
}

/// The raw base64 text after the comma, used verbatim in request bodies.
pub fn base64_payload(encoded: &EncodedImage) -> Result<&str, EditError> {
    split(encoded.as_str()).map(|(_, payload)| payload.trim())
}

/// Lenient: anything unparseable reports `image/png`.
pub fn mime_type_of(encoded: &EncodedImage) -> String {
    let raw = encoded.as_str();
    let Some(rest) = raw.strip_prefix("data:") else {
        return DEFAULT_MIME_TYPE.to_string();
    };
    let header = rest.split(',').next().unwrap_or_default();
    mime_from_header(header)
}

fn mime_from_header(header: &str) -> String {
    let mime = header.split(';').next().unwrap_or_default().trim();
    if mime.is_empty() || !mime.contains('/') {
        DEFAULT_MIME_TYPE.to_string()
    } else {
        mime.to_ascii_lowercase()
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    "png"
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    pub encoded: EncodedImage,
    pub mime_type: String,
    pub name: String,
}

impl ImageFile {
    pub fn from_bytes(
        bytes: &[u8],
        mime_type: &str,
        name: impl Into<String>,
    ) -> Result<Self, EditError> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(EditError::UnsupportedFileType(mime_type));
        }
        Ok(Self {
            encoded: encode(bytes, &mime_type),
            mime_type,
            name: name.into(),
        })
    }

    /// Promotes a generated image to a file; name and MIME type are synthesized.
    pub fn from_encoded(encoded: EncodedImage) -> Self {
        let mime_type = mime_type_of(&encoded);
        Self {
            encoded,
            mime_type,
            name: EDITED_IMAGE_NAME.to_string(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, EditError> {
        let Some(mime_type) = mime_for_path(path) else {
            let ext = path
                .extension()
                .and_then(|value| value.to_str())
                .unwrap_or("unknown");
            return Err(EditError::UnsupportedFileType(ext.to_string()));
        };
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| EDITED_IMAGE_NAME.to_string());
        Self::from_bytes(&bytes, mime_type, name)
    }

    /// Writes the decoded payload; returns the number of bytes written.
    pub fn save(&self, path: &Path) -> Result<usize, EditError> {
        let (bytes, _) = decode(&self.encoded)?;
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &bytes)?;
        Ok(bytes.len())
    }
}
