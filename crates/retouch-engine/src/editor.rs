use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::blocking::Client as HttpClient;
use retouch_contracts::codec::{self, EncodedImage, ImageFile};
use retouch_contracts::error::EditError;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::config::EditorConfig;

/// One instruction plus ordered input images in, one image out.
///
/// Implementations issue at most one remote call per invocation and block
/// until it resolves.
pub trait ImageEditor: Send + Sync {
    fn name(&self) -> &str;
    fn edit_image(&self, instruction: &str, images: &[ImageFile])
        -> Result<EncodedImage, EditError>;
}

pub struct GeminiEditor {
    config: EditorConfig,
    http: HttpClient,
}

impl GeminiEditor {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    /// Uses a caller-built client (proxy, TLS or pool settings).
    pub fn with_http_client(config: EditorConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.config.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.config.api_base, model_path)
    }

    fn image_part(image: &ImageFile) -> Result<Value, EditError> {
        let (_, encoded_mime) = codec::decode(&image.encoded)
            .map_err(|err| EditError::InvalidImage(format!("{} ({err})", image.name)))?;
        let data = codec::base64_payload(&image.encoded)
            .map_err(|err| EditError::InvalidImage(format!("{} ({err})", image.name)))?;
        let mime_type = if image.mime_type.trim().is_empty() {
            encoded_mime
        } else {
            image.mime_type.trim().to_string()
        };
        Ok(json!({
            "inlineData": {
                "data": data,
                "mimeType": mime_type,
            }
        }))
    }

    /// Images first, then the instruction, as a single user turn.
    fn build_payload(instruction: &str, images: &[ImageFile]) -> Result<Value, EditError> {
        let mut parts = images
            .iter()
            .map(Self::image_part)
            .collect::<Result<Vec<Value>, EditError>>()?;
        parts.push(json!({ "text": instruction }));
        Ok(json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
            },
        }))
    }

    /// First inline image of the first candidate wins; text parts only
    /// matter when no image came back.
    fn parse_response(payload: &Value) -> Result<EncodedImage, EditError> {
        let parts = payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut texts = Vec::new();
        for part in &parts {
            let inline = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object);
            if let Some(inline) = inline {
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .unwrap_or_default();
                if !data.is_empty() {
                    let mime_type = inline
                        .get("mimeType")
                        .or_else(|| inline.get("mime_type"))
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|value| !value.is_empty())
                        .unwrap_or(codec::DEFAULT_MIME_TYPE);
                    let encoded = codec::encode_base64_payload(data, mime_type);
                    return EncodedImage::parse(encoded.into_string()).map_err(|err| {
                        EditError::RemoteService(format!("model returned an unusable image: {err}"))
                    });
                }
            }
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                texts.push(text);
            }
        }

        let text = texts.concat().trim().to_string();
        let explanation = if text.is_empty() {
            payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
                .map(|reason| format!("Request blocked by the model ({reason})."))
        } else {
            Some(text)
        };
        Err(EditError::NoImageProduced { explanation })
    }
}

impl ImageEditor for GeminiEditor {
    fn name(&self) -> &str {
        "gemini"
    }

    fn edit_image(
        &self,
        instruction: &str,
        images: &[ImageFile],
    ) -> Result<EncodedImage, EditError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(EditError::Configuration(
                "GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string(),
            ));
        };
        let payload = Self::build_payload(instruction, images)?;
        let endpoint = self.endpoint();

        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .timeout(self.config.request_timeout)
            .json(&payload)
            .send()
            .map_err(|err| EditError::RemoteService(error_chain_text(&err, 512)))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| EditError::RemoteService(error_chain_text(&err, 512)))?;
        let response_payload = response_json_or_error(status, &body)?;
        Self::parse_response(&response_payload)
    }
}

/// Offline editor: answers every instruction with a solid-colour PNG derived
/// from the instruction and the input payloads.
#[derive(Debug, Clone)]
pub struct DryrunEditor {
    edge: u32,
}

impl DryrunEditor {
    pub fn new(edge: u32) -> Self {
        Self { edge: edge.max(1) }
    }

    fn color_for(instruction: &str, payloads: &[Vec<u8>]) -> (u8, u8, u8) {
        let mut hasher = Sha256::new();
        hasher.update(instruction.as_bytes());
        for payload in payloads {
            hasher.update(payload);
        }
        let digest = hasher.finalize();
        (digest[0], digest[1], digest[2])
    }
}

impl Default for DryrunEditor {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ImageEditor for DryrunEditor {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn edit_image(
        &self,
        instruction: &str,
        images: &[ImageFile],
    ) -> Result<EncodedImage, EditError> {
        let payloads = images
            .iter()
            .map(|image| {
                codec::decode(&image.encoded)
                    .map(|(bytes, _)| bytes)
                    .map_err(|err| EditError::InvalidImage(format!("{} ({err})", image.name)))
            })
            .collect::<Result<Vec<Vec<u8>>, EditError>>()?;

        let (r, g, b) = Self::color_for(instruction, &payloads);
        let mut canvas = RgbImage::new(self.edge, self.edge);
        for pixel in canvas.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(canvas)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|err| EditError::RemoteService(format!("dryrun render failed: {err}")))?;
        Ok(codec::encode(&png, "image/png"))
    }
}

fn response_json_or_error(status: u16, body: &str) -> Result<Value, EditError> {
    if !(200..300).contains(&status) {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| {
                value
                    .get("error")
                    .and_then(|error| error.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| truncate_text(body.trim(), 512));
        return Err(EditError::RemoteService(format!("HTTP {status}: {detail}")));
    }
    serde_json::from_str(body)
        .map_err(|err| EditError::RemoteService(format!("invalid JSON response: {err}")))
}

fn error_chain_text(err: &(dyn std::error::Error + 'static), max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut cause = Some(err);
    while let Some(current) = cause {
        let text = current.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        cause = current.source();
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use retouch_contracts::codec::{self, ImageFile};
    use retouch_contracts::error::{EditError, NO_IMAGE_FALLBACK_MESSAGE};
    use reqwest::blocking::Client as HttpClient;
    use serde_json::{json, Value};

    use super::{response_json_or_error, DryrunEditor, GeminiEditor, ImageEditor};
    use crate::config::EditorConfig;

    fn photo() -> ImageFile {
        ImageFile::from_bytes(b"source-bytes", "image/jpeg", "photo.jpg").unwrap()
    }

    fn broken_photo() -> ImageFile {
        let mut image = photo();
        image.encoded = codec::encode_base64_payload("@@not-base64@@", "image/jpeg");
        image
    }

    fn local_editor(config: EditorConfig) -> GeminiEditor {
        let http = HttpClient::builder().no_proxy().build().unwrap();
        GeminiEditor::with_http_client(config, http)
    }

    fn closed_port_base() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{port}/v1beta")
    }

    /// Serves exactly one HTTP exchange and hands back the raw request.
    fn serve_once(status: u16, body: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let read = stream.read(&mut buf).unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (key, value) = line.split_once(':')?;
                            key.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (format!("http://127.0.0.1:{port}/v1beta"), handle)
    }

    #[test]
    fn missing_credential_fails_before_network() {
        let editor = local_editor(EditorConfig::default().with_api_base(closed_port_base()));
        let err = editor.edit_image("upscale", &[photo()]).unwrap_err();
        assert!(matches!(err, EditError::Configuration(_)));
    }

    #[test]
    fn invalid_image_fails_before_network() {
        let editor = local_editor(EditorConfig::new("key").with_api_base(closed_port_base()));
        let err = editor
            .edit_image("upscale", &[photo(), broken_photo()])
            .unwrap_err();
        assert!(matches!(err, EditError::InvalidImage(_)), "{err:?}");
    }

    #[test]
    fn transport_failure_maps_to_remote_service_error() {
        let editor = local_editor(EditorConfig::new("key").with_api_base(closed_port_base()));
        let err = editor.edit_image("upscale", &[photo()]).unwrap_err();
        assert!(matches!(err, EditError::RemoteService(_)), "{err:?}");
        assert!(err
            .to_string()
            .starts_with("Failed to communicate with the AI model:"));
    }

    #[test]
    fn payload_puts_images_before_instruction() -> anyhow::Result<()> {
        let payload = GeminiEditor::build_payload("make it pop", &[photo()])?;
        let parts = payload["contents"][0]["parts"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(
            parts[0]["inlineData"]["data"],
            json!(codec::base64_payload(&photo().encoded)?)
        );
        assert_eq!(parts[1]["text"], json!("make it pop"));
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["IMAGE", "TEXT"])
        );
        Ok(())
    }

    #[test]
    fn parse_response_takes_first_inline_image() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Here you go"},
                    {"inlineData": {"mimeType": "image/webp", "data": "Zmlyc3Q="}},
                    {"inline_data": {"mime_type": "image/png", "data": "c2Vjb25k"}},
                ]}
            }]
        });
        let image = GeminiEditor::parse_response(&payload)?;
        assert_eq!(image.as_str(), "data:image/webp;base64,Zmlyc3Q=");
        Ok(())
    }

    #[test]
    fn parse_response_accepts_snake_case_and_defaults_mime() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"inline_data": {"data": "aW1n"}}]}}]
        });
        let image = GeminiEditor::parse_response(&payload)?;
        assert_eq!(codec::decode(&image)?, (b"img".to_vec(), "image/png".to_string()));
        Ok(())
    }

    #[test]
    fn parse_response_without_image_is_soft_failure() {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"text": "content policy violation"}]}}]
        });
        match GeminiEditor::parse_response(&payload) {
            Err(EditError::NoImageProduced { explanation }) => {
                assert_eq!(explanation.as_deref(), Some("content policy violation"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let err = GeminiEditor::parse_response(&json!({})).unwrap_err();
        assert_eq!(err.to_string(), NO_IMAGE_FALLBACK_MESSAGE);

        let blocked = GeminiEditor::parse_response(&json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap_err();
        assert_eq!(blocked.to_string(), "Request blocked by the model (SAFETY).");
    }

    #[test]
    fn non_success_status_maps_to_remote_service_error() {
        let err = response_json_or_error(
            400,
            r#"{"error": {"code": 400, "message": "API key not valid."}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to communicate with the AI model: HTTP 400: API key not valid."
        );

        let err = response_json_or_error(502, "bad gateway").unwrap_err();
        assert!(err.to_string().ends_with("HTTP 502: bad gateway"));

        let err = response_json_or_error(200, "<html>").unwrap_err();
        assert!(matches!(err, EditError::RemoteService(_)));
    }

    #[test]
    fn edit_image_round_trips_through_http() -> anyhow::Result<()> {
        let body = json!({
            "candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png", "data": "cmVzdWx0"}}
            ]}}]
        })
        .to_string();
        let (base, server) = serve_once(200, body);
        let editor = local_editor(EditorConfig::new("test-key").with_api_base(base));

        let image = editor.edit_image("remove the lamp", &[photo()])?;
        assert_eq!(codec::decode(&image)?.0, b"result".to_vec());

        let request = server.join().unwrap();
        assert!(request
            .starts_with("POST /v1beta/models/gemini-2.5-flash-image:generateContent"));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        let body_start = request.find("\r\n\r\n").unwrap_or(0) + 4;
        let sent: Value = serde_json::from_str(&request[body_start..])?;
        assert_eq!(sent["contents"][0]["parts"][1]["text"], json!("remove the lamp"));
        Ok(())
    }

    #[test]
    fn edit_image_surfaces_service_errors() {
        let (base, server) = serve_once(
            503,
            json!({"error": {"message": "The model is overloaded."}}).to_string(),
        );
        let editor = local_editor(EditorConfig::new("test-key").with_api_base(base));
        let err = editor.edit_image("upscale", &[photo()]).unwrap_err();
        server.join().unwrap();
        assert_eq!(
            err.to_string(),
            "Failed to communicate with the AI model: HTTP 503: The model is overloaded."
        );
    }

    #[test]
    fn dryrun_is_deterministic_per_instruction() -> anyhow::Result<()> {
        let editor = DryrunEditor::new(8);
        let first = editor.edit_image("stylize", &[photo()])?;
        let again = editor.edit_image("stylize", &[photo()])?;
        let other = editor.edit_image("upscale", &[photo()])?;
        assert_eq!(first, again);
        assert_ne!(first, other);

        let (bytes, mime) = codec::decode(&first)?;
        assert_eq!(mime, "image/png");
        assert_eq!(&bytes[1..4], b"PNG");

        assert!(matches!(
            editor.edit_image("stylize", &[broken_photo()]),
            Err(EditError::InvalidImage(_))
        ));
        Ok(())
    }
}
