use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Map, Value};

use crate::config::GeminiConfig;
use crate::error::truncate_text;
use crate::generator::{
    map_object, GeneratedImage, GenerationOutcome, GenerationRequest, ImageGenerator,
};

pub struct GeminiGenerator {
    api_base: String,
    api_key: String,
    model: String,
    http: HttpClient,
}

impl GeminiGenerator {
    pub fn new(api_key: &str, config: &GeminiConfig) -> Result<Self> {
        // `None` disables the blocking client's 30s default.
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Gemini HTTP client setup failed")?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.trim().to_string(),
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &GenerationRequest) -> Map<String, Value> {
        let mut parts = vec![json!({ "text": request.prompt })];
        for image in &request.images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": BASE64.encode(&image.bytes),
                }
            }));
        }
        map_object(json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        }))
    }

    /// First inline image across all candidates, in response order.
    fn extract_first_image(response_payload: &Value) -> Result<Option<GeneratedImage>> {
        for part in response_parts(response_payload) {
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = BASE64
                .decode(data.as_bytes())
                .context("Gemini image base64 decode failed")?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .map(str::to_string);
            return Ok(Some(GeneratedImage { bytes, mime_type }));
        }
        Ok(None)
    }

    fn extract_text_parts(response_payload: &Value) -> Vec<String> {
        response_parts(response_payload)
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Parts of the first candidate only; later candidates are ignored.
fn response_parts(response_payload: &Value) -> impl Iterator<Item = &Value> {
    response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

impl ImageGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let endpoint = self.endpoint_for_model(&self.model);
        let payload = Self::build_payload(request);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        let image = Self::extract_first_image(&response_payload)?;
        let text = Self::extract_text_parts(&response_payload);

        let finish_reason = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("finishReason"))
            .cloned()
            .unwrap_or(Value::Null);
        let reason = if image.is_none() {
            text.first()
                .cloned()
                .unwrap_or_else(|| "response contained no inline image data".to_string())
        } else {
            String::new()
        };

        Ok(GenerationOutcome {
            provider_request: map_object(json!({
                "endpoint": endpoint,
                "model": self.model,
                "images": request.images.len(),
                "prompt_chars": request.prompt.chars().count(),
            })),
            provider_response: map_object(json!({
                "finish_reason": finish_reason,
                "image_mime_type": image.as_ref().and_then(|item| item.mime_type.clone()),
                "text_parts": text.len(),
                "reason": reason,
            })),
            image,
            text,
        })
    }
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde_json::{json, Value};

    use super::GeminiGenerator;
    use crate::config::GeminiConfig;
    use crate::generator::{GenerationRequest, ImageGenerator, InlineImage};

    fn sample_request() -> GenerationRequest {
        GenerationRequest {
            prompt: "Restyle this room".to_string(),
            images: vec![
                InlineImage {
                    mime_type: "image/jpeg".to_string(),
                    bytes: vec![1, 2, 3],
                },
                InlineImage {
                    mime_type: "image/png".to_string(),
                    bytes: vec![4, 5],
                },
            ],
        }
    }

    /// Serves exactly one HTTP response and hands back the request body.
    fn one_shot_server(status: &'static str, body: String) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("header");
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    break;
                }
                if let Some((name, value)) = trimmed.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().expect("length");
                    }
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).expect("body");
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .expect("respond");
            String::from_utf8(request_body).expect("utf8")
        });
        (format!("http://{addr}/v1beta"), handle)
    }

    fn generator_for(api_base: &str) -> anyhow::Result<GeminiGenerator> {
        let config = GeminiConfig {
            api_key: Some("test-key".to_string()),
            api_base: api_base.to_string(),
            ..GeminiConfig::default()
        };
        GeminiGenerator::new("test-key", &config)
    }

    #[test]
    fn endpoint_accepts_bare_and_prefixed_models() -> anyhow::Result<()> {
        let generator = generator_for("https://example.test/v1beta/")?;
        assert_eq!(
            generator.endpoint_for_model("gemini-x"),
            "https://example.test/v1beta/models/gemini-x:generateContent"
        );
        assert_eq!(
            generator.endpoint_for_model("models/gemini-x"),
            "https://example.test/v1beta/models/gemini-x:generateContent"
        );
        Ok(())
    }

    #[test]
    fn payload_puts_prompt_before_images() {
        let payload = Value::Object(GeminiGenerator::build_payload(&sample_request()));
        let parts = payload["contents"][0]["parts"].as_array().cloned().unwrap_or_default();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["text"], "Restyle this room");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], BASE64.encode([1u8, 2, 3]));
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/png");
        assert_eq!(
            payload["generationConfig"]["responseModalities"],
            json!(["TEXT", "IMAGE"])
        );
    }

    #[test]
    fn first_inline_image_wins() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Here is the room." },
                    { "inline_data": { "mime_type": "image/png", "data": BASE64.encode([9u8, 9]) } },
                    { "inlineData": { "mimeType": "image/jpeg", "data": BASE64.encode([7u8]) } }
                ]}
            }]
        });
        let image = GeminiGenerator::extract_first_image(&response)?
            .ok_or_else(|| anyhow::anyhow!("expected an image"))?;
        assert_eq!(image.bytes, vec![9, 9]);
        assert_eq!(image.mime_type.as_deref(), Some("image/png"));
        assert_eq!(
            GeminiGenerator::extract_text_parts(&response),
            vec!["Here is the room.".to_string()]
        );
        Ok(())
    }

    #[test]
    fn only_the_first_candidate_is_read() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "No edit possible." }] } },
                { "content": { "parts": [
                    { "text": "Alternate take." },
                    { "inlineData": { "mimeType": "image/png", "data": BASE64.encode([5u8]) } }
                ]}}
            ]
        });
        assert!(GeminiGenerator::extract_first_image(&response)?.is_none());
        assert_eq!(
            GeminiGenerator::extract_text_parts(&response),
            vec!["No edit possible.".to_string()]
        );

        let empty_first = json!({
            "candidates": [
                {},
                { "content": { "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": BASE64.encode([5u8]) } }
                ]}}
            ]
        });
        assert!(GeminiGenerator::extract_first_image(&empty_first)?.is_none());
        Ok(())
    }

    #[test]
    fn text_only_response_has_no_image() -> anyhow::Result<()> {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "I cannot edit this photo." }] } }]
        });
        assert!(GeminiGenerator::extract_first_image(&response)?.is_none());
        assert!(GeminiGenerator::extract_first_image(&json!({}))?.is_none());
        Ok(())
    }

    #[test]
    fn invalid_base64_is_an_error() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "inlineData": { "data": "***" } }] } }]
        });
        let err = GeminiGenerator::extract_first_image(&response).expect_err("decode should fail");
        assert!(format!("{err:#}").contains("Gemini image base64 decode failed"));
    }

    #[test]
    fn generate_round_trips_through_http() -> anyhow::Result<()> {
        let body = json!({
            "candidates": [{
                "finishReason": "STOP",
                "content": { "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": BASE64.encode([1u8, 2, 3, 4]) } }
                ]}
            }]
        })
        .to_string();
        let (api_base, server) = one_shot_server("200 OK", body);
        let generator = generator_for(&api_base)?;

        let outcome = generator.generate(&sample_request())?;
        let image = outcome.image.ok_or_else(|| anyhow::anyhow!("expected an image"))?;
        assert_eq!(image.bytes, vec![1, 2, 3, 4]);
        assert_eq!(outcome.provider_response["finish_reason"], "STOP");

        let sent: Value = serde_json::from_str(&server.join().expect("server thread"))?;
        assert_eq!(sent["contents"][0]["parts"].as_array().map(Vec::len), Some(3));
        Ok(())
    }

    #[test]
    fn http_failure_surfaces_status_and_body() -> anyhow::Result<()> {
        let (api_base, server) = one_shot_server(
            "429 Too Many Requests",
            json!({ "error": { "message": "quota exhausted" } }).to_string(),
        );
        let generator = generator_for(&api_base)?;

        let err = generator
            .generate(&sample_request())
            .expect_err("quota error should fail");
        let text = format!("{err:#}");
        assert!(text.contains("Gemini request failed (429)"));
        assert!(text.contains("quota exhausted"));
        server.join().expect("server thread");
        Ok(())
    }
}
