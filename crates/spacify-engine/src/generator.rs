use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::config::GeminiConfig;
use crate::gemini::GeminiGenerator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Room photo first, then the furniture references in selection order.
    pub images: Vec<InlineImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    pub image: Option<GeneratedImage>,
    /// Descriptive text parts returned next to (or instead of) the image.
    pub text: Vec<String>,
    pub provider_request: Map<String, Value>,
    pub provider_response: Map<String, Value>,
}

impl GenerationOutcome {
    pub fn no_image_reason(&self, generator: &str) -> String {
        match self
            .provider_response
            .get("reason")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            Some(reason) => format!("{generator} returned no image: {reason}"),
            None => format!("{generator} returned no image"),
        }
    }
}

/// External image synthesis. One call per visualization; implementations do
/// not retry.
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;
    fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome>;
}

/// Stand-in used when no API key is configured; always defers to the
/// fallback compositor.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

impl ImageGenerator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    fn model(&self) -> &str {
        "none"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        Ok(GenerationOutcome {
            image: None,
            text: Vec::new(),
            provider_request: map_object(json!({
                "endpoint": "offline",
                "images": request.images.len(),
            })),
            provider_response: map_object(json!({
                "reason": "image generation is not configured (set GEMINI_API_KEY)",
            })),
        })
    }
}

pub fn generator_from_config(config: &GeminiConfig) -> Result<Box<dyn ImageGenerator>> {
    match config.api_key.as_deref() {
        Some(api_key) => Ok(Box::new(GeminiGenerator::new(api_key, config)?)),
        None => Ok(Box::new(OfflineGenerator)),
    }
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
