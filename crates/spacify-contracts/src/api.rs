//! Request and response shapes shared by every entry point.
//!
//! Field names follow the JSON contract the web frontend speaks
//! (`styleDescription`, `furnitureItems`, ...), so the same payloads can be
//! fed to the CLI with `--request` or served over HTTP by an outer layer.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    NotFound,
    Generation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::NotFound => "not_found",
            Self::Generation => "generation",
            Self::Internal => "internal",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            Self::Input => 400,
            Self::NotFound => 404,
            Self::Generation | Self::Internal => 500,
        }
    }
}

/// Outcome envelope. Serializes to `{success, message, data}` on success and
/// `{success, message, error}` on failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Success { message: String, data: T },
    Failure { message: String, kind: ErrorKind },
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self::Success {
            message: message.into(),
            data,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            kind,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Success { message, .. } | Self::Failure { message, .. } => message,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Success { .. } => 200,
            Self::Failure { kind, .. } => kind.http_status(),
        }
    }
}

impl<T: Serialize> Serialize for ApiResponse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        match self {
            Self::Success { message, data } => {
                map.serialize_entry("success", &true)?;
                map.serialize_entry("message", message)?;
                map.serialize_entry("data", data)?;
            }
            Self::Failure { message, kind } => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("message", message)?;
                map.serialize_entry("error", kind)?;
            }
        }
        map.end()
    }
}

/// A furniture piece as selected by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FurnitureSelection {
    pub id: String,
    pub name: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationRequest {
    #[serde(default)]
    pub room_image_id: Option<String>,
    #[serde(default)]
    pub style_description: String,
    #[serde(default)]
    pub furniture_items: Vec<FurnitureSelection>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationSource {
    Generated,
    FallbackComposite,
}

impl VisualizationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::FallbackComposite => "fallback_composite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationData {
    pub visualization_id: String,
    pub url: String,
    pub generated_at: String,
    pub style_description: String,
    pub furniture_count: usize,
    pub original_room_image: String,
    pub source: VisualizationSource,
    pub model: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub image_id: String,
    pub filename: String,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub uploads: String,
    pub generator: String,
    pub generator_model: String,
    pub api_key_configured: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub services: ServiceHealth,
}

/// Public URL path for a file stored in the uploads directory.
pub fn uploads_url(file_name: &str) -> String {
    format!("/uploads/{file_name}")
}
