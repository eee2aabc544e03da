use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const DEFAULT_UPLOAD_PATH: &str = "uploads";
pub const DEFAULT_MAX_FILE_SIZE: u64 = 15 * 1024 * 1024;
pub const DEFAULT_ALLOWED_FILE_TYPES: &str = "image/jpeg,image/png,image/webp,image/heic";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-preview-image-generation";
pub const DEFAULT_FURNITURE_ROOT: &str = "../frontend";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_EVENTS_PATH: &str = "logs/events.jsonl";

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    /// `None` leaves the request unbounded.
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            request_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpacifyConfig {
    pub uploads_dir: PathBuf,
    pub max_file_size: u64,
    pub allowed_mime_types: Vec<String>,
    pub gemini: GeminiConfig,
    pub furniture_root: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub events_path: PathBuf,
}

impl Default for SpacifyConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from(DEFAULT_UPLOAD_PATH),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_mime_types: parse_mime_list(DEFAULT_ALLOWED_FILE_TYPES),
            gemini: GeminiConfig::default(),
            furniture_root: PathBuf::from(DEFAULT_FURNITURE_ROOT),
            catalog_path: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            events_path: PathBuf::from(DEFAULT_EVENTS_PATH),
        }
    }
}

impl SpacifyConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup; blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = get("UPLOAD_PATH") {
            config.uploads_dir = PathBuf::from(path);
        }
        if let Some(raw) = get("MAX_FILE_SIZE") {
            config.max_file_size = raw
                .parse::<u64>()
                .with_context(|| format!("MAX_FILE_SIZE must be a byte count, got '{raw}'"))?;
            if config.max_file_size == 0 {
                bail!("MAX_FILE_SIZE must be greater than zero");
            }
        }
        if let Some(raw) = get("ALLOWED_FILE_TYPES") {
            let parsed = parse_mime_list(&raw);
            if parsed.is_empty() {
                bail!("ALLOWED_FILE_TYPES must list at least one MIME type");
            }
            config.allowed_mime_types = parsed;
        }

        config.gemini.api_key = get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY"));
        if let Some(base) = get("GEMINI_API_BASE") {
            config.gemini.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("GEMINI_MODEL") {
            config.gemini.model = model;
        }
        if let Some(raw) = get("SPACIFY_GEMINI_TIMEOUT_SECS") {
            let seconds = raw.parse::<f64>().with_context(|| {
                format!("SPACIFY_GEMINI_TIMEOUT_SECS must be a number, got '{raw}'")
            })?;
            if !seconds.is_finite() || seconds <= 0.0 {
                bail!("SPACIFY_GEMINI_TIMEOUT_SECS must be positive");
            }
            config.gemini.request_timeout = Some(Duration::from_secs_f64(seconds));
        }

        if let Some(path) = get("SPACIFY_FURNITURE_ROOT") {
            config.furniture_root = PathBuf::from(path);
        }
        config.catalog_path = get("SPACIFY_CATALOG_PATH").map(PathBuf::from);
        if let Some(path) = get("SPACIFY_DATA_DIR") {
            config.data_dir = PathBuf::from(path);
        }
        if let Some(path) = get("SPACIFY_EVENTS_PATH") {
            config.events_path = PathBuf::from(path);
        }
        Ok(config)
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.data_dir.join("receipts")
    }
}

fn parse_mime_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}
