//! Room visualization engine: upload intake, generative restyling with a
//! deterministic compositing fallback, and the service facade tying them to
//! the catalog, project manifests and event log.

pub mod assets;
pub mod compositor;
pub mod config;
pub mod error;
pub mod gemini;
pub mod generator;
pub mod prompt;
pub mod service;
pub mod storage;
pub mod uploads;
pub mod visualizer;

pub use config::{GeminiConfig, SpacifyConfig};
pub use error::SpacifyError;
pub use generator::{
    generator_from_config, GeneratedImage, GenerationOutcome, GenerationRequest, ImageGenerator,
    InlineImage, OfflineGenerator,
};
pub use service::Spacify;
pub use uploads::{RoomImage, UploadDirState, UploadPolicy, UploadStore, UploadedFile};
pub use visualizer::{VisualizationResult, Visualizer};
