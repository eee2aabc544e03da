use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use spacify_contracts::api::{
    uploads_url, VisualizationData, VisualizationRequest, VisualizationSource,
};
use spacify_contracts::events::{EventLevel, EventPayload, EventWriter};
use spacify_contracts::receipts::{build_receipt, write_receipt, ReceiptInputs};
use uuid::Uuid;

use crate::assets::FurnitureAssets;
use crate::compositor::{create_fallback_composite, OverlaySource, Placement, COMPOSITE_PREFIX};
use crate::error::{error_chain_text, SpacifyError};
use crate::generator::{map_object, GenerationOutcome, GenerationRequest, ImageGenerator, InlineImage};
use crate::prompt::build_visualization_prompt;
use crate::storage::{extension_for_mime, mime_for_path, write_unique_output, StoredOutput};
use crate::uploads::{RoomImage, UploadStore};

pub const GENERATED_PREFIX: &str = "styled-room";
pub const MIN_STYLE_CHARS: usize = 3;
pub const MAX_STYLE_CHARS: usize = 500;
pub const MAX_FURNITURE_ITEMS: usize = 10;

#[derive(Debug, Clone)]
pub struct VisualizationResult {
    pub data: VisualizationData,
    pub path: PathBuf,
    pub file_name: String,
    pub sha256: String,
    /// Grid placements; empty for generated images.
    pub placements: Vec<Placement>,
    pub receipt_path: Option<PathBuf>,
}

/// Rejects requests before anything is read or written.
pub fn validate_request(request: &VisualizationRequest) -> Result<(), SpacifyError> {
    let style = request.style_description.trim();
    if style.is_empty() {
        return Err(SpacifyError::input("Style description is required"));
    }
    let style_chars = style.chars().count();
    if style_chars < MIN_STYLE_CHARS {
        return Err(SpacifyError::input(
            "Style description must be at least 3 characters long",
        ));
    }
    if style_chars > MAX_STYLE_CHARS {
        return Err(SpacifyError::input(
            "Style description must be less than 500 characters",
        ));
    }
    if request.furniture_items.is_empty() {
        return Err(SpacifyError::input(
            "At least one furniture item must be selected",
        ));
    }
    if request.furniture_items.len() > MAX_FURNITURE_ITEMS {
        return Err(SpacifyError::input(
            "Maximum 10 furniture items can be selected",
        ));
    }
    if let Some(position) = request.furniture_items.iter().position(|item| {
        item.id.trim().is_empty() || item.name.trim().is_empty() || item.image.trim().is_empty()
    }) {
        return Err(SpacifyError::input(format!(
            "Furniture item {} must have an id, name and image",
            position + 1
        )));
    }
    Ok(())
}

struct LoadedFurniture {
    name: String,
    image: InlineImage,
}

struct Rendered {
    output: StoredOutput,
    source: VisualizationSource,
    model: String,
    placements: Vec<Placement>,
    outcome: GenerationOutcome,
}

/// Runs one visualization: generative restyle first, grid composite when the
/// generator fails or returns no image.
pub struct Visualizer<'a> {
    pub uploads: &'a UploadStore,
    pub assets: &'a FurnitureAssets,
    pub generator: &'a dyn ImageGenerator,
    pub events: &'a EventWriter,
    pub receipts_dir: &'a Path,
}

impl Visualizer<'_> {
    pub fn run(&self, request: &VisualizationRequest) -> Result<VisualizationResult> {
        validate_request(request)?;
        let room = self
            .uploads
            .resolve(request.room_image_id.as_deref().unwrap_or_default())?;
        let room_bytes = std::fs::read(&room.path)
            .with_context(|| format!("failed to read room image {}", room.path.display()))?;
        let style = request.style_description.trim().to_string();
        let started = Instant::now();
        self.events.emit(
            "visualization_started",
            map_object(json!({
                "room_image_id": room.id,
                "style_description": style,
                "furniture_ids": request.furniture_items.iter().map(|item| item.id.as_str()).collect::<Vec<_>>(),
                "generator": self.generator.name(),
            })),
        )?;

        let mut warnings = Vec::new();
        let furniture = self.load_furniture(request, &mut warnings)?;
        if furniture.is_empty() {
            return Err(
                SpacifyError::input("No furniture images could be loaded successfully").into(),
            );
        }

        let names: Vec<&str> = furniture.iter().map(|item| item.name.as_str()).collect();
        let mut images = Vec::with_capacity(furniture.len() + 1);
        images.push(InlineImage {
            mime_type: room.mime_type.clone(),
            bytes: room_bytes,
        });
        images.extend(furniture.iter().map(|item| item.image.clone()));
        let generation_request = GenerationRequest {
            prompt: build_visualization_prompt(&style, &names),
            images,
        };

        let rendered = match self.try_generate(&generation_request) {
            Ok(rendered) => {
                self.log_after_render(
                    EventLevel::Info,
                    "generation_succeeded",
                    map_object(json!({
                        "generator": self.generator.name(),
                        "model": self.generator.model(),
                        "file_name": rendered.output.file_name,
                        "mime_type": mime_for_path(&rendered.output.path),
                        "bytes": rendered.output.size,
                    })),
                    &mut warnings,
                );
                rendered
            }
            Err((primary, outcome)) => {
                let primary_text = error_chain_text(&primary, 1024);
                self.log_after_render(
                    EventLevel::Warn,
                    "generation_failed",
                    map_object(json!({
                        "generator": self.generator.name(),
                        "model": self.generator.model(),
                        "error": primary_text,
                    })),
                    &mut warnings,
                );
                warnings.push(format!("Image generation unavailable: {primary_text}"));
                self.fallback(request, &room, outcome, &primary_text, &mut warnings)?
            }
        };

        let visualization_id = Uuid::new_v4().to_string();
        let mut data = VisualizationData {
            visualization_id: visualization_id.clone(),
            url: uploads_url(&rendered.output.file_name),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            style_description: style,
            furniture_count: request.furniture_items.len(),
            original_room_image: room.url(),
            source: rendered.source,
            model: rendered.model,
            warnings,
        };

        let receipt_path = self.receipts_dir.join(format!("{visualization_id}.json"));
        let receipt = build_receipt(&ReceiptInputs {
            request,
            result: &data,
            provider_request: &rendered.outcome.provider_request,
            model_text: &rendered.outcome.text,
            image_path: &rendered.output.path,
            image_sha256: &rendered.output.sha256,
            receipt_path: &receipt_path,
        });
        let receipt_path = match write_receipt(&receipt_path, &receipt) {
            Ok(()) => Some(receipt_path),
            Err(err) => {
                self.log_after_render(
                    EventLevel::Warn,
                    "receipt_write_failed",
                    map_object(json!({
                        "visualization_id": visualization_id,
                        "error": error_chain_text(&err, 512),
                    })),
                    &mut data.warnings,
                );
                None
            }
        };

        let created = map_object(json!({
            "visualization_id": visualization_id,
            "file_name": rendered.output.file_name,
            "source": data.source.as_str(),
            "model": data.model,
            "furniture_count": data.furniture_count,
            "sha256": rendered.output.sha256,
            "elapsed_ms": started.elapsed().as_millis() as u64,
        }));
        self.log_after_render(
            EventLevel::Info,
            "visualization_created",
            created,
            &mut data.warnings,
        );

        Ok(VisualizationResult {
            data,
            path: rendered.output.path,
            file_name: rendered.output.file_name,
            sha256: rendered.output.sha256,
            placements: rendered.placements,
            receipt_path,
        })
    }

    /// Once generation has been attempted an output may already be on disk,
    /// so event log failures become warnings instead of errors.
    fn log_after_render(
        &self,
        level: EventLevel,
        event_type: &str,
        payload: EventPayload,
        warnings: &mut Vec<String>,
    ) {
        if let Err(err) = self.events.emit_at(level, event_type, payload) {
            warnings.push(format!(
                "Event log write failed for {event_type}: {}",
                error_chain_text(&err, 256)
            ));
        }
    }

    fn load_furniture(
        &self,
        request: &VisualizationRequest,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<LoadedFurniture>> {
        let mut loaded = Vec::new();
        for item in &request.furniture_items {
            let path = self.assets.resolve(&item.image);
            match std::fs::read(&path) {
                Ok(bytes) => loaded.push(LoadedFurniture {
                    name: item.name.trim().to_string(),
                    image: InlineImage {
                        mime_type: mime_for_path(&path).unwrap_or("image/png").to_string(),
                        bytes,
                    },
                }),
                Err(err) => {
                    self.events.warn(
                        "furniture_skipped",
                        map_object(json!({
                            "furniture_id": item.id,
                            "name": item.name,
                            "path": path.to_string_lossy(),
                            "error": err.to_string(),
                        })),
                    )?;
                    warnings.push(format!("Skipped furniture image for {}", item.name.trim()));
                }
            }
        }
        Ok(loaded)
    }

    /// One generator call; the error side carries whatever the generator
    /// returned so the receipt can still describe the attempt.
    fn try_generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<Rendered, (anyhow::Error, GenerationOutcome)> {
        let outcome = match self.generator.generate(request) {
            Ok(outcome) => outcome,
            Err(err) => return Err((err, GenerationOutcome::default())),
        };
        let Some(image) = outcome.image.as_ref() else {
            let reason = outcome.no_image_reason(self.generator.name());
            return Err((anyhow::anyhow!(reason), outcome));
        };
        let ext = image
            .mime_type
            .as_deref()
            .and_then(extension_for_mime)
            .unwrap_or("jpg");
        let output =
            match write_unique_output(self.uploads.dir(), GENERATED_PREFIX, ext, &image.bytes) {
                Ok(output) => output,
                Err(err) => return Err((err, outcome)),
            };
        Ok(Rendered {
            output,
            source: VisualizationSource::Generated,
            model: self.generator.model().to_string(),
            placements: Vec::new(),
            outcome,
        })
    }

    fn fallback(
        &self,
        request: &VisualizationRequest,
        room: &RoomImage,
        outcome: GenerationOutcome,
        primary_text: &str,
        warnings: &mut Vec<String>,
    ) -> Result<Rendered> {
        // Every requested item keeps its grid cell, readable or not.
        let overlays: Vec<OverlaySource> = request
            .furniture_items
            .iter()
            .enumerate()
            .map(|(index, item)| OverlaySource {
                index,
                name: item.name.trim().to_string(),
                path: self.assets.resolve(&item.image),
            })
            .collect();

        let composite = match create_fallback_composite(&room.path, &overlays, self.uploads.dir()) {
            Ok(composite) => composite,
            Err(fallback_err) => {
                let fallback_text = error_chain_text(&fallback_err, 1024);
                let failure = SpacifyError::generation(format!(
                    "Both image generation and fallback composite failed. Original error: {primary_text} (fallback error: {fallback_text})"
                ));
                // The typed failure stays in the chain when the log write also fails.
                if let Err(log_err) = self.events.error(
                    "visualization_failed",
                    map_object(json!({
                        "room_image_id": room.id,
                        "generation_error": primary_text,
                        "fallback_error": fallback_text,
                    })),
                ) {
                    return Err(anyhow::Error::new(failure).context(format!(
                        "event log write failed: {}",
                        error_chain_text(&log_err, 256)
                    )));
                }
                return Err(failure.into());
            }
        };

        for skipped in &composite.skipped {
            warnings.push(format!(
                "Fallback composite skipped {}: {}",
                skipped.name, skipped.reason
            ));
        }
        self.log_after_render(
            EventLevel::Info,
            "fallback_composite_created",
            map_object(json!({
                "file_name": composite.output.file_name,
                "width": composite.width,
                "height": composite.height,
                "placed": composite.placements.len(),
                "skipped": composite.skipped.len(),
            })),
            warnings,
        );
        Ok(Rendered {
            output: composite.output,
            source: VisualizationSource::FallbackComposite,
            model: COMPOSITE_PREFIX.to_string(),
            placements: composite.placements,
            outcome,
        })
    }
}
