use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde_json::json;
use spacify_contracts::api::{HealthData, ServiceHealth, VisualizationRequest};
use spacify_contracts::catalog::FurnitureCatalog;
use spacify_contracts::events::EventWriter;
use spacify_contracts::projects::{ProjectListing, ProjectManifest, ProjectStatus, ProjectStore};
use uuid::Uuid;

use crate::assets::FurnitureAssets;
use crate::config::SpacifyConfig;
use crate::error::{error_chain_text, SpacifyError};
use crate::generator::{generator_from_config, map_object, ImageGenerator};
use crate::uploads::{RoomImage, UploadPolicy, UploadStore, UploadedFile};
use crate::visualizer::{validate_request, VisualizationResult, Visualizer};

const PROJECT_NOT_FOUND: &str = "Project not found";
const MAX_PROJECT_NAME_CHARS: usize = 100;
const MAX_PROJECT_DESCRIPTION_CHARS: usize = 500;

/// Everything one process needs to serve uploads, visualizations, the
/// catalog and projects. Built once and passed to callers explicitly.
pub struct Spacify {
    config: SpacifyConfig,
    events: EventWriter,
    uploads: UploadStore,
    assets: FurnitureAssets,
    catalog: FurnitureCatalog,
    projects: ProjectStore,
    receipts_dir: PathBuf,
    generator: Box<dyn ImageGenerator>,
}

impl Spacify {
    pub fn new(
        config: SpacifyConfig,
        generator: Box<dyn ImageGenerator>,
        events: EventWriter,
    ) -> Result<Self> {
        let catalog = match config.catalog_path.as_deref() {
            Some(path) => FurnitureCatalog::from_json_file(path)?,
            None => FurnitureCatalog::default(),
        };
        Ok(Self {
            uploads: UploadStore::new(&config.uploads_dir, UploadPolicy::from_config(&config)),
            assets: FurnitureAssets::new(&config.furniture_root),
            projects: ProjectStore::new(config.projects_dir()),
            receipts_dir: config.receipts_dir(),
            catalog,
            events,
            generator,
            config,
        })
    }

    pub fn from_config(config: SpacifyConfig) -> Result<Self> {
        let generator = generator_from_config(&config.gemini)?;
        let events = EventWriter::new(&config.events_path, Uuid::new_v4().to_string());
        Self::new(config, generator, events)
    }

    pub fn config(&self) -> &SpacifyConfig {
        &self.config
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn catalog(&self) -> &FurnitureCatalog {
        &self.catalog
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    pub fn generator(&self) -> &dyn ImageGenerator {
        self.generator.as_ref()
    }

    /// Stores a room photo and, when a project is named, makes it that
    /// project's room.
    pub fn upload_room_image(
        &self,
        upload: &UploadedFile,
        project_id: Option<&str>,
    ) -> Result<RoomImage> {
        let mut project = project_id
            .map(|id| self.load_project(id))
            .transpose()?;

        let room = match self.uploads.accept(upload) {
            Ok(room) => room,
            Err(err) => {
                if let Err(log_err) = self.events.warn(
                    "upload_rejected",
                    map_object(json!({
                        "original_name": upload.original_name,
                        "mime_type": upload.mime_type,
                        "size": upload.bytes.len(),
                        "error": error_chain_text(&err, 512),
                    })),
                ) {
                    return Err(err.context(format!(
                        "event log write failed: {}",
                        error_chain_text(&log_err, 256)
                    )));
                }
                return Err(err);
            }
        };
        // An upload nobody logged is not kept.
        if let Err(log_err) = self.events.emit(
            "upload_accepted",
            map_object(json!({
                "image_id": room.id,
                "original_name": upload.original_name,
                "mime_type": room.mime_type,
                "size": room.size,
            })),
        ) {
            let _ = std::fs::remove_file(&room.path);
            return Err(log_err.context("upload_accepted event could not be recorded"));
        }

        if let Some(project) = project.as_mut() {
            project.attach_room(&room.id);
            self.save_project(project, "room_attached")?;
        }
        Ok(room)
    }

    /// Runs one visualization. With a project, the request may omit the room
    /// (the project's room is used) and the outcome is recorded on the
    /// project manifest.
    pub fn visualize(
        &self,
        request: &VisualizationRequest,
        project_id: Option<&str>,
    ) -> Result<VisualizationResult> {
        let Some(project_id) = project_id else {
            return self.visualizer().run(request);
        };
        let mut project = self.load_project(project_id)?;
        let mut request = request.clone();
        if request.room_image_id.is_none() {
            request.room_image_id = project.room_image_id.clone();
        }
        validate_request(&request)?;
        if let Some(room_id) = request.room_image_id.as_deref() {
            if project.room_image_id.as_deref() != Some(room_id) {
                project.attach_room(room_id);
            }
        }
        project.set_status(ProjectStatus::Processing);
        self.save_project(&project, "processing")?;

        match self.visualizer().run(&request) {
            Ok(result) => {
                let furniture_ids = request
                    .furniture_items
                    .iter()
                    .map(|item| item.id.clone())
                    .collect();
                project.record_visualization(&result.data, furniture_ids);
                self.save_project(&project, "visualization_recorded")?;
                Ok(result)
            }
            Err(err) => {
                project.set_status(ProjectStatus::Failed);
                self.save_project(&project, "failed")?;
                Err(err)
            }
        }
    }

    pub fn create_project(
        &self,
        name: &str,
        style_description: &str,
        description: Option<String>,
    ) -> Result<ProjectManifest> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SpacifyError::input("Project name is required").into());
        }
        if name.chars().count() > MAX_PROJECT_NAME_CHARS {
            return Err(SpacifyError::input(
                "Project name must be at most 100 characters",
            )
            .into());
        }
        if style_description.trim().is_empty() {
            return Err(SpacifyError::input("Style description is required").into());
        }
        let description = description
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        if description
            .as_deref()
            .is_some_and(|text| text.chars().count() > MAX_PROJECT_DESCRIPTION_CHARS)
        {
            return Err(SpacifyError::input(
                "Project description must be at most 500 characters",
            )
            .into());
        }

        let project = self
            .projects
            .create(name, style_description, description)
            .context("failed to create project")?;
        self.events.emit(
            "project_created",
            map_object(json!({
                "project_id": project.project_id,
                "name": project.name,
                "style_description": project.style_description,
            })),
        )?;
        Ok(project)
    }

    pub fn load_project(&self, project_id: &str) -> Result<ProjectManifest> {
        let trimmed = project_id.trim();
        if trimmed.is_empty() || trimmed.contains(['/', '\\']) || trimmed.contains("..") {
            return Err(SpacifyError::not_found(PROJECT_NOT_FOUND).into());
        }
        self.projects
            .load(trimmed)?
            .ok_or_else(|| SpacifyError::not_found(PROJECT_NOT_FOUND).into())
    }

    pub fn list_projects(&self) -> Result<ProjectListing> {
        let listing = self.projects.list()?;
        for unreadable in &listing.unreadable {
            self.events.warn(
                "project_unreadable",
                map_object(json!({
                    "path": unreadable.path.to_string_lossy(),
                    "error": unreadable.error,
                })),
            )?;
        }
        Ok(listing)
    }

    pub fn health(&self) -> HealthData {
        let uploads = self.uploads.dir_state();
        HealthData {
            status: if uploads.is_usable() { "healthy" } else { "degraded" }.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            version: env!("CARGO_PKG_VERSION").to_string(),
            services: ServiceHealth {
                uploads: uploads.as_str().to_string(),
                generator: self.generator.name().to_string(),
                generator_model: self.generator.model().to_string(),
                api_key_configured: self.config.gemini.api_key.is_some(),
            },
        }
    }

    fn visualizer(&self) -> Visualizer<'_> {
        Visualizer {
            uploads: &self.uploads,
            assets: &self.assets,
            generator: self.generator.as_ref(),
            events: &self.events,
            receipts_dir: &self.receipts_dir,
        }
    }

    fn save_project(&self, project: &ProjectManifest, change: &str) -> Result<()> {
        project.save()?;
        self.events.emit(
            "project_updated",
            map_object(json!({
                "project_id": project.project_id,
                "change": change,
                "status": project.status,
                "room_image_id": project.room_image_id,
                "visualizations": project.visualizations.len(),
            })),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use spacify_contracts::api::{ErrorKind, VisualizationRequest, VisualizationSource};
    use spacify_contracts::catalog::CatalogFilter;
    use spacify_contracts::events::EventWriter;
    use spacify_contracts::projects::ProjectStatus;

    use super::Spacify;
    use crate::config::SpacifyConfig;
    use crate::error::SpacifyError;
    use crate::generator::OfflineGenerator;
    use crate::uploads::UploadedFile;

    fn service(root: &std::path::Path) -> anyhow::Result<Spacify> {
        let config = SpacifyConfig {
            uploads_dir: root.join("uploads"),
            furniture_root: root.join("frontend"),
            data_dir: root.join("data"),
            events_path: root.join("events.jsonl"),
            ..SpacifyConfig::default()
        };
        let events = EventWriter::new(&config.events_path, "service-test");
        Spacify::new(config, Box::new(OfflineGenerator), events)
    }

    fn room_upload() -> anyhow::Result<UploadedFile> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(600, 300, Rgb([200, 200, 200]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(UploadedFile {
            original_name: "room.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes,
        })
    }

    fn seed_catalog_asset(root: &std::path::Path, image_ref: &str) -> anyhow::Result<()> {
        let path = root
            .join("frontend")
            .join("public")
            .join(image_ref.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        RgbaImage::from_pixel(40, 40, Rgba([120, 80, 40, 255])).save(path)?;
        Ok(())
    }

    fn kind_of(err: anyhow::Error) -> ErrorKind {
        SpacifyError::from_anyhow(err).kind
    }

    #[test]
    fn project_visualization_uses_project_room_and_records_history() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let spacify = service(temp.path())?;
        let project = spacify.create_project("Loft", "Industrial", None)?;
        let room = spacify.upload_room_image(&room_upload()?, Some(project.project_id.as_str()))?;

        let sofa = spacify
            .catalog()
            .list(&CatalogFilter {
                category: Some("living".to_string()),
                search: None,
            })
            .into_iter()
            .find(|item| item.image.starts_with('/'))
            .ok_or_else(|| anyhow::anyhow!("catalog has no public living-room item"))?;
        seed_catalog_asset(temp.path(), &sofa.image)?;

        let request = VisualizationRequest {
            room_image_id: None,
            style_description: "Scandinavian".to_string(),
            furniture_items: vec![sofa.selection()],
        };
        let result = spacify.visualize(&request, Some(project.project_id.as_str()))?;
        assert_eq!(result.data.source, VisualizationSource::FallbackComposite);
        assert_eq!(result.data.original_room_image, room.url());

        let stored = spacify.load_project(&project.project_id)?;
        assert_eq!(stored.status, ProjectStatus::Completed);
        assert_eq!(stored.room_image_id.as_deref(), Some(room.id.as_str()));
        assert_eq!(stored.style_description, "Scandinavian");
        let entry = stored
            .latest_visualization()
            .ok_or_else(|| anyhow::anyhow!("visualization not recorded"))?;
        assert_eq!(entry.visualization_id, result.data.visualization_id);
        assert_eq!(entry.furniture_ids, vec![sofa.id.clone()]);
        Ok(())
    }

    #[test]
    fn failed_project_visualization_marks_project_failed() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let spacify = service(temp.path())?;
        let project = spacify.create_project("Den", "Bohemian", Some("reading nook".to_string()))?;
        let broken = UploadedFile {
            original_name: "room.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: b"not really a png".to_vec(),
        };
        spacify.upload_room_image(&broken, Some(project.project_id.as_str()))?;
        seed_catalog_asset(temp.path(), "/furniture/rug.png")?;

        let request = VisualizationRequest {
            room_image_id: None,
            style_description: "Bohemian".to_string(),
            furniture_items: vec![spacify_contracts::api::FurnitureSelection {
                id: "rug".to_string(),
                name: "Rug".to_string(),
                image: "/furniture/rug.png".to_string(),
            }],
        };
        let err = spacify
            .visualize(&request, Some(project.project_id.as_str()))
            .expect_err("undecodable room should fail both paths");
        assert_eq!(kind_of(err), ErrorKind::Generation);
        assert_eq!(
            spacify.load_project(&project.project_id)?.status,
            ProjectStatus::Failed
        );
        Ok(())
    }

    #[test]
    fn rejected_upload_is_logged_and_not_stored() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let spacify = service(temp.path())?;
        let upload = UploadedFile {
            mime_type: "application/pdf".to_string(),
            ..room_upload()?
        };
        let err = spacify
            .upload_room_image(&upload, None)
            .expect_err("pdf should be rejected");
        assert_eq!(kind_of(err), ErrorKind::Input);
        assert!(!temp.path().join("uploads").exists()
            || std::fs::read_dir(temp.path().join("uploads"))?.next().is_none());
        let log = std::fs::read_to_string(temp.path().join("events.jsonl"))?;
        assert!(log.contains("\"type\":\"upload_rejected\""));
        Ok(())
    }

    #[test]
    fn unknown_project_is_not_found() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let spacify = service(temp.path())?;
        for id in ["missing", "../escape", ""] {
            let err = spacify.load_project(id).expect_err("project should be missing");
            assert_eq!(kind_of(err), ErrorKind::NotFound);
        }
        let err = spacify
            .upload_room_image(&room_upload()?, Some("missing"))
            .expect_err("unknown project");
        assert_eq!(kind_of(err), ErrorKind::NotFound);
        assert!(!temp.path().join("uploads").exists());
        Ok(())
    }

    #[test]
    fn project_creation_validates_fields() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let spacify = service(temp.path())?;
        let err = spacify
            .create_project("  ", "Modern", None)
            .expect_err("blank name");
        assert_eq!(SpacifyError::from_anyhow(err).message, "Project name is required");
        let err = spacify
            .create_project(&"n".repeat(101), "Modern", None)
            .expect_err("long name");
        assert_eq!(kind_of(err), ErrorKind::Input);

        spacify.create_project("First", "Modern", None)?;
        spacify.create_project("Second", "Rustic", None)?;
        std::fs::write(temp.path().join("data/projects/corrupt.json"), "not json")?;
        let listing = spacify.list_projects()?;
        let names: Vec<String> = listing
            .projects
            .into_iter()
            .map(|project| project.name)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"First".to_string()));
        assert_eq!(listing.unreadable.len(), 1);
        let log = std::fs::read_to_string(temp.path().join("events.jsonl"))?;
        assert!(log.contains("\"type\":\"project_unreadable\""));
        Ok(())
    }

    #[test]
    fn unlogged_upload_is_not_kept() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let spacify = service(temp.path())?;
        std::fs::create_dir_all(temp.path().join("events.jsonl"))?;

        let err = spacify
            .upload_room_image(&room_upload()?, None)
            .expect_err("event log is a directory");
        assert_eq!(kind_of(err), ErrorKind::Internal);
        assert!(std::fs::read_dir(temp.path().join("uploads"))?.next().is_none());

        let pdf = UploadedFile {
            mime_type: "application/pdf".to_string(),
            ..room_upload()?
        };
        let err = spacify
            .upload_room_image(&pdf, None)
            .expect_err("pdf should be rejected");
        assert_eq!(kind_of(err), ErrorKind::Input);
        Ok(())
    }

    #[test]
    fn health_reports_offline_generator() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let spacify = service(temp.path())?;
        let health = spacify.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.services.uploads, "missing");
        assert_eq!(health.services.generator, "offline");
        assert!(!health.services.api_key_configured);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

        spacify.upload_room_image(&room_upload()?, None)?;
        assert_eq!(spacify.health().services.uploads, "ok");
        Ok(())
    }

    #[test]
    fn health_check_leaves_filesystem_untouched() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let spacify = service(temp.path())?;
        spacify.health();
        assert!(std::fs::read_dir(temp.path())?.next().is_none());

        std::fs::create_dir_all(temp.path().join("uploads"))?;
        spacify.health();
        assert!(std::fs::read_dir(temp.path().join("uploads"))?.next().is_none());

        std::fs::remove_dir(temp.path().join("uploads"))?;
        std::fs::write(temp.path().join("uploads"), b"not a directory")?;
        let health = spacify.health();
        assert_eq!(health.status, "degraded");
        assert_eq!(health.services.uploads, "not_a_directory");
        Ok(())
    }
}
