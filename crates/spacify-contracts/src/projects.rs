use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use uuid::Uuid;

use crate::api::{VisualizationData, VisualizationSource};

pub const PROJECT_SCHEMA_VERSION: u64 = 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationEntry {
    pub visualization_id: String,
    pub url: String,
    pub source: VisualizationSource,
    pub style_description: String,
    pub furniture_ids: Vec<String>,
    pub room_image_id: Option<String>,
    pub generated_at: String,
    pub style_diff: Option<Vec<String>>,
}

/// A saved room-styling project: the uploaded room it works on and every
/// visualization produced for it, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    #[serde(skip)]
    pub path: PathBuf,
    pub schema_version: u64,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub style_description: String,
    pub status: ProjectStatus,
    pub room_image_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub visualizations: Vec<VisualizationEntry>,
}

impl ProjectManifest {
    pub fn new(
        path: impl Into<PathBuf>,
        project_id: impl Into<String>,
        name: impl Into<String>,
        style_description: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        let now = now_utc_iso();
        Self {
            path: path.into(),
            schema_version: PROJECT_SCHEMA_VERSION,
            project_id: project_id.into(),
            name: name.into(),
            description,
            style_description: style_description.into(),
            status: ProjectStatus::Draft,
            room_image_id: None,
            created_at: now.clone(),
            updated_at: now,
            visualizations: Vec::new(),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed reading project {}", path.display()))?;
        let mut manifest: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid project manifest {}", path.display()))?;
        manifest.path = path;
        Ok(manifest)
    }

    pub fn attach_room(&mut self, room_image_id: &str) {
        self.room_image_id = Some(room_image_id.to_string());
        self.touch();
    }

    pub fn set_status(&mut self, status: ProjectStatus) {
        self.status = status;
        self.touch();
    }

    pub fn record_visualization(
        &mut self,
        data: &VisualizationData,
        furniture_ids: Vec<String>,
    ) -> VisualizationEntry {
        let prev_style = self
            .visualizations
            .last()
            .map(|entry| entry.style_description.as_str());
        let entry = VisualizationEntry {
            visualization_id: data.visualization_id.clone(),
            url: data.url.clone(),
            source: data.source,
            style_description: data.style_description.clone(),
            furniture_ids,
            room_image_id: self.room_image_id.clone(),
            generated_at: data.generated_at.clone(),
            style_diff: style_diff(prev_style, &data.style_description),
        };
        self.visualizations.push(entry.clone());
        self.style_description = data.style_description.clone();
        self.status = ProjectStatus::Completed;
        self.touch();
        entry
    }

    pub fn latest_visualization(&self) -> Option<&VisualizationEntry> {
        self.visualizations.last()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = now_utc_iso();
    }
}

/// A manifest file that exists but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadableProject {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListing {
    pub projects: Vec<ProjectManifest>,
    pub unreadable: Vec<UnreadableProject>,
}

/// Directory of `<project_id>.json` manifests.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    dir: PathBuf,
}

impl ProjectStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn create(
        &self,
        name: &str,
        style_description: &str,
        description: Option<String>,
    ) -> anyhow::Result<ProjectManifest> {
        let project_id = Uuid::new_v4().to_string();
        let manifest = ProjectManifest::new(
            self.dir.join(format!("{project_id}.json")),
            project_id,
            name.trim(),
            style_description.trim(),
            description,
        );
        manifest.save()?;
        Ok(manifest)
    }

    /// Returns `Ok(None)` when no manifest exists for `project_id`.
    pub fn load(&self, project_id: &str) -> anyhow::Result<Option<ProjectManifest>> {
        let trimmed = project_id.trim();
        if !is_bare_id(trimmed) {
            bail!("invalid project id '{project_id}'");
        }
        let path = self.dir.join(format!("{trimmed}.json"));
        if !path.is_file() {
            return Ok(None);
        }
        ProjectManifest::load(path).map(Some)
    }

    /// Every readable manifest, oldest first. Manifests that fail to parse
    /// are reported next to them rather than dropped.
    pub fn list(&self) -> anyhow::Result<ProjectListing> {
        let mut listing = ProjectListing::default();
        if !self.dir.is_dir() {
            return Ok(listing);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match ProjectManifest::load(&path) {
                Ok(manifest) => listing.projects.push(manifest),
                Err(err) => listing.unreadable.push(UnreadableProject {
                    path,
                    error: format!("{err:#}"),
                }),
            }
        }
        listing.projects.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.project_id.cmp(&right.project_id))
        });
        listing.unreadable.sort_by(|left, right| left.path.cmp(&right.path));
        Ok(listing)
    }
}

fn is_bare_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

fn style_diff(prev: Option<&str>, curr: &str) -> Option<Vec<String>> {
    let prev = prev?;
    if prev == curr {
        return None;
    }
    let diff = TextDiff::from_lines(prev, curr);
    let rendered = diff.unified_diff().header("prev", "curr").to_string();
    Some(rendered.lines().map(str::to_string).collect())
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
