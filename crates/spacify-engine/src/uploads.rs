use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use spacify_contracts::api::{uploads_url, UploadData};
use uuid::Uuid;

use crate::config::SpacifyConfig;
use crate::error::SpacifyError;
use crate::storage::{extension_for_mime, mime_for_path, timestamp_millis, write_new_file};

const ROOM_PREFIX: &str = "room-";
const ROOM_NOT_FOUND: &str = "Room image not found. Please upload a room image first.";

/// One incoming image as received from the caller.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A stored room photo, identified by its filename in the uploads directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomImage {
    pub id: String,
    pub path: PathBuf,
    pub mime_type: String,
    pub size: u64,
    pub created_at: Option<String>,
}

impl RoomImage {
    pub fn url(&self) -> String {
        uploads_url(&self.id)
    }

    pub fn upload_data(&self) -> UploadData {
        UploadData {
            image_id: self.id.clone(),
            filename: self.id.clone(),
            size: self.size,
            url: self.url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub allowed_mime_types: Vec<String>,
}

impl UploadPolicy {
    pub fn from_config(config: &SpacifyConfig) -> Self {
        Self {
            max_bytes: config.max_file_size,
            allowed_mime_types: config.allowed_mime_types.clone(),
        }
    }

    pub fn check(&self, upload: &UploadedFile) -> Result<(), SpacifyError> {
        if upload.bytes.is_empty() {
            return Err(SpacifyError::input("No file provided"));
        }
        let mime = upload.mime_type.trim().to_ascii_lowercase();
        if !self.allowed_mime_types.iter().any(|allowed| *allowed == mime) {
            return Err(SpacifyError::input(format!(
                "Invalid file type. Only {} are allowed.",
                human_list(
                    &self
                        .allowed_mime_types
                        .iter()
                        .map(|value| format_label(value))
                        .collect::<Vec<_>>()
                )
            )));
        }
        if upload.bytes.len() as u64 > self.max_bytes {
            return Err(SpacifyError::input(format!(
                "File too large. Maximum size is {}.",
                format_size(self.max_bytes)
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    policy: UploadPolicy,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, policy: UploadPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validates and stores one room photo. Nothing touches the disk unless
    /// the upload passes the policy.
    pub fn accept(&self, upload: &UploadedFile) -> Result<RoomImage> {
        self.policy.check(upload)?;

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let mime_type = upload.mime_type.trim().to_ascii_lowercase();
        let ext = stored_extension(&upload.original_name, &mime_type);
        let id = format!("{ROOM_PREFIX}{}-{}{ext}", timestamp_millis(), Uuid::new_v4());
        let path = self.dir.join(&id);
        write_new_file(&path, &upload.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(RoomImage {
            id,
            path,
            mime_type,
            size: upload.bytes.len() as u64,
            created_at: Some(now_utc_iso()),
        })
    }

    /// Looks up a previously stored room photo by id. Only bare `room-*`
    /// filenames inside the uploads directory resolve.
    pub fn resolve(&self, image_id: &str) -> Result<RoomImage> {
        let id = image_id.trim();
        let is_bare = !id.is_empty()
            && !id.contains(['/', '\\'])
            && !id.contains("..")
            && id.starts_with(ROOM_PREFIX);
        if !is_bare {
            return Err(SpacifyError::not_found(ROOM_NOT_FOUND).into());
        }
        let path = self.dir.join(id);
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Err(SpacifyError::not_found(ROOM_NOT_FOUND).into()),
        };
        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .map(|time| DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Micros, false));

        Ok(RoomImage {
            id: id.to_string(),
            mime_type: mime_for_path(&path).unwrap_or("image/jpeg").to_string(),
            path,
            size: metadata.len(),
            created_at,
        })
    }

    /// Inspects the upload directory without touching it. A missing directory
    /// is still usable because `accept` creates it on first write.
    pub fn dir_state(&self) -> UploadDirState {
        match std::fs::metadata(&self.dir) {
            Ok(meta) if !meta.is_dir() => UploadDirState::NotADirectory,
            Ok(meta) if meta.permissions().readonly() => UploadDirState::ReadOnly,
            Ok(_) => UploadDirState::Ready,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => UploadDirState::Missing,
            Err(_) => UploadDirState::Inaccessible,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadDirState {
    Ready,
    Missing,
    ReadOnly,
    NotADirectory,
    Inaccessible,
}

impl UploadDirState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ok",
            Self::Missing => "missing",
            Self::ReadOnly => "read_only",
            Self::NotADirectory => "not_a_directory",
            Self::Inaccessible => "inaccessible",
        }
    }

    pub fn is_usable(self) -> bool {
        matches!(self, Self::Ready | Self::Missing)
    }
}

fn stored_extension(original_name: &str, mime_type: &str) -> String {
    let from_name = Path::new(original_name)
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .filter(|value| !value.is_empty() && value.chars().all(|ch| ch.is_ascii_alphanumeric()));
    match from_name.or_else(|| extension_for_mime(mime_type).map(str::to_string)) {
        Some(ext) => format!(".{ext}"),
        None => String::new(),
    }
}

fn format_label(mime: &str) -> String {
    match mime {
        "image/jpeg" => "JPG".to_string(),
        "image/png" => "PNG".to_string(),
        "image/webp" => "WebP".to_string(),
        "image/heic" => "HEIC".to_string(),
        other => other.to_string(),
    }
}

fn human_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} and {second}"),
        [head @ .., last] => format!("{}, and {last}", head.join(", ")),
    }
}

fn format_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
