use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOutput {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub sha256: String,
}

/// Writes `bytes` to `<dir>/<prefix>_<unix_millis>.<ext>`, adding a `-N`
/// suffix when that name is taken. Existing files are never overwritten.
pub fn write_unique_output(dir: &Path, prefix: &str, ext: &str, bytes: &[u8]) -> Result<StoredOutput> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let stamp = timestamp_millis();
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let file_name = if attempt == 0 {
            format!("{prefix}_{stamp}.{ext}")
        } else {
            format!("{prefix}_{stamp}-{attempt}.{ext}")
        };
        let path = dir.join(&file_name);
        match write_new_file(&path, bytes) {
            Ok(()) => {
                return Ok(StoredOutput {
                    path,
                    file_name,
                    size: bytes.len() as u64,
                    sha256: sha256_hex(bytes),
                })
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to write {}", path.display())))
            }
        }
    }
    bail!(
        "could not find a free output name for {prefix} in {}",
        dir.display()
    )
}

pub fn write_new_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(bytes)?;
    file.flush()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let lowered = mime.trim().to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return Some("jpg");
    }
    if lowered.contains("png") {
        return Some("png");
    }
    if lowered.contains("webp") {
        return Some("webp");
    }
    if lowered.contains("heic") {
        return Some("heic");
    }
    None
}
