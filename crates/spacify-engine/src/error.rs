use std::fmt;

use spacify_contracts::api::ErrorKind;

/// Failure that is reported back to the caller, tagged with its kind.
///
/// Travels inside `anyhow::Error` through the engine and is recovered at the
/// edge with [`SpacifyError::from_anyhow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpacifyError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SpacifyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Input, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn from_anyhow(err: anyhow::Error) -> Self {
        if let Some(typed) = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<SpacifyError>())
        {
            return typed.clone();
        }
        Self::internal(error_chain_text(&err, 1024))
    }
}

impl fmt::Display for SpacifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SpacifyError {}

pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing: &String| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
