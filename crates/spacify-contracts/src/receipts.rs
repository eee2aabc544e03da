use std::path::Path;

use serde_json::{Map, Value};

use crate::api::{VisualizationData, VisualizationRequest};

pub const RECEIPT_SCHEMA_VERSION: u64 = 1;

pub struct ReceiptInputs<'a> {
    pub request: &'a VisualizationRequest,
    pub result: &'a VisualizationData,
    pub provider_request: &'a Map<String, Value>,
    pub model_text: &'a [String],
    pub image_path: &'a Path,
    pub image_sha256: &'a str,
    pub receipt_path: &'a Path,
}

pub fn build_receipt(inputs: &ReceiptInputs<'_>) -> Value {
    let mut root = Map::new();
    root.insert(
        "schema_version".to_string(),
        Value::Number(RECEIPT_SCHEMA_VERSION.into()),
    );
    root.insert(
        "request".to_string(),
        sanitize_payload(&serde_json::to_value(inputs.request).unwrap_or(Value::Null)),
    );
    root.insert(
        "result".to_string(),
        serde_json::to_value(inputs.result).unwrap_or(Value::Null),
    );
    root.insert(
        "provider_request".to_string(),
        sanitize_payload(&Value::Object(inputs.provider_request.clone())),
    );
    root.insert(
        "model_text".to_string(),
        Value::Array(
            inputs
                .model_text
                .iter()
                .cloned()
                .map(Value::String)
                .collect(),
        ),
    );

    let mut artifacts = Map::new();
    artifacts.insert(
        "image_path".to_string(),
        Value::String(inputs.image_path.to_string_lossy().to_string()),
    );
    artifacts.insert(
        "image_sha256".to_string(),
        Value::String(inputs.image_sha256.to_string()),
    );
    artifacts.insert(
        "receipt_path".to_string(),
        Value::String(inputs.receipt_path.to_string_lossy().to_string()),
    );
    root.insert("artifacts".to_string(), Value::Object(artifacts));
    Value::Object(root)
}

pub fn write_receipt(path: &Path, payload: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

/// Replaces inline image payloads so receipts stay small and free of image data.
fn sanitize_payload(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Array(rows) => Value::Array(rows.iter().map(sanitize_payload).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, row) in map {
                let lowered = key.to_ascii_lowercase();
                if matches!(lowered.as_str(), "data" | "b64_json" | "image_bytes") {
                    out.insert(key.clone(), Value::String("<omitted>".to_string()));
                    continue;
                }
                out.insert(key.clone(), sanitize_payload(row));
            }
            Value::Object(out)
        }
    }
}
