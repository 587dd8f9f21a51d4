//! Entity catalog file.
//!
//! ```yaml
//! entities:
//!   uniprot:
//!     kind: tool
//!     runtime: python
//!     path: tools/uniprot
//!     install_spec: ["bash", "tools/uniprot/setup.sh"]
//!     register_spec: "claude mcp add uniprot -- python tools/uniprot/server.py"
//! ```
//!
//! `entities` may also be a list of records that carry their own `name`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use mcphub_core::EntityRecord;

use crate::error::OrchestratorError;

/// Read entity records from a catalog file. A missing file is an empty catalog.
pub fn load_records(path: &Path) -> Result<Vec<EntityRecord>, OrchestratorError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "No catalog file, starting with an empty registry");
            return Ok(Vec::new());
        }
        Err(e) => return Err(catalog_error(path, e)),
    };

    let records = parse_records(&text).map_err(|message| OrchestratorError::Catalog {
        path: path.to_path_buf(),
        message,
    })?;
    debug!(path = %path.display(), count = records.len(), "Catalog loaded");
    Ok(records)
}

/// Parse catalog YAML into records.
pub fn parse_records(text: &str) -> Result<Vec<EntityRecord>, String> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    let value = serde_json::to_value(&yaml).map_err(|e| e.to_string())?;

    let entities = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(mut top) => top.remove("entities").unwrap_or(Value::Null),
        _ => return Err("top level must be a mapping with an 'entities' key".to_string()),
    };

    match entities {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(record) => Ok(record),
                _ => Err(format!("entities[{i}] is not a mapping")),
            })
            .collect(),
        Value::Object(named) => named
            .into_iter()
            .map(|(name, item)| match item {
                Value::Object(mut record) => {
                    record
                        .entry("name")
                        .or_insert_with(|| Value::String(name.clone()));
                    Ok(record)
                }
                Value::Null => Err(format!("entity '{name}' has no fields")),
                _ => Err(format!("entity '{name}' is not a mapping")),
            })
            .collect(),
        _ => Err("'entities' must be a list or a mapping".to_string()),
    }
}

fn catalog_error(path: &Path, e: std::io::Error) -> OrchestratorError {
    OrchestratorError::Catalog {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
