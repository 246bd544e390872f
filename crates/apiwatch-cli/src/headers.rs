use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Load the extra-header mapping from a `.properties`-style file.
///
/// One `Name=Value` pair per line; blank lines and `#` comments are
/// skipped, values may themselves contain `=`. A missing file is a
/// warning, not an error, so a bare checkout still runs.
pub fn load(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        tracing::warn!(
            "header config {} not found, continuing without extra headers",
            path.display()
        );
        return Ok(HashMap::new());
    }

    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut headers = HashMap::new();
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                headers.insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    tracing::debug!("loaded {} headers from {}", headers.len(), path.display());
    Ok(headers)
}
