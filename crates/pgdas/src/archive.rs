//! Local copy of every declaration payload, grouped by period:
//! `<base>/<AAAAMM>/<label> - PGDAS - <AAAAMM>.json`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::declaration::Declaration;
use crate::store::file_stem;

/// Label used when the caller has no establishment code at hand.
pub const DEFAULT_LABEL: &str = "multi";

/// The label comes from ERP data and is reduced to file-name-safe characters.
pub fn payload_path(declaration: &Declaration, label: Option<&str>, base_dir: &Path) -> PathBuf {
    let period = declaration.period.to_string();
    let label = label
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(file_stem)
        .unwrap_or_else(|| DEFAULT_LABEL.to_string());
    base_dir
        .join(&period)
        .join(format!("{label} - PGDAS - {period}.json"))
}

/// Writes the wire JSON (empty members omitted, UTF-8 kept as-is) and
/// returns the file path. Existing files for the same label are overwritten.
pub fn save_payload(
    declaration: &Declaration,
    label: Option<&str>,
    base_dir: &Path,
    pretty: bool,
) -> io::Result<PathBuf> {
    let path = payload_path(declaration, label, base_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let wire = declaration.to_wire().map_err(io::Error::other)?;
    let bytes = if pretty {
        serde_json::to_vec_pretty(&wire)
    } else {
        serde_json::to_vec(&wire)
    }
    .map_err(io::Error::other)?;

    fs::write(&path, bytes)?;
    debug!(path = %path.display(), "declaration payload archived");
    Ok(path)
}
