//! The bot's JSON state files (`stats.json`, `vouchers.json`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};

use crate::atomic_io::{read_text_optional, write_text_atomic};
use crate::time_utils::current_unix_timestamp_ms;

/// Pretty-prints `value` and atomically replaces `path` with it.
pub fn write_json_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let encoded = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to encode {}", path.display()))?;
    write_text_atomic(path, &encoded)
}

/// Loads a state file, falling back to `T::default()` when it is missing,
/// unreadable or unparsable.
///
/// An unparsable file is first renamed to `<name>.corrupt-<ms>`, so the next
/// save starts a fresh file instead of overwriting the only copy.
pub fn read_json_document_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match read_text_optional(path) {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(error) => {
            warn!("state file unreadable, using defaults: error={error:#}");
            return T::default();
        }
    };
    match serde_json::from_str::<T>(&raw) {
        Ok(value) => value,
        Err(parse_error) => {
            match quarantine(path) {
                Ok(kept) => warn!(
                    "state file unparsable, starting empty: path={} kept={} error={parse_error}",
                    path.display(),
                    kept.display()
                ),
                Err(move_error) => error!(
                    "state file unparsable and not moved aside: path={} error={parse_error} move_error={move_error:#}",
                    path.display()
                ),
            }
            T::default()
        }
    }
}

fn quarantine(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("state");
    let kept = path.with_file_name(format!(
        "{file_name}.corrupt-{}",
        current_unix_timestamp_ms()
    ));
    std::fs::rename(path, &kept)
        .with_context(|| format!("failed to move {} to {}", path.display(), kept.display()))?;
    Ok(kept)
}
