//! Run artifact discovery
//!
//! Spiders write their output under `<data_dir>/<YYYY-MM-DD>/<Source>/`
//! where `<Source>` is the CamelCase form of the target name. After a
//! successful run the newest JSON file in today's directory is reported
//! in the completion notification, together with its record count when
//! the file holds a JSON array.

use std::path::Path;
use std::time::SystemTime;
use tracing::debug;

use crate::models::RunArtifact;

/// CamelCase folder name for a target, e.g. `bullseye_press` -> `BullseyePress`
pub fn source_folder(target: &str) -> String {
    target
        .split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Locate the most recent JSON output for a target's run today
pub fn find_latest(data_dir: &Path, target: &str) -> Option<RunArtifact> {
    let date_dir = chrono::Local::now().format("%Y-%m-%d").to_string();
    let base_dir = data_dir.join(date_dir).join(source_folder(target));

    let entries = match std::fs::read_dir(&base_dir) {
        Ok(entries) => entries,
        Err(_) => {
            debug!(
                "No artifact directory {} for target '{}'",
                base_dir.display(),
                target
            );
            return None;
        }
    };

    let mut candidates: Vec<(SystemTime, std::path::PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((modified, path))
            } else {
                None
            }
        })
        .collect();

    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    let (_, path) = candidates.into_iter().next()?;
    let records = count_records(&path);

    Some(RunArtifact { path, records })
}

/// Count top-level records when the file is a JSON array
fn count_records(path: &Path) -> Option<usize> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<serde_json::Value>(&contents).ok()? {
        serde_json::Value::Array(items) => Some(items.len()),
        _ => None,
    }
}
