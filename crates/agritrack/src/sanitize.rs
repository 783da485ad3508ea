//! Helpers for keeping local paths out of log lines and span fields.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Returns only the file name component (no directory).
pub fn redact_path<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Short deterministic hash of a path, for correlating log lines.
pub fn hash_path<P: AsRef<Path>>(path: P) -> String {
    let mut hasher = DefaultHasher::new();
    path.as_ref().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
