//! Registers uploaded videos as QUEUED jobs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::info;

use crate::db::job_repo::{self, NewJob};
use crate::db::Database;
use crate::error::IntakeError;
use crate::worker::job::{now_timestamp, UPLOADS_DIR};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Copies `source` into `<media_root>/uploads/` and inserts a QUEUED row.
/// Returns the new job id.
pub fn enqueue_upload(db: &Database, media_root: &Path, source: &Path) -> Result<i64, IntakeError> {
    let metadata = std::fs::metadata(source)
        .ok()
        .filter(|m| m.is_file())
        .ok_or_else(|| IntakeError::NotFound(source.to_path_buf()))?;

    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IntakeError::UnsupportedFormat(source.display().to_string()))?;

    if !is_video(source) {
        return Err(IntakeError::UnsupportedFormat(file_name.to_string()));
    }

    let uploads = media_root.join(UPLOADS_DIR);
    std::fs::create_dir_all(&uploads).map_err(|e| IntakeError::CreateDirectory {
        path: uploads.clone(),
        source: e,
    })?;

    let target = unique_target(&uploads, file_name)?;
    std::fs::copy(source, &target).map_err(|e| IntakeError::CopyFile {
        from: source.to_path_buf(),
        to: target.clone(),
        source: e,
    })?;

    let stored_name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());

    let job = NewJob {
        file_name: stored_name.clone(),
        format: extension_of(&target),
        size: metadata.len() as f64 / BYTES_PER_MB,
        upload_timestamp: now_timestamp(),
    };
    let id = job_repo::insert(db, &job)?;

    info!("Queued job {} for {}", id, stored_name);
    Ok(id)
}

fn is_video(path: &Path) -> bool {
    mime_guess::from_path(path)
        .iter()
        .any(|mime| mime.type_() == mime_guess::mime::VIDEO)
}

/// Lowercase extension with its leading dot, e.g. `.mp4`.
fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// `name.ext`, then `name-1.ext`, `name-2.ext`, ... until no stored upload
/// shares the stem. Artifacts are named after the stem, so `flock.mov`
/// stored next to `flock.mp4` becomes `flock-1.mov`.
fn unique_target(dir: &Path, file_name: &str) -> Result<PathBuf, IntakeError> {
    let taken = stems_in(dir)?;

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "video".to_string());
    if !taken.contains(&stem) {
        return Ok(dir.join(file_name));
    }

    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1;
    loop {
        let candidate = format!("{}-{}", stem, n);
        if !taken.contains(&candidate) {
            return Ok(dir.join(format!("{}{}", candidate, ext)));
        }
        n += 1;
    }
}

fn stems_in(dir: &Path) -> Result<HashSet<String>, IntakeError> {
    let entries = std::fs::read_dir(dir).map_err(|e| IntakeError::ReadDirectory {
        path: dir.to_path_buf(),
        source: e,
    })?;
    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::job::{Job, JobStatus};

    fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; len]).unwrap();
        path
    }

    #[test]
    fn test_enqueue_copies_and_inserts() {
        let src = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let upload = write_file(src.path(), "Flock.MP4", 2 * 1024 * 1024);

        let id = enqueue_upload(&db, media.path(), &upload).unwrap();

        let row = job_repo::find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.file_name, "Flock.MP4");
        assert_eq!(row.format, ".mp4");
        assert_eq!(row.size, 2.0);
        assert_eq!(row.status, JobStatus::Queued.as_str());
        assert!(media.path().join("uploads/Flock.MP4").exists());
    }

    #[test]
    fn test_enqueue_avoids_name_collisions() {
        let src = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let upload = write_file(src.path(), "sheep.mov", 10);

        let first = enqueue_upload(&db, media.path(), &upload).unwrap();
        let second = enqueue_upload(&db, media.path(), &upload).unwrap();

        let first = job_repo::find_by_id(&db, first).unwrap().unwrap();
        let second = job_repo::find_by_id(&db, second).unwrap().unwrap();
        assert_eq!(first.file_name, "sheep.mov");
        assert_eq!(second.file_name, "sheep-1.mov");
    }

    #[test]
    fn test_same_stem_different_extension_gets_own_artifacts() {
        let src = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let mp4 = write_file(src.path(), "flock.mp4", 10);
        let mov = write_file(src.path(), "flock.mov", 10);

        let first = enqueue_upload(&db, media.path(), &mp4).unwrap();
        let second = enqueue_upload(&db, media.path(), &mov).unwrap();

        let first = Job::try_from(job_repo::find_by_id(&db, first).unwrap().unwrap()).unwrap();
        let second = Job::try_from(job_repo::find_by_id(&db, second).unwrap().unwrap()).unwrap();
        assert_eq!(first.file_name, "flock.mp4");
        assert_eq!(second.file_name, "flock-1.mov");
        assert_eq!(second.format, ".mov");
        assert!(media.path().join("uploads/flock-1.mov").exists());

        let (a, b) = (first.artifacts(), second.artifacts());
        assert_ne!(a.raw_output, b.raw_output);
        assert_ne!(a.final_output, b.final_output);
        assert_ne!(a.thumbnail, b.thumbnail);
    }

    #[test]
    fn test_enqueue_rejects_missing_file() {
        let media = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let result = enqueue_upload(&db, media.path(), Path::new("/nonexistent/a.mp4"));
        assert!(matches!(result, Err(IntakeError::NotFound(_))));
    }

    #[test]
    fn test_enqueue_rejects_non_video() {
        let src = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let upload = write_file(src.path(), "notes.txt", 10);

        let result = enqueue_upload(&db, media.path(), &upload);
        assert!(matches!(result, Err(IntakeError::UnsupportedFormat(_))));
        assert_eq!(job_repo::count_by_status(&db, JobStatus::Queued).unwrap(), 0);
    }
}
