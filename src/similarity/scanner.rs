use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Lowercase extensions recognized as videos
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "wmv"];

pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Recursively collect video files under `roots`, sorted and without
/// duplicates. Unreadable entries are skipped.
pub fn scan_videos<P: AsRef<Path>>(roots: &[P]) -> Vec<PathBuf> {
    let mut videos = BTreeSet::new();

    for root in roots {
        let root = root.as_ref();
        if !root.exists() {
            log::warn!("Scan root {:?} does not exist", root);
            continue;
        }

        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {:?}: {}", root, e);
                    continue;
                }
            };

            if entry.file_type().is_file() && is_supported_video(entry.path()) {
                videos.insert(entry.into_path());
            }
        }
    }

    log::info!("Found {} video files", videos.len());
    videos.into_iter().collect()
}
