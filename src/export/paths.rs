use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// `<root>/<camera>`. A name that cleans down to nothing but dots maps to `_`
/// so it cannot climb out of the root.
pub fn camera_dir(root: &Path, camera: &str) -> PathBuf {
    let name = clean_filename(camera);
    if name.trim_matches('.').is_empty() {
        root.join("_")
    } else {
        root.join(name)
    }
}

/// `<root>/<camera>/<YYYY-MM-DD>`
pub fn target_dir(root: &Path, camera: &str, date: NaiveDate) -> PathBuf {
    camera_dir(root, camera).join(date.format("%Y-%m-%d").to_string())
}

/// Create `<root>/<camera>` for every camera, returning the paths in order.
/// Existing directories are left alone.
pub fn create_camera_dirs(root: &Path, cameras: &[String]) -> std::io::Result<Vec<PathBuf>> {
    cameras
        .iter()
        .map(|camera| {
            let dir = camera_dir(root, camera);
            std::fs::create_dir_all(&dir)?;
            Ok(dir)
        })
        .collect()
}

/// Strip characters that are invalid in file names on common filesystems.
pub fn clean_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Sibling `.part` path used while a download is in flight.
pub fn part_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    final_path.with_file_name(name)
}
