use std::fs::FileTimes;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::ClipError;
use super::paths::part_path;
use crate::nvr::{NvrClient, NvrError};
use crate::retry::{self, RetryAction, RetryConfig};

/// Fetch the exported file at `locator` into `download_path` via a `.part`
/// sibling, renamed into place only once the full body is on disk.
///
/// "Not ready" replies and other transient errors are retried per
/// `retry_config`. On any failure the `.part` file is removed and nothing is
/// left under the final name.
pub async fn download_export(
    client: &dyn NvrClient,
    locator: &str,
    download_path: &Path,
    retry_config: &RetryConfig,
) -> Result<u64, ClipError> {
    let part = part_path(download_path);

    let result = retry::retry_with_backoff(
        retry_config,
        |e: &NvrError| {
            if e.is_retryable() {
                RetryAction::Retry
            } else {
                RetryAction::Abort
            }
        },
        || attempt_download(client, locator, &part),
    )
    .await;

    let bytes = match result {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = fs::remove_file(&part).await;
            return Err(ClipError::Download(e));
        }
    };

    if let Err(e) = fs::rename(&part, download_path).await {
        let _ = fs::remove_file(&part).await;
        return Err(ClipError::Disk {
            path: download_path.display().to_string(),
            source: e,
        });
    }
    Ok(bytes)
}

/// Single attempt: truncate the `.part` file and stream the body into it.
async fn attempt_download(
    client: &dyn NvrClient,
    locator: &str,
    part: &Path,
) -> Result<u64, NvrError> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part)
        .await?;
    let written = client.download(locator, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Set the modification and access times of a file to the given Unix
/// timestamp. Negative timestamps clamp to the epoch.
pub fn set_file_mtime(path: &Path, timestamp: i64) -> std::io::Result<()> {
    let time = if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        SystemTime::UNIX_EPOCH
    };
    let times = FileTimes::new().set_modified(time).set_accessed(time);
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_times(times)?;
    Ok(())
}
