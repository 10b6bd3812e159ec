use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{IndexerError, Result};

const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Clone)]
pub struct DownloadPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl DownloadPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff * 2u32.saturating_pow(attempt)
    }
}

pub fn is_retryable(status: StatusCode) -> bool {
    RETRY_STATUSES.contains(&status.as_u16())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Downloads `url` into `dest`. The body is streamed into a `.part` sibling
/// and renamed into place only after a complete transfer; any failure removes
/// the partial file. Returns the number of bytes written.
pub fn download(url: &str, dest: &Path, policy: &DownloadPolicy) -> Result<u64> {
    let client = Client::builder()
        .user_agent(concat!("jar-indexer/", env!("CARGO_PKG_VERSION")))
        .timeout(policy.timeout)
        .build()
        .map_err(|e| IndexerError::DownloadFailed(format!("Failed to create HTTP client: {e}")))?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = part_path(dest);

    let result = fetch_with_retry(&client, url, &tmp, policy).and_then(|bytes| {
        fs::rename(&tmp, dest)?;
        Ok(bytes)
    });

    if result.is_err() && tmp.exists() {
        if let Err(err) = fs::remove_file(&tmp) {
            warn!(path = %tmp.display(), %err, "failed to remove partial download");
        }
    }
    result
}

fn fetch_with_retry(client: &Client, url: &str, tmp: &Path, policy: &DownloadPolicy) -> Result<u64> {
    let mut attempt = 0u32;
    loop {
        let outcome = client.get(url).send();
        let retry_reason = match outcome {
            Ok(mut response) if response.status().is_success() => {
                let mut file = File::create(tmp)?;
                let bytes = response.copy_to(&mut file).map_err(|e| {
                    IndexerError::DownloadFailed(format!("Failed to read response body from {url}: {e}"))
                })?;
                info!(url, bytes, "download complete");
                return Ok(bytes);
            }
            Ok(response) if is_retryable(response.status()) => {
                format!("HTTP {}", response.status())
            }
            Ok(response) => {
                return Err(IndexerError::DownloadFailed(format!(
                    "Failed to download from {url}: HTTP {}",
                    response.status()
                )));
            }
            Err(err) => err.to_string(),
        };

        if attempt >= policy.retries {
            return Err(IndexerError::DownloadFailed(format!(
                "Failed to download from {url}: {retry_reason}"
            )));
        }
        let delay = policy.delay(attempt);
        warn!(url, attempt = attempt + 1, reason = %retry_reason, ?delay, "retrying download");
        std::thread::sleep(delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "jar_indexer_download_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    #[test]
    fn retry_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::NOT_IMPLEMENTED));
    }

    #[test]
    fn backoff_doubles() {
        let policy = DownloadPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn part_file_sits_next_to_destination() {
        assert_eq!(
            part_path(Path::new("/s/lib-1.0-sources.jar")),
            PathBuf::from("/s/lib-1.0-sources.jar.part")
        );
    }

    #[test]
    fn connection_failure_leaves_nothing_behind() {
        let dir = temp_dir("refused");
        let dest = dir.join("lib-1.0-sources.jar");
        let policy = DownloadPolicy {
            timeout: Duration::from_secs(2),
            retries: 0,
            backoff: Duration::from_millis(1),
        };
        let err = download("http://127.0.0.1:1/lib.jar", &dest, &policy).unwrap_err();
        assert!(matches!(err, IndexerError::DownloadFailed(_)));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        let _ = fs::remove_dir_all(dir);
    }
}
