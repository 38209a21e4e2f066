//! HTTP download helpers for per-country archives.
//!
//! Archives are streamed to disk chunk by chunk; nothing is retried.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;

/// Builds the archive URL for a country code: `<base>/<CODE>.zip`.
#[must_use]
pub fn archive_url(base_url: &str, iso_code: &str) -> String {
    format!("{}/{iso_code}.zip", base_url.trim_end_matches('/'))
}

/// Builds the shared HTTP client with an overall per-request timeout.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent("geonames-download/0.1")
        .timeout(timeout)
        .build()
        .map_err(FetchError::Http)
}

/// Downloads a file from a URL to a local path.
///
/// Uses streaming to avoid loading the entire archive into memory. The
/// destination is left as-is on failure; callers decide whether to keep
/// or remove a partial file.
///
/// # Errors
///
/// Returns an error if the HTTP request fails, the response is not
/// successful, or the local file cannot be written.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<u64, FetchError> {
    log::info!("Downloading {url}");

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
    }

    let response = client.get(url).send().await.map_err(FetchError::Http)?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| FetchError::Io {
            path: dest.display().to_string(),
            source: e,
        })?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Http)?;
        file.write_all(&chunk).await.map_err(|e| FetchError::Io {
            path: dest.display().to_string(),
            source: e,
        })?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| FetchError::Io {
        path: dest.display().to_string(),
        source: e,
    })?;

    #[allow(clippy::cast_precision_loss)]
    let kb = downloaded as f64 / 1024.0;
    log::debug!("  {} complete: {kb:.1} KB", dest.display());

    Ok(downloaded)
}

/// Errors from download operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP request error, including timeouts.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// I/O error writing to disk.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}
