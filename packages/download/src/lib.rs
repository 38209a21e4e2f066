#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetch-and-extract loop for GeoNames per-country dump archives.
//!
//! Reads `countryInfo.txt`, and for every country code without a local
//! `<download_dir>/<CODE>.zip` downloads `<base_url>/<CODE>.zip` and
//! extracts it into the shared `unzip_dir`. Countries are processed one
//! at a time; a failure only costs the country it happened on.
//!
//! # Usage
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use geonames_download::fetch_all;
//! use geonames_models::{DownloadConfig, progress::null_progress};
//!
//! let stats = fetch_all(&DownloadConfig::default(), &null_progress()).await?;
//! println!("{} countries, {} downloaded", stats.countries, stats.downloaded);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod fetch;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use geonames_models::progress::ProgressCallback;
use geonames_models::{COUNTRY_INFO_URL, DownloadConfig, FetchStats, country};

/// Name of the readme every GeoNames archive ships with.
pub const README_FILE_NAME: &str = "readme.txt";

/// Errors from the fetch-and-extract loop.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The reference table is not present locally.
    #[error("{path} does not exist, please download it from {url} to this location", url = COUNTRY_INFO_URL)]
    ReferenceMissing {
        /// Expected location of the reference table.
        path: String,
    },

    /// HTTP client setup error.
    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    /// Archive error.
    #[error("Archive error: {0}")]
    Archive(#[from] archive::ArchiveError),

    /// I/O error on the local directories.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Async task join error.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Reads the ISO codes of every country row in the reference table.
///
/// # Errors
///
/// Returns [`DownloadError::ReferenceMissing`] if the file does not exist,
/// or an I/O error if it cannot be read.
pub fn read_country_codes(reference_file: &Path) -> Result<Vec<String>, DownloadError> {
    if !reference_file.is_file() {
        return Err(DownloadError::ReferenceMissing {
            path: reference_file.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(reference_file).map_err(|e| DownloadError::Io {
        path: reference_file.display().to_string(),
        source: e,
    })?;

    Ok(contents
        .lines()
        .filter_map(country::iso_code)
        .map(str::to_string)
        .collect())
}

/// Local path of a country's archive.
#[must_use]
pub fn archive_path(download_dir: &Path, iso_code: &str) -> PathBuf {
    download_dir.join(format!("{iso_code}.zip"))
}

/// Runs the fetch-and-extract loop.
///
/// 1. Optionally empties both output directories (`reset`)
/// 2. Skips every code whose archive already exists (no network call)
/// 3. Downloads and extracts the rest, logging and skipping failures
/// 4. Removes `readme.txt` from the extraction folder
///
/// # Errors
///
/// Returns an error if the reference table is missing, the output
/// directories cannot be prepared, or the HTTP client cannot be built.
/// Per-country failures are counted in [`FetchStats`] instead.
pub async fn fetch_all(
    config: &DownloadConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<FetchStats, DownloadError> {
    let codes = read_country_codes(&config.reference_file)?;

    if config.reset {
        reset_dir(&config.download_dir)?;
        reset_dir(&config.unzip_dir)?;
    }
    ensure_dir(&config.download_dir)?;
    ensure_dir(&config.unzip_dir)?;

    let client = fetch::build_client(Duration::from_secs(config.timeout_secs))?;
    let mut stats = FetchStats::default();

    progress.set_total(codes.len() as u64);

    for code in &codes {
        stats.countries += 1;
        progress.set_message(code.clone());

        let dest = archive_path(&config.download_dir, code);
        if dest.is_file() {
            log::debug!("{} already present, skipping", dest.display());
            stats.skipped += 1;
            progress.inc(1);
            continue;
        }

        let url = fetch::archive_url(&config.base_url, code);
        if let Err(e) = fetch::download_file(&client, &url, &dest).await {
            log::warn!("Failed to download {url}: {e}");
            if dest.exists() {
                if let Err(e) = tokio::fs::remove_file(&dest).await {
                    log::warn!("  could not remove partial {}: {e}", dest.display());
                }
            }
            stats.failed_downloads += 1;
            progress.inc(1);
            continue;
        }
        stats.downloaded += 1;

        log::info!(
            "  Unzipping {} to {}",
            dest.display(),
            config.unzip_dir.display()
        );

        let unzip_dir = config.unzip_dir.clone();
        let extracted =
            tokio::task::spawn_blocking(move || archive::extract_zip(&dest, &unzip_dir)).await?;

        match extracted {
            Ok(count) => stats.extracted_entries += count,
            Err(e) => {
                log::warn!("  {e}");
                stats.invalid_archives += 1;
            }
        }

        progress.inc(1);
    }

    remove_readme(&config.unzip_dir)?;

    log::info!("Number of countries processed: {}", stats.countries);
    progress.finish(format!(
        "{} countries ({} downloaded, {} skipped)",
        stats.countries, stats.downloaded, stats.skipped
    ));

    Ok(stats)
}

/// Deletes the GeoNames readme from the extraction folder, if present.
fn remove_readme(unzip_dir: &Path) -> Result<(), DownloadError> {
    let readme = unzip_dir.join(README_FILE_NAME);
    if readme.is_file() {
        std::fs::remove_file(&readme).map_err(|e| DownloadError::Io {
            path: readme.display().to_string(),
            source: e,
        })?;
        log::debug!("Removed {}", readme.display());
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), DownloadError> {
    std::fs::create_dir_all(path).map_err(|e| DownloadError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Removes a directory and everything in it, then recreates it empty.
fn reset_dir(path: &Path) -> Result<(), DownloadError> {
    if path.exists() {
        log::info!("Removing {}", path.display());
        std::fs::remove_dir_all(path).map_err(|e| DownloadError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    ensure_dir(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::fs;
    use std::io::Write as _;
    use std::sync::Mutex;

    use geonames_models::progress::null_progress;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

    /// Serves fixed bodies by request path and records every path asked for.
    async fn serve(routes: HashMap<String, Vec<u8>>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let routes = Arc::new(routes);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = request
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .to_string();
                    seen.lock().unwrap().push(path.clone());

                    let (status, body) = routes.get(&path).map_or_else(
                        || ("404 Not Found", b"missing".to_vec()),
                        |body| ("200 OK", body.clone()),
                    );
                    let head = format!(
                        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), requests)
    }

    /// Accepts connections, sends headers and part of the body, then stalls.
    async fn serve_stalled() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\nPK")
                        .await;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    drop(socket);
                });
            }
        });

        format!("http://{addr}")
    }

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn test_config(tmp: &Path, base_url: &str, reference: &str) -> DownloadConfig {
        fs::create_dir_all(tmp).unwrap();
        let reference_file = tmp.join("countryInfo.txt");
        fs::write(&reference_file, reference).unwrap();
        DownloadConfig {
            base_url: base_url.to_string(),
            reference_file,
            download_dir: tmp.join("countryZip"),
            unzip_dir: tmp.join("unzipFolder"),
            reset: false,
            timeout_secs: 10,
        }
    }

    #[test]
    fn reads_codes_skipping_comments() {
        let tmp = std::env::temp_dir().join("geonames_download_codes_test");
        let _ = fs::remove_dir_all(&tmp);
        let config = test_config(
            &tmp,
            "http://unused",
            "# comment\n#ISO\tISO3\nAU\tAUS\n\nUS\tUSA\n",
        );

        let codes = read_country_codes(&config.reference_file).unwrap();
        assert_eq!(codes, vec!["AU".to_string(), "US".to_string()]);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn missing_reference_is_fatal_and_names_source() {
        let config = DownloadConfig {
            reference_file: std::env::temp_dir().join("geonames_no_such_countryInfo.txt"),
            ..DownloadConfig::default()
        };

        let err = fetch_all(&config, &null_progress()).await.unwrap_err();
        assert!(matches!(err, DownloadError::ReferenceMissing { .. }));
        assert!(err.to_string().contains(COUNTRY_INFO_URL));
    }

    #[tokio::test]
    async fn downloads_extracts_and_removes_readme() {
        let tmp = std::env::temp_dir().join("geonames_download_e2e_test");
        let _ = fs::remove_dir_all(&tmp);

        let gazetteer: &[u8] = b"6252001\tUnited States\tUnited States\n";
        let archive = zip_bytes(&[("US.txt", gazetteer), ("readme.txt", &b"readme"[..])]);
        let (base_url, requests) =
            serve(HashMap::from([("/US.zip".to_string(), archive.clone())])).await;

        let config = test_config(&tmp, &base_url, "#ISO\tCountry\nUS\tUnited States\t...\n");
        let stats = fetch_all(&config, &null_progress()).await.unwrap();

        assert_eq!(requests.lock().unwrap().as_slice(), ["/US.zip".to_string()]);
        assert_eq!(stats.countries, 1);
        assert_eq!(stats.downloaded, 1);
        assert_eq!(stats.extracted_entries, 2);
        assert_eq!(fs::read(config.download_dir.join("US.zip")).unwrap(), archive);
        assert_eq!(fs::read(config.unzip_dir.join("US.txt")).unwrap(), gazetteer);
        assert!(!config.unzip_dir.join("readme.txt").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn existing_archive_is_not_fetched_again() {
        let tmp = std::env::temp_dir().join("geonames_download_skip_test");
        let _ = fs::remove_dir_all(&tmp);

        let (base_url, requests) = serve(HashMap::new()).await;
        let config = test_config(&tmp, &base_url, "US\tUnited States\n");
        fs::create_dir_all(&config.download_dir).unwrap();
        fs::write(config.download_dir.join("US.zip"), b"already here").unwrap();

        let stats = fetch_all(&config, &null_progress()).await.unwrap();

        assert!(requests.lock().unwrap().is_empty());
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.downloaded, 0);
        assert_eq!(
            fs::read(config.download_dir.join("US.zip")).unwrap(),
            b"already here"
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn invalid_archive_does_not_stop_the_loop() {
        let tmp = std::env::temp_dir().join("geonames_download_invalid_test");
        let _ = fs::remove_dir_all(&tmp);

        let good = zip_bytes(&[("AU.txt", &b"2077456\tAustralia\n"[..])]);
        let (base_url, _) = serve(HashMap::from([
            ("/XX.zip".to_string(), b"not a zip".to_vec()),
            ("/AU.zip".to_string(), good),
        ]))
        .await;

        let config = test_config(&tmp, &base_url, "XX\tBroken\nAU\tAustralia\n");
        let stats = fetch_all(&config, &null_progress()).await.unwrap();

        assert_eq!(stats.countries, 2);
        assert_eq!(stats.downloaded, 2);
        assert_eq!(stats.invalid_archives, 1);
        assert!(config.unzip_dir.join("AU.txt").exists());
        // The bad archive stays on disk, so a re-run skips it.
        assert!(config.download_dir.join("XX.zip").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn failed_download_leaves_no_partial_file() {
        let tmp = std::env::temp_dir().join("geonames_download_404_test");
        let _ = fs::remove_dir_all(&tmp);

        let (base_url, requests) = serve(HashMap::new()).await;
        let config = test_config(&tmp, &base_url, "ZZ\tNowhere\n");
        let stats = fetch_all(&config, &null_progress()).await.unwrap();

        assert_eq!(requests.lock().unwrap().as_slice(), ["/ZZ.zip".to_string()]);
        assert_eq!(stats.failed_downloads, 1);
        assert!(!config.download_dir.join("ZZ.zip").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn reset_empties_output_directories() {
        let tmp = std::env::temp_dir().join("geonames_download_reset_test");
        let _ = fs::remove_dir_all(&tmp);

        let (base_url, _) = serve(HashMap::new()).await;
        let mut config = test_config(&tmp, &base_url, "# nothing to fetch\n");
        fs::create_dir_all(&config.unzip_dir).unwrap();
        fs::write(config.unzip_dir.join("stale.txt"), b"old").unwrap();
        config.reset = true;

        fetch_all(&config, &null_progress()).await.unwrap();

        assert!(config.unzip_dir.is_dir());
        assert!(!config.unzip_dir.join("stale.txt").exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn stalled_download_times_out_and_is_removed() {
        let tmp = std::env::temp_dir().join("geonames_download_timeout_test");
        let _ = fs::remove_dir_all(&tmp);

        let base_url = serve_stalled().await;
        let mut config = test_config(&tmp, &base_url, "AU\tAustralia\n");
        config.timeout_secs = 1;

        let started = std::time::Instant::now();
        let stats = fetch_all(&config, &null_progress()).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(stats.failed_downloads, 1);
        assert_eq!(stats.downloaded, 0);
        assert!(!config.download_dir.join("AU.zip").exists());

        let _ = fs::remove_dir_all(&tmp);
    }
}
