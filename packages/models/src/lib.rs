#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the GeoNames country toolchain.
//!
//! This crate contains only data types, configuration structs, and simple
//! parsing helpers. It has no heavyweight dependencies (no HTTP, no
//! Tantivy, no async runtime).

pub mod country;
pub mod place;
pub mod progress;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Base URL of the GeoNames dump service.
pub const DEFAULT_BASE_URL: &str = "http://download.geonames.org/export/dump";

/// Where users are told to fetch the reference table from when it is
/// missing locally.
pub const COUNTRY_INFO_URL: &str = "http://download.geonames.org/export/dump/countryInfo.txt";

/// Value of the `display_type` field on every emitted document.
pub const DISPLAY_TYPE: &str = "geonames";

/// Role granted when the access store has nothing for a record.
pub const GUEST_ROLE: &str = "guest";

/// Top-level configuration file layout (`geonames.toml`).
///
/// Every section and field is optional; missing values fall back to the
/// defaults documented on each section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeonamesConfig {
    /// Fetch-and-extract settings.
    pub download: DownloadConfig,
    /// Country harvest settings.
    pub harvest: HarvestConfig,
    /// Index settings.
    pub index: IndexConfig,
}

/// Settings for the fetch-and-extract loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Base URL; archives are fetched from `<base_url>/<ISO>.zip`.
    pub base_url: String,
    /// Local copy of `countryInfo.txt`.
    pub reference_file: PathBuf,
    /// Directory holding one `<ISO>.zip` per country.
    pub download_dir: PathBuf,
    /// Directory all archives are extracted into.
    pub unzip_dir: PathBuf,
    /// Empty both directories before fetching.
    pub reset: bool,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            reference_file: PathBuf::from("countryInfo.txt"),
            download_dir: PathBuf::from("countryZip"),
            unzip_dir: PathBuf::from("unzipFolder"),
            reset: false,
            timeout_secs: 300,
        }
    }
}

/// Settings for building stored country objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Local copy of `countryInfo.txt`, including its `#ISO` header line.
    pub country_info: PathBuf,
    /// Folder holding the extracted `<ISO>.txt` gazetteer files.
    pub country_folder: PathBuf,
    /// Root of the object storage.
    pub storage_dir: PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            country_info: PathBuf::from("countryInfo.txt"),
            country_folder: PathBuf::from("unzipFolder"),
            storage_dir: PathBuf::from("storage"),
        }
    }
}

/// Settings for the record transform and the Tantivy index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory where the Tantivy index is stored.
    pub index_dir: PathBuf,
    /// Memory budget for the Tantivy `IndexWriter` in bytes.
    pub writer_heap_bytes: usize,
    /// Payload id treated as the object-level metadata payload. When unset
    /// the object's `<ISO>.json` payload is used.
    pub meta_pid: Option<String>,
    /// Copied into `repository_name`.
    pub repository_name: String,
    /// Copied into `repository_type`.
    pub repository_type: String,
    /// Copied into `harvest_config` when set.
    pub harvest_config: Option<String>,
    /// Copied into `harvest_rules` when set.
    pub harvest_rules: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("geonames_index"),
            writer_heap_bytes: 64 * 1024 * 1024,
            meta_pid: None,
            repository_name: "GeoNames".to_string(),
            repository_type: "Gazetteer".to_string(),
            harvest_config: None,
            harvest_rules: None,
        }
    }
}

/// Counters reported by the fetch-and-extract loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
    /// Country rows read from the reference table.
    pub countries: u64,
    /// Archives downloaded during this run.
    pub downloaded: u64,
    /// Codes skipped because the archive was already present.
    pub skipped: u64,
    /// Archive entries written to the extraction folder.
    pub extracted_entries: u64,
    /// Downloads that could not be opened as ZIP archives.
    pub invalid_archives: u64,
    /// Downloads that failed before completing.
    pub failed_downloads: u64,
}

/// Counters reported by one run of the record transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    /// Documents handed to the sink.
    pub documents: u64,
    /// Area documents among them.
    pub areas: u64,
    /// Gazetteer rows folded into the country document.
    pub merged_rows: u64,
    /// Gazetteer rows rejected by the column schema.
    pub skipped_rows: u64,
}

impl IndexSummary {
    /// Adds another summary's counters onto this one.
    pub const fn absorb(&mut self, other: Self) {
        self.documents += other.documents;
        self.areas += other.areas;
        self.merged_rows += other.merged_rows;
        self.skipped_rows += other.skipped_rows;
    }
}
