#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Builds stored GeoNames country objects.
//!
//! Reads `countryInfo.txt` (header line included) and, for every country
//! whose gazetteer `<ISO>.txt` was extracted into the country folder,
//! creates or updates one object in [`storage::FsStorage`]:
//!
//! - id: MD5 hex of `http://geonames.org/<geonameid>`
//! - `<ISO>.json`: the country's reference row as a JSON object
//! - `<ISO>.txt`: a copy of the gazetteer
//! - properties `ISOcode`, `countryName`, `render-pending`

pub mod storage;

use std::collections::{BTreeMap, BTreeSet};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use geonames_models::country::{CountryRow, CountryTable, GEONAME_ID_COLUMN};
use geonames_models::place::{geoname_object_id, geoname_url};
use geonames_models::progress::ProgressCallback;
use geonames_models::{COUNTRY_INFO_URL, HarvestConfig};

use storage::{FsStorage, StorageError};

/// Object property holding the ISO code.
pub const ISO_CODE_PROPERTY: &str = "ISOcode";

/// Object property holding the country name.
pub const COUNTRY_NAME_PROPERTY: &str = "countryName";

/// Object property flagging the object for (re)indexing.
pub const RENDER_PENDING_PROPERTY: &str = "render-pending";

/// Errors from harvesting.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// The reference table is not present locally.
    #[error("Fail to read file {path}, download it from {url}", url = COUNTRY_INFO_URL)]
    ReferenceMissing {
        /// Expected location of the reference table.
        path: String,
    },

    /// The reference table has no `#ISO` header line.
    #[error("No #ISO header line in {0}")]
    MissingHeader(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON serialisation error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Name of a country's metadata payload.
#[must_use]
pub fn metadata_payload_id(iso_code: &str) -> String {
    format!("{iso_code}.json")
}

/// Name of a country's gazetteer payload.
#[must_use]
pub fn gazetteer_payload_id(iso_code: &str) -> String {
    format!("{iso_code}.txt")
}

/// Builds the metadata stored for a country: every reference column plus
/// `dc_identifier` (the geoname URL) and `dc_title` (the country name).
#[must_use]
pub fn country_metadata(row: &CountryRow) -> BTreeMap<String, String> {
    let mut metadata: BTreeMap<String, String> = row
        .columns()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if let Some(id) = row.value(GEONAME_ID_COLUMN) {
        metadata.insert("dc_identifier".to_string(), geoname_url(id));
    }
    metadata.insert("dc_title".to_string(), row.country_name().to_string());

    metadata
}

/// Reads and parses the reference table.
///
/// # Errors
///
/// Returns [`HarvestError::ReferenceMissing`] if the file is absent and
/// [`HarvestError::MissingHeader`] if it has no `#ISO` header.
pub fn read_country_table(path: &Path) -> Result<CountryTable, HarvestError> {
    if !path.is_file() {
        return Err(HarvestError::ReferenceMissing {
            path: path.display().to_string(),
        });
    }

    let file = std::fs::File::open(path).map_err(|e| HarvestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let table = CountryTable::parse(BufReader::new(file)).map_err(|e| HarvestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    if table.header.is_empty() {
        return Err(HarvestError::MissingHeader(path.display().to_string()));
    }

    Ok(table)
}

/// Creates or updates the stored object for one country.
///
/// Returns `Ok(None)` when the country has no extracted gazetteer or no
/// geoname id.
///
/// # Errors
///
/// Returns an error if the object cannot be written.
pub fn harvest_country(
    row: &CountryRow,
    country_folder: &Path,
    storage: &FsStorage,
) -> Result<Option<String>, HarvestError> {
    let iso_code = row.iso_code();
    log::debug!("Processing... {iso_code}");

    let gazetteer = country_folder.join(gazetteer_payload_id(iso_code));
    if iso_code.is_empty() || !gazetteer.is_file() {
        log::debug!("  no gazetteer at {}, skipping", gazetteer.display());
        return Ok(None);
    }

    let Some(geoname_id) = row.geoname_id() else {
        log::warn!("  {iso_code} has no geonameid, skipping");
        return Ok(None);
    };

    let oid = geoname_object_id(geoname_id);
    log::info!(
        "Creating Geoname object: {} with url: {}",
        row.country_name(),
        geoname_url(geoname_id)
    );

    let metadata = serde_json::to_vec_pretty(&country_metadata(row))?;

    let mut object = storage.get_or_create(&oid)?;
    object.write_payload(&metadata_payload_id(iso_code), &metadata)?;
    object.copy_payload(&gazetteer_payload_id(iso_code), &gazetteer)?;
    object.set_property(ISO_CODE_PROPERTY, iso_code);
    object.set_property(COUNTRY_NAME_PROPERTY, row.country_name());
    object.set_property(RENDER_PENDING_PROPERTY, "true");
    object.save()?;

    Ok(Some(oid))
}

/// Harvests every country in the reference table into `storage`.
///
/// Returns the ids of the objects created or updated.
///
/// # Errors
///
/// Returns an error if the reference table cannot be read or an object
/// cannot be written.
pub fn harvest(
    config: &HarvestConfig,
    storage: &FsStorage,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<BTreeSet<String>, HarvestError> {
    let table = read_country_table(&config.country_info)?;
    progress.set_total(table.rows.len() as u64);

    let mut ids = BTreeSet::new();
    for row in &table.rows {
        progress.set_message(row.iso_code().to_string());
        if let Some(oid) = harvest_country(row, &config.country_folder, storage)? {
            ids.insert(oid);
        }
        progress.inc(1);
    }

    log::info!("Harvested {} country objects", ids.len());
    progress.finish(format!("{} countries harvested", ids.len()));

    Ok(ids)
}
