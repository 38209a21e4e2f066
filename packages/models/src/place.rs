//! The fixed GeoNames gazetteer row schema.
//!
//! Per-country dump files (`<ISO>.txt`) hold one place per line with
//! exactly [`PLACE_COLUMNS`] tab-separated columns. The same column list
//! names the fields copied into index documents, so parser and serializer
//! can never disagree about positions.

/// Prefix used to build a place's canonical URL.
pub const GEONAMES_URL_PREFIX: &str = "http://geonames.org/";

/// Column names of a gazetteer row, in file order.
pub const PLACE_COLUMNS: [&str; 19] = [
    "geonameid",
    "name",
    "asciiname",
    "alternatenames",
    "latitude",
    "longitude",
    "feature class",
    "feature code",
    "country code",
    "cc2",
    "admin1 code",
    "admin2 code",
    "admin3 code",
    "admin4 code",
    "population",
    "elevation",
    "gtopo30",
    "timezone",
    "modification date",
];

/// Columns never copied into index documents.
pub const EXCLUDED_COLUMNS: &[&str] = &["alternatenames"];

const GEONAME_ID: usize = 0;
const NAME: usize = 1;

/// Canonical URL for a geoname id.
#[must_use]
pub fn geoname_url(geoname_id: &str) -> String {
    format!("{GEONAMES_URL_PREFIX}{geoname_id}")
}

/// Record identifier for a geoname: the lowercase hex MD5 of its URL.
#[must_use]
pub fn geoname_object_id(geoname_id: &str) -> String {
    format!("{:x}", md5::compute(geoname_url(geoname_id).as_bytes()))
}

/// A gazetteer line whose column count does not match [`PLACE_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected} tab-separated columns, found {found}")]
pub struct ColumnMismatch {
    /// Number of columns the schema declares.
    pub expected: usize,
    /// Number of columns found on the line.
    pub found: usize,
}

/// One validated gazetteer line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceRow<'a> {
    values: [&'a str; PLACE_COLUMNS.len()],
}

impl<'a> PlaceRow<'a> {
    /// Splits a line on tabs and checks it against the schema.
    ///
    /// A trailing `\r` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ColumnMismatch`] if the line does not have exactly
    /// [`PLACE_COLUMNS`] columns.
    pub fn parse(line: &'a str) -> Result<Self, ColumnMismatch> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let parts: Vec<&str> = line.split('\t').collect();
        let found = parts.len();
        let values = parts.try_into().map_err(|_| ColumnMismatch {
            expected: PLACE_COLUMNS.len(),
            found,
        })?;
        Ok(Self { values })
    }

    /// The numeric geoname id (first column).
    #[must_use]
    pub const fn geoname_id(&self) -> &'a str {
        self.values[GEONAME_ID]
    }

    /// The place's name (second column).
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.values[NAME]
    }

    /// The record identifier derived from [`Self::geoname_id`].
    #[must_use]
    pub fn object_id(&self) -> String {
        geoname_object_id(self.geoname_id())
    }

    /// Looks up a value by schema column name.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<&'a str> {
        PLACE_COLUMNS
            .iter()
            .position(|name| *name == column)
            .map(|i| self.values[i])
    }

    /// Column/value pairs to copy into a document: non-empty values of
    /// every column except [`EXCLUDED_COLUMNS`].
    pub fn indexable_columns(&self) -> impl Iterator<Item = (&'static str, &'a str)> + '_ {
        PLACE_COLUMNS
            .iter()
            .zip(self.values)
            .filter(|&(name, value)| !value.is_empty() && !EXCLUDED_COLUMNS.contains(name))
            .map(|(name, value)| (*name, value))
    }
}
