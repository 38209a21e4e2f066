//! Parsing for the GeoNames `countryInfo.txt` reference table.
//!
//! The table is tab-separated with one country per line. Lines starting
//! with `#` are comments, except the `#ISO\t...` line which names the
//! columns.

use std::io::BufRead;

/// Prefix of the comment line that carries the column names.
const HEADER_PREFIX: &str = "#ISO\t";

/// Column holding the two-letter ISO code.
pub const ISO_COLUMN: &str = "ISO";

/// Column holding the country's display name.
pub const COUNTRY_COLUMN: &str = "Country";

/// Column holding the country's own geoname id.
pub const GEONAME_ID_COLUMN: &str = "geonameid";

/// Returns `true` for lines that carry no country row.
#[must_use]
pub fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.trim().is_empty()
}

/// Extracts the ISO code (first column) from a data line.
///
/// Returns `None` for comment and blank lines.
#[must_use]
pub fn iso_code(line: &str) -> Option<&str> {
    if is_comment(line) {
        return None;
    }
    line.split('\t')
        .next()
        .map(str::trim)
        .filter(|code| !code.is_empty())
}

/// Normalises the `#ISO\t...` header line into column names.
///
/// The leading `#` is dropped, any column starting with `Area` becomes
/// `AreaInSqKm`, and remaining names are trimmed with spaces replaced by
/// underscores.
#[must_use]
pub fn parse_header(line: &str) -> Vec<String> {
    let line = line.strip_prefix('#').unwrap_or(line);
    line.trim_end_matches(['\r', '\n'])
        .split('\t')
        .map(|name| {
            if name.starts_with("Area") {
                "AreaInSqKm".to_string()
            } else {
                name.trim().replace(' ', "_")
            }
        })
        .collect()
}

/// One data row of the reference table, paired with the header names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRow {
    values: Vec<(String, String)>,
}

impl CountryRow {
    /// The row's ISO code, or `""` if the column is absent.
    #[must_use]
    pub fn iso_code(&self) -> &str {
        self.value(ISO_COLUMN).unwrap_or("")
    }

    /// The row's country name, or `""` if the column is absent.
    #[must_use]
    pub fn country_name(&self) -> &str {
        self.value(COUNTRY_COLUMN).unwrap_or("")
    }

    /// The row's geoname id, if present and non-empty.
    #[must_use]
    pub fn geoname_id(&self) -> Option<&str> {
        self.value(GEONAME_ID_COLUMN).filter(|id| !id.is_empty())
    }

    /// Looks up a value by normalised column name.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Column/value pairs in table order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The parsed reference table.
#[derive(Debug, Clone, Default)]
pub struct CountryTable {
    /// Normalised column names from the `#ISO` header line.
    pub header: Vec<String>,
    /// Data rows that followed the header.
    pub rows: Vec<CountryRow>,
}

impl CountryTable {
    /// Reads the table from a line source.
    ///
    /// Rows are only collected after the header line has been seen. Values
    /// beyond the last header column are dropped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a line cannot be read.
    pub fn parse(reader: impl BufRead) -> std::io::Result<Self> {
        let mut table = Self::default();
        let mut in_body = false;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');

            if line.starts_with(HEADER_PREFIX) {
                table.header = parse_header(line);
                in_body = true;
                continue;
            }
            if !in_body || is_comment(line) {
                continue;
            }

            let values = table
                .header
                .iter()
                .cloned()
                .zip(line.split('\t').map(str::to_string))
                .collect();
            table.rows.push(CountryRow { values });
        }

        Ok(table)
    }
}
