//! Turns one stored country object into index documents.
//!
//! The object-level pass emits a `country` document with every metadata
//! key copied verbatim, and one `area` document per gazetteer row. The row
//! whose derived id equals the object's own id is the country's own
//! gazetteer entry: it is folded into the country document instead of
//! producing a duplicate.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::BufRead;

use geonames_harvest::storage::DigitalObject;
use geonames_harvest::{
    COUNTRY_NAME_PROPERTY, ISO_CODE_PROPERTY, gazetteer_payload_id, metadata_payload_id,
};
use geonames_models::place::PlaceRow;
use geonames_models::{DISPLAY_TYPE, GUEST_ROLE, IndexConfig, IndexSummary};

use crate::IndexError;
use crate::access::AccessControl;
use crate::document::IndexDocument;
use crate::sink::IndexSink;

/// Timestamp layout of `last_modified`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Whether a document describes the object itself or one of its payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    /// The object-level record (metadata payload).
    Object,
    /// Any other payload of the object.
    Datastream,
}

impl ItemType {
    /// Value of the `item_type` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Datastream => "datastream",
        }
    }
}

/// Per-object parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexParams {
    /// Payload id that selects the object-level pass.
    pub meta_pid: String,
    /// The country's ISO code.
    pub iso_code: String,
    /// The country's name, copied onto area documents.
    pub country_name: String,
    /// Repository name.
    pub repository_name: String,
    /// Repository type.
    pub repository_type: String,
    /// Harvest configuration id.
    pub harvest_config: Option<String>,
    /// Harvest rules id.
    pub harvest_rules: Option<String>,
}

impl IndexParams {
    /// Combines an object's properties with the index configuration.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::MissingProperty`] if the object has no ISO
    /// code.
    pub fn for_object<O: DigitalObject + ?Sized>(
        object: &O,
        config: &IndexConfig,
    ) -> Result<Self, IndexError> {
        let iso_code = object
            .property(ISO_CODE_PROPERTY)
            .filter(|code| !code.is_empty())
            .ok_or_else(|| IndexError::MissingProperty {
                oid: object.id().to_string(),
                property: ISO_CODE_PROPERTY,
            })?
            .to_string();

        Ok(Self {
            meta_pid: config
                .meta_pid
                .clone()
                .unwrap_or_else(|| metadata_payload_id(&iso_code)),
            country_name: object
                .property(COUNTRY_NAME_PROPERTY)
                .unwrap_or_default()
                .to_string(),
            iso_code,
            repository_name: config.repository_name.clone(),
            repository_type: config.repository_type.clone(),
            harvest_config: config.harvest_config.clone(),
            harvest_rules: config.harvest_rules.clone(),
        })
    }
}

/// Indexes one payload of an object.
///
/// When `payload_id` is the metadata pid, emits the area documents and
/// then the country document; otherwise emits a single datastream
/// document. The main document is always sent last.
///
/// # Errors
///
/// Returns [`IndexError::MissingPayload`] if the object-level pass cannot
/// find the metadata or gazetteer payload; in that case nothing is sent.
/// Also fails on unreadable payloads, access-store errors and sink errors.
pub fn index_object<S, O, A>(
    sink: &mut S,
    object: &O,
    payload_id: &str,
    params: &IndexParams,
    access: &mut A,
) -> Result<IndexSummary, IndexError>
where
    S: IndexSink + ?Sized,
    O: DigitalObject + ?Sized,
    A: AccessControl + ?Sized,
{
    let timestamp = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();

    let (record_id, item_type) = if payload_id == params.meta_pid {
        (object.id().to_string(), ItemType::Object)
    } else {
        (format!("{}/{payload_id}", object.id()), ItemType::Datastream)
    };

    let mut doc = IndexDocument::new(record_id.as_str());
    if item_type == ItemType::Datastream {
        doc.add("identifier", payload_id);
    }
    doc.add("id", record_id.as_str());
    doc.add("storage_id", record_id.as_str());
    doc.add("item_type", item_type.as_str());
    doc.add("last_modified", timestamp.as_str());
    doc.add_opt("harvest_config", params.harvest_config.as_deref());
    doc.add_opt("harvest_rules", params.harvest_rules.as_deref());
    doc.add("display_type", DISPLAY_TYPE);

    let mut summary = IndexSummary::default();

    if item_type == ItemType::Object {
        doc.add("repository_name", params.repository_name.as_str());
        doc.add("repository_type", params.repository_type.as_str());

        log::info!("*** Processing: {}", params.iso_code);

        let metadata_id = metadata_payload_id(&params.iso_code);
        let gazetteer_id = gazetteer_payload_id(&params.iso_code);
        let metadata = open_required(object, &metadata_id)?;
        let gazetteer = open_required(object, &gazetteer_id)?;

        doc.add("recordType", "country");
        for (key, value) in read_metadata(metadata, &metadata_id)? {
            doc.add(key, value);
        }

        let context = AreaContext {
            parent_id: object.id(),
            item_type,
            timestamp: &timestamp,
            params,
        };
        summary = index_gazetteer(sink, gazetteer, &gazetteer_id, &context, &mut doc)?;
    }

    apply_security(&mut doc, access)?;
    sink.send(doc)?;
    summary.documents += 1;

    Ok(summary)
}

fn open_required<'a, O: DigitalObject + ?Sized>(
    object: &'a O,
    payload_id: &str,
) -> Result<Box<dyn BufRead + 'a>, IndexError> {
    object
        .open_payload(payload_id)?
        .ok_or_else(|| IndexError::MissingPayload {
            oid: object.id().to_string(),
            payload: payload_id.to_string(),
        })
}

/// Reads a JSON object payload into string values.
///
/// Strings are copied as-is, `null` becomes an empty string, and any other
/// value keeps its JSON text.
fn read_metadata(
    reader: Box<dyn BufRead + '_>,
    payload_id: &str,
) -> Result<BTreeMap<String, String>, IndexError> {
    let value: serde_json::Value = serde_json::from_reader(reader)?;
    let serde_json::Value::Object(map) = value else {
        return Err(IndexError::InvalidMetadata(payload_id.to_string()));
    };

    Ok(map
        .into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::Null => (key, String::new()),
            serde_json::Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect())
}

/// Fields every area document inherits from its country.
struct AreaContext<'a> {
    parent_id: &'a str,
    item_type: ItemType,
    timestamp: &'a str,
    params: &'a IndexParams,
}

impl AreaContext<'_> {
    fn new_area(&self, area_id: &str) -> IndexDocument {
        let mut area = IndexDocument::new(area_id);
        area.add("recordType", "area");
        area.add("item_type", self.item_type.as_str());
        area.add("dc_identifier", area_id);
        area.add("id", area_id);
        area.add("storage_id", self.parent_id);
        area.add("last_modified", self.timestamp);
        area.add("display_type", DISPLAY_TYPE);
        area.add("countryName", self.params.country_name.as_str());
        area.add("repository_name", self.params.repository_name.as_str());
        area.add("repository_type", self.params.repository_type.as_str());
        area.add("security_filter", GUEST_ROLE);
        area
    }
}

fn add_place(doc: &mut IndexDocument, row: &PlaceRow<'_>) {
    doc.add("dc_title", row.name());
    for (column, value) in row.indexable_columns() {
        doc.add(column, value);
    }
}

/// Walks the gazetteer, sending area documents and folding the object's
/// own row into `country`.
fn index_gazetteer<S: IndexSink + ?Sized>(
    sink: &mut S,
    mut reader: Box<dyn BufRead + '_>,
    payload_id: &str,
    context: &AreaContext<'_>,
    country: &mut IndexDocument,
) -> Result<IndexSummary, IndexError> {
    let mut summary = IndexSummary::default();

    let mut buf = Vec::new();
    let mut number = 0_usize;

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| IndexError::Payload {
                payload: payload_id.to_string(),
                source: e,
            })?;
        if read == 0 {
            break;
        }
        number += 1;

        let bytes = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
        let line = String::from_utf8_lossy(bytes);
        if matches!(line, Cow::Owned(_)) {
            log::warn!("{payload_id} line {number}: invalid UTF-8 replaced");
        }

        let row = match PlaceRow::parse(&line) {
            Ok(row) => row,
            Err(e) => {
                log::warn!("{payload_id} line {number}: {e}, skipping");
                summary.skipped_rows += 1;
                continue;
            }
        };

        let area_id = row.object_id();
        if area_id == context.parent_id {
            add_place(country, &row);
            summary.merged_rows += 1;
            continue;
        }

        let mut area = context.new_area(&area_id);
        add_place(&mut area, &row);
        sink.send(area)?;
        summary.documents += 1;
        summary.areas += 1;
    }

    Ok(summary)
}

/// Copies the record's roles into `security_filter`, defaulting (and
/// persisting) `guest` when the store has none.
fn apply_security<A: AccessControl + ?Sized>(
    doc: &mut IndexDocument,
    access: &mut A,
) -> Result<(), IndexError> {
    match access.roles_with_access(doc.id())? {
        Some(roles) if !roles.is_empty() => {
            for role in roles {
                doc.add("security_filter", role);
            }
        }
        _ => {
            let record_id = doc.id().to_string();
            access.grant_role(&record_id, GUEST_ROLE)?;
            doc.add("security_filter", GUEST_ROLE);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use geonames_harvest::storage::StorageError;
    use geonames_models::place::geoname_object_id;

    use crate::access::MemoryAccess;
    use crate::sink::MemorySink;

    /// In-memory stand-in for a stored object.
    struct TestObject {
        id: String,
        properties: BTreeMap<String, String>,
        payloads: BTreeMap<String, Vec<u8>>,
    }

    impl TestObject {
        fn country(iso: &str, name: &str, geoname_id: &str) -> Self {
            let mut properties = BTreeMap::new();
            properties.insert(ISO_CODE_PROPERTY.to_string(), iso.to_string());
            properties.insert(COUNTRY_NAME_PROPERTY.to_string(), name.to_string());
            Self {
                id: geoname_object_id(geoname_id),
                properties,
                payloads: BTreeMap::new(),
            }
        }

        fn with_payload(self, id: &str, contents: &str) -> Self {
            self.with_bytes(id, contents.as_bytes())
        }

        fn with_bytes(mut self, id: &str, contents: &[u8]) -> Self {
            self.payloads.insert(id.to_string(), contents.to_vec());
            self
        }
    }

    impl DigitalObject for TestObject {
        fn id(&self) -> &str {
            &self.id
        }

        fn property(&self, key: &str) -> Option<&str> {
            self.properties.get(key).map(String::as_str)
        }

        fn payload_ids(&self) -> Result<Vec<String>, StorageError> {
            Ok(self.payloads.keys().cloned().collect())
        }

        fn open_payload(
            &self,
            payload_id: &str,
        ) -> Result<Option<Box<dyn BufRead + '_>>, StorageError> {
            Ok(self
                .payloads
                .get(payload_id)
                .map(|bytes| Box::new(bytes.as_slice()) as Box<dyn BufRead + '_>))
        }
    }

    const AUSTRALIA_ROW: &str = "2077456\tAustralia\tAustralia\tAvstralija,Australie\t-25\t135\tA\tPCLI\tAU\t\t00\t\t\t\t24992369\t\t330\tAustralia/Sydney\t2019-10-04";
    const MELBOURNE_ROW: &str = "2158177\tMelbourne\tMelbourne\t\t-37.814\t144.96332\tP\tPPLA\tAU\t\t07\t24600\t\t\t4917750\t\t25\tAustralia/Melbourne\t2019-07-17";
    const SYDNEY_ROW: &str = "2147714\tSydney\tSydney\tSIDNEJ,Sidney\t-33.86785\t151.20732\tP\tPPLA\tAU\t\t02\t17200\t\t\t4627345\t\t58\tAustralia/Sydney\t2020-05-25";

    fn australia(gazetteer: &str) -> TestObject {
        TestObject::country("AU", "Australia", "2077456")
            .with_payload(
                "AU.json",
                r#"{"ISO": "AU", "Capital": "Canberra", "geonameid": "2077456", "dc_title": "Australia", "missing": null, "count": 3}"#,
            )
            .with_payload("AU.txt", gazetteer)
    }

    fn params(object: &TestObject) -> IndexParams {
        IndexParams::for_object(object, &IndexConfig::default()).unwrap()
    }

    #[test]
    fn own_row_is_merged_into_country_document() {
        let object = australia(AUSTRALIA_ROW);
        let mut sink = MemorySink::default();
        let mut access = MemoryAccess::new();

        let summary =
            index_object(&mut sink, &object, "AU.json", &params(&object), &mut access).unwrap();

        assert_eq!(sink.documents.len(), 1);
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.merged_rows, 1);
        assert_eq!(summary.areas, 0);

        let country = &sink.documents[0];
        assert_eq!(country.id(), object.id);
        assert_eq!(country.first("recordType"), Some("country"));
        assert_eq!(country.first("item_type"), Some("object"));
        assert_eq!(country.first("Capital"), Some("Canberra"));
        assert_eq!(country.first("count"), Some("3"));
        assert_eq!(country.values("missing"), [""]);
        // Title from metadata plus the merged row's name.
        assert_eq!(country.values("dc_title"), ["Australia", "Australia"]);
        assert_eq!(country.first("feature code"), Some("PCLI"));
        assert!(!country.contains("alternatenames"));
        assert!(!country.contains("cc2"));
    }

    #[test]
    fn other_rows_become_area_documents() {
        let object = australia(&format!("{AUSTRALIA_ROW}\n{SYDNEY_ROW}\n"));
        let mut sink = MemorySink::default();
        let mut access = MemoryAccess::new();

        let summary =
            index_object(&mut sink, &object, "AU.json", &params(&object), &mut access).unwrap();

        assert_eq!(summary.documents, 2);
        assert_eq!(summary.areas, 1);
        assert_eq!(sink.with_id(&object.id).count(), 1);

        let sydney_id = geoname_object_id("2147714");
        let area = sink.with_id(&sydney_id).next().unwrap();
        assert_eq!(area.first("recordType"), Some("area"));
        assert_eq!(area.first("dc_identifier"), Some(sydney_id.as_str()));
        assert_eq!(area.first("storage_id"), Some(object.id.as_str()));
        assert_eq!(area.first("countryName"), Some("Australia"));
        assert_eq!(area.first("dc_title"), Some("Sydney"));
        assert_eq!(area.first("admin2 code"), Some("17200"));
        assert_eq!(area.first("repository_name"), Some("GeoNames"));
        assert_eq!(area.values("security_filter"), ["guest"]);
        assert!(!area.contains("alternatenames"));
        assert!(!area.contains("admin3 code"));

        for doc in &sink.documents {
            assert!(!doc.contains("alternatenames"));
            assert_eq!(doc.first("display_type"), Some(DISPLAY_TYPE));
        }

        // The country document is sent last.
        assert_eq!(sink.documents.last().unwrap().id(), object.id);
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let object = australia(&format!("only\tthree\tcolumns\n\n{SYDNEY_ROW}\n"));
        let mut sink = MemorySink::default();
        let mut access = MemoryAccess::new();

        let summary =
            index_object(&mut sink, &object, "AU.json", &params(&object), &mut access).unwrap();

        assert_eq!(summary.skipped_rows, 2);
        assert_eq!(summary.areas, 1);
    }

    #[test]
    fn invalid_utf8_is_replaced_and_later_rows_still_indexed() {
        let rest = SYDNEY_ROW.strip_prefix("2147714\tSydney\t").unwrap();
        let mut gazetteer = format!("{AUSTRALIA_ROW}\n").into_bytes();
        gazetteer.extend_from_slice(b"2147714\tSyd\xffney\t");
        gazetteer.extend_from_slice(rest.as_bytes());
        gazetteer.extend_from_slice(format!("\n{MELBOURNE_ROW}\n").as_bytes());

        let object = TestObject::country("AU", "Australia", "2077456")
            .with_payload("AU.json", r#"{"ISO": "AU"}"#)
            .with_bytes("AU.txt", &gazetteer);
        let mut sink = MemorySink::default();
        let mut access = MemoryAccess::new();

        let summary =
            index_object(&mut sink, &object, "AU.json", &params(&object), &mut access).unwrap();

        assert_eq!(summary.skipped_rows, 0);
        assert_eq!(summary.merged_rows, 1);
        assert_eq!(summary.areas, 2);

        let sydney_id = geoname_object_id("2147714");
        let sydney = sink.with_id(&sydney_id).next().unwrap();
        assert_eq!(sydney.first("dc_title"), Some("Syd\u{fffd}ney"));
        let melbourne_id = geoname_object_id("2158177");
        let melbourne = sink.with_id(&melbourne_id).next().unwrap();
        assert_eq!(melbourne.first("dc_title"), Some("Melbourne"));
    }

    #[test]
    fn no_roles_defaults_to_guest_and_persists_it() {
        let object = australia(AUSTRALIA_ROW);
        let mut sink = MemorySink::default();
        let mut access = MemoryAccess::new();

        index_object(&mut sink, &object, "AU.json", &params(&object), &mut access).unwrap();

        assert_eq!(sink.documents[0].values("security_filter"), ["guest"]);
        assert_eq!(
            access.roles_with_access(&object.id).unwrap(),
            Some(vec!["guest".to_string()])
        );
    }

    #[test]
    fn existing_roles_are_propagated() {
        let object = australia(AUSTRALIA_ROW);
        let mut sink = MemorySink::default();
        let mut access = MemoryAccess::new().with_roles(&object.id, &["admin", "librarian"]);

        index_object(&mut sink, &object, "AU.json", &params(&object), &mut access).unwrap();

        assert_eq!(
            sink.documents[0].values("security_filter"),
            ["admin", "librarian"]
        );
    }

    #[test]
    fn missing_gazetteer_is_fatal_and_sends_nothing() {
        let object = TestObject::country("AU", "Australia", "2077456")
            .with_payload("AU.json", r#"{"ISO": "AU"}"#);
        let mut sink = MemorySink::default();
        let mut access = MemoryAccess::new();

        let err = index_object(&mut sink, &object, "AU.json", &params(&object), &mut access)
            .unwrap_err();

        assert!(matches!(err, IndexError::MissingPayload { ref payload, .. } if payload == "AU.txt"));
        assert!(sink.documents.is_empty());
    }

    #[test]
    fn missing_metadata_is_fatal() {
        let object =
            TestObject::country("AU", "Australia", "2077456").with_payload("AU.txt", AUSTRALIA_ROW);
        let mut sink = MemorySink::default();
        let mut access = MemoryAccess::new();

        let err = index_object(&mut sink, &object, "AU.json", &params(&object), &mut access)
            .unwrap_err();

        assert!(matches!(err, IndexError::MissingPayload { ref payload, .. } if payload == "AU.json"));
        assert!(sink.documents.is_empty());
    }

    #[test]
    fn other_payloads_become_datastream_documents() {
        let object = australia(AUSTRALIA_ROW);
        let mut sink = MemorySink::default();
        let mut access = MemoryAccess::new();

        let summary =
            index_object(&mut sink, &object, "AU.txt", &params(&object), &mut access).unwrap();

        assert_eq!(summary.documents, 1);
        let doc = &sink.documents[0];
        let expected_id = format!("{}/AU.txt", object.id);
        assert_eq!(doc.id(), expected_id);
        assert_eq!(doc.first("item_type"), Some("datastream"));
        assert_eq!(doc.first("identifier"), Some("AU.txt"));
        assert_eq!(doc.first("storage_id"), Some(expected_id.as_str()));
        assert!(!doc.contains("recordType"));
        assert!(!doc.contains("repository_name"));
        assert_eq!(doc.values("security_filter"), ["guest"]);
    }

    #[test]
    fn configured_provenance_is_copied() {
        let object = australia(AUSTRALIA_ROW);
        let config = IndexConfig {
            harvest_config: Some("geonames.toml".to_string()),
            harvest_rules: Some("rules-1".to_string()),
            ..IndexConfig::default()
        };
        let params = IndexParams::for_object(&object, &config).unwrap();
        let mut sink = MemorySink::default();

        index_object(&mut sink, &object, "AU.json", &params, &mut MemoryAccess::new()).unwrap();

        let doc = &sink.documents[0];
        assert_eq!(doc.first("harvest_config"), Some("geonames.toml"));
        assert_eq!(doc.first("harvest_rules"), Some("rules-1"));
        let modified = doc.first("last_modified").unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(modified, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn object_without_iso_code_is_rejected() {
        let object = TestObject {
            id: "x".to_string(),
            properties: BTreeMap::new(),
            payloads: BTreeMap::new(),
        };
        let err = IndexParams::for_object(&object, &IndexConfig::default()).unwrap_err();
        assert!(matches!(err, IndexError::MissingProperty { .. }));
    }
}
