//! Tantivy index schema for GeoNames documents.
//!
//! Documents carry an open-ended set of fields (metadata keys are copied
//! verbatim), so everything except a few search handles goes into one
//! JSON field.

use tantivy::schema::{
    Field, IndexRecordOption, JsonObjectOptions, STORED, STRING, Schema, TEXT, TextFieldIndexing,
};

/// Names of all fields in the schema.
pub struct FieldNames;

impl FieldNames {
    /// Record id, exact match.
    pub const ID: &'static str = "id";
    /// `country`, `area`, or the item type for datastreams.
    pub const RECORD_TYPE: &'static str = "record_type";
    /// Tokenized `dc_title`.
    pub const TITLE: &'static str = "title";
    /// Every document field as a JSON object of string arrays.
    pub const FIELDS: &'static str = "fields";
}

/// All resolved field handles.
#[derive(Debug, Clone)]
pub struct GeonamesFields {
    /// Record id.
    pub id: Field,
    /// Record type.
    pub record_type: Field,
    /// Title.
    pub title: Field,
    /// Dynamic document fields.
    pub fields: Field,
}

impl GeonamesFields {
    /// Resolves field handles from a schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema was not built by [`build_schema`].
    pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
        Ok(Self {
            id: schema.get_field(FieldNames::ID)?,
            record_type: schema.get_field(FieldNames::RECORD_TYPE)?,
            title: schema.get_field(FieldNames::TITLE)?,
            fields: schema.get_field(FieldNames::FIELDS)?,
        })
    }
}

/// Builds the schema:
/// - `id` STRING + stored
/// - `record_type` STRING + stored
/// - `title` TEXT + stored
/// - `fields` JSON, tokenized + stored
#[must_use]
pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field(FieldNames::ID, STRING | STORED);
    builder.add_text_field(FieldNames::RECORD_TYPE, STRING | STORED);
    builder.add_text_field(FieldNames::TITLE, TEXT | STORED);

    let json_options = JsonObjectOptions::default().set_stored().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    builder.add_json_field(FieldNames::FIELDS, json_options);

    builder.build()
}
