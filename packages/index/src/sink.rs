//! Destinations for emitted documents.

use std::path::Path;

use tantivy::{Index, IndexWriter, TantivyDocument};

use crate::IndexError;
use crate::document::IndexDocument;
use crate::schema::{self, FieldNames};

/// Accepts documents keyed by record id.
pub trait IndexSink {
    /// Buffers one document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be accepted.
    fn send(&mut self, document: IndexDocument) -> Result<(), IndexError>;
}

/// Collects documents in memory, in the order they were sent.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Documents received so far.
    pub documents: Vec<IndexDocument>,
}

impl MemorySink {
    /// Documents sent under `id`.
    pub fn with_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a IndexDocument> + 'a {
        self.documents.iter().filter(move |doc| doc.id() == id)
    }
}

impl IndexSink for MemorySink {
    fn send(&mut self, document: IndexDocument) -> Result<(), IndexError> {
        self.documents.push(document);
        Ok(())
    }
}

/// Writes documents into a fresh Tantivy index.
pub struct TantivySink {
    schema: tantivy::schema::Schema,
    writer: IndexWriter,
    count: u64,
}

impl TantivySink {
    /// Creates (or recreates) an index at `index_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be reset or the index
    /// cannot be created.
    pub fn create(index_dir: &Path, writer_heap_bytes: usize) -> Result<Self, IndexError> {
        if index_dir.exists() {
            log::info!("Removing existing index at {}", index_dir.display());
            std::fs::remove_dir_all(index_dir)?;
        }
        std::fs::create_dir_all(index_dir)?;

        let schema = schema::build_schema();
        let index = Index::create_in_dir(index_dir, schema.clone())?;
        let writer = index.writer(writer_heap_bytes)?;

        Ok(Self {
            schema,
            writer,
            count: 0,
        })
    }

    /// Commits buffered documents and waits for merges to finish.
    ///
    /// Returns the number of documents written.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn commit(mut self) -> Result<u64, IndexError> {
        log::info!("Committing index ({} documents)...", self.count);
        self.writer.commit()?;
        self.writer.wait_merging_threads()?;
        Ok(self.count)
    }
}

/// The stored record type: `recordType` when set, otherwise the item type.
fn record_type(document: &IndexDocument) -> &str {
    document
        .first("recordType")
        .or_else(|| document.first("item_type"))
        .unwrap_or("")
}

impl IndexSink for TantivySink {
    fn send(&mut self, document: IndexDocument) -> Result<(), IndexError> {
        let mut json = serde_json::Map::new();
        json.insert(FieldNames::ID.to_string(), document.id().into());
        json.insert(
            FieldNames::RECORD_TYPE.to_string(),
            record_type(&document).into(),
        );
        if let Some(title) = document.first("dc_title") {
            json.insert(FieldNames::TITLE.to_string(), title.into());
        }
        json.insert(
            FieldNames::FIELDS.to_string(),
            serde_json::to_value(document.fields())?,
        );

        let json = serde_json::Value::Object(json).to_string();
        let doc = TantivyDocument::parse_json(&self.schema, &json)
            .map_err(|e| IndexError::Other(format!("document {}: {e}", document.id())))?;

        self.writer.add_document(doc)?;
        self.count += 1;
        Ok(())
    }
}
