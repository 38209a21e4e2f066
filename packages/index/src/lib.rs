#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Record transform and search index for GeoNames country objects.
//!
//! # Architecture
//!
//! - **Transform**: [`transform::index_object`] turns one stored object
//!   into a `country` document plus one `area` document per gazetteer
//!   row, applying the record-level security default.
//! - **Sinks**: documents go to any [`sink::IndexSink`]; the
//!   [`sink::TantivySink`] writes a Tantivy index on disk.
//! - **Search**: [`GeonamesIndex`] opens that index and queries titles.

pub mod access;
pub mod document;
pub mod schema;
pub mod sink;
pub mod transform;

use std::path::Path;
use std::sync::Arc;

use geonames_harvest::RENDER_PENDING_PROPERTY;
use geonames_harvest::storage::{DigitalObject, FsStorage, StorageError};
use geonames_models::progress::ProgressCallback;
use geonames_models::{IndexConfig, IndexSummary};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::{Index, IndexReader, ReloadPolicy, TantivyDocument};

use access::{AccessControl, AccessError};
use schema::GeonamesFields;
use sink::{IndexSink, MemorySink};
use transform::IndexParams;

/// Errors from indexing and searching.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Tantivy error.
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Search query could not be parsed.
    #[error("Invalid query: {0}")]
    Query(#[from] tantivy::query::QueryParserError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Access-control store error.
    #[error("Access control error: {0}")]
    Access(#[from] AccessError),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A payload the transform needs is not attached to the object.
    #[error("Object {oid} has no payload {payload}")]
    MissingPayload {
        /// Object id.
        oid: String,
        /// Missing payload id.
        payload: String,
    },

    /// A property the transform needs is not set on the object.
    #[error("Object {oid} has no {property} property")]
    MissingProperty {
        /// Object id.
        oid: String,
        /// Missing property key.
        property: &'static str,
    },

    /// The metadata payload is not a JSON object.
    #[error("Metadata payload {0} is not a JSON object")]
    InvalidMetadata(String),

    /// A payload could not be read.
    #[error("Failed to read payload {payload}: {source}")]
    Payload {
        /// Payload id.
        payload: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// One or more objects failed during a batch run.
    #[error("{} object(s) failed to index: {}", .0.len(), .0.join(", "))]
    ObjectsFailed(Vec<String>),

    /// Index directory not found.
    #[error("Index directory not found: {0}")]
    IndexNotFound(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

/// Outcome of [`index_storage`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRun {
    /// Totals over every object that indexed cleanly.
    pub summary: IndexSummary,
    /// Ids of objects that failed, in processing order.
    pub failed: Vec<String>,
}

impl IndexRun {
    /// Converts a run with failures into [`IndexError::ObjectsFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ObjectsFailed`] if any object failed.
    pub fn into_result(self) -> Result<IndexSummary, IndexError> {
        if self.failed.is_empty() {
            Ok(self.summary)
        } else {
            Err(IndexError::ObjectsFailed(self.failed))
        }
    }
}

/// Indexes every payload of every stored object.
///
/// A failing object is logged and recorded in [`IndexRun::failed`], and
/// none of its documents reach `sink`; the remaining objects still run. Objects that index cleanly have their
/// `render-pending` flag cleared.
///
/// # Errors
///
/// Returns an error only if the storage root cannot be listed.
pub fn index_storage<S, A>(
    storage: &FsStorage,
    config: &IndexConfig,
    access: &mut A,
    sink: &mut S,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<IndexRun, IndexError>
where
    S: IndexSink + ?Sized,
    A: AccessControl + ?Sized,
{
    let ids = storage.object_ids()?;
    progress.set_total(ids.len() as u64);

    let mut run = IndexRun::default();
    for oid in ids {
        progress.set_message(oid.clone());
        match index_stored_object(storage, &oid, config, access, sink) {
            Ok(summary) => run.summary.absorb(summary),
            Err(e) => {
                log::error!("Failed to index object {oid}: {e}");
                run.failed.push(oid);
            }
        }
        progress.inc(1);
    }

    log::info!(
        "Indexed {} documents ({} areas, {} merged rows, {} skipped rows), {} failed objects",
        run.summary.documents,
        run.summary.areas,
        run.summary.merged_rows,
        run.summary.skipped_rows,
        run.failed.len()
    );
    progress.finish(format!("{} documents indexed", run.summary.documents));

    Ok(run)
}

fn index_stored_object<S, A>(
    storage: &FsStorage,
    oid: &str,
    config: &IndexConfig,
    access: &mut A,
    sink: &mut S,
) -> Result<IndexSummary, IndexError>
where
    S: IndexSink + ?Sized,
    A: AccessControl + ?Sized,
{
    let Some(mut object) = storage.get(oid)? else {
        return Err(IndexError::Other(format!("Object {oid} vanished from storage")));
    };
    let params = IndexParams::for_object(&object, config)?;

    // Held back until every payload succeeds so a failing object leaves
    // no orphan area documents behind.
    let mut pending = MemorySink::default();
    let mut summary = IndexSummary::default();
    for payload_id in object.payload_ids()? {
        summary.absorb(transform::index_object(
            &mut pending,
            &object,
            &payload_id,
            &params,
            access,
        )?);
    }
    for document in pending.documents {
        sink.send(document)?;
    }

    object.set_property(RENDER_PENDING_PROPERTY, "false");
    object.save()?;

    Ok(summary)
}

/// A single search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Record id.
    pub id: String,
    /// Record title.
    pub title: String,
    /// `country`, `area`, or the item type.
    pub record_type: String,
    /// BM25 score.
    pub score: f32,
}

/// A handle to an opened GeoNames index.
pub struct GeonamesIndex {
    index: Index,
    fields: GeonamesFields,
    reader: IndexReader,
}

impl GeonamesIndex {
    /// Opens an index previously written by [`sink::TantivySink`].
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or does not
    /// contain a valid index.
    pub fn open(index_dir: impl AsRef<Path>) -> Result<Self, IndexError> {
        let index_dir = index_dir.as_ref();
        if !index_dir.exists() {
            return Err(IndexError::IndexNotFound(index_dir.display().to_string()));
        }

        log::info!("Opening GeoNames index at {}", index_dir.display());

        let index = Index::open_in_dir(index_dir)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        let fields = GeonamesFields::from_schema(&index.schema())?;

        Ok(Self {
            index,
            fields,
            reader,
        })
    }

    /// Returns the total number of documents in the index.
    #[must_use]
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Searches titles, best match first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be parsed or the search fails.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, IndexError> {
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.fields.title]);
        let query = parser.parse_query(query)?;

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let text = |field: Field| {
                doc.get_first(field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };
            hits.push(SearchHit {
                id: text(self.fields.id),
                title: text(self.fields.title),
                record_type: text(self.fields.record_type),
                score,
            });
        }

        Ok(hits)
    }
}
