//! Record-level access control.
//!
//! The transform only needs two operations: look up the roles allowed to
//! see a record, and grant a role when nothing is recorded yet.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Access-control store keyed by record id.
pub trait AccessControl {
    /// Roles with access to the record, or `None` if nothing is recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn roles_with_access(&self, record_id: &str) -> Result<Option<Vec<String>>, AccessError>;

    /// Grants a role on a record and persists it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn grant_role(&mut self, record_id: &str, role: &str) -> Result<(), AccessError>;
}

/// Errors from access-control stores.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Store file is not valid JSON.
    #[error("Invalid access store {path}: {source}")]
    Json {
        /// Store path.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccess {
    roles: BTreeMap<String, Vec<String>>,
}

impl MemoryAccess {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates roles for a record.
    #[must_use]
    pub fn with_roles(mut self, record_id: &str, roles: &[&str]) -> Self {
        self.roles.insert(
            record_id.to_string(),
            roles.iter().map(ToString::to_string).collect(),
        );
        self
    }
}

impl AccessControl for MemoryAccess {
    fn roles_with_access(&self, record_id: &str) -> Result<Option<Vec<String>>, AccessError> {
        Ok(self.roles.get(record_id).cloned())
    }

    fn grant_role(&mut self, record_id: &str, role: &str) -> Result<(), AccessError> {
        grant(&mut self.roles, record_id, role);
        Ok(())
    }
}

/// Store persisted as a JSON object `{ "<record id>": ["role", ...] }`.
///
/// Every grant rewrites the file.
#[derive(Debug, Clone)]
pub struct FileAccess {
    path: PathBuf,
    roles: BTreeMap<String, Vec<String>>,
}

impl FileAccess {
    /// Loads the store, starting empty if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AccessError> {
        let path = path.into();
        let roles = if path.is_file() {
            let text = std::fs::read_to_string(&path).map_err(|e| AccessError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            serde_json::from_str(&text).map_err(|e| AccessError::Json {
                path: path.display().to_string(),
                source: e,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, roles })
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), AccessError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AccessError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let text = serde_json::to_string_pretty(&self.roles).map_err(|e| AccessError::Json {
            path: self.path.display().to_string(),
            source: e,
        })?;
        std::fs::write(&self.path, text).map_err(|e| AccessError::Io {
            path: self.path.display().to_string(),
            source: e,
        })
    }
}

impl AccessControl for FileAccess {
    fn roles_with_access(&self, record_id: &str) -> Result<Option<Vec<String>>, AccessError> {
        Ok(self.roles.get(record_id).cloned())
    }

    fn grant_role(&mut self, record_id: &str, role: &str) -> Result<(), AccessError> {
        grant(&mut self.roles, record_id, role);
        self.persist()
    }
}

fn grant(roles: &mut BTreeMap<String, Vec<String>>, record_id: &str, role: &str) {
    let entry = roles.entry(record_id.to_string()).or_default();
    if !entry.iter().any(|r| r == role) {
        entry.push(role.to_string());
    }
}
