//! Directory-backed object storage.
//!
//! Each object lives in `<root>/<oid>/`. Payloads are plain files in that
//! directory and the object's properties are kept in `object.toml`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// File holding an object's properties.
pub const PROPERTIES_FILE: &str = "object.toml";

/// A stored record with named payloads and string properties.
///
/// This is the view the record transform needs of a source object.
pub trait DigitalObject {
    /// The object's identifier.
    fn id(&self) -> &str;

    /// Looks up a property value.
    fn property(&self, key: &str) -> Option<&str>;

    /// Identifiers of every payload attached to the object.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload list cannot be read.
    fn payload_ids(&self) -> Result<Vec<String>, StorageError>;

    /// Opens a payload for line-oriented reading.
    ///
    /// Returns `Ok(None)` when the object has no such payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload exists but cannot be opened.
    fn open_payload(&self, payload_id: &str) -> Result<Option<Box<dyn BufRead + '_>>, StorageError>;
}

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Identifier that cannot be used as a single path component.
    #[error("Invalid identifier: {0:?}")]
    InvalidId(String),

    /// Property file could not be parsed.
    #[error("Invalid properties in {path}: {source}")]
    Properties {
        /// Properties file path.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// Property file could not be serialised.
    #[error("Failed to serialise properties: {0}")]
    Serialise(#[from] toml::ser::Error),

    /// I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Rejects ids that would escape the storage root or clash with the
/// properties file.
fn validate_id(id: &str) -> Result<(), StorageError> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id == PROPERTIES_FILE
        || id.contains(['/', '\\'])
    {
        return Err(StorageError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Object storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Opens (and creates if needed) storage at `root`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(Self { root })
    }

    /// The storage root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads an existing object, or returns an empty one that is written
    /// on first [`StoredObject::save`] or payload write.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or existing properties
    /// cannot be read.
    pub fn get_or_create(&self, oid: &str) -> Result<StoredObject, StorageError> {
        validate_id(oid)?;
        let dir = self.root.join(oid);
        let properties = load_properties(&dir)?;
        Ok(StoredObject {
            id: oid.to_string(),
            dir,
            properties,
        })
    }

    /// Loads an existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or the properties cannot be
    /// read.
    pub fn get(&self, oid: &str) -> Result<Option<StoredObject>, StorageError> {
        validate_id(oid)?;
        if !self.root.join(oid).join(PROPERTIES_FILE).is_file() {
            return Ok(None);
        }
        self.get_or_create(oid).map(Some)
    }

    /// Ids of every saved object, sorted.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the root cannot be listed.
    pub fn object_ids(&self) -> Result<Vec<String>, StorageError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(io_error(&self.root))? {
            let entry = entry.map_err(io_error(&self.root))?;
            let path = entry.path();
            if path.join(PROPERTIES_FILE).is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn load_properties(dir: &Path) -> Result<BTreeMap<String, String>, StorageError> {
    let path = dir.join(PROPERTIES_FILE);
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(&path).map_err(io_error(&path))?;
    toml::from_str(&text).map_err(|source| StorageError::Properties {
        path: path.display().to_string(),
        source,
    })
}

/// An object stored under [`FsStorage`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    id: String,
    dir: PathBuf,
    properties: BTreeMap<String, String>,
}

impl StoredObject {
    /// Directory holding the object's files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sets a property; persisted by [`Self::save`].
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// All properties.
    #[must_use]
    pub const fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Creates or replaces a payload with the given bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or the file cannot be written.
    pub fn write_payload(&self, payload_id: &str, contents: &[u8]) -> Result<(), StorageError> {
        validate_id(payload_id)?;
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.dir.join(payload_id);
        std::fs::write(&path, contents).map_err(io_error(&path))
    }

    /// Creates or replaces a payload by copying a local file.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is invalid or the copy fails.
    pub fn copy_payload(&self, payload_id: &str, source: &Path) -> Result<u64, StorageError> {
        validate_id(payload_id)?;
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.dir.join(payload_id);
        let mut reader = File::open(source).map_err(io_error(source))?;
        let mut writer = File::create(&path).map_err(io_error(&path))?;
        std::io::copy(&mut reader, &mut writer).map_err(io_error(&path))
    }

    /// Writes the properties file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let path = self.dir.join(PROPERTIES_FILE);
        let text = toml::to_string(&self.properties)?;
        std::fs::write(&path, text).map_err(io_error(&path))
    }
}

impl DigitalObject for StoredObject {
    fn id(&self) -> &str {
        &self.id
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    fn payload_ids(&self) -> Result<Vec<String>, StorageError> {
        let mut ids = Vec::new();
        if !self.dir.is_dir() {
            return Ok(ids);
        }
        for entry in std::fs::read_dir(&self.dir).map_err(io_error(&self.dir))? {
            let entry = entry.map_err(io_error(&self.dir))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name != PROPERTIES_FILE {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn open_payload(&self, payload_id: &str) -> Result<Option<Box<dyn BufRead + '_>>, StorageError> {
        validate_id(payload_id)?;
        let path = self.dir.join(payload_id);
        if !path.is_file() {
            return Ok(None);
        }
        let file = File::open(&path).map_err(io_error(&path))?;
        Ok(Some(Box::new(BufReader::new(file))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn objects_round_trip_through_disk() {
        let tmp = std::env::temp_dir().join("geonames_storage_round_trip_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let storage = FsStorage::open(&tmp).unwrap();
        let mut object = storage.get_or_create("abc123").unwrap();
        object.set_property("ISOcode", "AU");
        object.set_property("render-pending", "true");
        object.write_payload("AU.json", b"{}").unwrap();
        object.save().unwrap();

        let loaded = storage.get("abc123").unwrap().unwrap();
        assert_eq!(loaded.id(), "abc123");
        assert_eq!(loaded.property("ISOcode"), Some("AU"));
        assert_eq!(loaded.property("render-pending"), Some("true"));
        assert_eq!(loaded.payload_ids().unwrap(), vec!["AU.json".to_string()]);

        let mut text = String::new();
        loaded
            .open_payload("AU.json")
            .unwrap()
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "{}");

        assert_eq!(storage.object_ids().unwrap(), vec!["abc123".to_string()]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_payload_and_object_are_none() {
        let tmp = std::env::temp_dir().join("geonames_storage_missing_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let storage = FsStorage::open(&tmp).unwrap();
        assert!(storage.get("nothing").unwrap().is_none());

        let object = storage.get_or_create("empty").unwrap();
        assert!(object.open_payload("AU.txt").unwrap().is_none());
        assert!(object.payload_ids().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_path_like_ids() {
        let tmp = std::env::temp_dir().join("geonames_storage_ids_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let storage = FsStorage::open(&tmp).unwrap();
        assert!(matches!(
            storage.get_or_create("../escape"),
            Err(StorageError::InvalidId(_))
        ));
        let object = storage.get_or_create("ok").unwrap();
        assert!(matches!(
            object.write_payload(PROPERTIES_FILE, b""),
            Err(StorageError::InvalidId(_))
        ));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn copy_errors_name_the_failing_side() {
        let tmp = std::env::temp_dir().join("geonames_storage_copy_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let storage = FsStorage::open(tmp.join("root")).unwrap();
        let object = storage.get_or_create("abc").unwrap();

        let missing = tmp.join("missing.txt");
        match object.copy_payload("AU.txt", &missing) {
            Err(StorageError::Io { path, .. }) => assert_eq!(path, missing.display().to_string()),
            other => panic!("expected source error, got {other:?}"),
        }

        let source = tmp.join("AU.txt");
        std::fs::write(&source, "2077456\tAustralia\n").unwrap();
        // A directory where the payload file should go.
        let blocked = object.dir().join("AU.txt");
        std::fs::create_dir_all(&blocked).unwrap();
        match object.copy_payload("AU.txt", &source) {
            Err(StorageError::Io { path, .. }) => assert_eq!(path, blocked.display().to_string()),
            other => panic!("expected destination error, got {other:?}"),
        }

        assert_eq!(object.copy_payload("AU.json", &source).unwrap(), 18);

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
