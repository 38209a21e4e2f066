//! Loads the TOML configuration and applies command-line overrides.

use std::path::{Path, PathBuf};

use geonames_models::GeonamesConfig;

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`GeonamesConfig`].
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// Config path.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// Reads `path`, or returns the defaults when no path was given.
///
/// # Errors
///
/// Returns an error if an explicitly given file cannot be read or parsed.
pub fn load(path: Option<&Path>) -> Result<GeonamesConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(GeonamesConfig::default());
    };

    log::info!("Loading config from {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Path flags shared by the subcommands. Every `Some` wins over the file.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct Overrides {
    /// Base URL the `<ISO>.zip` archives are fetched from
    #[arg(long, global = true)]
    pub base_url: Option<String>,
    /// Country reference table (`countryInfo.txt`)
    #[arg(long, global = true)]
    pub reference_file: Option<PathBuf>,
    /// Directory archives are downloaded into
    #[arg(long, global = true)]
    pub download_dir: Option<PathBuf>,
    /// Directory archives are extracted into
    #[arg(long, global = true)]
    pub unzip_dir: Option<PathBuf>,
    /// Delete and recreate the download and extraction directories first
    #[arg(long, global = true)]
    pub reset: bool,
    /// Object storage root
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,
    /// Tantivy index directory
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,
}

impl Overrides {
    /// Applies the flags onto a loaded config.
    ///
    /// The reference table and extraction folder are shared by the
    /// download and harvest stages, so one flag updates both.
    pub fn apply(&self, config: &mut GeonamesConfig) {
        if let Some(url) = &self.base_url {
            config.download.base_url.clone_from(url);
        }
        if let Some(file) = &self.reference_file {
            config.download.reference_file.clone_from(file);
            config.harvest.country_info.clone_from(file);
        }
        if let Some(dir) = &self.download_dir {
            config.download.download_dir.clone_from(dir);
        }
        if let Some(dir) = &self.unzip_dir {
            config.download.unzip_dir.clone_from(dir);
            config.harvest.country_folder.clone_from(dir);
        }
        if self.reset {
            config.download.reset = true;
        }
        if let Some(dir) = &self.storage_dir {
            config.harvest.storage_dir.clone_from(dir);
        }
        if let Some(dir) = &self.index_dir {
            config.index.index_dir.clone_from(dir);
        }
    }
}
