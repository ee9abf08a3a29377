//! Trait-based echogram dataset loading.
//!
//! New store formats can be added by implementing [`DatasetLoader`] and
//! registering the loader in [`LoaderRegistry::new`].
//!
//! ## Supported Formats
//!
//! - **Zarr v2 directory stores**: regridded Sv/MVBS cubes written by xarray
//!
//! ## Usage
//!
//! ```rust,ignore
//! use echodash::data::LoaderRegistry;
//!
//! let registry = LoaderRegistry::new();
//! let data = registry.open(Path::new("2019/x0083_2_WT.zarr"), "Sv")?;
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::data::EchogramData;

/// Errors raised while opening a dataset.
#[derive(Error, Debug, Clone)]
pub enum LoaderError {
    /// No registered loader handles the path
    #[error("No loader can open {path:?}")]
    NoLoader { path: PathBuf },

    /// The store is unreadable or does not hold what was asked for
    #[error("{0}")]
    Store(String),

    /// An error tagged with the loader that raised it
    #[error("[{loader}] {source}")]
    Loader {
        loader: &'static str,
        #[source]
        source: Box<LoaderError>,
    },
}

impl LoaderError {
    /// Create a store error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Tag the error with the loader that raised it, unless it already is.
    pub fn with_loader(self, loader: &'static str) -> Self {
        match self {
            tagged @ Self::Loader { .. } => tagged,
            other => Self::Loader {
                loader,
                source: Box::new(other),
            },
        }
    }

    /// The loader that raised this error, if known.
    pub fn loader_id(&self) -> Option<&'static str> {
        match self {
            Self::Loader { loader, .. } => Some(*loader),
            _ => None,
        }
    }
}

/// Trait for echogram dataset loaders.
pub trait DatasetLoader: Send + Sync {
    /// Unique identifier for this loader (e.g., "zarr").
    fn id(&self) -> &'static str;

    /// Human-readable name for logs.
    fn display_name(&self) -> &'static str;

    /// Store extensions this loader handles (lowercase, without dots).
    fn extensions(&self) -> &'static [&'static str];

    /// Check if this loader recognises the store at `path`.
    ///
    /// Used when the extension is unknown; implementations should look for
    /// format markers rather than trusting the name.
    fn can_load(&self, path: &Path) -> bool;

    /// Open `variable` from the store at `path`.
    ///
    /// The returned data has its vertical axis under the canonical name and
    /// its values ordered `[channel, ping_time, depth]`.
    fn open(&self, path: &Path, variable: &str) -> Result<EchogramData, LoaderError>;
}

/// Registry of available dataset loaders.
pub struct LoaderRegistry {
    loaders: Vec<Box<dyn DatasetLoader>>,
}

impl LoaderRegistry {
    /// Create a new registry with all built-in loaders.
    pub fn new() -> Self {
        let mut registry = Self {
            loaders: Vec::new(),
        };
        registry.register(Box::new(super::loaders::ZarrLoader));
        registry
    }

    /// Register a new loader.
    pub fn register(&mut self, loader: Box<dyn DatasetLoader>) {
        self.loaders.push(loader);
    }

    /// Get all supported store extensions.
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = self
            .loaders
            .iter()
            .flat_map(|l| l.extensions().iter().copied())
            .collect();
        extensions.sort();
        extensions.dedup();
        extensions
    }

    /// Open a dataset, choosing the loader by extension, then by detection.
    pub fn open(&self, path: &Path, variable: &str) -> Result<EchogramData, LoaderError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        let by_extension = extension.as_deref().and_then(|ext| {
            self.loaders
                .iter()
                .find(|l| l.extensions().iter().any(|e| *e == ext))
        });

        let loader = by_extension
            .or_else(|| self.loaders.iter().find(|l| l.can_load(path)))
            .ok_or_else(|| LoaderError::NoLoader {
                path: path.to_path_buf(),
            })?;

        log::debug!("Opening {:?} with {} loader", path, loader.id());
        loader
            .open(path, variable)
            .map_err(|e| e.with_loader(loader.id()))
    }

    /// Get all registered loaders.
    pub fn loaders(&self) -> &[Box<dyn DatasetLoader>] {
        &self.loaders
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
