//! Dataset selection and companion annotation paths.
//!
//! Stores live under the data root as `{year}/{name}.{extension}`. The path
//! of a store relative to the root, minus its extension, is its identifier;
//! the identifier also yields the survey year and transect, which locate the
//! prediction and manual `.evr` files through the configured templates.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::config::PathsConfig;

/// Errors raised while choosing a dataset or deriving its key.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The data root holds no stores
    #[error("No *.{extension} datasets under {root:?}")]
    NoDatasets { root: PathBuf, extension: String },

    /// The relative path is too shallow to carry a year and a transect
    #[error("Dataset path {path:?} needs at least `year/transect` segments under the data root")]
    MissingSegments { path: PathBuf },

    /// The path does not lie under the data root
    #[error("Dataset path {path:?} is outside the data root {root:?}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// Reading or locating a path failed
    #[error("Cannot access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Every store under `root` whose name ends in `.{extension}`, sorted.
///
/// Directories are searched recursively, but a store itself (which is a
/// directory in the Zarr layout) is never descended into.
pub fn list_datasets(root: &Path, extension: &str) -> Result<Vec<PathBuf>, ResolveError> {
    let mut found = Vec::new();
    collect_datasets(root, extension, &mut found)?;
    found.sort();
    log::debug!("Found {} datasets under {:?}", found.len(), root);
    Ok(found)
}

fn collect_datasets(dir: &Path, extension: &str, found: &mut Vec<PathBuf>) -> Result<(), ResolveError> {
    let io_error = |source| ResolveError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if has_extension(&path, extension) {
            found.push(path);
        } else if path.is_dir() {
            collect_datasets(&path, extension, found)?;
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Pick the dataset to show.
///
/// An explicit path is used as given, relative to the working directory and
/// without checking that it exists. Otherwise the last store in sorted order
/// is chosen. Either way the result is absolute.
pub fn resolve_dataset(explicit: Option<&Path>, paths: &PathsConfig) -> Result<PathBuf, ResolveError> {
    if let Some(path) = explicit {
        return absolute(path);
    }
    list_datasets(&absolute(&paths.data_root)?, &paths.extension)?
        .pop()
        .ok_or_else(|| ResolveError::NoDatasets {
            root: paths.data_root.clone(),
            extension: paths.extension.clone(),
        })
}

/// `path` made absolute against the working directory. No I/O is done.
pub fn absolute(path: &Path) -> Result<PathBuf, ResolveError> {
    std::path::absolute(path).map_err(|source| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Survey key of a dataset, derived from its location under the data root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetKey {
    /// Relative path without the store extension, `/`-separated
    pub identifier: String,
    /// First path segment
    pub year: String,
    /// Second path segment up to its first `_`
    pub transect: String,
}

impl DatasetKey {
    /// Derive the key of `path`.
    ///
    /// Relative paths are taken relative to the data root. No I/O is done.
    pub fn derive(path: &Path, paths: &PathsConfig) -> Result<Self, ResolveError> {
        let root = &paths.data_root;
        let relative = if path.is_absolute() {
            let absolute_root = absolute(root)?;
            path.strip_prefix(&absolute_root)
                .map_err(|_| ResolveError::OutsideRoot {
                    path: path.to_path_buf(),
                    root: root.clone(),
                })?
        } else {
            path
        };

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(ResolveError::OutsideRoot {
                        path: path.to_path_buf(),
                        root: root.clone(),
                    });
                }
            }
        }

        if let Some(last) = segments.last_mut() {
            let suffix = format!(".{}", paths.extension);
            if let Some(stem) = last.strip_suffix(&suffix)
                && !stem.is_empty()
            {
                *last = stem.to_string();
            }
        }

        if segments.len() < 2 {
            return Err(ResolveError::MissingSegments {
                path: path.to_path_buf(),
            });
        }

        let year = segments[0].clone();
        let transect = segments[1]
            .split('_')
            .next()
            .unwrap_or(&segments[1])
            .to_string();

        Ok(Self {
            identifier: segments.join("/"),
            year,
            transect,
        })
    }
}

/// Locations of the annotation files belonging to one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanionPaths {
    /// Model prediction regions
    pub prediction: PathBuf,
    /// Human-labelled regions
    pub manual: PathBuf,
}

impl CompanionPaths {
    /// Fill the configured templates with `key`. Pure; nothing is read.
    pub fn derive(key: &DatasetKey, paths: &PathsConfig) -> Self {
        Self {
            prediction: paths
                .prediction_dir
                .join(fill_template(&paths.prediction_template, key)),
            manual: paths.label_dir.join(fill_template(&paths.manual_template, key)),
        }
    }
}

/// Replace `{identifier}`, `{year}` and `{transect}` in `template`.
pub fn fill_template(template: &str, key: &DatasetKey) -> String {
    template
        .replace("{identifier}", &key.identifier)
        .replace("{year}", &key.year)
        .replace("{transect}", &key.transect)
}
