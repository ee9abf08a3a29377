//! The per-selection rendering pipeline.
//!
//! key → companion paths → dataset → tricolor base → overlays → composite.
//! Only the dataset and the base image are required; either overlay may be
//! missing, which is reported back as a notice for the page.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::color_utils::to_hex;
use crate::compositor::{Composite, compose};
use crate::config::AppConfig;
use crate::data::{LoaderError, LoaderRegistry};
use crate::overlay::{build_manual_overlay, build_prediction_overlay};
use crate::render::{AxisMapping, RenderError, encode_png, render_tricolor};
use crate::resolver::{CompanionPaths, DatasetKey, ResolveError, absolute};

/// Errors that stop a view from being produced.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Cannot open dataset: {0}")]
    Load(#[from] LoaderError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// The render task panicked or was cancelled
    #[error("Render task aborted: {0}")]
    Aborted(String),
}

/// Summary of one drawn overlay layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerInfo {
    pub source: &'static str,
    pub color: String,
    pub line_width: u32,
    pub regions: usize,
}

/// Everything the presentation layer needs for one selection.
#[derive(Debug, Clone)]
pub struct RenderedView {
    /// Dataset path that was rendered
    pub dataset: PathBuf,
    pub key: DatasetKey,
    pub companions: CompanionPaths,
    /// Page title (the dataset identifier)
    pub title: String,
    pub composite: Composite,
    pub mapping: AxisMapping,
    /// First and last ping time of the dataset
    pub time_range: Option<(NaiveDateTime, NaiveDateTime)>,
    /// Flattened composite as PNG
    pub png: Vec<u8>,
    pub layers: Vec<LayerInfo>,
    /// Non-fatal conditions worth showing next to the image
    pub notices: Vec<String>,
}

/// Runs the pipeline against a fixed configuration.
pub struct Pipeline {
    config: AppConfig,
    loaders: LoaderRegistry,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            loaders: LoaderRegistry::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Absolute location of a dataset named by the selector.
    ///
    /// Relative paths are taken relative to the data root; command line
    /// paths are made absolute by [`resolve_dataset`] before they get here.
    ///
    /// [`resolve_dataset`]: crate::resolver::resolve_dataset
    pub fn dataset_path(&self, path: &Path) -> PathBuf {
        let joined = self.config.paths.data_root.join(path);
        absolute(&joined).unwrap_or(joined)
    }

    /// Produce the view for the dataset at `path`.
    pub fn render(&self, path: &Path) -> Result<RenderedView, PipelineError> {
        let dataset = self.dataset_path(path);
        let key = DatasetKey::derive(&dataset, &self.config.paths)?;
        let companions = CompanionPaths::derive(&key, &self.config.paths);
        log::info!("Plotting: {}", key.identifier);
        log::debug!(
            "Companions: prediction {:?}, manual {:?}",
            companions.prediction,
            companions.manual
        );

        let render = &self.config.render;
        let data = self.loaders.open(&dataset, &render.variable)?;
        let base = render_tricolor(&data, render)?;
        let mapping = AxisMapping::for_data(&data, base.width(), base.height());
        let time_range = data.time_range();

        let regions = &self.config.regions;
        let predicted = build_prediction_overlay(&companions.prediction, regions);
        let manual = build_manual_overlay(&companions.manual, regions);

        let mut notices = Vec::new();
        if predicted.is_none() {
            notices.push(format!(
                "No predicted hake regions ({})",
                companions.prediction.display()
            ));
        }
        if manual.is_none() {
            notices.push(format!(
                "No manual hake labels ({})",
                companions.manual.display()
            ));
        }

        let composite = compose(base, [predicted, manual]);
        let layers = composite
            .layers
            .iter()
            .map(|layer| LayerInfo {
                source: layer.source.name(),
                color: to_hex(layer.style.color),
                line_width: layer.style.line_width,
                regions: layer.len(),
            })
            .collect();
        let png = encode_png(&composite.flatten(&mapping))?;

        Ok(RenderedView {
            dataset,
            title: key.identifier.clone(),
            key,
            companions,
            composite,
            mapping,
            time_range,
            png,
            layers,
            notices,
        })
    }
}
