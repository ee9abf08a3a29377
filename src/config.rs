//! Configuration file support for the dashboard.
//!
//! Folder layout, companion file templates, the label allow-list, render
//! bounds and the server port all live in one [`AppConfig`] that is loaded
//! once at startup and passed into the pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color_utils::{CYAN, MAGENTA};
use crate::constants;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Where datasets and annotation files live
    #[serde(default)]
    pub paths: PathsConfig,

    /// Echogram rendering settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Region overlay settings
    #[serde(default)]
    pub regions: RegionsConfig,

    /// Presentation server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Filesystem layout consumed by the input resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root folder of the regridded stores
    pub data_root: PathBuf,
    /// Store extension, without the dot
    pub extension: String,
    /// Folder of prediction files
    pub prediction_dir: PathBuf,
    /// Folder of manual label files
    pub label_dir: PathBuf,
    /// Prediction file path relative to `prediction_dir`
    pub prediction_template: String,
    /// Manual file path relative to `label_dir`
    pub manual_template: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(constants::DEFAULT_DATA_ROOT),
            extension: constants::DATASET_EXTENSION.to_string(),
            prediction_dir: PathBuf::from(constants::DEFAULT_PREDICTION_DIR),
            label_dir: PathBuf::from(constants::DEFAULT_LABEL_DIR),
            prediction_template: constants::DEFAULT_PREDICTION_TEMPLATE.to_string(),
            manual_template: constants::DEFAULT_MANUAL_TEMPLATE.to_string(),
        }
    }
}

/// Reference to one frequency channel, by position or by full name.
///
/// Channel names differ between survey years, so positions are the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    /// Position along the channel axis
    Index(usize),
    /// Exact channel name as stored in the dataset
    Name(String),
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelRef::Index(i) => write!(f, "#{}", i),
            ChannelRef::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Echogram rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Data variable to render
    pub variable: String,
    /// Channels mapped to red, green and blue, in that order
    pub channels: [ChannelRef; 3],
    /// Value mapped to zero intensity
    pub vmin: f32,
    /// Value mapped to full intensity
    pub vmax: f32,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            variable: constants::DEFAULT_VARIABLE.to_string(),
            // 120 kHz, 38 kHz, 18 kHz on the 2019+ surveys
            channels: [ChannelRef::Index(2), ChannelRef::Index(1), ChannelRef::Index(0)],
            vmin: constants::DEFAULT_VMIN,
            vmax: constants::DEFAULT_VMAX,
            width: constants::DEFAULT_FRAME_WIDTH,
            height: constants::DEFAULT_FRAME_HEIGHT,
        }
    }
}

/// Line style of one overlay source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayStyle {
    /// RGB color for the outline
    pub color: [u8; 3],
    /// Outline width in pixels
    pub line_width: u32,
}

impl OverlayStyle {
    /// Create a new style.
    pub fn new(color: [u8; 3], line_width: u32) -> Self {
        Self { color, line_width }
    }
}

/// Region overlay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionsConfig {
    /// Manual region classes that are kept
    pub label_allow_list: Vec<String>,
    /// Style of model-predicted regions
    pub prediction_style: OverlayStyle,
    /// Style of manually labeled regions
    pub manual_style: OverlayStyle,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            label_allow_list: constants::DEFAULT_LABEL_ALLOW_LIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            prediction_style: OverlayStyle::new(MAGENTA, constants::DEFAULT_LINE_WIDTH),
            manual_style: OverlayStyle::new(CYAN, constants::DEFAULT_LINE_WIDTH),
        }
    }
}

/// Presentation server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Expose the `/admin` status endpoint
    pub admin: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: constants::DEFAULT_PORT,
            admin: true,
        }
    }
}

impl AppConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            paths: PathsConfig::default(),
            render: RenderConfig::default(),
            regions: RegionsConfig::default(),
            server: ServerConfig::default(),
            log_level: LogLevel::default(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        config.validate()?;
        Ok(config)
    }

    /// Check templates and render bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_template(&self.paths.prediction_template)?;
        validate_template(&self.paths.manual_template)?;

        if self.render.vmax.partial_cmp(&self.render.vmin) != Some(std::cmp::Ordering::Greater) {
            return Err(ConfigError::Invalid(format!(
                "vmax ({}) must be greater than vmin ({})",
                self.render.vmax, self.render.vmin
            )));
        }
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ConfigError::Invalid(
                "render width and height must be non-zero".to_string(),
            ));
        }
        if self.paths.extension.is_empty() {
            return Err(ConfigError::Invalid(
                "dataset extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the default filename for the config file.
    pub fn default_filename() -> &'static str {
        "echodash-config.json"
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("echodash").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("echodash")
                    .join(Self::default_filename())
            })
        }
    }

    /// Load configuration from an explicit file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Resolve the configuration used at startup.
    ///
    /// A file named by the `ECHODASH_CONFIG` variable must load; otherwise the
    /// default path is tried and defaults are used when it does not exist.
    pub fn load_startup() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(constants::CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                log::debug!("No config file found at {:?}, using defaults", path);
                Ok(Self::new())
            }
            None => Ok(Self::new()),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject placeholders the companion path derivation cannot fill.
fn validate_template(template: &str) -> Result<(), ConfigError> {
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| ConfigError::InvalidTemplate {
            template: template.to_string(),
            reason: "unterminated placeholder".to_string(),
        })?;
        let name = &after[..end];
        if !constants::TEMPLATE_PLACEHOLDERS.contains(&name) {
            return Err(ConfigError::InvalidTemplate {
                template: template.to_string(),
                reason: format!("unknown placeholder {{{}}}", name),
            });
        }
        rest = &after[end + 1..];
    }
    Ok(())
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// A companion path template cannot be rendered
    #[error("Invalid path template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// I/O error when reading config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
