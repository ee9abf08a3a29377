//! Global constants for the echogram dashboard

/// Folder holding the regridded Sv stores
pub const DEFAULT_DATA_ROOT: &str = "/home/ubuntu/efs/hake_nasc_202309/regridd_Sv_latlon";

/// Folder holding model prediction `.evr` files
pub const DEFAULT_PREDICTION_DIR: &str = "/home/ubuntu/efs/hake_nasc_202309/prediction_evr";

/// Folder holding manual label allocations
pub const DEFAULT_LABEL_DIR: &str = "/home/ubuntu/efs/label_allocations";

/// Prediction file name, relative to the prediction folder
pub const DEFAULT_PREDICTION_TEMPLATE: &str = "{identifier}_pred.evr";

/// Manual label file name, relative to the label folder
pub const DEFAULT_MANUAL_TEMPLATE: &str = "{year}_run_2023_10_18/regions/{transect}_regions.evr";

/// Store extension of the regridded datasets
pub const DATASET_EXTENSION: &str = "zarr";

/// Placeholders accepted in companion path templates
pub const TEMPLATE_PLACEHOLDERS: &[&str] = &["identifier", "year", "transect"];

/// Manual region classes shown on the echogram
pub const DEFAULT_LABEL_ALLOW_LIST: &[&str] = &["Age-0 Hake", "Age-1 Hake", "Hake", "Hake Mix"];

/// Variable rendered as the echogram
pub const DEFAULT_VARIABLE: &str = "Sv";

/// Canonical name of the vertical axis
pub const VERTICAL_DIM: &str = "depth";

/// Alternate vertical axis name aliased onto [`VERTICAL_DIM`]
pub const ALTERNATE_VERTICAL_DIM: &str = "echo_range";

/// Horizontal axis of the echogram
pub const TIME_DIM: &str = "ping_time";

/// Frequency channel axis
pub const CHANNEL_DIM: &str = "channel";

/// Largest array (in elements) a store may declare before it is refused
pub const MAX_ARRAY_ELEMENTS: usize = 1 << 28;

/// Largest decoded chunk in bytes; Blosc frames cannot exceed 2 GiB either
pub const MAX_CHUNK_BYTES: usize = 1 << 31;

/// Lower colour bound in dB
pub const DEFAULT_VMIN: f32 = -70.0;

/// Upper colour bound in dB
pub const DEFAULT_VMAX: f32 = -40.0;

/// Rendered echogram frame width in pixels
pub const DEFAULT_FRAME_WIDTH: u32 = 1200;

/// Rendered echogram frame height in pixels
pub const DEFAULT_FRAME_HEIGHT: u32 = 500;

/// Port the dashboard is served on
pub const DEFAULT_PORT: u16 = 1456;

/// Outline width of region overlays in pixels
pub const DEFAULT_LINE_WIDTH: u32 = 2;

/// Name of the composited view
pub const VIEW_NAME: &str = "tricolor";

/// Environment variable pointing at a config file
pub const CONFIG_ENV_VAR: &str = "ECHODASH_CONFIG";
