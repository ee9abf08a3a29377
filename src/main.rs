//! echodash entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use echodash::AppConfig;
use echodash::pipeline::Pipeline;
use echodash::resolver::resolve_dataset;
use echodash::server::{self, AppState};

/// Serve a tricolor echogram with predicted and labelled hake regions.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Regridded zarr file to plot (defaults to the last one under the data root)
    #[arg(short = 'z', long = "zarr-file")]
    zarr_file: Option<PathBuf>,
}

fn init_logging(config: &AppConfig) {
    // RUST_LOG, when set, overrides the configured level
    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .parse_default_env()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load_startup() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    let dataset = match resolve_dataset(cli.zarr_file.as_deref(), &config.paths) {
        Ok(path) => path,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let pipeline = Pipeline::new(config);
    let initial = match pipeline.render(&dataset) {
        Ok(view) => view,
        Err(e) => {
            log::error!("Cannot render {:?}: {}", dataset, e);
            return ExitCode::FAILURE;
        }
    };
    for notice in &initial.notices {
        log::info!("{}", notice);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Cannot start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(server::serve(AppState::new(pipeline, initial))) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
