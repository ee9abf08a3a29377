//! Presentation server.
//!
//! Serves the `tricolor` view over HTTP. There is one current view for the
//! whole process, shared behind a mutex; selecting another dataset re-runs
//! the pipeline on the blocking pool and replaces it. The page asks for its
//! image with its own `?file=`, so a client whose dataset was replaced by
//! another client's selection gets its own image back (at the cost of a
//! render).
//!
//! | Route                             | Response                                   |
//! |-----------------------------------|--------------------------------------------|
//! | `/`                               | redirect to `/tricolor`                    |
//! | `/tricolor[?file=]`               | dashboard page, optionally switching files |
//! | `/tricolor/image.png[?file=]`     | composite of the file, or the current one  |
//! | `/tricolor/regions.json[?file=]`  | overlay outlines of the same view          |
//! | `/api/files`              | datasets under the data root               |
//! | `/admin`                  | status JSON                                |

mod page;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::constants::VIEW_NAME;
use crate::pipeline::{Pipeline, PipelineError, RenderedView};
use crate::resolver::list_datasets;

pub use page::{error_page, escape_html, tricolor_page};

/// Errors that stop the server itself.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Cannot bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    current: Arc<Mutex<Arc<RenderedView>>>,
    renders: Arc<AtomicU64>,
    started: Instant,
}

impl AppState {
    /// State serving `initial` until another dataset is selected.
    pub fn new(pipeline: Pipeline, initial: RenderedView) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            current: Arc::new(Mutex::new(Arc::new(initial))),
            renders: Arc::new(AtomicU64::new(1)),
            started: Instant::now(),
        }
    }

    /// The view currently on display.
    pub fn current(&self) -> Arc<RenderedView> {
        match self.current.lock() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn replace(&self, view: Arc<RenderedView>) {
        match self.current.lock() {
            Ok(mut guard) => *guard = view,
            Err(poisoned) => *poisoned.into_inner() = view,
        }
        self.renders.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of views rendered since startup.
    pub fn render_count(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    /// Switch to the dataset at `file`, rendering it unless it is already shown.
    pub async fn select(&self, file: &Path) -> Result<Arc<RenderedView>, PipelineError> {
        let current = self.current();
        if current.dataset == self.pipeline.dataset_path(file) {
            return Ok(current);
        }

        let pipeline = Arc::clone(&self.pipeline);
        let file = file.to_path_buf();
        let view = tokio::task::spawn_blocking(move || pipeline.render(&file))
            .await
            .map_err(|e| PipelineError::Aborted(e.to_string()))??;

        let view = Arc::new(view);
        self.replace(Arc::clone(&view));
        Ok(view)
    }

    /// The view for a requested file, or the current one when none is given.
    async fn view_for(&self, file: Option<&str>) -> Result<Arc<RenderedView>, PipelineError> {
        match file.filter(|f| !f.is_empty()) {
            Some(file) => self.select(Path::new(file)).await,
            None => Ok(self.current()),
        }
    }

    /// Dataset paths relative to the data root, sorted.
    fn relative_files(&self) -> Vec<String> {
        let paths = &self.pipeline.config().paths;
        match list_datasets(&paths.data_root, &paths.extension) {
            Ok(files) => files
                .iter()
                .map(|f| relative_name(f, &paths.data_root))
                .collect(),
            Err(e) => {
                log::warn!("Cannot list datasets: {}", e);
                Vec::new()
            }
        }
    }
}

/// `path` relative to `root` with `/` separators, or the full path when it
/// lies elsewhere.
fn relative_name(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}

fn error_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Resolve(_) => StatusCode::BAD_REQUEST,
        PipelineError::Load(_) | PipelineError::Render(_) | PipelineError::Aborted(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TricolorQuery {
    file: Option<String>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let view = format!("/{}", VIEW_NAME);
    let mut app = Router::new()
        .route("/", get(index))
        .route(&view, get(tricolor))
        .route(&format!("{}/image.png", view), get(image_png))
        .route(&format!("{}/regions.json", view), get(regions_json))
        .route("/api/files", get(list_files));
    if state.pipeline.config().server.admin {
        app = app.route("/admin", get(admin));
    }
    app.with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(state: AppState) -> Result<(), ServerError> {
    let server = &state.pipeline.config().server;
    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    log::info!("Serving http://{}/{}", addr, VIEW_NAME);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Cannot listen for shutdown signal: {}", e);
            }
            log::info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn index() -> Redirect {
    Redirect::temporary(&format!("/{}", VIEW_NAME))
}

async fn tricolor(State(state): State<AppState>, Query(query): Query<TricolorQuery>) -> Response {
    let file = query.file.as_deref();
    let view = match state.view_for(file).await {
        Ok(view) => view,
        Err(e) => {
            let file = file.unwrap_or_default();
            log::error!("Cannot show {}: {}", file, e);
            return (error_status(&e), Html(error_page(file, &e.to_string()))).into_response();
        }
    };

    let root = &state.pipeline.config().paths.data_root;
    let selected = relative_name(&view.dataset, root);
    let files = state.relative_files();
    Html(tricolor_page(&view, &files, &selected, state.render_count())).into_response()
}

async fn image_png(State(state): State<AppState>, Query(query): Query<TricolorQuery>) -> Response {
    let view = match state.view_for(query.file.as_deref()).await {
        Ok(view) => view,
        Err(e) => return (error_status(&e), e.to_string()).into_response(),
    };
    let mut response = view.png.clone().into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

async fn regions_json(State(state): State<AppState>, Query(query): Query<TricolorQuery>) -> Response {
    let view = match state.view_for(query.file.as_deref()).await {
        Ok(view) => view,
        Err(e) => return (error_status(&e), e.to_string()).into_response(),
    };
    let layers: Vec<serde_json::Value> = view
        .composite
        .layers
        .iter()
        .zip(&view.layers)
        .map(|(layer, info)| {
            let paths: Vec<serde_json::Value> = layer
                .paths()
                .map(|path| {
                    let pixels: Vec<[f32; 2]> = path
                        .vertices
                        .iter()
                        .map(|v| {
                            let (x, y) = view.mapping.project(v);
                            [x, y]
                        })
                        .collect();
                    json!({
                        "id": path.id,
                        "class": path.class,
                        "vertices": path.vertices,
                        "pixels": pixels,
                    })
                })
                .collect();
            json!({
                "source": layer.source,
                "color": info.color,
                "line_width": info.line_width,
                "paths": paths,
            })
        })
        .collect();

    axum::Json(json!({
        "title": view.title,
        "width": view.mapping.width(),
        "height": view.mapping.height(),
        "layers": layers,
    }))
    .into_response()
}

async fn list_files(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.current();
    let root = state.pipeline.config().paths.data_root.clone();
    axum::Json(json!({
        "root": root,
        "files": state.relative_files(),
        "current": relative_name(&view.dataset, &root),
    }))
}

async fn admin(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.current();
    axum::Json(json!({
        "uptime_secs": state.started.elapsed().as_secs(),
        "renders": state.render_count(),
        "current": {
            "dataset": view.dataset,
            "key": view.key,
            "companions": view.companions,
            "layers": view.layers,
            "notices": view.notices,
        },
        "config": state.pipeline.config(),
    }))
}
