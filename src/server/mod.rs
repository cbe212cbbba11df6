//! HTTP connection layer.
//!
//! `GET /?c1=..` admits a query and streams its protocol lines as the body;
//! `GET /status` and `GET /health` report on the process.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use axum::{
    body::Body,
    extract::{Query as QueryString, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tokio::{net::TcpListener, sync::mpsc, task};
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigError, ServerConfig};
use crate::error::GraphError;
use crate::jobs::{spawn_notifier, JobQueue, Worker};
use crate::query::{Line, QueryParams, QueryRequest, Rejection, TagIndex};
use crate::storage::{verify_layout, GraphStore, VerifyLevel};

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Loading the graph or the worker failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Binding or serving failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A blocking task could not be joined.
    #[error("internal task failure: {0}")]
    Join(#[from] task::JoinError),
    /// The worker thread panicked.
    #[error("query worker panicked")]
    WorkerPanicked,
}

/// Shared state of every handler.
pub struct AppState {
    store: Arc<GraphStore>,
    queue: Arc<JobQueue>,
    js_callback: String,
}

impl AppState {
    /// Bundles the graph, the job queue and the JS callback name.
    pub fn new(store: Arc<GraphStore>, queue: Arc<JobQueue>, js_callback: impl Into<String>) -> Self {
        Self {
            store,
            queue,
            js_callback: js_callback.into(),
        }
    }
}

type SharedState = Arc<AppState>;

/// Running worker and notifier threads bound to one queue.
pub struct Engine {
    /// Admission queue.
    pub queue: Arc<JobQueue>,
    worker: JoinHandle<crate::error::Result<()>>,
    notifier: JoinHandle<()>,
}

impl Engine {
    /// Starts the worker and the notifier.
    pub fn start(
        store: Arc<GraphStore>,
        tags: Arc<TagIndex>,
        config: &ServerConfig,
    ) -> std::io::Result<Self> {
        let queue = Arc::new(JobQueue::new(config.queue_capacity));
        let worker = Worker::new(
            store,
            tags,
            config.initial_result_capacity,
            config.results_per_line,
        );
        let notifier = spawn_notifier(
            Arc::clone(&queue),
            worker.progress(),
            config.notify_interval(),
        )?;
        let worker = worker.spawn(Arc::clone(&queue))?;
        Ok(Self {
            queue,
            worker,
            notifier,
        })
    }

    /// Shuts the queue down and waits for both threads.
    pub fn stop(self) -> Result<(), ServerError> {
        self.queue.shutdown();
        let _ = self.notifier.join();
        match self.worker.join() {
            Ok(result) => result.map_err(ServerError::from),
            Err(_) => Err(ServerError::WorkerPanicked),
        }
    }
}

/// Loads the graph, starts the worker and serves until Ctrl-C or a fatal
/// worker error.
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;
    let store = load_store(&config).await?;
    let tags = {
        let store = Arc::clone(&store);
        let categories = config.tag_categories.clone();
        Arc::new(task::spawn_blocking(move || TagIndex::build(&store, &categories)).await??)
    };

    let engine = Engine::start(Arc::clone(&store), tags, &config)?;
    let state = Arc::new(AppState::new(
        Arc::clone(&store),
        Arc::clone(&engine.queue),
        config.js_callback.clone(),
    ));
    let app = router(state, &config.allow_origins);
    let addr: SocketAddr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        data_dir = %config.data_dir.display(),
        max_node = store.max_node(),
        queue_capacity = config.queue_capacity,
        "catgraph listening"
    );

    let mut stopped = engine.queue.stopped();
    let shutdown_queue = Arc::clone(&engine.queue);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = stopped.wait_for(|stopped| *stopped) => {
                    tracing::error!("query worker stopped; shutting down")
                }
            }
            shutdown_queue.shutdown();
        })
        .await?;

    task::spawn_blocking(move || engine.stop()).await?
}

async fn load_store(config: &ServerConfig) -> Result<Arc<GraphStore>, ServerError> {
    let dir = config.data_dir.clone();
    let verify = config.verify_on_load;
    let store = task::spawn_blocking(move || -> crate::error::Result<GraphStore> {
        let store = GraphStore::load(&dir)?;
        if verify {
            let report = verify_layout(store.cat_index(), store.blocks(), VerifyLevel::Full);
            if !report.success {
                return Err(GraphError::Corruption(report.summary()));
            }
        }
        Ok(store)
    })
    .await??;
    Ok(Arc::new(store))
}

/// Builds the router over `state`.
pub fn router(state: Arc<AppState>, allow_origins: &[String]) -> Router {
    let mut router = Router::new()
        .route("/", get(query_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .fallback(fallback_handler);
    if let Some(layer) = build_cors_layer(allow_origins) {
        router = router.layer(layer);
    }
    router.with_state(state).layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let base = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);
    if origins.iter().any(|origin| origin.trim() == "*") {
        return Some(base.allow_origin(Any));
    }
    let mut allowed = Vec::new();
    for origin in origins {
        let trimmed = origin.trim().trim_end_matches('/');
        match HeaderValue::from_str(trimmed) {
            Ok(value) if !trimmed.is_empty() => allowed.push(value),
            _ => tracing::warn!(%origin, "ignoring invalid CORS origin"),
        }
    }
    if allowed.is_empty() {
        return None;
    }
    Some(base.allow_origin(AllowOrigin::list(allowed)))
}

async fn query_handler(
    State(state): State<SharedState>,
    QueryString(params): QueryString<QueryParams>,
) -> Result<Response, AppError> {
    let js = params.t.as_deref() == Some("js");
    let query = QueryRequest::from_params(&params)?.validate(&state.store)?;
    let (tx, rx) = mpsc::unbounded_channel::<Line>();
    let ticket = state.queue.submit(query, Arc::new(tx))?;
    tracing::debug!(job = ticket.id, ahead = ticket.ahead, kind = %query.kind, "query accepted");

    let lines = UnboundedReceiverStream::new(rx);
    let (content_type, body) = if js {
        let header = tokio_stream::once(format!("{}( [\n", state.js_callback));
        let items = lines.map(|line| match line {
            Line::Done => " 'DONE'] );\n".to_string(),
            other => format!(" '{other}',\n"),
        });
        (
            "application/javascript; charset=utf-8",
            Body::from_stream(header.chain(items).map(Ok::<_, Infallible>)),
        )
    } else {
        (
            "text/plain; charset=utf-8",
            Body::from_stream(lines.map(|line| Ok::<_, Infallible>(format!("{line}\n")))),
        )
    };
    Ok(([(CONTENT_TYPE, content_type)], body).into_response())
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        queue: state.queue.depth(),
        relsize: state.store.max_node(),
        dbage: state.store.age_secs(),
    })
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn fallback_handler() -> (StatusCode, &'static str) {
    (
        StatusCode::BAD_REQUEST,
        "Bad request. Use /?c1=...&... or /status.\n",
    )
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

/// Installs the global `tracing` subscriber once (`RUST_LOG`, default `info`).
pub fn install_tracing_subscriber() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
    });
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    queue: usize,
    relsize: usize,
    dbage: u64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Rejected(Rejection::QueueFull { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Rejected(_) => StatusCode::BAD_REQUEST,
        };
        tracing::debug!(%status, error = %self, "request rejected");
        let body = Json(ErrorPayload {
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    message: String,
}
