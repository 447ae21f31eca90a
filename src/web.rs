use crate::{
    app::AppError,
    records::{Category, Record},
    semantic::{CategoryStats, SemanticSearchError, SemanticSearchService},
};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

const INDEX_HTML: &str = include_str!("../web/index.html");

#[derive(Clone)]
struct SharedState {
    service: Arc<SemanticSearchService>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

pub fn router(service: Arc<SemanticSearchService>) -> Router {
    let shared_state = Arc::new(SharedState { service });

    let mut app = Router::new()
        .route("/", get(index))
        .route("/api/categories", get(categories))
        .route("/api/reload", post(reload));

    for category in Category::ALL {
        app = app.route(
            category.endpoint(),
            get(
                move |state: State<Arc<SharedState>>,
                      params: Result<Query<SearchParams>, QueryRejection>| {
                    search(category, state, params)
                },
            ),
        );
    }

    app.layer(
        tower_http::trace::TraceLayer::new_for_http()
            .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
            .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
    )
    .with_state(shared_state)
}

async fn start_app(service: Arc<SemanticSearchService>, addr: &str) -> anyhow::Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(service: SemanticSearchService, addr: &str) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(Arc::new(service), addr).await })
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = if self.0.is_bad_request() {
            axum::http::StatusCode::BAD_REQUEST
        } else {
            log::error!("{self:?}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<String>,

    /// Defaults to `default_num_results`; negative values yield nothing.
    #[serde(default)]
    pub num_results: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub best_matches: Vec<Record>,
}

async fn search(
    category: Category,
    State(state): State<Arc<SharedState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, HttpError> {
    let Query(params) = params?;
    log::debug!("{category}: {params:?}");

    let query = params.query.ok_or(SemanticSearchError::InvalidQuery)?;
    let num_results = params
        .num_results
        .map(|n| usize::try_from(n).unwrap_or(0));

    let best_matches = tokio::task::block_in_place(|| {
        state.service.search(category, &query, num_results)
    })?;

    Ok(Json(SearchResponse {
        query,
        best_matches,
    }))
}

async fn categories(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<Vec<CategoryStats>>, HttpError> {
    Ok(Json(state.service.stats()?))
}

async fn reload(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<Vec<CategoryStats>>, HttpError> {
    let stats = tokio::task::block_in_place(|| state.service.reload())?;
    log::info!("reloaded {} categories", stats.len());
    Ok(Json(stats))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
