use std::{any::Any, net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use server_api::{
    list_performances, performance_detail, require_api_key, upstream::KopisClient, ApiContext,
};
use shared::{
    domain::{ListingQuery, PerformanceId},
    error::{ApiError, ErrorCode},
    protocol::{PerformanceDetailResponse, PerformanceListResponse},
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

const LIVENESS_TEXT: &str = "KOPIS API proxy server is running";

#[derive(Debug, Deserialize)]
struct ListPerformancesQuery {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
    stdate: Option<String>,
    eddate: Option<String>,
    cpage: Option<String>,
    rows: Option<String>,
    sharea: Option<String>,
    genre: Option<String>,
}

impl ListPerformancesQuery {
    fn into_listing_query(self) -> Result<ListingQuery, ApiError> {
        let mut query = ListingQuery::new(require_api_key(self.api_key)?);
        override_if_present(&mut query.stdate, self.stdate);
        override_if_present(&mut query.eddate, self.eddate);
        override_if_present(&mut query.cpage, self.cpage);
        override_if_present(&mut query.rows, self.rows);
        override_if_present(&mut query.sharea, self.sharea);
        query.genre = self.genre.filter(|genre| !genre.is_empty());
        Ok(query)
    }
}

fn override_if_present(slot: &mut String, value: Option<String>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        *slot = value;
    }
}

#[derive(Debug, Deserialize)]
struct DetailQuery {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

type Rejection = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    install_panic_hook();

    let settings = load_settings();
    let upstream = KopisClient::new(settings.upstream_config())?;
    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(
        %addr,
        upstream = %upstream.base_url(),
        timeout_ms = settings.upstream_timeout_ms,
        "KOPIS proxy listening"
    );

    let state = AppState {
        api: ApiContext { upstream },
    };
    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Panics are logged and the process keeps serving; the failing request
/// gets a JSON 500 from [`panic_response`].
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        error!(%panic, "unexpected panic while serving");
    }));
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/api/performances", get(http_list_performances))
        .route("/api/performance/:id", get(http_performance_detail))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::BadRequest | ErrorCode::MissingApiKey => StatusCode::BAD_REQUEST,
        ErrorCode::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::UpstreamMalformed | ErrorCode::UpstreamFailure | ErrorCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn reject(err: ApiError) -> Rejection {
    (status_for(err.code), Json(err))
}

/// Extractor failures answer with the same JSON body as every other error.
fn bad_request(message: String) -> Rejection {
    reject(ApiError::new(ErrorCode::BadRequest, message))
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    reject(ApiError::new(ErrorCode::Internal, "internal server error")).into_response()
}

async fn liveness() -> &'static str {
    LIVENESS_TEXT
}

async fn not_found(uri: Uri) -> Rejection {
    reject(ApiError::new(
        ErrorCode::NotFound,
        format!("no route for {}", uri.path()),
    ))
}

async fn http_list_performances(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListPerformancesQuery>, QueryRejection>,
) -> Result<Json<PerformanceListResponse>, Rejection> {
    let Query(q) = query.map_err(|rejection| bad_request(rejection.body_text()))?;
    let query = q.into_listing_query().map_err(reject)?;
    let response = list_performances(&state.api, query)
        .await
        .map_err(reject)?;
    Ok(Json(response))
}

async fn http_performance_detail(
    State(state): State<Arc<AppState>>,
    id: Result<Path<String>, PathRejection>,
    query: Result<Query<DetailQuery>, QueryRejection>,
) -> Result<Json<PerformanceDetailResponse>, Rejection> {
    let Path(id) = id.map_err(|rejection| bad_request(rejection.body_text()))?;
    let Query(q) = query.map_err(|rejection| bad_request(rejection.body_text()))?;
    let api_key = require_api_key(q.api_key).map_err(reject)?;
    let response = performance_detail(&state.api, PerformanceId(id), &api_key)
        .await
        .map_err(reject)?;
    Ok(Json(response))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
