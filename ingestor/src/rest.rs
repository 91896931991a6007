use crate::errors::{IngestError, StoreError};
use crate::metrics::QUERY_LATENCY_SECONDS;
use crate::model::{ErrorBody, IngestEvent, QueryBody};
use crate::router::IngestRouter;
use crate::store::{SharedStore, DEFAULT_QUERY_LIMIT};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        OriginalUri, Path, Query, State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, error, info};
use wire::{Envelope, MetricKind, Reading};

/// Trailing window served by the query endpoint.
pub const QUERY_WINDOW_MS: i64 = 60_000;

#[derive(Clone)]
struct AppState {
    query: QueryService,
    ingest: IngestRouter,
}

#[derive(Debug, Deserialize)]
pub struct WeatherParams {
    device_id: Option<String>,
}

/// A window query as seen by the service, independent of the HTTP layer.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub path: String,
    pub resource: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub status: StatusCode,
    pub body: QueryBody,
}

impl QueryResponse {
    fn error(status: StatusCode, body: ErrorBody) -> Self {
        Self {
            status,
            body: QueryBody::Error(body),
        }
    }
}

impl IntoResponse for QueryResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Serves the most recent readings of one device for one metric kind.
#[derive(Clone)]
pub struct QueryService {
    store: SharedStore,
}

impl QueryService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn handle(&self, request: QueryRequest) -> QueryResponse {
        self.handle_at(request, Utc::now().timestamp_millis()).await
    }

    /// Answers `request` as if the current time were `now_ms`.
    pub async fn handle_at(&self, request: QueryRequest, now_ms: i64) -> QueryResponse {
        let kind = match request.resource.as_deref().map(str::parse::<MetricKind>) {
            Some(Ok(kind)) => kind,
            _ => {
                debug!(path = %request.path, "No metric kind for query");
                return QueryResponse::error(
                    StatusCode::NOT_FOUND,
                    ErrorBody::route_not_found(request.path),
                );
            }
        };

        if let Err(e) = self.store.namespace(kind) {
            error!(%kind, error = %e, "Query for unconfigured metric kind");
            return QueryResponse::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(e.to_string()),
            );
        }

        let device_id = request
            .device_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| default_device_id(kind));
        let since = now_ms - QUERY_WINDOW_MS;
        info!("Fetching data for {} since {}", kind, since);

        let start = Instant::now();
        let response = match self
            .store
            .query_recent(kind, &device_id, since, DEFAULT_QUERY_LIMIT)
            .await
        {
            Ok(readings) => QueryResponse {
                status: StatusCode::OK,
                body: QueryBody::Readings(readings),
            },
            Err(StoreError::NotConfigured(e)) => QueryResponse::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(e.to_string()),
            ),
            Err(e) => {
                error!(%kind, device_id = %device_id, error = %e, "Window query failed");
                QueryResponse::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new(format!("Failed to fetch {} data", kind)),
                )
            }
        };

        QUERY_LATENCY_SECONDS
            .with_label_values(&[kind.resource(), response.status.as_str()])
            .observe(start.elapsed().as_secs_f64());
        response
    }
}

/// Device queried when the request does not name one.
pub fn default_device_id(kind: MetricKind) -> String {
    format!("{}_sensor_1", kind.resource())
}

pub fn create_router(store: SharedStore, envelope: Envelope) -> Router {
    let state = AppState {
        query: QueryService::new(store.clone()),
        ingest: IngestRouter::new(store, envelope),
    };

    Router::new()
        .route("/weather/:resource", get(get_weather))
        .route("/ingest/:resource", post(post_ingest))
        .fallback(route_not_found)
        .with_state(state)
}

// Extractor rejections are answered here so every error body stays JSON
async fn get_weather(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    resource: Result<Path<String>, PathRejection>,
    params: Result<Query<WeatherParams>, QueryRejection>,
) -> QueryResponse {
    let Ok(Path(resource)) = resource else {
        debug!(path = %uri.path(), "Unresolvable query resource");
        return QueryResponse::error(
            StatusCode::NOT_FOUND,
            ErrorBody::route_not_found(uri.path()),
        );
    };

    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            debug!(path = %uri.path(), error = %rejection, "Rejected query string");
            return QueryResponse::error(
                StatusCode::BAD_REQUEST,
                ErrorBody::new(rejection.body_text()),
            );
        }
    };

    state
        .query
        .handle(QueryRequest {
            path: uri.path().to_string(),
            resource: Some(resource),
            device_id: params.device_id,
        })
        .await
}

async fn post_ingest(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    resource: Result<Path<String>, PathRejection>,
    event: Result<Json<IngestEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<Reading>), Response> {
    let Ok(Path(resource)) = resource else {
        return Err(route_not_found(uri).await.into_response());
    };
    let event = match event {
        Ok(Json(event)) => event,
        Err(rejection) => {
            return Err((
                rejection.status(),
                Json(ErrorBody::new(rejection.body_text())),
            )
                .into_response())
        }
    };

    match state.ingest.handle(&resource, event.data.as_bytes()).await {
        Ok(reading) => Ok((StatusCode::ACCEPTED, Json(reading))),
        Err(e) => Err(ingest_error_response(&resource, uri.path(), e)),
    }
}

fn ingest_error_response(resource: &str, path: &str, err: IngestError) -> Response {
    let (status, body) = match err {
        IngestError::UnknownKind(_) => (StatusCode::NOT_FOUND, ErrorBody::route_not_found(path)),
        IngestError::Envelope(_) | IngestError::Decode(_) | IngestError::Invalid { .. } => {
            (StatusCode::BAD_REQUEST, ErrorBody::new(err.to_string()))
        }
        IngestError::Store(StoreError::NotConfigured(e)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorBody::new(e.to_string()))
        }
        IngestError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new(format!("Failed to store {} data", resource)),
        ),
    };
    (status, Json(body)).into_response()
}

async fn route_not_found(uri: Uri) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::route_not_found(uri.path())),
    )
}
