//! Axum-based HTTP server for the feeder API.
//!
//! Provides REST endpoints for:
//! - POST `/feed` - Manual feed request
//! - GET `/status` - Feeder state + sensor snapshot
//! - GET/POST `/schedules*` - Schedule CRUD
//! - POST `/disable` / `/enable` - Suspend until next UTC midnight / resume
//! - GET `/sensor/distance`, `/sensor/status` - Decoder outputs
//! - GET `/logs` - Tail of the append-only log
//! - GET `/health` - Liveness
//!
//! Handlers map outcomes to status codes: policy denials are 409 with the
//! structured denial body, storage faults are 500, and nothing a single
//! request does can take the process down.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Days, Utc};
use log::info;
use serde::de::DeserializeOwned;
use tower_http::cors::{Any, CorsLayer};

use crate::config::WebConfig;
use crate::logging::{tail_lines, DEFAULT_TAIL_LINES};
use crate::schedule::{validate_entries, validate_entry, ScheduleEntry};
use crate::sensor::SensorError;
use crate::state::{FeedOutcome, FeedSource, DEFAULT_FEED_DURATION_MS};
use crate::store::StoreError;
use crate::traits::FeederRelay;

use super::api::{
    DeleteScheduleRequest, DenialBody, DisableBody, DistanceBody, ErrorBody, FeedBody,
    FeedRequest, LogsBody, LogsQuery, OkBody, SensorErrorBody, StatusBody,
};
use super::shared::SharedFeeder;

// ============================================================================
// Helpers
// ============================================================================

fn invalid_json(err: serde_json::Error) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::with_detail("Invalid JSON", err)),
    )
        .into_response()
}

/// Parse a required JSON body.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(invalid_json)
}

/// Parse an optional JSON body, falling back to `T::default()` when empty.
fn parse_body_or_default<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.is_empty() {
        return Ok(T::default());
    }
    parse_body(body)
}

fn store_failure(err: StoreError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::with_detail("state store failure", err)),
    )
        .into_response()
}

// ============================================================================
// Route Handlers
// ============================================================================

/// GET /health - liveness probe
async fn get_health() -> Json<OkBody> {
    Json(OkBody::new())
}

/// GET /status - feeder state snapshot plus sensor status
async fn get_status<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
) -> Response {
    match shared.state().await {
        Ok(state) => Json(StatusBody {
            ok: true,
            state,
            sensor: shared.sensor().status(),
        })
        .into_response(),
        Err(err) => store_failure(err),
    }
}

/// POST /feed - manual feed request
///
/// Accepts `{"duration": 3000}` or an empty body (default duration).
async fn post_feed<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
    body: Bytes,
) -> Response {
    let request: FeedRequest = match parse_body_or_default(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let duration_ms = request.duration.unwrap_or(DEFAULT_FEED_DURATION_MS);

    match shared.attempt_feed(FeedSource::Manual, duration_ms).await {
        Ok(FeedOutcome::Allowed(receipt)) => Json(FeedBody::new(receipt)).into_response(),
        Ok(FeedOutcome::Denied(denial)) => {
            (StatusCode::CONFLICT, Json(DenialBody::new(denial))).into_response()
        }
        Err(err) => store_failure(err),
    }
}

/// POST /disable - suspend feeding until the next UTC midnight
async fn post_disable<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
) -> Response {
    let now = Utc::now();
    let midnight = (now.date_naive() + Days::new(1))
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();

    match shared
        .update_state(|state| state.disabled_until = Some(midnight))
        .await
    {
        Ok(_) => {
            info!("feeding disabled until {} (next midnight UTC)", midnight.to_rfc3339());
            Json(DisableBody {
                ok: true,
                message: "Feeding disabled until next midnight (00:00 UTC)".into(),
                disabled_until: Some(midnight),
            })
            .into_response()
        }
        Err(err) => store_failure(err),
    }
}

/// POST /enable - lift a suspension immediately
async fn post_enable<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
) -> Response {
    match shared
        .update_state(|state| state.disabled_until = None)
        .await
    {
        Ok(_) => {
            info!("feeding re-enabled immediately");
            Json(DisableBody {
                ok: true,
                message: "Feeding re-enabled".into(),
                disabled_until: None,
            })
            .into_response()
        }
        Err(err) => store_failure(err),
    }
}

/// GET /schedules - the full list
async fn get_schedules<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
) -> Response {
    match shared.with_schedules(|store| store.load()) {
        Ok(schedules) => Json(schedules).into_response(),
        Err(err) => store_failure(err),
    }
}

/// POST /schedules - replace the full list
async fn post_schedules<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
    body: Bytes,
) -> Response {
    let entries: Vec<ScheduleEntry> = match parse_body(&body) {
        Ok(entries) => entries,
        Err(response) => return response,
    };
    if let Err(err) = validate_entries(&entries) {
        return (StatusCode::BAD_REQUEST, Json(ErrorBody::new(err.to_string()))).into_response();
    }

    match shared.with_schedules(|store| store.save(&entries)) {
        Ok(()) => Json(OkBody::new()).into_response(),
        Err(err) => store_failure(err),
    }
}

/// POST /schedules/add - append one entry
async fn post_schedule_add<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
    body: Bytes,
) -> Response {
    let entry: ScheduleEntry = match parse_body(&body) {
        Ok(entry) => entry,
        Err(response) => return response,
    };
    if let Err(err) = validate_entry(&entry) {
        return (StatusCode::BAD_REQUEST, Json(ErrorBody::new(err.to_string()))).into_response();
    }

    let result = shared.with_schedules(|store| {
        let mut entries = store.load()?;
        if entries.iter().any(|existing| existing.id == entry.id) {
            return Ok(None);
        }
        entries.push(entry.clone());
        store.save(&entries)?;
        Ok(Some(()))
    });

    match result {
        Ok(Some(())) => Json(OkBody::new()).into_response(),
        Ok(None) => (
            StatusCode::CONFLICT,
            Json(ErrorBody::new(format!("schedule {:?} already exists", entry.id))),
        )
            .into_response(),
        Err(err) => store_failure(err),
    }
}

/// POST /schedules/update - replace one entry by id
async fn post_schedule_update<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
    body: Bytes,
) -> Response {
    let entry: ScheduleEntry = match parse_body(&body) {
        Ok(entry) => entry,
        Err(response) => return response,
    };
    if let Err(err) = validate_entry(&entry) {
        return (StatusCode::BAD_REQUEST, Json(ErrorBody::new(err.to_string()))).into_response();
    }

    let result = shared.with_schedules(|store| {
        let mut entries = store.load()?;
        match entries.iter_mut().find(|existing| existing.id == entry.id) {
            Some(slot) => {
                *slot = entry.clone();
                store.save(&entries)?;
                Ok(Some(()))
            }
            None => Ok(None),
        }
    });

    match result {
        Ok(Some(())) => Json(OkBody::new()).into_response(),
        Ok(None) => schedule_not_found(&entry.id),
        Err(err) => store_failure(err),
    }
}

/// POST /schedules/delete - remove one entry by id
async fn post_schedule_delete<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
    body: Bytes,
) -> Response {
    let request: DeleteScheduleRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let result = shared.with_schedules(|store| {
        let mut entries = store.load()?;
        let before = entries.len();
        entries.retain(|existing| existing.id != request.id);
        if entries.len() == before {
            return Ok(None);
        }
        store.save(&entries)?;
        Ok(Some(()))
    });

    match result {
        Ok(Some(())) => Json(OkBody::new()).into_response(),
        Ok(None) => schedule_not_found(&request.id),
        Err(err) => store_failure(err),
    }
}

fn schedule_not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new(format!("schedule {id:?} not found"))),
    )
        .into_response()
}

/// GET /sensor/distance - the latest validated sample
async fn get_sensor_distance<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
) -> Response {
    match shared.sensor().read_distance(Utc::now()) {
        Ok(result) => Json(DistanceBody { ok: true, result }).into_response(),
        Err(err) => {
            let status = match err {
                SensorError::NoReadingYet => StatusCode::CONFLICT,
                SensorError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            };
            (
                status,
                Json(SensorErrorBody {
                    ok: false,
                    reason: err.reason().into(),
                    message: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /sensor/status - decoder health telemetry
async fn get_sensor_status<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
) -> Response {
    Json(shared.sensor().status()).into_response()
}

/// GET /logs - tail of the append-only log file
async fn get_logs<R: FeederRelay + Send + 'static>(
    State(shared): State<Arc<SharedFeeder<R>>>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let lines = query.lines.unwrap_or(DEFAULT_TAIL_LINES);
    match tail_lines(shared.log_path(), lines) {
        Ok((logs, total_lines)) => Json(LogsBody {
            ok: true,
            returned_lines: logs.len(),
            logs,
            total_lines,
        })
        .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody::with_detail("Failed to read logs", err)),
        )
            .into_response(),
    }
}

/// Fallback handler for 404
async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorBody::new("Not found"))).into_response()
}

// ============================================================================
// Server Builder
// ============================================================================

/// Build the axum router with all routes.
pub fn build_router<R: FeederRelay + Send + 'static>(
    shared: Arc<SharedFeeder<R>>,
    config: &WebConfig,
) -> Router {
    let mut router = Router::new()
        .route("/health", get(get_health))
        .route("/status", get(get_status::<R>))
        .route("/feed", post(post_feed::<R>))
        .route("/disable", post(post_disable::<R>))
        .route("/enable", post(post_enable::<R>))
        .route("/schedules", get(get_schedules::<R>).post(post_schedules::<R>))
        .route("/schedules/add", post(post_schedule_add::<R>))
        .route("/schedules/update", post(post_schedule_update::<R>))
        .route("/schedules/delete", post(post_schedule_delete::<R>))
        .route("/sensor/distance", get(get_sensor_distance::<R>))
        .route("/sensor/status", get(get_sensor_status::<R>))
        .route("/logs", get(get_logs::<R>))
        .fallback(not_found)
        .with_state(shared);

    if config.cors_permissive {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Start the web server.
///
/// Blocks until the server shuts down. The same `shared` handle should be
/// given to the schedule runner so every trigger source goes through one
/// arbiter.
pub async fn run_server<R: FeederRelay + Send + 'static>(
    shared: Arc<SharedFeeder<R>>,
    config: &WebConfig,
) -> Result<(), std::io::Error> {
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let router = build_router(shared, config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("feeder API listening on http://{addr}");

    axum::serve(listener, router).await
}
