//! Request handlers and the state they share.
//!
//! Handlers validate their input, delegate to a core component and shape the
//! result into a response. They never log failures themselves; see
//! [`ApiError`].

use super::error::ApiError;
use crate::server::config::ServerConfig;
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, header},
    response::Response,
};
use offload_core::{
    Error,
    dispatch::TaskDispatcher,
    pool::WorkerPool,
    range::{RangeFile, resolve_range},
    store::{NewUser, UserRecord, UserStore},
    workload::{self, JsonElement},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;

/// Everything a handler may touch, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    dispatcher: TaskDispatcher,
    store: Arc<dyn UserStore>,
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, pool: Arc<WorkerPool>, store: Arc<dyn UserStore>) -> Self {
        let dispatcher = TaskDispatcher::new(pool).with_timeout(config.worker_timeout);

        Self {
            dispatcher,
            store,
            config: Arc::new(config),
        }
    }
}

#[derive(Serialize)]
pub struct Greeting {
    message: &'static str,
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn json_small() -> Json<Greeting> {
    Json(Greeting {
        message: "Hello World!",
    })
}

/// Computes on the runtime thread serving the request, stalling every other
/// request scheduled on it.
pub async fn fibonacci_blocker(
    State(state): State<AppState>,
    Path(n): Path<String>,
) -> Result<String, ApiError> {
    Ok(state.dispatcher.run_blocking(&n)?.to_string())
}

pub async fn fibonacci_non_blocking(
    State(state): State<AppState>,
    Path(n): Path<String>,
) -> Result<String, ApiError> {
    Ok(state.dispatcher.run_offloaded(&n).await?.to_string())
}

/// Responds with the four results as a JSON array in a plain-text body.
pub async fn fibonacci_parallel(
    State(state): State<AppState>,
    Path(n): Path<String>,
) -> Result<String, ApiError> {
    let results = state.dispatcher.run_parallel(&n).await?;
    Ok(format!("[{}]", results.map(|v| v.to_string()).join(",")))
}

/// Answers the parameterized endpoints when their parameter is missing.
pub async fn missing_param() -> ApiError {
    Error::BadRequest {
        reason: "missing path parameter".to_string(),
    }
    .into()
}

pub async fn video_serving(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let file = RangeFile::open(&state.config.video_path).await?;
    let total_size = file.total_size();

    // A header that is not visible ASCII cannot hold a valid range.
    let raw_range = headers
        .get(header::RANGE)
        .map(|value| value.to_str())
        .transpose()
        .map_err(|_| Error::RangeNotSatisfiable { total_size })?;

    let range = resolve_range(raw_range, total_size)?;
    let frame = range.frame();
    let body = file.stream(range, state.config.stream_chunk_bytes).await?;

    let mut response = Response::builder()
        .status(frame.status)
        .header(header::CONTENT_TYPE, state.config.video_content_type.clone())
        .header(header::CONTENT_LENGTH, frame.content_length);
    if let Some(content_range) = frame.content_range {
        response = response.header(header::CONTENT_RANGE, content_range);
    }
    if frame.accept_ranges {
        response = response.header(header::ACCEPT_RANGES, "bytes");
    }

    response
        .body(Body::from_stream(body))
        .map_err(ApiError::internal)
}

pub async fn memory_intensive(
    State(state): State<AppState>,
    Path(n): Path<String>,
) -> Result<String, ApiError> {
    let multiplier = workload::parse_memory_multiplier(&n)?;
    let per_unit = state.config.memory_elements_per_unit;

    let sum = tokio::task::spawn_blocking(move || workload::memory_intensive(multiplier, per_unit))
        .await
        .map_err(ApiError::internal)??;

    Ok(format!("Memory intensive operation completed. Sum: {sum}"))
}

pub async fn json_processing(
    State(state): State<AppState>,
    Path(n): Path<String>,
) -> Result<Json<Vec<JsonElement>>, ApiError> {
    round_trip(&state, workload::json_multiplier(Some(&n))).await
}

pub async fn json_processing_default(
    State(state): State<AppState>,
) -> Result<Json<Vec<JsonElement>>, ApiError> {
    round_trip(&state, workload::json_multiplier(None)).await
}

async fn round_trip(state: &AppState, multiplier: i64) -> Result<Json<Vec<JsonElement>>, ApiError> {
    let per_unit = state.config.json_elements_per_unit;

    let elements =
        tokio::task::spawn_blocking(move || workload::json_round_trip(multiplier, per_unit))
            .await
            .map_err(ApiError::internal)??;

    Ok(Json(elements))
}

#[derive(Deserialize)]
struct UsernameBody {
    username: String,
}

#[derive(Deserialize)]
struct PasswordChange {
    username: String,
    password: String,
}

pub async fn insert_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let user: NewUser = json_body(&headers, &body)?;
    user.validate().map_err(|e| Error::BadRequest {
        reason: e.to_string(),
    })?;

    state.store.create(user).await.map_err(Error::from)?;
    Ok("User inserted successfully\n")
}

pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Option<UserRecord>>, ApiError> {
    let UsernameBody { username } = json_body(&headers, &body)?;
    require("username", &username)?;

    let user = state.store.get(&username).await.map_err(Error::from)?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let PasswordChange { username, password } = json_body(&headers, &body)?;
    require("username", &username)?;
    require("password", &password)?;

    state
        .store
        .update(&username, &password)
        .await
        .map_err(Error::from)?;
    Ok("User updated successfully\n")
}

pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let UsernameBody { username } = json_body(&headers, &body)?;
    require("username", &username)?;

    state.store.delete(&username).await.map_err(Error::from)?;
    Ok("User deleted successfully\n")
}

/// Decodes a JSON body, telling a missing content type (400) apart from a
/// foreign one (415).
fn json_body<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> Result<T, ApiError> {
    let Some(content_type) = headers.get(header::CONTENT_TYPE) else {
        return Err(Error::BadRequest {
            reason: "missing content type".to_string(),
        }
        .into());
    };

    let content_type = content_type.to_str().unwrap_or_default();
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case("application/json") {
        return Err(ApiError::UnsupportedMediaType {
            content_type: content_type.to_string(),
        });
    }

    serde_json::from_slice(body).map_err(|e| {
        Error::BadRequest {
            reason: format!("malformed JSON body: {e}"),
        }
        .into()
    })
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(Error::BadRequest {
            reason: format!("`{field}` must not be empty"),
        }
        .into());
    }
    Ok(())
}
