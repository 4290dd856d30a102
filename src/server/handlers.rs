use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{NearestPayload, DEFAULT_NEAREST_LIMIT};
use crate::error::ServiceError;
use crate::store::{City, CityId};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        if e.is_server_fault() {
            tracing::error!(error = %e, "request failed");
        }
        api_error(e.status(), e.to_string())
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        api_error(StatusCode::BAD_REQUEST, format!("Invalid path: {}", e.body_text()))
    }
}

/// Parse a JSON body regardless of the declared content type.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e)))
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ─── GET /get ────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct CityList {
    pub cities: Vec<City>,
}

pub async fn list_cities(State(state): State<Arc<AppState>>) -> Result<Json<CityList>, ApiError> {
    let start = Instant::now();
    let cities = state.service.list().await?;

    tracing::info!(count = cities.len(), elapsed_ms = elapsed_ms(start), "GET /get");
    Ok(Json(CityList { cities }))
}

// ─── GET /get/{id} ───────────────────────────────────────────────

pub async fn get_city(
    State(state): State<Arc<AppState>>,
    id: Result<Path<CityId>, PathRejection>,
) -> Result<Json<City>, ApiError> {
    let start = Instant::now();
    let Path(id) = id?;

    match state.service.get(id).await? {
        Some(city) => {
            tracing::info!(
                id,
                name = %city.name,
                elapsed_ms = elapsed_ms(start),
                "GET /get/{{id}}"
            );
            Ok(Json(city))
        }
        None => Err(api_error(StatusCode::NOT_FOUND, format!("City {} not found", id))),
    }
}

// ─── POST /create ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateRequest {
    pub name: String,
}

pub async fn create_city(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<City>, ApiError> {
    let start = Instant::now();
    let request: CreateRequest = parse_json(&body)?;

    let city = state.service.create(&request.name).await?;

    tracing::info!(id = city.id, name = %city.name, elapsed_ms = elapsed_ms(start), "POST /create");
    Ok(Json(city))
}

// ─── DELETE /delete/{id} ─────────────────────────────────────────

pub async fn delete_city(
    State(state): State<Arc<AppState>>,
    id: Result<Path<CityId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let start = Instant::now();
    let Path(id) = id?;

    state.service.delete(id).await?;

    tracing::info!(id, elapsed_ms = elapsed_ms(start), "DELETE /delete/{{id}}");
    Ok(StatusCode::OK)
}

// ─── POST /near ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct NearRequest {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn near_cities(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<NearestPayload>, ApiError> {
    let start = Instant::now();
    let request: NearRequest = parse_json(&body)?;
    let limit = request.limit.unwrap_or(DEFAULT_NEAREST_LIMIT);

    let result = state.service.nearest(request.lat, request.lon, limit).await?;

    tracing::info!(
        lat = request.lat,
        lon = request.lon,
        found = result.len(),
        elapsed_ms = elapsed_ms(start),
        "POST /near"
    );
    Ok(Json(NearestPayload { result }))
}
