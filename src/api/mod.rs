//! HTTP surface over the engine.

mod bookings;
mod error;
mod reports;
mod rooms;
mod users;

use std::sync::Arc;

use axum::routing::{get, patch, post, put};
use axum::{Json, Router, middleware};
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use ulid::Ulid;

pub use error::ApiError;

use crate::auth;
use crate::config::Config;
use crate::engine::Engine;
use crate::model::{Ms, parse_instant};
use crate::observability;

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, config: Config) -> Self {
        Self {
            engine,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/rooms", post(rooms::create_room))
        .route("/api/rooms/{id}", put(rooms::update_room))
        .route("/api/bookings", get(bookings::list_bookings))
        .route("/api/bookings/{id}/admin", put(bookings::admin_update_booking))
        .route("/api/bookings/{id}/status", patch(bookings::set_status))
        .route("/api/dashboard", get(reports::dashboard))
        .route("/api/dashboard/booking-change", get(reports::booking_change))
        .route("/api/dashboard/revenue-change", get(reports::revenue_change))
        .route_layer(middleware::from_fn(auth::require_admin));

    let open = Router::new()
        .route("/health", get(health))
        .route("/api/rooms", get(rooms::list_rooms))
        .route("/api/rooms/{id}", get(rooms::get_room))
        .route("/api/rooms/{id}/ratings", post(rooms::add_rating))
        .route("/api/rooms/{id}/rating", get(rooms::average_rating))
        .route("/api/users", post(users::register_user))
        .route("/api/users/{id}", get(users::get_user))
        .route("/api/users/{id}/bookings", get(users::user_bookings))
        .route("/api/bookings", post(bookings::create_booking))
        .route("/api/bookings/mine", get(bookings::my_bookings))
        .route("/api/bookings/{id}", get(bookings::get_booking).put(bookings::update_booking))
        .route("/api/bookings/{id}/cancel", post(bookings::cancel_booking));

    open.merge(admin)
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_token))
        .layer(middleware::from_fn(observability::track_http))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health
async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "innkeep",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `{ "message": ..., "<key>": <resource> }`
fn reply<T: Serialize>(message: &str, key: &str, resource: T) -> Result<Json<Value>, ApiError> {
    let resource = serde_json::to_value(resource)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut body = Map::new();
    body.insert("message".into(), Value::String(message.into()));
    body.insert(key.into(), resource);
    Ok(Json(Value::Object(body)))
}

fn parse_id(raw: &str, what: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(raw.trim()).map_err(|_| ApiError::bad_request(format!("Invalid {what} id.")))
}

fn parse_date(raw: &str, what: &str) -> Result<Ms, ApiError> {
    parse_instant(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid {what} date.")))
}

fn parse_optional_date(raw: Option<&str>, what: &str) -> Result<Option<Ms>, ApiError> {
    raw.map(|r| parse_date(r, what)).transpose()
}
