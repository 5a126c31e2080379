//! User endpoints

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::model::{BookingInfo, NewUser, Role, UserInfo};

use super::{ApiError, ApiResult, AppState, parse_id, reply};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub role: Option<String>,
}

/// POST /api/users
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = payload?;
    let role = match req.role.as_deref() {
        None => Role::default(),
        Some(raw) => Role::parse(raw).ok_or_else(|| ApiError::bad_request("Role must be admin or standard."))?,
    };
    let user = state
        .engine
        .register_user(NewUser {
            name: req.name,
            email: req.email,
            role,
        })
        .await?;
    Ok((StatusCode::CREATED, reply("User registered successfully", "user", user)?))
}

/// GET /api/users/{id}
pub async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<UserInfo> {
    let id = parse_id(&id, "user")?;
    Ok(Json(state.engine.get_user(id)?))
}

/// GET /api/users/{id}/bookings
pub async fn user_bookings(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<BookingInfo>> {
    let id = parse_id(&id, "user")?;
    Ok(Json(state.engine.bookings_for_user(id).await?))
}
