//! Room endpoints: catalog, admin edits, ratings

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::Caller;
use crate::model::{RatingSummary, RoomInfo, RoomSpec, TaxRates};

use super::{ApiError, ApiResult, AppState, parse_id, reply};

#[derive(Debug, Deserialize)]
pub struct RoomRequest {
    pub name: String,
    pub price_per_night: Decimal,
    /// Zero means no discount.
    #[serde(default)]
    pub discounted_price: Decimal,
    pub max_occupancy: u32,
    #[serde(default)]
    pub taxes: TaxRatesRequest,
    pub total_slots: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TaxRatesRequest {
    pub vat: Decimal,
    pub service_tax: Decimal,
    pub other: Decimal,
}

impl From<RoomRequest> for RoomSpec {
    fn from(req: RoomRequest) -> Self {
        Self {
            name: req.name,
            price_per_night: req.price_per_night,
            discounted_price: req.discounted_price,
            max_occupancy: req.max_occupancy,
            taxes: TaxRates {
                vat: req.taxes.vat,
                service_tax: req.taxes.service_tax,
                other: req.taxes.other,
            },
            total_slots: req.total_slots,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub rating: f64,
}

/// POST /api/rooms
pub async fn create_room(
    State(state): State<AppState>,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = payload?;
    let room = state.engine.create_room(req.into()).await?;
    Ok((StatusCode::CREATED, reply("Room created successfully", "room", room)?))
}

/// GET /api/rooms
pub async fn list_rooms(State(state): State<AppState>) -> ApiResult<Vec<RoomInfo>> {
    Ok(Json(state.engine.list_rooms().await))
}

/// GET /api/rooms/{id}
pub async fn get_room(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<RoomInfo> {
    let id = parse_id(&id, "room")?;
    Ok(Json(state.engine.get_room(id).await?))
}

/// PUT /api/rooms/{id}
pub async fn update_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<RoomRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "room")?;
    let Json(req) = payload?;
    let room = state.engine.update_room(id, req.into()).await?;
    reply("Room updated successfully", "room", room)
}

/// POST /api/rooms/{id}/ratings
pub async fn add_rating(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Result<Json<RatingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let user_id = caller.require_user()?;
    let id = parse_id(&id, "room")?;
    let Json(req) = payload?;
    let room = state.engine.add_rating(id, user_id, req.rating).await?;
    Ok((StatusCode::CREATED, reply("Rating added successfully", "room", room)?))
}

/// GET /api/rooms/{id}/rating
pub async fn average_rating(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RatingSummary> {
    let id = parse_id(&id, "room")?;
    Ok(Json(state.engine.average_rating(id).await?))
}
