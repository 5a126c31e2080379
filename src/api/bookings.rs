//! Booking endpoints: create, read, edit, cancel

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use ulid::Ulid;

use crate::auth::Caller;
use crate::model::{BookingChanges, BookingInfo, BookingStatus, NewBooking};

use super::{ApiError, ApiResult, AppState, parse_date, parse_id, parse_optional_date, reply};

fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    /// Defaults to the calling user.
    pub user_id: Option<Ulid>,
    pub room_id: Ulid,
    pub check_in: String,
    pub check_out: String,
    pub guests: i64,
    #[serde(default = "one")]
    pub room_count: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBookingRequest {
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub room_id: Option<Ulid>,
    pub guests: Option<i64>,
    /// Honoured on the admin route only.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

fn parse_status(raw: &str) -> Result<BookingStatus, ApiError> {
    BookingStatus::parse(raw)
        .ok_or_else(|| ApiError::bad_request("Status must be one of Pending, Confirmed, Cancelled."))
}

impl UpdateBookingRequest {
    fn into_changes(self, allow_status: bool) -> Result<BookingChanges, ApiError> {
        let status = match self.status.as_deref() {
            Some(raw) if allow_status => Some(parse_status(raw)?),
            Some(_) => return Err(ApiError::Forbidden("only admins can change booking status")),
            None => None,
        };
        Ok(BookingChanges {
            check_in: parse_optional_date(self.check_in.as_deref(), "check-in")?,
            check_out: parse_optional_date(self.check_out.as_deref(), "check-out")?,
            room_id: self.room_id,
            guests: self.guests,
            status,
        })
    }
}

/// POST /api/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = payload?;
    let user_id = match req.user_id {
        Some(id) => id,
        None => caller.require_user()?,
    };
    let booking = state
        .engine
        .create_booking(NewBooking {
            user_id,
            room_id: req.room_id,
            check_in: parse_date(&req.check_in, "check-in")?,
            check_out: parse_date(&req.check_out, "check-out")?,
            guests: req.guests,
            room_count: req.room_count,
        })
        .await?;
    let info = state.engine.get_booking(booking.id).await?;
    Ok((StatusCode::CREATED, reply("Booking created successfully", "booking", info)?))
}

/// GET /api/bookings
pub async fn list_bookings(State(state): State<AppState>) -> ApiResult<Vec<BookingInfo>> {
    Ok(Json(state.engine.list_bookings().await))
}

/// GET /api/bookings/mine
pub async fn my_bookings(State(state): State<AppState>, caller: Caller) -> ApiResult<Vec<BookingInfo>> {
    let user_id = caller.require_user()?;
    Ok(Json(state.engine.user_bookings(user_id).await))
}

/// GET /api/bookings/{id}
pub async fn get_booking(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<BookingInfo> {
    let id = parse_id(&id, "booking")?;
    Ok(Json(state.engine.get_booking(id).await?))
}

/// PUT /api/bookings/{id}
pub async fn update_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateBookingRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "booking")?;
    let Json(req) = payload?;
    let booking = state.engine.update_booking(id, req.into_changes(false)?).await?;
    let info = state.engine.get_booking(booking.id).await?;
    reply("Booking updated successfully", "booking", info)
}

/// PUT /api/bookings/{id}/admin
pub async fn admin_update_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateBookingRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "booking")?;
    let Json(req) = payload?;
    let booking = state.engine.update_booking(id, req.into_changes(true)?).await?;
    let info = state.engine.get_booking(booking.id).await?;
    reply("Booking updated successfully", "booking", info)
}

/// PATCH /api/bookings/{id}/status
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "booking")?;
    let Json(req) = payload?;
    let status = parse_status(&req.status)?;
    let booking = state.engine.set_booking_status(id, status).await?;
    let info = state.engine.get_booking(booking.id).await?;
    reply("Booking status updated successfully", "booking", info)
}

/// POST /api/bookings/{id}/cancel
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, "booking")?;
    let outcome = state.engine.cancel_booking(id).await?;
    let info = state.engine.get_booking(outcome.booking.id).await?;
    Ok(Json(json!({
        "message": "Booking cancelled successfully",
        "refund": outcome.refund_note,
        "booking": info,
    })))
}
