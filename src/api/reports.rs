//! Admin dashboard endpoints

use axum::Json;
use axum::extract::State;

use crate::model::{DashboardSummary, PeriodChange};

use super::{ApiResult, AppState};

/// GET /api/dashboard
pub async fn dashboard(State(state): State<AppState>) -> ApiResult<DashboardSummary> {
    let recent = state.config.recent_bookings;
    Ok(Json(state.engine.dashboard_summary(recent).await))
}

/// GET /api/dashboard/booking-change
pub async fn booking_change(State(state): State<AppState>) -> ApiResult<PeriodChange> {
    Ok(Json(state.engine.booking_change().await))
}

/// GET /api/dashboard/revenue-change
pub async fn revenue_change(State(state): State<AppState>) -> ApiResult<PeriodChange> {
    Ok(Json(state.engine.revenue_change().await))
}
