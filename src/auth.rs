use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, header};
use axum::middleware::Next;
use axum::response::Response;
use ulid::Ulid;

use crate::api::{ApiError, AppState};
use crate::model::Role;
use crate::observability;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Who is calling, as stated by the fronting auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<Ulid>,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The caller's user id, or 401 when the request is anonymous.
    pub fn require_user(&self) -> Result<Ulid, ApiError> {
        self.user_id
            .ok_or(ApiError::Unauthorized("caller is not identified"))
    }

    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = match headers.get(USER_ID_HEADER) {
            None => None,
            Some(raw) => {
                let raw = raw
                    .to_str()
                    .map_err(|_| ApiError::Unauthorized("malformed user id"))?;
                Some(
                    Ulid::from_string(raw.trim())
                        .map_err(|_| ApiError::Unauthorized("malformed user id"))?,
                )
            }
        };
        let role = match headers.get(USER_ROLE_HEADER) {
            None => Role::default(),
            Some(raw) => raw
                .to_str()
                .ok()
                .and_then(Role::parse)
                .ok_or(ApiError::Unauthorized("unknown role"))?,
        };
        Ok(Self { user_id, role })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

/// Admin capability check for every admin-only route.
pub async fn require_admin(caller: Caller, req: Request, next: Next) -> Result<Response, ApiError> {
    if !caller.is_admin() {
        tracing::warn!(user_id = ?caller.user_id, path = %req.uri().path(), "admin route refused");
        metrics::counter!(observability::AUTH_FAILURES_TOTAL, "reason" => "forbidden").increment(1);
        return Err(ApiError::Forbidden("admin access required"));
    }
    Ok(next.run(req).await)
}

/// Shared bearer token on `/api` routes, when one is configured.
pub async fn require_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.api_token.as_deref() else {
        return Ok(next.run(req).await);
    };
    if req.method() == Method::OPTIONS || !req.uri().path().starts_with("/api/") {
        return Ok(next.run(req).await);
    }

    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    if presented != Some(expected) {
        metrics::counter!(observability::AUTH_FAILURES_TOTAL, "reason" => "token").increment(1);
        return Err(ApiError::Unauthorized("missing or invalid API token"));
    }
    Ok(next.run(req).await)
}
