//! Bearer-token guard for the admin routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use super::error::AppError;
use super::state::AppState;

/// Compare digests so the comparison time does not depend on where the
/// tokens first differ.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Reject requests without `Authorization: Bearer <admin.api_token>`. An
/// empty configured token disables the admin API.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state.admin_token();
    if expected.is_empty() {
        return Err(AppError::Unauthorized(
            "Admin API is disabled: no admin token configured".to_string(),
        ));
    }

    let authorized = match bearer_token(&request) {
        Some(token) if tokens_match(token, expected) => Ok(()),
        Some(_) => {
            tracing::warn!(path = %request.uri().path(), "Rejected admin token");
            Err(AppError::Unauthorized("Invalid admin token".to_string()))
        }
        None => Err(AppError::Unauthorized("Missing bearer token".to_string())),
    };
    authorized?;

    Ok(next.run(request).await)
}
