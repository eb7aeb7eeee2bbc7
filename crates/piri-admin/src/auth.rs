//! The bearer-token gate every admin route sits behind (spec.md §6: "All
//! routes are under a common root, gated by a bearer-token filter whose
//! signing key is the node's public identity"). Grounded on the
//! `require_permission` extension-based middleware in `ferrex-server`'s
//! `users::auth::permission_middleware`, adapted from role extraction to
//! signature verification.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::{AdminState, PaymentApi};

pub async fn bearer_auth<P, L>(
    State(state): State<AdminState<P, L>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    P: PaymentApi,
    L: 'static,
{
    let header = request.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()).ok_or(ApiError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
    state.authenticator.verify(token).map_err(|_| ApiError::Unauthorized)?;
    Ok(next.run(request).await)
}
