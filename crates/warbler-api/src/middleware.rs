use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::warn;

use warbler_db::models::UserRow;

use crate::auth::AppState;
use crate::error::AppError;
use crate::{found, session};

pub const UNAUTHORIZED_NOTICE: &str = "Access unauthorized.";

/// The logged-in user, inserted by [`require_login`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

/// The logged-in user, if there is one. For pages open to everybody.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<UserRow>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(MaybeUser(session::current_user(state, &jar).await?))
    }
}

/// Let the request through only with a valid session; otherwise bounce to
/// the home page with an "Access unauthorized." notice.
pub async fn require_login(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    match session::current_user(&state, &jar).await? {
        Some(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            Ok(next.run(req).await)
        }
        None => {
            warn!("Unauthorized {} {}", req.method(), req.uri().path());
            Ok(unauthorized(jar))
        }
    }
}

pub fn unauthorized(jar: CookieJar) -> Response {
    (session::flash(jar, "danger", UNAUTHORIZED_NOTICE), found("/")).into_response()
}
