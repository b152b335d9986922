pub mod auth;
pub mod error;
pub mod home;
pub mod likes;
pub mod messages;
pub mod middleware;
pub mod session;
pub mod templates;
pub mod users;

#[cfg(test)]
mod test_support;

use axum::{
    Router,
    http::{StatusCode, header},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::error;

use warbler_db::Database;

pub use auth::{AppState, AppStateInner};
pub use error::AppError;

use crate::middleware::require_login;

/// Build the application router. Pages that mutate state, or that reveal
/// who follows whom, sit behind the login gate.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(home::homepage))
        .route("/signup", get(auth::signup_form).post(auth::signup_submit))
        .route("/login", get(auth::login_form).post(auth::login_submit))
        .route("/users", get(users::list_users))
        .route("/users/{user_id}", get(users::show_user))
        .route("/messages/{message_id}", get(messages::show_message))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/users/{user_id}/following", get(users::show_following))
        .route("/users/{user_id}/followers", get(users::show_followers))
        .route("/users/{user_id}/likes", get(users::show_likes))
        .route("/users/follow/{user_id}", post(users::follow))
        .route("/users/stop-following/{user_id}", post(users::stop_following))
        .route("/users/like/{message_id}", post(likes::like))
        .route("/users/unlike/{message_id}", post(likes::unlike))
        .route(
            "/users/profile",
            get(users::edit_profile).post(users::update_profile),
        )
        .route("/users/delete", post(users::delete_user))
        .route(
            "/messages/new",
            get(messages::new_message).post(messages::create_message),
        )
        .route("/messages/{message_id}/delete", post(messages::delete_message))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_login))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Plain 302 redirect. `axum::response::Redirect` only offers 303/307/308.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Run blocking DB work (and password hashing) off the async runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, AppError>
where
    F: FnOnce(&Database) -> T + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::from(e)
        })
}
