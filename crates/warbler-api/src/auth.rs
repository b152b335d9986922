use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Form,
    extract::State,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{info, warn};

use warbler_db::models::{NewUser, UserRow};
use warbler_db::{Database, DbError};
use warbler_types::api::{LoginForm, SignupForm};

use crate::error::AppError;
use crate::middleware::{CurrentUser, MaybeUser};
use crate::templates::render;
use crate::{found, run_blocking, session};

pub const MIN_PASSWORD_LEN: usize = 6;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub templates: Tera,
    /// Signs session tokens.
    pub secret: String,
}

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("username or email rejected: {0}")]
    Integrity(String),

    #[error("password must not be empty")]
    InvalidPassword,

    #[error(transparent)]
    App(#[from] AppError),
}

/// Create a user with an Argon2id-hashed password.
///
/// Duplicate or empty username/email is [`SignupError::Integrity`]; an empty
/// password is [`SignupError::InvalidPassword`].
pub fn signup(
    db: &Database,
    username: &str,
    email: &str,
    password: &str,
    image_url: Option<&str>,
) -> Result<UserRow, SignupError> {
    if password.is_empty() {
        return Err(SignupError::InvalidPassword);
    }

    let password_hash = hash_password(password)?;

    db.create_user(&NewUser {
        username,
        email,
        password_hash: &password_hash,
        image_url,
    })
    .map_err(|e| match e {
        DbError::Integrity(msg) => SignupError::Integrity(msg),
        other => SignupError::App(other.into()),
    })
}

/// The user with this username, if the password matches. Wrong password and
/// unknown username are both `Ok(None)`.
pub fn authenticate(db: &Database, username: &str, password: &str) -> Result<Option<UserRow>, AppError> {
    let Some(user) = db.get_user_by_username(username)? else {
        return Ok(None);
    };

    let parsed_hash = match PasswordHash::new(&user.password) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Unreadable password hash for user {}: {}", user.id, e);
            return Ok(None);
        }
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(Some(user)),
        Err(_) => Ok(None),
    }
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Hash(e.to_string()))
}

// -- Handlers --

pub async fn signup_form(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    render(&state, jar, viewer.as_ref(), "users/signup.html", form_context("", ""))
}

pub async fn signup_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Result<Response, AppError> {
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        let jar = session::flash(
            jar,
            "danger",
            &format!("Password must be at least {MIN_PASSWORD_LEN} characters."),
        );
        let context = form_context(&form.username, &form.email);
        return Ok(render(&state, jar, None, "users/signup.html", context)?.into_response());
    }

    let username = form.username.clone();
    let email = form.email.clone();
    let outcome = run_blocking(&state, move |db| {
        signup(
            db,
            &form.username,
            &form.email,
            &form.password,
            form.image_url.as_deref(),
        )
    })
    .await?;

    match outcome {
        Ok(user) => {
            info!("New user {} ({})", user.username, user.id);
            let jar = session::log_in(jar, &state.secret, &user)?;
            Ok((jar, found("/")).into_response())
        }
        Err(SignupError::Integrity(reason)) => {
            warn!("Signup rejected for '{}': {}", username, reason);
            let jar = session::flash(jar, "danger", "Username or email already taken.");
            let context = form_context(&username, &email);
            Ok(render(&state, jar, None, "users/signup.html", context)?.into_response())
        }
        Err(SignupError::InvalidPassword) => {
            let jar = session::flash(jar, "danger", "Password must not be empty.");
            let context = form_context(&username, &email);
            Ok(render(&state, jar, None, "users/signup.html", context)?.into_response())
        }
        Err(SignupError::App(e)) => Err(e),
    }
}

pub async fn login_form(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    render(&state, jar, viewer.as_ref(), "users/login.html", form_context("", ""))
}

pub async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let username = form.username.clone();
    let user = run_blocking(&state, move |db| authenticate(db, &form.username, &form.password))
        .await??;

    match user {
        Some(user) => {
            info!("User {} logged in", user.id);
            let jar = session::log_in(jar, &state.secret, &user)?;
            let jar = session::flash(jar, "success", &format!("Hello, {}!", user.username));
            Ok((jar, found("/")).into_response())
        }
        None => {
            warn!("Failed login for '{}'", username);
            let jar = session::flash(jar, "danger", "Invalid credentials.");
            let context = form_context(&username, "");
            Ok(render(&state, jar, None, "users/login.html", context)?.into_response())
        }
    }
}

pub async fn logout(Extension(CurrentUser(me)): Extension<CurrentUser>, jar: CookieJar) -> Response {
    info!("User {} logged out", me.id);
    let jar = session::log_out(jar);
    let jar = session::flash(jar, "success", "You have successfully logged out.");
    (jar, found("/login")).into_response()
}

fn form_context(username: &str, email: &str) -> Context {
    let mut context = Context::new();
    context.insert("username", username);
    context.insert("email", email);
    context
}
