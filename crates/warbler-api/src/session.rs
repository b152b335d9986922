//! Cookie-backed session identity and one-shot flash notices.
//!
//! The session cookie carries an HS256 JWT whose `sub` is the user id. A
//! missing, forged or expired token reads as "logged out", and so does a
//! token for a user that no longer exists.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use warbler_db::models::UserRow;
use warbler_types::api::Claims;

use crate::auth::AppState;
use crate::error::AppError;
use crate::run_blocking;

pub const SESSION_COOKIE: &str = "curr_user";
pub const FLASH_COOKIE: &str = "flash";

const SESSION_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    /// Bootstrap alert flavour: "success", "danger", "info".
    pub category: String,
    pub text: String,
}

pub fn issue_token(secret: &str, user: &UserRow) -> Result<String, AppError> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| debug!("Rejected session token: {}", e))
    .ok()
}

pub fn log_in(jar: CookieJar, secret: &str, user: &UserRow) -> Result<CookieJar, AppError> {
    let token = issue_token(secret, user)?;
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    Ok(jar.add(cookie))
}

pub fn log_out(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

/// The user named by the session cookie, if any.
pub async fn current_user(state: &AppState, jar: &CookieJar) -> Result<Option<UserRow>, AppError> {
    let Some(claims) = jar
        .get(SESSION_COOKIE)
        .and_then(|c| decode_token(&state.secret, c.value()))
    else {
        return Ok(None);
    };

    let user = run_blocking(state, move |db| db.get_user(claims.sub)).await??;
    if user.is_none() {
        debug!("Session names missing user {}", claims.sub);
    }
    Ok(user)
}

/// Queue a notice for the next rendered page.
pub fn flash(jar: CookieJar, category: &str, text: &str) -> CookieJar {
    let mut flashes = read_flashes(&jar);
    flashes.push(Flash {
        category: category.to_string(),
        text: text.to_string(),
    });

    let encoded = match serde_json::to_vec(&flashes) {
        Ok(json) => B64.encode(json),
        Err(e) => {
            warn!("Dropping flash message: {}", e);
            return jar;
        }
    };

    jar.add(Cookie::build((FLASH_COOKIE, encoded)).path("/").http_only(true))
}

/// Drain queued notices.
pub fn take_flashes(jar: CookieJar) -> (CookieJar, Vec<Flash>) {
    let flashes = read_flashes(&jar);
    if jar.get(FLASH_COOKIE).is_none() {
        return (jar, flashes);
    }
    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), flashes)
}

fn read_flashes(jar: &CookieJar) -> Vec<Flash> {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return Vec::new();
    };

    B64.decode(cookie.value())
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_else(|| {
            warn!("Ignoring malformed flash cookie");
            Vec::new()
        })
}
