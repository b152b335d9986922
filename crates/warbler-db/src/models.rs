//! Database row types: these map directly to SQLite rows.
//! Distinct from warbler-types view models so the password hash stays in the DB layer.

use chrono::NaiveDateTime;
use tracing::warn;
use warbler_types::models::{Message, User};

pub const DEFAULT_IMAGE_URL: &str = "/static/images/default-pic.svg";
pub const DEFAULT_HEADER_IMAGE_URL: &str = "/static/images/warbler-hero.svg";

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub fn to_public(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            image_url: self.image_url.clone(),
            header_image_url: self.header_image_url.clone(),
            bio: self.bio.clone(),
            location: self.location.clone(),
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            image_url: row.image_url,
            header_image_url: row.header_image_url,
            bio: row.bio,
            location: row.location,
        }
    }
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    /// `None` or blank falls back to [`DEFAULT_IMAGE_URL`].
    pub image_url: Option<&'a str>,
}

pub struct ProfileUpdate<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub image_url: Option<&'a str>,
    pub header_image_url: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub location: Option<&'a str>,
}

/// A message row joined with its author's display fields.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub text: String,
    pub timestamp: String,
    pub user_id: i64,
    pub author_username: String,
    pub author_image_url: String,
}

impl MessageRow {
    pub fn into_message(self, liked: bool) -> Message {
        let timestamp = display_timestamp(&self.timestamp, self.id);
        Message {
            id: self.id,
            text: self.text,
            timestamp,
            user_id: self.user_id,
            author_username: self.author_username,
            author_image_url: self.author_image_url,
            liked,
        }
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS.SSS" without timezone.
fn display_timestamp(raw: &str, message_id: i64) -> String {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.format("%d %B %Y").to_string())
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on message {}: {}", raw, message_id, e);
            raw.to_string()
        })
}

/// Treat blank optional form input as absent.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
