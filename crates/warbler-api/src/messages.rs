use std::collections::HashSet;

use axum::{
    Extension, Form,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tera::Context;
use tracing::{info, warn};

use warbler_db::DbError;
use warbler_db::models::{MessageRow, UserRow};
use warbler_types::api::MessageForm;
use warbler_types::models::Message;

use crate::auth::AppState;
use crate::error::AppError;
use crate::middleware::{CurrentUser, MaybeUser, unauthorized};
use crate::templates::render;
use crate::{found, run_blocking, session};

pub const MAX_MESSAGE_LEN: usize = 140;

/// Convert rows to view models, marking the ones the viewer liked.
pub(crate) fn with_likes(rows: Vec<MessageRow>, liked: &HashSet<i64>) -> Vec<Message> {
    rows.into_iter()
        .map(|row| {
            let is_liked = liked.contains(&row.id);
            row.into_message(is_liked)
        })
        .collect()
}

/// SQLite's `length()` stops at the first NUL, so such text can never
/// satisfy the column's CHECK.
fn valid_text(text: &str) -> bool {
    let len = text.chars().count();
    (1..=MAX_MESSAGE_LEN).contains(&len) && !text.contains('\0')
}

pub async fn new_message(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let mut context = Context::new();
    context.insert("text", "");
    render(&state, jar, Some(&me), "messages/new.html", context)
}

pub async fn create_message(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    jar: CookieJar,
    Form(form): Form<MessageForm>,
) -> Result<Response, AppError> {
    if !valid_text(&form.text) {
        return reject_text(&state, jar, &me, &form.text);
    }

    let me_id = me.id;
    let text = form.text.clone();
    match run_blocking(&state, move |db| db.insert_message(me_id, &form.text)).await? {
        Ok(message_id) => {
            info!("User {} posted message {}", me_id, message_id);
            Ok(found(&format!("/users/{me_id}")))
        }
        Err(DbError::Integrity(reason)) => {
            warn!("Message from user {} rejected: {}", me_id, reason);
            reject_text(&state, jar, &me, &text)
        }
        Err(e) => Err(e.into()),
    }
}

fn reject_text(state: &AppState, jar: CookieJar, me: &UserRow, text: &str) -> Result<Response, AppError> {
    let jar = session::flash(
        jar,
        "danger",
        &format!("Messages must be between 1 and {MAX_MESSAGE_LEN} characters."),
    );
    let mut context = Context::new();
    context.insert("text", text);
    Ok(render(state, jar, Some(me), "messages/new.html", context)?.into_response())
}

pub async fn show_message(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    jar: CookieJar,
    Path(message_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = viewer.as_ref().map(|v| v.id);
    let found_message = run_blocking(&state, move |db| -> warbler_db::Result<_> {
        let Some(row) = db.get_message(message_id)? else {
            return Ok(None);
        };
        let liked = match viewer_id {
            Some(id) => db.is_liked_by(message_id, id)?,
            None => false,
        };
        Ok(Some(row.into_message(liked)))
    })
    .await??;

    let message = found_message.ok_or(AppError::NotFound)?;
    let mut context = Context::new();
    context.insert("message", &message);
    render(&state, jar, viewer.as_ref(), "messages/show.html", context)
}

enum Deletion {
    Missing,
    NotOwner,
    Deleted,
}

/// POST /messages/{message_id}/delete: only the author may delete.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    jar: CookieJar,
    Path(message_id): Path<i64>,
) -> Result<Response, AppError> {
    let me_id = me.id;
    let outcome = run_blocking(&state, move |db| -> warbler_db::Result<_> {
        if db.get_message(message_id)?.is_none() {
            return Ok(Deletion::Missing);
        }
        Ok(if db.delete_message(message_id, me_id)? {
            Deletion::Deleted
        } else {
            Deletion::NotOwner
        })
    })
    .await??;

    match outcome {
        Deletion::Missing => Err(AppError::NotFound),
        Deletion::NotOwner => {
            warn!("User {} tried to delete message {} they don't own", me_id, message_id);
            Ok(unauthorized(jar))
        }
        Deletion::Deleted => {
            info!("User {} deleted message {}", me_id, message_id);
            Ok(found(&format!("/users/{me_id}")))
        }
    }
}
