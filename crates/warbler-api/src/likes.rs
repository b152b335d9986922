use axum::{
    Extension,
    extract::{Path, State},
    response::Response,
};
use tracing::info;

use crate::auth::AppState;
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::{found, run_blocking};

/// POST /users/like/{message_id}
pub async fn like(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(message_id): Path<i64>,
) -> Result<Response, AppError> {
    let me_id = me.id;
    let added = run_blocking(&state, move |db| -> warbler_db::Result<_> {
        if db.get_message(message_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(db.like(me_id, message_id)?))
    })
    .await??
    .ok_or(AppError::NotFound)?;

    if added {
        info!("User {} liked message {}", me_id, message_id);
    }
    Ok(found(&format!("/users/{me_id}/likes")))
}

/// POST /users/unlike/{message_id}
pub async fn unlike(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(message_id): Path<i64>,
) -> Result<Response, AppError> {
    let me_id = me.id;
    if run_blocking(&state, move |db| db.unlike(me_id, message_id)).await?? {
        info!("User {} unliked message {}", me_id, message_id);
    }
    Ok(found(&format!("/users/{me_id}/likes")))
}
