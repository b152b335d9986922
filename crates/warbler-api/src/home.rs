use axum::{extract::State, response::IntoResponse};
use axum_extra::extract::CookieJar;
use tera::Context;

use crate::auth::AppState;
use crate::error::AppError;
use crate::messages::with_likes;
use crate::middleware::MaybeUser;
use crate::run_blocking;
use crate::templates::render;

const TIMELINE_LIMIT: u32 = 100;

/// Timeline for a logged-in user, the landing page for everybody else.
pub async fn homepage(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let Some(me) = viewer else {
        return render(&state, jar, None, "home-anon.html", Context::new());
    };

    let user_id = me.id;
    let (rows, liked, stats) = run_blocking(&state, move |db| -> warbler_db::Result<_> {
        Ok((
            db.timeline(user_id, TIMELINE_LIMIT)?,
            db.liked_message_ids(user_id)?,
            db.user_stats(user_id)?,
        ))
    })
    .await??;

    let mut context = Context::new();
    context.insert("messages", &with_likes(rows, &liked));
    context.insert("stats", &stats);
    render(&state, jar, Some(&me), "home.html", context)
}
