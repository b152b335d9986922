use std::collections::HashSet;

use axum::{
    Extension, Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tera::Context;
use tracing::{info, warn};

use warbler_db::models::{ProfileUpdate, UserRow};
use warbler_db::{Database, DbError};
use warbler_types::api::{ProfileForm, UserSearchQuery};
use warbler_types::models::{UserCard, UserStats};

use crate::auth::{AppState, authenticate};
use crate::error::AppError;
use crate::messages::with_likes;
use crate::middleware::{CurrentUser, MaybeUser};
use crate::templates::render;
use crate::{found, run_blocking, session};

const PROFILE_MESSAGE_LIMIT: u32 = 100;

/// Header data shared by every page under `/users/{user_id}`.
struct Profile {
    user: UserRow,
    stats: UserStats,
    /// Whether the viewer follows this user.
    is_following: bool,
}

impl Profile {
    fn load(db: &Database, user_id: i64, viewer_id: Option<i64>) -> warbler_db::Result<Option<Self>> {
        let Some(user) = db.get_user(user_id)? else {
            return Ok(None);
        };
        let stats = db.user_stats(user_id)?;
        let is_following = match viewer_id {
            Some(viewer_id) => db.is_following(viewer_id, user_id)?,
            None => false,
        };
        Ok(Some(Self {
            user,
            stats,
            is_following,
        }))
    }

    fn context(&self) -> Context {
        let mut context = Context::new();
        context.insert("user", &self.user.to_public());
        context.insert("stats", &self.stats);
        context.insert("is_following", &self.is_following);
        context
    }
}

#[derive(Clone, Copy)]
enum Relation {
    Following,
    Followers,
}

fn to_cards(rows: Vec<UserRow>, following: &HashSet<i64>) -> Vec<UserCard> {
    rows.into_iter()
        .map(|row| UserCard {
            is_following: following.contains(&row.id),
            user: row.into(),
        })
        .collect()
}

fn following_ids(db: &Database, viewer_id: Option<i64>) -> warbler_db::Result<HashSet<i64>> {
    match viewer_id {
        Some(id) => db.following_ids(id),
        None => Ok(HashSet::new()),
    }
}

fn liked_ids(db: &Database, viewer_id: Option<i64>) -> warbler_db::Result<HashSet<i64>> {
    match viewer_id {
        Some(id) => db.liked_message_ids(id),
        None => Ok(HashSet::new()),
    }
}

/// GET /users: every user, or those whose username contains `q`.
pub async fn list_users(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    jar: CookieJar,
    Query(query): Query<UserSearchQuery>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = viewer.as_ref().map(|v| v.id);
    let cards = run_blocking(&state, move |db| -> warbler_db::Result<_> {
        let rows = db.list_users(query.q.as_deref())?;
        Ok(to_cards(rows, &following_ids(db, viewer_id)?))
    })
    .await??;

    let mut context = Context::new();
    context.insert("users", &cards);
    render(&state, jar, viewer.as_ref(), "users/index.html", context)
}

pub async fn show_user(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    jar: CookieJar,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let viewer_id = viewer.as_ref().map(|v| v.id);
    let page = run_blocking(&state, move |db| -> warbler_db::Result<_> {
        let Some(profile) = Profile::load(db, user_id, viewer_id)? else {
            return Ok(None);
        };
        let rows = db.messages_for_user(user_id, PROFILE_MESSAGE_LIMIT)?;
        Ok(Some((profile, with_likes(rows, &liked_ids(db, viewer_id)?))))
    })
    .await??;

    let (profile, messages) = page.ok_or(AppError::NotFound)?;
    let mut context = profile.context();
    context.insert("messages", &messages);
    render(&state, jar, viewer.as_ref(), "users/show.html", context)
}

pub async fn show_following(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    jar: CookieJar,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    relation_page(state, me, jar, user_id, Relation::Following).await
}

pub async fn show_followers(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    jar: CookieJar,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    relation_page(state, me, jar, user_id, Relation::Followers).await
}

async fn relation_page(
    state: AppState,
    me: UserRow,
    jar: CookieJar,
    user_id: i64,
    relation: Relation,
) -> Result<impl IntoResponse, AppError> {
    let me_id = me.id;
    let page = run_blocking(&state, move |db| -> warbler_db::Result<_> {
        let Some(profile) = Profile::load(db, user_id, Some(me_id))? else {
            return Ok(None);
        };
        let rows = match relation {
            Relation::Following => db.following(user_id)?,
            Relation::Followers => db.followers(user_id)?,
        };
        Ok(Some((profile, to_cards(rows, &db.following_ids(me_id)?))))
    })
    .await??;

    let (profile, cards) = page.ok_or(AppError::NotFound)?;
    let mut context = profile.context();
    context.insert("users", &cards);
    let template = match relation {
        Relation::Following => "users/following.html",
        Relation::Followers => "users/followers.html",
    };
    render(&state, jar, Some(&me), template, context)
}

pub async fn show_likes(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    jar: CookieJar,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let me_id = me.id;
    let page = run_blocking(&state, move |db| -> warbler_db::Result<_> {
        let Some(profile) = Profile::load(db, user_id, Some(me_id))? else {
            return Ok(None);
        };
        let rows = db.liked_messages(user_id)?;
        Ok(Some((profile, with_likes(rows, &db.liked_message_ids(me_id)?))))
    })
    .await??;

    let (profile, messages) = page.ok_or(AppError::NotFound)?;
    let mut context = profile.context();
    context.insert("messages", &messages);
    render(&state, jar, Some(&me), "users/likes.html", context)
}

/// POST /users/follow/{user_id}
pub async fn follow(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    let me_id = me.id;
    let added = run_blocking(&state, move |db| -> warbler_db::Result<_> {
        if db.get_user(user_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(db.follow(me_id, user_id)?))
    })
    .await??
    .ok_or(AppError::NotFound)?;

    if added {
        info!("User {} now follows {}", me_id, user_id);
    }
    Ok(found(&format!("/users/{me_id}/following")))
}

/// POST /users/stop-following/{user_id}
pub async fn stop_following(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    Path(user_id): Path<i64>,
) -> Result<Response, AppError> {
    let me_id = me.id;
    if run_blocking(&state, move |db| db.unfollow(me_id, user_id)).await?? {
        info!("User {} stopped following {}", me_id, user_id);
    }
    Ok(found(&format!("/users/{me_id}/following")))
}

/// GET /users/profile
pub async fn edit_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let context = edit_context(
        me.id,
        &me.username,
        &me.email,
        &me.image_url,
        &me.header_image_url,
        me.bio.as_deref().unwrap_or_default(),
        me.location.as_deref().unwrap_or_default(),
    );
    render(&state, jar, Some(&me), "users/edit.html", context)
}

enum ProfileOutcome {
    WrongPassword,
    Rejected(String),
    Updated,
}

/// POST /users/profile: the current password must accompany any change.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    jar: CookieJar,
    Form(form): Form<ProfileForm>,
) -> Result<Response, AppError> {
    let context = edit_context(
        me.id,
        &form.username,
        &form.email,
        form.image_url.as_deref().unwrap_or_default(),
        form.header_image_url.as_deref().unwrap_or_default(),
        form.bio.as_deref().unwrap_or_default(),
        form.location.as_deref().unwrap_or_default(),
    );

    let me_id = me.id;
    let current_username = me.username.clone();
    let outcome = run_blocking(&state, move |db| -> Result<_, AppError> {
        if authenticate(db, &current_username, &form.password)?.is_none() {
            return Ok(ProfileOutcome::WrongPassword);
        }

        let update = ProfileUpdate {
            username: &form.username,
            email: &form.email,
            image_url: form.image_url.as_deref(),
            header_image_url: form.header_image_url.as_deref(),
            bio: form.bio.as_deref(),
            location: form.location.as_deref(),
        };
        match db.update_user(me_id, &update) {
            Ok(_) => Ok(ProfileOutcome::Updated),
            Err(DbError::Integrity(reason)) => Ok(ProfileOutcome::Rejected(reason)),
            Err(e) => Err(e.into()),
        }
    })
    .await??;

    match outcome {
        ProfileOutcome::Updated => {
            info!("User {} updated their profile", me_id);
            let jar = session::flash(jar, "success", "Profile updated.");
            Ok((jar, found(&format!("/users/{me_id}"))).into_response())
        }
        ProfileOutcome::WrongPassword => {
            warn!("Profile update for user {} with wrong password", me_id);
            let jar = session::flash(jar, "danger", "Wrong password, please try again.");
            Ok(render(&state, jar, Some(&me), "users/edit.html", context)?.into_response())
        }
        ProfileOutcome::Rejected(reason) => {
            warn!("Profile update for user {} rejected: {}", me_id, reason);
            let jar = session::flash(jar, "danger", "Username or email already taken.");
            Ok(render(&state, jar, Some(&me), "users/edit.html", context)?.into_response())
        }
    }
}

/// POST /users/delete: removes the account and everything it owns.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(CurrentUser(me)): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let me_id = me.id;
    run_blocking(&state, move |db| db.delete_user(me_id)).await??;
    info!("User {} ({}) deleted their account", me.username, me_id);

    let jar = session::log_out(jar);
    let jar = session::flash(jar, "success", "Your account has been deleted.");
    Ok((jar, found("/signup")).into_response())
}

fn edit_context(
    user_id: i64,
    username: &str,
    email: &str,
    image_url: &str,
    header_image_url: &str,
    bio: &str,
    location: &str,
) -> Context {
    let mut context = Context::new();
    context.insert("user_id", &user_id);
    context.insert("username", username);
    context.insert("email", email);
    context.insert("image_url", image_url);
    context.insert("header_image_url", header_image_url);
    context.insert("bio", bio);
    context.insert("location", location);
    context
}
