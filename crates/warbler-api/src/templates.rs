use axum::response::Html;
use axum_extra::extract::CookieJar;
use tera::{Context, Tera};

use warbler_db::models::UserRow;

use crate::auth::AppState;
use crate::error::AppError;
use crate::session;

pub const NOT_FOUND_PAGE: &str = include_str!("../templates/404.html");
pub const SERVER_ERROR_PAGE: &str = include_str!("../templates/500.html");

/// Compile the embedded page templates. Names ending in `.html` get
/// autoescaping.
pub fn load() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("base.html", include_str!("../templates/base.html")),
        ("home.html", include_str!("../templates/home.html")),
        ("home-anon.html", include_str!("../templates/home-anon.html")),
        ("messages/_list.html", include_str!("../templates/messages/_list.html")),
        ("messages/new.html", include_str!("../templates/messages/new.html")),
        ("messages/show.html", include_str!("../templates/messages/show.html")),
        ("users/_cards.html", include_str!("../templates/users/_cards.html")),
        ("users/signup.html", include_str!("../templates/users/signup.html")),
        ("users/login.html", include_str!("../templates/users/login.html")),
        ("users/index.html", include_str!("../templates/users/index.html")),
        ("users/detail.html", include_str!("../templates/users/detail.html")),
        ("users/show.html", include_str!("../templates/users/show.html")),
        ("users/following.html", include_str!("../templates/users/following.html")),
        ("users/followers.html", include_str!("../templates/users/followers.html")),
        ("users/likes.html", include_str!("../templates/users/likes.html")),
        ("users/edit.html", include_str!("../templates/users/edit.html")),
    ])?;
    Ok(tera)
}

/// Render `template` for the viewer, consuming any queued flash notices.
pub fn render(
    state: &AppState,
    jar: CookieJar,
    viewer: Option<&UserRow>,
    template: &str,
    mut context: Context,
) -> Result<(CookieJar, Html<String>), AppError> {
    let (jar, flashes) = session::take_flashes(jar);
    context.insert("flashes", &flashes);
    context.insert("current_user", &viewer.map(UserRow::to_public));

    let html = state.templates.render(template, &context)?;
    Ok((jar, Html(html)))
}
