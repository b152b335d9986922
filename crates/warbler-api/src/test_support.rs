//! In-process HTTP client for handler tests. Drives the router with
//! `oneshot` and keeps a cookie store between requests like a browser.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use axum_extra::extract::cookie::Cookie;
use tower::ServiceExt;

use warbler_db::Database;
use warbler_db::models::UserRow;

use crate::auth::{self, AppState, AppStateInner};
use crate::session::{SESSION_COOKIE, issue_token};
use crate::{router, templates};

const SECRET: &str = "test-secret";
const MAX_REDIRECTS: usize = 5;

pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: String,
}

pub struct TestClient {
    app: Router,
    state: AppState,
    cookies: BTreeMap<String, String>,
}

impl TestClient {
    pub fn new() -> Self {
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            templates: templates::load().unwrap(),
            secret: SECRET.to_string(),
        });
        Self {
            app: router(state.clone()),
            state,
            cookies: BTreeMap::new(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Create `name` with email `{name}@email.com` and password "password".
    pub fn signup(&self, name: &str) -> UserRow {
        auth::signup(self.db(), name, &format!("{name}@email.com"), "password", None).unwrap()
    }

    pub fn log_in_as(&mut self, user: &UserRow) {
        let token = issue_token(SECRET, user).unwrap();
        self.cookies.insert(SESSION_COOKIE.to_string(), token);
    }

    pub fn has_session(&self) -> bool {
        self.cookies.contains_key(SESSION_COOKIE)
    }

    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&mut self, uri: &str, form: &[(&str, &str)]) -> TestResponse {
        self.send(Method::POST, uri, Some(serde_urlencoded::to_string(form).unwrap())).await
    }

    /// GET each `Location` until a non-redirect response.
    pub async fn follow(&mut self, mut resp: TestResponse) -> TestResponse {
        for _ in 0..MAX_REDIRECTS {
            let Some(location) = resp.location.clone() else {
                return resp;
            };
            assert!(resp.status.is_redirection(), "Location on {}", resp.status);
            resp = self.get(&location).await;
        }
        panic!("too many redirects");
    }

    async fn send(&mut self, method: Method, uri: &str, form: Option<String>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if !self.cookies.is_empty() {
            let header_value = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, header_value);
        }
        let body = match form {
            Some(form) => {
                builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form)
            }
            None => Body::empty(),
        };

        let resp = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        self.read(resp).await
    }

    async fn read(&mut self, resp: Response) -> TestResponse {
        for value in resp.headers().get_all(header::SET_COOKIE) {
            let cookie = Cookie::parse(value.to_str().unwrap().to_string()).unwrap();
            if cookie.value().is_empty() {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }

        let status = resp.status();
        let location = resp
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();

        TestResponse {
            status,
            location,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }
}
