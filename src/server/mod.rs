//! A deliberately vulnerable login server to point the attack at.
//!
//! `/vulnerable` compares credentials one character at a time and bails out
//! on the first mismatch, with an artificial delay per matching character so
//! the leak is visible over a real network. `/secure` does the same job in
//! constant time.
#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::spawn_unix_server;

use crate::decode_basic_auth;

use axum::{
    extract::{Query, State},
    http::{
        header::{AUTHORIZATION, CACHE_CONTROL, LOCATION, REFRESH, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, error};
use url::form_urlencoded;

use std::{sync::Arc, time::Duration};

const REALM: &str = "Basic realm=\"timing-oracle\"";
const DEFAULT_KEY_DELAY_MS: u64 = 20;

const CODES_PAGE: &str = "<!doctype html><html><head><title>Codes</title></head>\
<body><h1>Access granted</h1><p>Launch codes: 0000-0000</p>\
<a href=\"/deconnecter?rediriger_url=/vulnerable\">Log out</a></body></html>";
const WRONG_PASSWORD_PAGE: &str = "<!doctype html><html><head><title>Denied</title></head>\
<body><h1>Wrong username or password</h1></body></html>";
const LOGOUT_PAGE: &str = "<!doctype html><html><head><title>Logged out</title></head>\
<body><h1>Logged out</h1></body></html>";

/// Users and keys the server checks against, plus the timing behaviour of
/// the checks.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    users: Vec<(String, String)>,
    api_key: String,
    /// Slept for every matching leading character by the vulnerable checks.
    char_delay: Duration,
    /// Stands in for the cost of hashing a password.
    verify_cost: Duration,
}

impl CredentialStore {
    pub fn new(char_delay: Duration) -> Self {
        Self {
            users: Vec::new(),
            api_key: String::new(),
            char_delay,
            verify_cost: Duration::ZERO,
        }
    }

    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.users.push((username.to_string(), password.to_string()));
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = api_key.to_string();
        self
    }

    pub fn with_verify_cost(mut self, verify_cost: Duration) -> Self {
        self.verify_cost = verify_cost;
        self
    }

    /// Early-exit username scan, then an early-exit password check if the
    /// user exists.
    pub async fn verify_insecure(&self, username: &str, password: &str) -> bool {
        for (user, expected_password) in &self.users {
            if insecure_compare(user.as_bytes(), username.as_bytes(), self.char_delay).await {
                tokio::time::sleep(self.verify_cost).await;
                return insecure_compare(
                    expected_password.as_bytes(),
                    password.as_bytes(),
                    self.char_delay,
                )
                .await;
            }
        }
        false
    }

    /// Looks at every user and pays the verification cost whether or not
    /// the username exists.
    pub async fn verify_secure(&self, username: &str, password: &str) -> bool {
        let mut valid = subtle::Choice::from(0);
        for (user, expected_password) in &self.users {
            let user_matches = user.as_bytes().ct_eq(username.as_bytes());
            let password_matches = expected_password.as_bytes().ct_eq(password.as_bytes());
            valid |= user_matches & password_matches;
        }
        tokio::time::sleep(self.verify_cost).await;
        valid.into()
    }
}

/// Byte-at-a-time comparison that sleeps for every matching leading byte and
/// stops at the first difference.
pub async fn insecure_compare(expected: &[u8], given: &[u8], delay: Duration) -> bool {
    for (&e, &g) in expected.iter().zip(given) {
        if e != g {
            return false;
        }
        tokio::time::sleep(delay).await;
    }
    expected.len() == given.len()
}

pub fn router(store: CredentialStore) -> Router {
    Router::new()
        .route("/", get(|| async { redirect("/vulnerable") }))
        .route("/vulnerable", get(vulnerable))
        .route("/secure", get(secure))
        .route("/deconnecter", get(logout))
        .route("/api/secure", get(api_key_secure))
        .route("/api/insecure", get(api_key_insecure))
        .route("/api/very-insecure", get(api_key_very_insecure))
        .layer(middleware::map_response(disable_cache))
        .with_state(Arc::new(store))
}

/// Serve the oracle on `address` in the background, returning its base URL.
pub async fn spawn_server(
    address: impl ToSocketAddrs,
    store: CredentialStore,
) -> std::io::Result<String> {
    let listener = TcpListener::bind(address).await?;
    let addr = listener.local_addr()?;
    let app = router(store);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("oracle server stopped: {e}");
        }
    });
    Ok(format!("http://{}", addr))
}

type Store = State<Arc<CredentialStore>>;

async fn vulnerable(State(store): Store, headers: HeaderMap) -> Response {
    let valid = match credentials(&headers) {
        Some((username, password)) => store.verify_insecure(&username, &password).await,
        None => false,
    };
    if valid {
        Html(CODES_PAGE).into_response()
    } else {
        unauthorized()
    }
}

async fn secure(State(store): Store, headers: HeaderMap) -> Response {
    let valid = match credentials(&headers) {
        Some((username, password)) => store.verify_secure(&username, &password).await,
        None => false,
    };
    if valid {
        Html(CODES_PAGE).into_response()
    } else {
        unauthorized()
    }
}

#[derive(Debug, Deserialize)]
struct LogoutParams {
    rediriger_url: String,
    #[serde(default)]
    rediriger: bool,
}

/// A 401 makes browsers forget cached Basic credentials; the page then
/// refreshes back here to send the user on.
async fn logout(Query(params): Query<LogoutParams>) -> Response {
    if params.rediriger {
        return redirect(&params.rediriger_url);
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("rediriger", "true")
        .append_pair("rediriger_url", &params.rediriger_url)
        .finish();
    let refresh = format!("0;url=/deconnecter?{query}");
    let mut response = (StatusCode::UNAUTHORIZED, Html(LOGOUT_PAGE)).into_response();
    if let Ok(value) = HeaderValue::from_str(&refresh) {
        response.headers_mut().insert(REFRESH, value);
    }
    response
}

#[derive(Debug, Deserialize)]
struct KeyParams {
    key: String,
    delay: Option<u64>,
}

#[derive(Debug, Serialize)]
struct KeyResponse {
    valid: bool,
}

async fn api_key_secure(State(store): Store, Query(params): Query<KeyParams>) -> Json<KeyResponse> {
    let valid = store.api_key.as_bytes().ct_eq(params.key.as_bytes()).into();
    Json(KeyResponse { valid })
}

async fn api_key_insecure(
    State(store): Store,
    Query(params): Query<KeyParams>,
) -> Json<KeyResponse> {
    Json(KeyResponse {
        valid: params.key == store.api_key,
    })
}

async fn api_key_very_insecure(
    State(store): Store,
    Query(params): Query<KeyParams>,
) -> Json<KeyResponse> {
    let delay = Duration::from_millis(params.delay.unwrap_or(DEFAULT_KEY_DELAY_MS));
    let valid = insecure_compare(store.api_key.as_bytes(), params.key.as_bytes(), delay).await;
    Json(KeyResponse { valid })
}

fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let credentials = decode_basic_auth(header);
    if credentials.is_none() {
        debug!("malformed authorization header");
    }
    credentials
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, REALM)],
        Html(WRONG_PASSWORD_PAGE),
    )
        .into_response()
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "Illegal redirect url").into_response(),
    }
}

async fn disable_cache(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
