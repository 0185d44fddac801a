//! In-process stand-in for the reporting API, served over real HTTP.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{Value, json};

use super::ReportingClient;
use super::credentials::TokenCache;
use crate::config::ReportingConfig;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    responses: Arc<Mutex<HashMap<String, (StatusCode, Value)>>>,
    rejected_tokens: Arc<Mutex<HashSet<String>>>,
    issued: Arc<AtomicUsize>,
}

pub struct MockReportingApi {
    pub base_url: String,
    state: MockState,
}

impl MockReportingApi {
    pub async fn start() -> Self {
        let state = MockState::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(handle).with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { base_url: format!("http://{}", addr), state }
    }

    pub fn config(&self) -> ReportingConfig {
        ReportingConfig {
            base_url: self.base_url.clone(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            token_ttl: Duration::from_secs(3500),
        }
    }

    pub fn client(&self) -> ReportingClient {
        let config = self.config();
        ReportingClient::new(&config, Arc::new(TokenCache::new(config.token_ttl)))
    }

    pub fn respond(&self, path: &str, body: Value) {
        self.respond_status(path, StatusCode::OK, body);
    }

    pub fn respond_status(&self, path: &str, status: StatusCode, body: Value) {
        self.state.responses.lock().unwrap().insert(path.to_string(), (status, body));
    }

    /// Responds only to `method` on `path`, taking priority over [`Self::respond`].
    pub fn respond_method(&self, method: Method, path: &str, body: Value) {
        self.state.responses.lock().unwrap().insert(format!("{method} {path}"), (StatusCode::OK, body));
    }

    pub fn reject_token(&self, token: &str) {
        self.state.rejected_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }

    /// Requests other than the token exchange.
    pub fn report_requests(&self) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path != "/auth/v2/token").collect()
    }
}

async fn handle(State(state): State<MockState>, method: Method, uri: Uri, headers: HeaderMap, body: String) -> Response {
    let authorization = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        query: uri.query().unwrap_or_default().to_string(),
        authorization: authorization.clone(),
        body,
    });

    if path == "/auth/v2/token" {
        let n = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
        return Json(json!({"access_token": format!("token-{n}"), "token_type": "bearer", "expires_in": 3600})).into_response();
    }

    let bearer = authorization.as_deref().and_then(|a| a.strip_prefix("Bearer ")).unwrap_or_default();
    if bearer.is_empty() || state.rejected_tokens.lock().unwrap().contains(bearer) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "unauthorized"}))).into_response();
    }

    let responses = state.responses.lock().unwrap();
    match responses.get(&format!("{method} {path}")).or_else(|| responses.get(&path)) {
        Some((status, body)) => (*status, Json(body.clone())).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"message": "not found"}))).into_response(),
    }
}
