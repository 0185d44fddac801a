use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::agent::engine::{self, AgentContext, EngineError};
use crate::agent::tools::ToolRegistry;
use crate::conversation::{ChatTurn, DEFAULT_CONVERSATION};
use crate::models::LanguageModel;
use crate::reporting::deployments::{NetworkUpdate, NewNetwork};
use crate::reporting::{ReportingClient, ReportingError};
use crate::settings::{ConversationSettings, ConversationSettingsPatch, GlobalDefaults};
use crate::storage::ConversationStore;
use crate::transcription::SpeechToText;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub model: Arc<dyn LanguageModel>,
    pub transcriber: Arc<dyn SpeechToText>,
    pub reporting: Arc<ReportingClient>,
    pub tools: Arc<ToolRegistry>,
    pub defaults: Arc<GlobalDefaults>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    fn agent(&self) -> AgentContext<'_> {
        AgentContext {
            store: self.store.as_ref(),
            model: self.model.as_ref(),
            tools: self.tools.as_ref(),
            reporting: self.reporting.as_ref(),
            defaults: self.defaults.as_ref(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Reporting(#[from] ReportingError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound | ApiError::Engine(EngineError::ConversationNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Reporting(ReportingError::Status { .. }) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct TextMessage {
    message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub message: String,
}

/// JSON bodies carry `{message}`; anything else is audio to transcribe.
async fn inbound_text(state: &AppState, headers: &HeaderMap, body: Bytes) -> ApiResult<String> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    let text = if is_json {
        let parsed: TextMessage = serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        parsed.message
    } else {
        if body.is_empty() {
            return Err(ApiError::BadRequest("empty audio body".into()));
        }
        state.transcriber.transcribe(body.to_vec()).await?
    };
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::BadRequest("no speech or text to respond to".into()));
    }
    Ok(text)
}

async fn chat_in(state: &AppState, conversation: Uuid, headers: &HeaderMap, body: Bytes) -> ApiResult<Json<ChatReply>> {
    // unknown ids are rejected before any transcription
    state.store.get_conversation(conversation).await?.ok_or(ApiError::NotFound)?;
    let message = inbound_text(state, headers, body).await?;
    info!(%conversation, chars = message.len(), "inbound message");
    let answer = engine::respond(state.agent(), conversation, &message).await?;
    Ok(Json(ChatReply { message: answer }))
}

async fn chat_default(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult<Json<ChatReply>> {
    chat_in(&state, DEFAULT_CONVERSATION, &headers, body).await
}

async fn chat_in_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ChatReply>> {
    chat_in(&state, id, &headers, body).await
}

async fn list_all_turns(State(state): State<AppState>) -> ApiResult<Json<Vec<ChatTurn>>> {
    Ok(Json(state.store.list_turns(None).await?))
}

async fn purge_all_turns(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let removed = state.store.purge_turns(None).await?;
    info!(removed, "all turns purged");
    Ok(Json(json!({})))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationBody {
    pub settings: Option<ConversationSettings>,
}

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub id: Uuid,
}

async fn create_conversation(
    State(state): State<AppState>,
    body: Option<Json<CreateConversationBody>>,
) -> ApiResult<Json<CreateConversationResponse>> {
    let settings = body.and_then(|Json(b)| b.settings).unwrap_or_default();
    let id = state.store.create_conversation(settings).await?;
    Ok(Json(CreateConversationResponse { id }))
}

#[derive(Debug, Serialize)]
pub struct ListConversationsResponse {
    pub conversations: Vec<Uuid>,
}

async fn list_conversations(State(state): State<AppState>) -> ApiResult<Json<ListConversationsResponse>> {
    let conversations = state.store.list_conversations().await?;
    Ok(Json(ListConversationsResponse { conversations }))
}

async fn delete_conversation(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    if id == DEFAULT_CONVERSATION {
        return Err(ApiError::BadRequest("the default conversation cannot be deleted".into()));
    }
    if state.store.delete_conversation(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

#[derive(Debug, Serialize)]
struct ConversationSettingsResponse {
    settings: ConversationSettings,
}

async fn get_conversation_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ConversationSettingsResponse>> {
    let conversation = state.store.get_conversation(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(ConversationSettingsResponse { settings: conversation.settings }))
}

async fn patch_conversation_settings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ConversationSettingsPatch>,
) -> ApiResult<Json<ConversationSettingsResponse>> {
    let mut conversation = state.store.get_conversation(id).await?.ok_or(ApiError::NotFound)?;
    conversation.settings.apply_patch(patch);
    state.store.update_settings(id, conversation.settings.clone()).await?;
    Ok(Json(ConversationSettingsResponse { settings: conversation.settings }))
}

async fn list_conversation_turns(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Vec<ChatTurn>>> {
    let conversation = state.store.get_conversation(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(conversation.turns))
}

async fn purge_conversation_turns(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    state.store.get_conversation(id).await?.ok_or(ApiError::NotFound)?;
    let removed = state.store.purge_turns(Some(id)).await?;
    Ok(Json(json!({ "deleted": removed })))
}

async fn list_networks(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(state.reporting.list_network_deployments().await?))
}

async fn create_network(State(state): State<AppState>, Json(network): Json<NewNetwork>) -> ApiResult<Json<Value>> {
    Ok(Json(state.reporting.create_network_deployment(&network).await?))
}

async fn get_network(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    Ok(Json(state.reporting.get_network_deployment(&id).await?))
}

async fn update_network(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<NetworkUpdate>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.reporting.update_network_deployment(&id, &update).await?))
}

async fn delete_network(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    Ok(Json(state.reporting.delete_network_deployment(&id).await?))
}

async fn render_metrics(State(state): State<AppState>) -> ApiResult<String> {
    state.metrics.as_ref().map(|h| h.render()).ok_or(ApiError::NotFound)
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/chat", post(chat_default))
        .route("/chats", get(list_all_turns).delete(purge_all_turns))
        .route("/v1/conversations", post(create_conversation).get(list_conversations))
        .route("/v1/conversations/:id", delete(delete_conversation))
        .route("/v1/conversations/:id/settings", get(get_conversation_settings).patch(patch_conversation_settings))
        .route("/v1/conversations/:id/chat", post(chat_in_conversation))
        .route("/v1/conversations/:id/turns", get(list_conversation_turns).delete(purge_conversation_turns))
        .route("/v1/deployments/networks", get(list_networks).post(create_network))
        .route("/v1/deployments/networks/:id", get(get_network).put(update_network).delete(delete_network))
        .route("/metrics", get(render_metrics))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState, max_body_bytes: usize) -> anyhow::Result<()> {
    let app = router(state, max_body_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatResponse, ScriptedModel};
    use crate::reporting::mock::MockReportingApi;
    use crate::storage::temp_store;
    use crate::transcription::FixedTranscript;
    use chrono::{Duration, SecondsFormat, Utc};

    struct TestApp {
        base: String,
        model: Arc<ScriptedModel>,
        api: MockReportingApi,
        http: reqwest::Client,
        _dir: tempfile::TempDir,
    }

    /// Counts transcriptions so tests can tell whether audio was processed.
    struct CountingTranscript {
        text: String,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SpeechToText for CountingTranscript {
        async fn transcribe(&self, _audio: Vec<u8>) -> anyhow::Result<String> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.text.clone())
        }
    }

    /// The recorder is process-global; every test shares one.
    fn prometheus() -> PrometheusHandle {
        static HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();
        HANDLE
            .get_or_init(|| metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder().unwrap())
            .clone()
    }

    async fn spawn_app(script: Vec<ChatResponse>, transcript: &str) -> TestApp {
        spawn_with(script, Arc::new(FixedTranscript(transcript.into())), None).await
    }

    async fn spawn_with(
        script: Vec<ChatResponse>,
        transcriber: Arc<dyn SpeechToText>,
        metrics: Option<PrometheusHandle>,
    ) -> TestApp {
        let (store, dir) = temp_store().await;
        let api = MockReportingApi::start().await;
        let model = Arc::new(ScriptedModel::new(script));
        let state = AppState {
            store: Arc::new(store),
            model: model.clone(),
            transcriber,
            reporting: Arc::new(api.client()),
            tools: Arc::new(ToolRegistry::with_default_tools()),
            defaults: Arc::new(GlobalDefaults::default()),
            metrics,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state, 1024 * 1024)).await.unwrap();
        });
        TestApp { base: format!("http://{}", addr), model, api, http: reqwest::Client::new(), _dir: dir }
    }

    impl TestApp {
        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }
    }

    #[tokio::test]
    async fn audio_turn_is_answered_and_persisted() {
        let end = Utc::now();
        let start = end - Duration::days(7);
        let app = spawn_app(
            vec![
                ScriptedModel::call(
                    "listInfectedLookups",
                    json!({
                        "startDate": start.to_rfc3339_opts(SecondsFormat::Secs, true),
                        "endDate": end.to_rfc3339_opts(SecondsFormat::Secs, true),
                    }),
                ),
                ScriptedModel::text("| Domain |\n|---|\n| a.example |\n| b.example |\n| c.example |"),
            ],
            "show me blocked lookups for the last week",
        )
        .await;
        app.api.respond(
            "/reports/v2/activity/dns",
            json!({"data": [
                {"domain": "a.example", "identities": [], "blockedapplications": []},
                {"domain": "b.example", "identities": [], "blockedapplications": []},
                {"domain": "c.example", "identities": [], "blockedapplications": []}
            ]}),
        );

        let resp = app
            .http
            .post(app.url("/chat"))
            .header("content-type", "audio/wav")
            .body(b"RIFF....WAVEfmt ".to_vec())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert!(body["message"].as_str().unwrap().contains("c.example"));

        let recorded = app.model.recorded();
        assert_eq!(recorded[0].message, "show me blocked lookups for the last week");
        assert_eq!(recorded[1].tool_results[0].outputs.len(), 3);

        let turns: Vec<Value> = app.http.get(app.url("/chats")).send().await.unwrap().json().await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["isBot"], false);
        assert_eq!(turns[0]["message"], "show me blocked lookups for the last week");
        assert_eq!(turns[1]["isBot"], true);
    }

    #[tokio::test]
    async fn purge_then_list_is_empty() {
        let app = spawn_app(vec![ScriptedModel::text("one"), ScriptedModel::text("two")], "unused").await;
        for q in ["first", "second"] {
            let resp = app.http.post(app.url("/chat")).json(&json!({"message": q})).send().await.unwrap();
            assert_eq!(resp.status(), 200);
        }
        let turns: Vec<Value> = app.http.get(app.url("/chats")).send().await.unwrap().json().await.unwrap();
        assert_eq!(turns.len(), 4);

        let resp = app.http.delete(app.url("/chats")).send().await.unwrap();
        assert_eq!(resp.json::<Value>().await.unwrap(), json!({}));
        let turns: Vec<Value> = app.http.get(app.url("/chats")).send().await.unwrap().json().await.unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn conversations_are_isolated_and_configurable() {
        let app = spawn_app(vec![ScriptedModel::text("scoped answer")], "unused").await;

        let created: Value = app
            .http
            .post(app.url("/v1/conversations"))
            .json(&json!({"settings": {"model": "command-r"}}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let patched: Value = app
            .http
            .patch(app.url(&format!("/v1/conversations/{id}/settings")))
            .json(&json!({"default_window_days": 7}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(patched["settings"]["model"], "command-r");
        assert_eq!(patched["settings"]["default_window_days"], 7);

        let resp = app
            .http
            .post(app.url(&format!("/v1/conversations/{id}/chat")))
            .json(&json!({"message": "hello"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(app.model.recorded()[0].model, "command-r");
        assert!(app.model.recorded()[0].preamble.contains("last 7 days"));

        let scoped: Vec<Value> = app
            .http
            .get(app.url(&format!("/v1/conversations/{id}/turns")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(scoped.len(), 2);
        let default_turns: Vec<Value> = app
            .http
            .get(app.url(&format!("/v1/conversations/{}/turns", DEFAULT_CONVERSATION)))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(default_turns.is_empty());

        let missing = app
            .http
            .post(app.url(&format!("/v1/conversations/{}/chat", Uuid::new_v4())))
            .json(&json!({"message": "hello"}))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);

        let resp = app.http.delete(app.url(&format!("/v1/conversations/{id}"))).send().await.unwrap();
        assert_eq!(resp.status(), 204);
    }

    #[tokio::test]
    async fn unknown_conversation_skips_transcription() {
        let transcriber = Arc::new(CountingTranscript { text: "top threats".into(), calls: Default::default() });
        let app = spawn_with(vec![ScriptedModel::text("unused")], transcriber.clone(), None).await;
        let resp = app
            .http
            .post(app.url(&format!("/v1/conversations/{}/chat", Uuid::new_v4())))
            .header("content-type", "audio/wav")
            .body(vec![1u8; 32])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        assert_eq!(transcriber.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(app.model.recorded().is_empty());

        let resp = app.http.post(app.url("/chat")).header("content-type", "audio/wav").body(vec![1u8; 32]).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(transcriber.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn counters_show_up_on_metrics_endpoint() {
        let app = spawn_with(
            vec![
                ScriptedModel::call("getTopThreats", json!({"startDate": "2024-03-01", "endDate": "2024-03-31"})),
                ScriptedModel::text("Emotet leads."),
            ],
            Arc::new(FixedTranscript("unused".into())),
            Some(prometheus()),
        )
        .await;
        app.api.respond("/reports/v2/top-threats", json!({"data": [{"threat": "Emotet", "count": 4}]}));

        let resp = app.http.post(app.url("/chat")).json(&json!({"message": "top threats in march"})).send().await.unwrap();
        assert_eq!(resp.status(), 200);

        let resp = app.http.get(app.url("/metrics")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let text = resp.text().await.unwrap();
        for name in [
            "assistant_turns_total",
            "assistant_model_calls_total",
            "assistant_tool_calls_total",
            "assistant_token_refresh_total",
        ] {
            assert!(text.contains(name), "{name} missing from:\n{text}");
        }
        assert!(text.contains("tool=\"getTopThreats\""));
    }

    #[tokio::test]
    async fn silent_audio_is_a_bad_request() {
        let app = spawn_app(vec![], "   ").await;
        let resp = app
            .http
            .post(app.url("/chat"))
            .header("content-type", "audio/webm")
            .body(vec![0u8; 16])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert!(app.model.recorded().is_empty());
    }

    #[tokio::test]
    async fn model_failure_is_a_hard_failure() {
        let app = spawn_app(vec![], "unused").await;
        let resp = app.http.post(app.url("/chat")).json(&json!({"message": "hi"})).send().await.unwrap();
        assert_eq!(resp.status(), 500);
        let turns: Vec<Value> = app.http.get(app.url("/chats")).send().await.unwrap().json().await.unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn deployments_are_proxied() {
        let app = spawn_app(vec![], "unused").await;
        app.api.respond("/deployments/v2/networks", json!([{"originId": 1, "name": "hq"}]));
        app.api.respond_status("/deployments/v2/networks/99", StatusCode::NOT_FOUND, json!({"message": "no such network"}));

        let listed: Value = app.http.get(app.url("/v1/deployments/networks")).send().await.unwrap().json().await.unwrap();
        assert_eq!(listed[0]["name"], "hq");

        let resp = app.http.get(app.url("/v1/deployments/networks/99")).send().await.unwrap();
        assert_eq!(resp.status(), 502);
        assert!(resp.text().await.unwrap().contains("no such network"));

        let resp = app.http.get(app.url("/metrics")).send().await.unwrap();
        assert_eq!(resp.status(), 404);
    }
}
