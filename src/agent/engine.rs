use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::prompt::build_preamble;
use crate::agent::tools::{ToolContext, ToolDescriptor, ToolError, ToolRegistry};
use crate::conversation::{ChatTurn, Speaker};
use crate::models::{ChatRequest, ChatResponse, HistoryMessage, LanguageModel, ToolCallRequest, ToolCallResult};
use crate::reporting::ReportingClient;
use crate::settings::{EffectiveSettings, GlobalDefaults, resolve_effective_settings};
use crate::storage::ConversationStore;

#[derive(Clone, Copy)]
pub struct AgentContext<'a> {
    pub store: &'a dyn ConversationStore,
    pub model: &'a dyn LanguageModel,
    pub tools: &'a ToolRegistry,
    pub reporting: &'a ReportingClient,
    pub defaults: &'a GlobalDefaults,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),
    #[error("model call failed: {0}")]
    Model(anyhow::Error),
    #[error("tool-call loop exceeded limit of {limit} rounds")]
    ToolLoopExceeded { limit: u32 },
    #[error("conversation store failed: {0}")]
    Store(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: String,
    /// Tool-calling rounds it took to reach the answer.
    pub rounds: u32,
}

/// Answers one inbound message and records the exchange.
///
/// Only the user message and the final answer are persisted, together,
/// once the loop has finished. A failure anywhere leaves the store untouched;
/// tool side effects on the remote API are not undone.
pub async fn respond(ctx: AgentContext<'_>, conversation_id: Uuid, message: &str) -> Result<String, EngineError> {
    let conversation = ctx
        .store
        .get_conversation(conversation_id)
        .await
        .map_err(EngineError::Store)?
        .ok_or(EngineError::ConversationNotFound(conversation_id))?;
    let settings = resolve_effective_settings(ctx.defaults, &conversation.settings);

    let outcome = run_turn(ctx, &settings, message, &conversation.turns).await?;
    ctx.store
        .record_exchange(conversation_id, message, &outcome.answer)
        .await
        .map_err(EngineError::Store)?;
    metrics::counter!("assistant_turns_total").increment(1);
    info!(%conversation_id, rounds = outcome.rounds, "turn answered");
    Ok(outcome.answer)
}

/// Drives the model until it answers without requesting tools.
///
/// Interim rounds extend an in-memory copy of `history` only. With
/// `max_tool_rounds` unset the loop has no ceiling.
pub async fn run_turn(
    ctx: AgentContext<'_>,
    settings: &EffectiveSettings,
    message: &str,
    history: &[ChatTurn],
) -> Result<TurnOutcome, EngineError> {
    let preamble = build_preamble(Utc::now(), settings.default_window_days);
    let tools = ctx.tools.descriptors();
    let mut working: Vec<HistoryMessage> = history
        .iter()
        .map(|t| HistoryMessage { role: t.speaker(), message: t.message.clone().unwrap_or_default() })
        .collect();

    let mut response = call_model(ctx, settings, &preamble, &tools, &working, message, Vec::new()).await?;
    let mut rounds = 0;
    while !response.tool_calls.is_empty() {
        rounds += 1;
        if let Some(limit) = settings.max_tool_rounds {
            if rounds > limit {
                warn!(limit, "model kept requesting tools; giving up");
                return Err(EngineError::ToolLoopExceeded { limit });
            }
        }

        working.push(HistoryMessage { role: Speaker::User, message: message.to_string() });
        working.push(HistoryMessage { role: Speaker::Chatbot, message: response.text.clone() });

        debug!(round = rounds, calls = response.tool_calls.len(), "dispatching tool calls");
        let results = join_all(response.tool_calls.iter().map(|call| dispatch_tool(ctx, call))).await;
        response = call_model(ctx, settings, &preamble, &tools, &working, "", results).await?;
    }

    Ok(TurnOutcome { answer: response.text, rounds })
}

async fn call_model(
    ctx: AgentContext<'_>,
    settings: &EffectiveSettings,
    preamble: &str,
    tools: &[&'static ToolDescriptor],
    history: &[HistoryMessage],
    message: &str,
    tool_results: Vec<ToolCallResult>,
) -> Result<ChatResponse, EngineError> {
    let req = ChatRequest {
        model: settings.model.clone(),
        preamble: preamble.to_string(),
        message: message.to_string(),
        history: history.to_vec(),
        tools: tools.to_vec(),
        tool_results,
        temperature: settings.temperature,
    };
    metrics::counter!("assistant_model_calls_total").increment(1);
    ctx.model.chat(req).await.map_err(EngineError::Model)
}

/// Runs one requested call. Every failure, including an unknown tool name,
/// becomes an `{error}` output record so sibling calls and the turn go on.
pub async fn dispatch_tool(ctx: AgentContext<'_>, call: &ToolCallRequest) -> ToolCallResult {
    let started = Instant::now();
    let outcome = match ctx.tools.get(&call.name) {
        Some(tool) => tool.run(ToolContext { reporting: ctx.reporting }, call.parameters.clone()).await,
        None => Err(ToolError::UnknownTool(call.name.clone())),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let outputs = match outcome {
        Ok(outputs) => {
            info!(tool = %call.name, records = outputs.len(), elapsed_ms, "tool call ok");
            metrics::counter!("assistant_tool_calls_total", "tool" => call.name.clone(), "outcome" => "ok").increment(1);
            outputs
        }
        Err(err) => {
            warn!(tool = %call.name, elapsed_ms, error = %err, "tool call failed");
            metrics::counter!("assistant_tool_calls_total", "tool" => call.name.clone(), "outcome" => "error").increment(1);
            vec![json!({ "error": err.to_string() })]
        }
    };
    ToolCallResult { call: call.clone(), outputs }
}
