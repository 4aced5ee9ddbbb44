//! The per-message dispatch cycle: resolve tenant, guard the session, run
//! the bounded LLM/tool loop, persist the reply.
//!
//! Concurrency model: any number of turns run in parallel across customers
//! and tenants, but a per-session async mutex serialises turns for one
//! customer, so two quick messages can never race the same cart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use plaza_core::config::EngineConfig;
use plaza_core::types::{Platform, SenderKind};
use plaza_identity::types::ADDON_BASE_BOT;
use tracing::{debug, info, warn};

use crate::context::{Stores, ToolContext};
use crate::error::Result;
use crate::prompt::build_system_prompt;
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall};
use crate::tools::{build_toolset, to_definitions, Tool, ToolOutcome};

const MAX_REPLY_TOKENS: u32 = 1024;
/// One bounded retry for transient provider failures.
const PROVIDER_RETRY_DELAY: Duration = Duration::from_millis(300);

const APOLOGY_FALLBACK: &str =
    "Sorry, something went wrong on our side. Could you try that again in a moment?";
const APOLOGY_TOOL_CAP: &str =
    "Sorry, I couldn't finish that request. Could you rephrase or try again?";

/// A webhook-delivered customer message, already channel-normalised.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub platform: Platform,
    /// The platform's page/phone id identifying the tenant integration.
    pub tenant_external_id: String,
    pub customer_phone: String,
    pub text: String,
    /// Language the transport detected on the message, if any.
    pub language: Option<String>,
}

/// What one turn produced. `reply: None` means the engine stayed silent
/// (human-locked session or disabled tenant); the caller sends nothing.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: String,
    pub business_id: String,
    pub owner_id: String,
    pub reply: Option<String>,
}

pub struct Engine {
    provider: Arc<dyn LlmProvider>,
    stores: Stores,
    config: EngineConfig,
    model: String,
    /// Per-session turn locks; entries live for the process lifetime.
    session_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl Engine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        stores: Stores,
        config: EngineConfig,
        model: String,
    ) -> Self {
        Self {
            provider,
            stores,
            config,
            model,
            session_locks: DashMap::new(),
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Process one inbound customer message end to end.
    pub async fn handle_inbound(&self, inbound: InboundMessage) -> Result<TurnOutcome> {
        let tenant = self
            .stores
            .identity
            .resolve_inbound(inbound.platform, &inbound.tenant_external_id)?;
        let business_id = tenant.business_id().to_string();
        let owner_id = tenant.owner_id().to_string();

        let session = self.stores.sessions.get_or_create(
            &business_id,
            &inbound.customer_phone,
            inbound.platform,
        )?;

        // FIFO per session: turns for the same customer never interleave.
        let lock = self
            .session_locks
            .entry(session.id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Snapshot the history before logging the new message so the prompt
        // does not carry the current text twice.
        let prior_history = self.history_messages(&session.id);

        // The customer message is always logged, even when the bot stays quiet.
        self.stores
            .sessions
            .append_message(&session.id, SenderKind::Customer, &inbound.text)?;

        // Tenant master switch: an inactive base_bot silences the engine.
        if !self
            .stores
            .addons
            .is_active(&business_id, ADDON_BASE_BOT)
            .unwrap_or(false)
        {
            debug!(business = %business_id, "base_bot inactive; message logged only");
            return Ok(TurnOutcome {
                session_id: session.id,
                business_id,
                owner_id,
                reply: None,
            });
        }

        if let Some(lang) = &inbound.language {
            self.stores.sessions.set_language_hint(&session.id, lang)?;
        }

        // Human has the conversation: log and stay silent.
        let session = self
            .stores
            .sessions
            .get(&session.id)?
            .ok_or_else(|| plaza_sessions::SessionError::NotFound(session.id.clone()))?;
        if session.is_locked() {
            debug!(session = %session.id, "session human-locked; no tool dispatch");
            return Ok(TurnOutcome {
                session_id: session.id,
                business_id,
                owner_id,
                reply: None,
            });
        }

        let deadline = Instant::now() + Duration::from_secs(self.config.turn_timeout_secs);
        let tz_offset = tenant
            .business
            .tz_offset_minutes
            .unwrap_or(self.config.default_tz_offset_minutes);
        let cancel_hours = tenant
            .business
            .default_cancel_hours
            .unwrap_or(plaza_core::config::DEFAULT_CANCEL_HOURS);
        let ctx = ToolContext::new(
            tenant,
            inbound.customer_phone.clone(),
            inbound.platform,
            session.id.clone(),
            session.language_hint.clone(),
            self.stores.clone(),
            tz_offset,
            cancel_hours,
            deadline,
        );

        let reply = self.run_tool_loop(&ctx, prior_history, &inbound.text).await;

        self.stores
            .sessions
            .append_message(&session.id, SenderKind::Bot, &reply)?;

        Ok(TurnOutcome {
            session_id: session.id,
            business_id,
            owner_id,
            reply: Some(reply),
        })
    }

    /// The bounded LLM/tool exchange. Always produces user-facing text; every
    /// failure path degrades to an apology rather than an error.
    async fn run_tool_loop(
        &self,
        ctx: &ToolContext,
        prior_history: Vec<serde_json::Value>,
        user_text: &str,
    ) -> String {
        let tools = build_toolset(ctx);
        let definitions = to_definitions(&tools);
        let cart = ctx.stores.carts.snapshot(&ctx.cart_key()).ok().flatten();
        let system = build_system_prompt(ctx, cart.as_ref());

        let mut raw_messages = prior_history;
        raw_messages.push(serde_json::json!({ "role": "user", "content": user_text }));

        for round in 0..self.config.max_tool_rounds {
            if ctx.deadline_exceeded() {
                warn!(session = %ctx.session_id, round, "turn deadline exceeded");
                return APOLOGY_FALLBACK.to_string();
            }

            let request = ChatRequest {
                model: self.model.clone(),
                system: system.clone(),
                messages: Vec::new(),
                max_tokens: MAX_REPLY_TOKENS,
                tools: definitions.clone(),
                raw_messages: Some(raw_messages.clone()),
            };

            let response = match self.complete_with_retry(&request).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(session = %ctx.session_id, error = %e, "LLM call failed");
                    return APOLOGY_FALLBACK.to_string();
                }
            };

            if response.tool_calls.is_empty() {
                debug!(session = %ctx.session_id, round, "turn complete");
                return if response.content.trim().is_empty() {
                    APOLOGY_TOOL_CAP.to_string()
                } else {
                    response.content
                };
            }

            raw_messages.push(assistant_turn(&response));

            let mut results = Vec::with_capacity(response.tool_calls.len());
            for call in &response.tool_calls {
                let outcome = self.execute_call(ctx, &tools, call).await;
                self.log_tool_call(ctx, call, &outcome);
                results.push(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": outcome.to_json(),
                    "is_error": !outcome.success,
                }));
            }
            raw_messages.push(serde_json::json!({ "role": "user", "content": results }));
        }

        warn!(
            session = %ctx.session_id,
            cap = self.config.max_tool_rounds,
            "tool loop hit the round cap"
        );
        APOLOGY_TOOL_CAP.to_string()
    }

    /// Execute one tool call with the dispatch-level guards: known tool,
    /// turn deadline, and the validator-before-mutation ordering.
    async fn execute_call(
        &self,
        ctx: &ToolContext,
        tools: &[Box<dyn Tool>],
        call: &ToolCall,
    ) -> ToolOutcome {
        let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
            return ToolOutcome::error("UNKNOWN_TOOL", format!("unknown tool: {}", call.name));
        };
        if ctx.deadline_exceeded() {
            return ToolOutcome::error("TIMEOUT", "The request ran out of time");
        }
        if let Some(validator) = tool.required_validator() {
            if !ctx.validation_passed(validator) {
                return ToolOutcome::error(
                    "PRECONDITION_MISSING",
                    format!("run {validator} first in this turn, and it must pass"),
                );
            }
        }
        debug!(tool = %call.name, session = %ctx.session_id, "executing tool");
        tool.execute(call.input.clone(), ctx).await
    }

    async fn complete_with_retry(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ChatResponse, ProviderError> {
        match self.provider.complete(request).await {
            Ok(r) => Ok(r),
            Err(e) if e.is_transient() => {
                info!(error = %e, "transient provider error; retrying once");
                tokio::time::sleep(PROVIDER_RETRY_DELAY).await;
                self.provider.complete(request).await
            }
            Err(e) => Err(e),
        }
    }

    /// Recent customer/bot exchange replayed as plain alternating messages.
    fn history_messages(&self, session_id: &str) -> Vec<serde_json::Value> {
        let history = self
            .stores
            .sessions
            .history(session_id, self.config.history_turns)
            .unwrap_or_default();
        history
            .iter()
            .filter_map(|m| match m.sender {
                SenderKind::Customer => {
                    Some(serde_json::json!({ "role": "user", "content": m.content }))
                }
                SenderKind::Bot => {
                    Some(serde_json::json!({ "role": "assistant", "content": m.content }))
                }
                // System/employee notes are not part of the LLM exchange.
                _ => None,
            })
            .collect()
    }

    /// Audit trail: every tool call lands in the session log as a system row.
    fn log_tool_call(&self, ctx: &ToolContext, call: &ToolCall, outcome: &ToolOutcome) {
        let summary = if outcome.success {
            format!("[tool] {} ok", call.name)
        } else {
            format!(
                "[tool] {} failed ({})",
                call.name,
                outcome.error_code.as_deref().unwrap_or("ERROR")
            )
        };
        if let Err(e) =
            self.stores
                .sessions
                .append_message(&ctx.session_id, SenderKind::System, &summary)
        {
            warn!(session = %ctx.session_id, error = %e, "could not log tool call");
        }
    }
}

fn assistant_turn(response: &ChatResponse) -> serde_json::Value {
    let mut content: Vec<serde_json::Value> = Vec::new();
    if !response.content.is_empty() {
        content.push(serde_json::json!({ "type": "text", "text": response.content }));
    }
    for call in &response.tool_calls {
        content.push(serde_json::json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.input,
        }));
    }
    serde_json::json!({ "role": "assistant", "content": content })
}
