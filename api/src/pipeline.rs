//! Request governance: validation, identity, access, generation and the
//! bounded leak-correction protocol.
//!
//! ```text
//! INITIAL_REPLY --clean--------------------------------------------> FINAL
//! INITIAL_REPLY --leak--> REWRITE_ATTEMPT --clean------------------> FINAL
//!                         REWRITE_ATTEMPT --leak | call failed--> FALLBACK_TEMPLATE --> FINAL
//! ```

use std::sync::Arc;

use tutorgate_core::access::AccessPolicy;
use tutorgate_core::context::TutoringContext;
use tutorgate_core::disclosure::{DisclosurePolicy, SAFE_HINT_FALLBACK};
use tutorgate_core::exchange::ChatMessage;
use tutorgate_core::prompt;
use tutorgate_core::request::{Action, RawTutoringRequest, normalize};
use tutorgate_core::sanitize::sanitize;

use crate::completion::{CompletionClient, CompletionError};
use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::verification::{Identity, VerificationService, token_fingerprint};

/// How far the disclosure protocol went for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeakStage {
    /// Disclosure was permitted; the detector did not run.
    NotEvaluated,
    /// The primary reply passed the detector.
    Clean,
    /// A rewrite removed the leak.
    Rewritten,
    /// The fixed safe hint replaced the reply.
    Fallback,
}

impl LeakStage {
    pub fn as_str(self) -> &'static str {
        match self {
            LeakStage::NotEvaluated => "not_evaluated",
            LeakStage::Clean => "clean",
            LeakStage::Rewritten => "rewritten",
            LeakStage::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorOutcome {
    pub reply: String,
    pub effective_action: Action,
    pub leak_stage: LeakStage,
    pub provider_calls: u8,
}

pub struct TutorPipeline {
    completion: Arc<dyn CompletionClient>,
    verifier: Arc<dyn VerificationService>,
    access: AccessPolicy,
    disclosure: Arc<dyn DisclosurePolicy>,
    config: PipelineConfig,
}

impl TutorPipeline {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        verifier: Arc<dyn VerificationService>,
        disclosure: Arc<dyn DisclosurePolicy>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            completion,
            verifier,
            access: AccessPolicy,
            disclosure,
            config,
        }
    }

    pub async fn run(
        &self,
        raw: RawTutoringRequest,
        session_token: Option<&str>,
    ) -> Result<TutorOutcome, AppError> {
        let request = normalize(raw)?;

        let identity = match session_token {
            Some(token) => {
                let identity = self.resolve_identity(token).await;
                tracing::debug!(
                    token = %token_fingerprint(token),
                    verified = identity.verified,
                    teacher = identity.teacher,
                    "resolved caller identity"
                );
                identity
            }
            None => Default::default(),
        };

        let ctx = TutoringContext::build(request.with_auth(identity.auth_context()));
        if ctx.intent_overridden() {
            tracing::info!(
                requested_action = ctx.requested_action.as_str(),
                effective_action = ctx.effective_action.as_str(),
                "intent override"
            );
        }

        if let Err(denied) = self.access.authorize(&ctx) {
            tracing::warn!(
                role = ctx.role.as_str(),
                effective_action = ctx.effective_action.as_str(),
                verified = ctx.auth.verified,
                teacher_licensed = ctx.auth.teacher_licensed,
                decision = "deny",
                reason = denied.code(),
                "access decision"
            );
            return Err(denied.into());
        }
        tracing::debug!(
            role = ctx.role.as_str(),
            effective_action = ctx.effective_action.as_str(),
            decision = "allow",
            "access decision"
        );

        let composed = prompt::compose(&ctx);
        let primary = sanitize(&self.call(&composed.messages()).await?);
        if primary.is_empty() {
            return Err(CompletionError::Empty.into());
        }

        let outcome = if self.disclosure.withholds_final_answer(&ctx) {
            self.enforce_disclosure(&composed.system, primary, ctx.effective_action)
                .await
        } else {
            TutorOutcome {
                reply: primary,
                effective_action: ctx.effective_action,
                leak_stage: LeakStage::NotEvaluated,
                provider_calls: 1,
            }
        };

        tracing::info!(
            role = ctx.role.as_str(),
            effective_action = outcome.effective_action.as_str(),
            attempt = ctx.attempt,
            has_image = ctx.has_image,
            leak_stage = outcome.leak_stage.as_str(),
            provider_calls = outcome.provider_calls,
            "tutoring reply ready"
        );
        Ok(outcome)
    }

    async fn enforce_disclosure(
        &self,
        system: &str,
        primary: String,
        effective_action: Action,
    ) -> TutorOutcome {
        let mut provider_calls = 1;
        if !self.disclosure.is_leak(&primary) {
            return TutorOutcome {
                reply: primary,
                effective_action,
                leak_stage: LeakStage::Clean,
                provider_calls,
            };
        }

        let mut current = primary;
        for round in 1..=self.config.rewrite_rounds {
            tracing::info!(round, "leak detected, requesting rewrite");
            provider_calls += 1;
            match self.call(&prompt::rewrite_messages(system, &current)).await {
                Ok(raw) => {
                    let rewritten = sanitize(&raw);
                    if !rewritten.is_empty() && !self.disclosure.is_leak(&rewritten) {
                        return TutorOutcome {
                            reply: rewritten,
                            effective_action,
                            leak_stage: LeakStage::Rewritten,
                            provider_calls,
                        };
                    }
                    tracing::warn!(round, "rewrite still reveals the answer");
                    if !rewritten.is_empty() {
                        current = rewritten;
                    }
                }
                Err(err) => {
                    tracing::warn!(round, error = %err, "rewrite call failed");
                    break;
                }
            }
        }

        TutorOutcome {
            reply: SAFE_HINT_FALLBACK.to_string(),
            effective_action,
            leak_stage: LeakStage::Fallback,
            provider_calls,
        }
    }

    /// Identity lookup under the same deadline as provider calls. A lookup
    /// that never answers leaves the caller unverified.
    async fn resolve_identity(&self, token: &str) -> Identity {
        match tokio::time::timeout(self.config.call_timeout, self.verifier.resolve(token)).await {
            Ok(identity) => identity,
            Err(_) => {
                tracing::warn!(
                    token = %token_fingerprint(token),
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "verification lookup timed out, treating caller as unverified"
                );
                Identity::default()
            }
        }
    }

    async fn call(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        match tokio::time::timeout(self.config.call_timeout, self.completion.complete(messages))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.call_timeout.as_millis() as u64,
                    "model provider call timed out"
                );
                Err(CompletionError::Timeout)
            }
        }
    }
}
