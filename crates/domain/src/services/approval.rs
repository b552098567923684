//! Auto-approval after a successful verification.

use std::sync::Arc;

use chrono::{Duration, Utc};
use shared::crypto::token_fingerprint;
use shared::markdown::escape_markdown_v2;

use super::chat_platform::{ChatPlatform, NotificationResult, PlatformError};
use super::store::{ApprovalClaim, VerificationStore};
use crate::models::{ApprovalFailure, ApprovalOutcome, JoinRequest, RequestOrigin};

/// Title used when the platform does not report one.
const FALLBACK_CHAT_TITLE: &str = "the group";

#[derive(Debug, Clone)]
pub struct ApprovalSettings {
    /// How long an approval claim blocks other callers.
    pub claim_lease: Duration,
    /// Whether to message the member after approval.
    pub send_welcome: bool,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            claim_lease: Duration::seconds(120),
            send_welcome: true,
        }
    }
}

/// Builds the MarkdownV2 welcome message for a chat.
pub fn welcome_message(chat_title: &str) -> String {
    format!(
        "🎉 *Verification passed\\!*\n\nYou have joined *{}*\\. Welcome\\!",
        escape_markdown_v2(chat_title)
    )
}

/// Relays approvals to the chat platform and records the result.
pub struct ApprovalOrchestrator {
    store: Arc<dyn VerificationStore>,
    platform: Arc<dyn ChatPlatform>,
    settings: ApprovalSettings,
}

impl ApprovalOrchestrator {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        platform: Arc<dyn ChatPlatform>,
        settings: ApprovalSettings,
    ) -> Self {
        Self {
            store,
            platform,
            settings,
        }
    }

    /// Approves the join request bound to `token`.
    ///
    /// At most one caller per token reaches the platform. A classified
    /// platform failure leaves the request pending.
    pub async fn auto_approve(&self, token: &str) -> ApprovalOutcome {
        let token_fp = token_fingerprint(token);

        let claim = self
            .store
            .claim_for_approval(token, Utc::now(), self.settings.claim_lease)
            .await;

        let request = match claim {
            Ok(ApprovalClaim::Claimed(request)) => request,
            Ok(ApprovalClaim::NotFound) => {
                tracing::warn!(token_fp = %token_fp, "No join request bound to token");
                return ApprovalOutcome::failed(ApprovalFailure::RequestNotFound);
            }
            Ok(ApprovalClaim::NotPending(status)) => {
                tracing::info!(token_fp = %token_fp, status = %status, "Join request already processed");
                return ApprovalOutcome::failed(ApprovalFailure::AlreadyProcessed);
            }
            Ok(ApprovalClaim::InFlight) => {
                tracing::info!(token_fp = %token_fp, "Approval already in flight");
                return ApprovalOutcome::failed(ApprovalFailure::AlreadyProcessed);
            }
            Err(e) => {
                tracing::error!(token_fp = %token_fp, error = %e, "Failed to claim join request");
                return ApprovalOutcome::failed(ApprovalFailure::Internal(
                    "failed to load join request".to_string(),
                ));
            }
        };

        if request.origin == RequestOrigin::Platform {
            if let Err(e) = self
                .platform
                .approve_join_request(request.chat_id, request.user_id)
                .await
            {
                let reason = e.classify();
                log_platform_failure(&token_fp, &request, &e, &reason);

                if let Err(release_err) = self.store.release_approval_claim(token).await {
                    tracing::warn!(
                        token_fp = %token_fp,
                        error = %release_err,
                        "Failed to release approval claim; it will lapse after the lease"
                    );
                }
                return ApprovalOutcome::failed(reason);
            }
        }

        match self.store.mark_approved(token, None, Utc::now()).await {
            Ok(true) => {
                tracing::info!(
                    token_fp = %token_fp,
                    user_id = request.user_id,
                    chat_id = request.chat_id,
                    origin = %request.origin,
                    "Join request approved"
                );
            }
            Ok(false) => {
                tracing::error!(
                    token_fp = %token_fp,
                    user_id = request.user_id,
                    chat_id = request.chat_id,
                    reconciliation_required = true,
                    "Approved upstream but join request was no longer pending locally"
                );
            }
            Err(e) => {
                tracing::error!(
                    token_fp = %token_fp,
                    user_id = request.user_id,
                    chat_id = request.chat_id,
                    error = %e,
                    reconciliation_required = true,
                    "Approved upstream but failed to record approval"
                );
            }
        }

        let welcome = self.send_welcome(&request).await;
        if let NotificationResult::Failed(reason) = &welcome {
            tracing::warn!(
                token_fp = %token_fp,
                user_id = request.user_id,
                reason = %reason,
                "Welcome message not delivered"
            );
        }

        ApprovalOutcome::approved()
    }

    /// Sends the welcome message. Never fails the approval.
    pub async fn send_welcome(&self, request: &JoinRequest) -> NotificationResult {
        if !self.settings.send_welcome || request.origin != RequestOrigin::Platform {
            return NotificationResult::Skipped;
        }

        let title = match self.platform.get_chat_info(request.chat_id).await {
            Ok(info) => info.title.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                tracing::debug!(chat_id = request.chat_id, error = %e, "Could not fetch chat title");
                None
            }
        };
        let text = welcome_message(title.as_deref().unwrap_or(FALLBACK_CHAT_TITLE));

        match self
            .platform
            .send_direct_message(request.user_id, &text)
            .await
        {
            Ok(()) => NotificationResult::Sent,
            Err(e) => NotificationResult::Failed(e.to_string()),
        }
    }
}

/// Severity for a failed approval call.
fn platform_failure_level(error: &PlatformError, reason: &ApprovalFailure) -> tracing::Level {
    if error.is_transport() || reason.is_configuration_problem() {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    }
}

fn log_platform_failure(
    token_fp: &str,
    request: &JoinRequest,
    error: &PlatformError,
    reason: &ApprovalFailure,
) {
    if platform_failure_level(error, reason) == tracing::Level::WARN {
        tracing::warn!(
            token_fp = %token_fp,
            user_id = request.user_id,
            chat_id = request.chat_id,
            reason = reason.as_str(),
            detail = %reason,
            "Platform refused join request approval"
        );
    } else if error.is_transport() {
        tracing::error!(
            token_fp = %token_fp,
            user_id = request.user_id,
            chat_id = request.chat_id,
            error = %error,
            transport = true,
            "Chat platform unreachable during join request approval"
        );
    } else {
        tracing::error!(
            token_fp = %token_fp,
            user_id = request.user_id,
            chat_id = request.chat_id,
            reason = reason.as_str(),
            configuration_problem = true,
            "Bot cannot approve join requests in this chat; check its membership and admin rights"
        );
    }
}
