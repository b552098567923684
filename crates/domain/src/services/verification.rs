//! Completes a verification session and hands off to approval.

use std::sync::Arc;

use chrono::Utc;
use shared::crypto::token_fingerprint;

use super::approval::ApprovalOrchestrator;
use super::captcha::CaptchaVerifier;
use super::store::{StoreError, VerificationStore};
use crate::models::{ApprovalOutcome, CompletionResult, SessionCompletion, VerificationSession};

/// Why a verification submission was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("Verification session not found")]
    SessionNotFound,

    #[error("Verification session has expired")]
    SessionExpired,

    #[error("Verification already completed")]
    AlreadyCompleted,

    /// The provider rejected the response. Retryable until the session expires.
    #[error("CAPTCHA rejected: {code}")]
    CaptchaRejected { code: String, message: String },

    /// The provider could not be reached.
    #[error("CAPTCHA provider unavailable: {code}")]
    CaptchaUnavailable { code: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A challenge response submitted for a token.
#[derive(Debug, Clone)]
pub struct VerificationSubmission {
    pub token: String,
    pub captcha_response: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Successful verification and the result of the approval that followed it.
#[derive(Debug, Clone)]
pub struct ApprovalAttempted {
    pub session: VerificationSession,
    pub approval: ApprovalOutcome,
}

pub struct VerificationOrchestrator {
    store: Arc<dyn VerificationStore>,
    verifier: Arc<dyn CaptchaVerifier>,
    approval: Arc<ApprovalOrchestrator>,
}

impl VerificationOrchestrator {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        verifier: Arc<dyn CaptchaVerifier>,
        approval: Arc<ApprovalOrchestrator>,
    ) -> Self {
        Self {
            store,
            verifier,
            approval,
        }
    }

    /// Verifies a challenge response and, on success, triggers approval.
    ///
    /// Of several concurrent successful submissions for one token, exactly
    /// one completes the session; the rest get `AlreadyCompleted`. An approval
    /// failure never undoes the completed verification.
    pub async fn complete_verification(
        &self,
        submission: VerificationSubmission,
    ) -> Result<ApprovalAttempted, VerificationError> {
        let token_fp = token_fingerprint(&submission.token);

        let session = self
            .store
            .find_session(&submission.token)
            .await
            .map_err(|e| internal(&token_fp, "load session", e))?
            .ok_or(VerificationError::SessionNotFound)?;

        if session.is_expired_at(Utc::now()) {
            tracing::info!(token_fp = %token_fp, "Verification attempted on expired session");
            return Err(VerificationError::SessionExpired);
        }
        if session.captcha_completed {
            return Err(VerificationError::AlreadyCompleted);
        }

        let outcome = self
            .verifier
            .verify(
                &submission.captcha_response,
                submission.client_ip.as_deref(),
                submission.user_agent.as_deref(),
            )
            .await
            .map_err(|e| {
                tracing::error!(
                    token_fp = %token_fp,
                    provider = self.verifier.provider_name(),
                    error = %e,
                    "CAPTCHA verification failed unexpectedly"
                );
                VerificationError::Internal("verification could not be completed".to_string())
            })?;

        if !outcome.success {
            let code = outcome
                .error_code
                .clone()
                .unwrap_or_else(|| crate::models::captcha::UNKNOWN_ERROR.to_string());
            if outcome.is_transport_failure() {
                tracing::error!(
                    token_fp = %token_fp,
                    provider = self.verifier.provider_name(),
                    error_code = %code,
                    "CAPTCHA provider unreachable"
                );
                return Err(VerificationError::CaptchaUnavailable {
                    code,
                    message: outcome.human_message,
                });
            }
            tracing::warn!(
                token_fp = %token_fp,
                provider = self.verifier.provider_name(),
                error_code = %code,
                "CAPTCHA response rejected"
            );
            return Err(VerificationError::CaptchaRejected {
                code,
                message: outcome.human_message,
            });
        }

        let completion = SessionCompletion {
            token: submission.token.clone(),
            captcha_response: submission.captcha_response,
            ip_address: submission.client_ip,
            user_agent: submission.user_agent,
            completed_at: Utc::now(),
        };

        let session = match self
            .store
            .complete_verification(completion)
            .await
            .map_err(|e| internal(&token_fp, "complete session", e))?
        {
            CompletionResult::Completed(session) => session,
            CompletionResult::AlreadyCompleted => return Err(VerificationError::AlreadyCompleted),
            CompletionResult::Expired => return Err(VerificationError::SessionExpired),
            CompletionResult::NotFound => return Err(VerificationError::SessionNotFound),
        };

        tracing::info!(
            token_fp = %token_fp,
            user_id = session.user_id,
            chat_id = session.chat_id,
            "Verification completed"
        );

        let approval = self.approval.auto_approve(&submission.token).await;

        Ok(ApprovalAttempted { session, approval })
    }
}

fn internal(token_fp: &str, action: &str, err: StoreError) -> VerificationError {
    tracing::error!(token_fp = %token_fp, action, error = %err, "Verification store failure");
    VerificationError::Internal("verification could not be completed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApprovalFailure, CaptchaVerificationOutcome, DisplayName, JoinRequestStatus,
        NewJoinAttempt, RequestOrigin,
    };
    use crate::services::approval::ApprovalSettings;
    use crate::services::captcha::MockCaptchaVerifier;
    use crate::services::chat_platform::{MockChatPlatform, PlatformError};
    use crate::services::store::InMemoryVerificationStore;
    use chrono::Duration;

    struct Harness {
        store: Arc<InMemoryVerificationStore>,
        platform: Arc<MockChatPlatform>,
        verifier: Arc<MockCaptchaVerifier>,
        orchestrator: Arc<VerificationOrchestrator>,
    }

    fn harness(verifier: MockCaptchaVerifier, platform: MockChatPlatform) -> Harness {
        let store = Arc::new(InMemoryVerificationStore::new());
        let platform = Arc::new(platform);
        let verifier = Arc::new(verifier);
        let approval = Arc::new(ApprovalOrchestrator::new(
            store.clone(),
            platform.clone(),
            ApprovalSettings::default(),
        ));
        let orchestrator = Arc::new(VerificationOrchestrator::new(
            store.clone(),
            verifier.clone(),
            approval,
        ));
        Harness {
            store,
            platform,
            verifier,
            orchestrator,
        }
    }

    async fn issue(store: &InMemoryVerificationStore, ttl: Duration) -> String {
        let token = shared::crypto::generate_verification_token();
        let now = Utc::now();
        store
            .create_join_attempt(
                &NewJoinAttempt {
                    user_id: 42,
                    chat_id: 100,
                    display_name: DisplayName::default(),
                    origin: RequestOrigin::Platform,
                },
                &token,
                now,
                now + ttl,
            )
            .await
            .unwrap();
        token
    }

    fn submission(token: &str) -> VerificationSubmission {
        VerificationSubmission {
            token: token.to_string(),
            captcha_response: "P1_response".to_string(),
            client_ip: Some("203.0.113.7".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
        }
    }

    #[tokio::test]
    async fn test_happy_path_approves() {
        let h = harness(MockCaptchaVerifier::accepting(), MockChatPlatform::new());
        let token = issue(&h.store, Duration::seconds(600)).await;

        let result = h
            .orchestrator
            .complete_verification(submission(&token))
            .await
            .unwrap();

        assert!(result.approval.success);
        assert!(result.session.captcha_completed);
        assert_eq!(result.session.ip_address.as_deref(), Some("203.0.113.7"));

        let session = h.store.find_session(&token).await.unwrap().unwrap();
        assert!(session.captcha_completed);
        assert!(session.completed_time.is_some());
        assert_eq!(session.captcha_response.as_deref(), Some("P1_response"));

        let request = h.store.find_join_request(&token).await.unwrap().unwrap();
        assert_eq!(request.status, JoinRequestStatus::Approved);
        assert!(request.verification_completed);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let h = harness(MockCaptchaVerifier::accepting(), MockChatPlatform::new());
        let err = h
            .orchestrator
            .complete_verification(submission("nope"))
            .await
            .unwrap_err();
        assert_eq!(err, VerificationError::SessionNotFound);
        assert_eq!(h.verifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_session_skips_provider() {
        let h = harness(MockCaptchaVerifier::accepting(), MockChatPlatform::new());
        let token = issue(&h.store, Duration::seconds(-1)).await;

        let err = h
            .orchestrator
            .complete_verification(submission(&token))
            .await
            .unwrap_err();

        assert_eq!(err, VerificationError::SessionExpired);
        assert_eq!(h.verifier.calls(), 0);
        assert_eq!(h.platform.approve_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejection_is_retryable() {
        let verifier = MockCaptchaVerifier::scripted(
            vec![CaptchaVerificationOutcome::rejected(
                "timeout-or-duplicate",
                "The response expired or was already used",
                serde_json::Value::Null,
            )],
            CaptchaVerificationOutcome::accepted(serde_json::Value::Null),
        );
        let h = harness(verifier, MockChatPlatform::new());
        let token = issue(&h.store, Duration::seconds(600)).await;

        let err = h
            .orchestrator
            .complete_verification(submission(&token))
            .await
            .unwrap_err();
        match err {
            VerificationError::CaptchaRejected { code, .. } => {
                assert_eq!(code, "timeout-or-duplicate")
            }
            other => panic!("unexpected error {:?}", other),
        }
        let session = h.store.find_session(&token).await.unwrap().unwrap();
        assert!(!session.captcha_completed);

        let result = h
            .orchestrator
            .complete_verification(submission(&token))
            .await
            .unwrap();
        assert!(result.approval.success);
    }

    #[tokio::test]
    async fn test_transport_failure_is_unavailable() {
        let verifier = MockCaptchaVerifier::scripted(
            Vec::new(),
            CaptchaVerificationOutcome::network_error(),
        );
        let h = harness(verifier, MockChatPlatform::new());
        let token = issue(&h.store, Duration::seconds(600)).await;

        let err = h
            .orchestrator
            .complete_verification(submission(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::CaptchaUnavailable { ref code, .. } if code == "network-error"));
    }

    #[tokio::test]
    async fn test_second_submission_is_already_completed() {
        let h = harness(MockCaptchaVerifier::accepting(), MockChatPlatform::new());
        let token = issue(&h.store, Duration::seconds(600)).await;

        h.orchestrator
            .complete_verification(submission(&token))
            .await
            .unwrap();
        let err = h
            .orchestrator
            .complete_verification(submission(&token))
            .await
            .unwrap_err();

        assert_eq!(err, VerificationError::AlreadyCompleted);
        assert_eq!(h.platform.approve_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_approve_once() {
        let h = harness(MockCaptchaVerifier::accepting(), MockChatPlatform::new());
        let token = issue(&h.store, Duration::seconds(600)).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let orchestrator = h.orchestrator.clone();
                let sub = submission(&token);
                tokio::spawn(async move { orchestrator.complete_verification(sub).await })
            })
            .collect();

        let mut successes = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert_eq!(e, VerificationError::AlreadyCompleted),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(h.platform.approve_calls(), 1);
    }

    #[tokio::test]
    async fn test_approval_failure_keeps_verification() {
        let platform = MockChatPlatform::failing_approval(PlatformError::Rejected {
            code: Some(400),
            description: "Bad Request: CHAT_ADMIN_REQUIRED".into(),
        });
        let h = harness(MockCaptchaVerifier::accepting(), platform);
        let token = issue(&h.store, Duration::seconds(600)).await;

        let result = h
            .orchestrator
            .complete_verification(submission(&token))
            .await
            .unwrap();

        assert_eq!(
            result.approval.failure_reason,
            Some(ApprovalFailure::InsufficientPermissions)
        );
        let session = h.store.find_session(&token).await.unwrap().unwrap();
        assert!(session.captcha_completed);
        let request = h.store.find_join_request(&token).await.unwrap().unwrap();
        assert_eq!(request.status, JoinRequestStatus::Pending);
        assert!(request.verification_completed);
    }
}
