//! Join attempt intake and status queries.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use shared::crypto::{generate_verification_token, token_fingerprint};

use super::store::{StoreError, VerificationStore};
use crate::models::{JoinRequest, NewJoinAttempt, VerificationStats, VerificationStatus};

/// A freshly issued token and the join request it is bound to.
#[derive(Debug, Clone)]
pub struct IssuedVerification {
    pub join_request: JoinRequest,
    pub expires_at: DateTime<Utc>,
}

impl IssuedVerification {
    pub fn token(&self) -> &str {
        &self.join_request.verification_token
    }
}

pub struct JoinAttemptService {
    store: Arc<dyn VerificationStore>,
    ttl: Duration,
}

impl JoinAttemptService {
    /// `ttl` is the session lifetime. Non-positive values issue sessions that
    /// are already expired, which tests rely on.
    pub fn new(store: Arc<dyn VerificationStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a new token for `(user_id, chat_id)`.
    ///
    /// A pending request for the same pair is reused and its previous
    /// session invalidated.
    pub async fn create_join_attempt(
        &self,
        attempt: NewJoinAttempt,
    ) -> Result<IssuedVerification, StoreError> {
        self.create_with_ttl(attempt, self.ttl).await
    }

    /// Like [`create_join_attempt`](Self::create_join_attempt) with an explicit lifetime.
    pub async fn create_with_ttl(
        &self,
        attempt: NewJoinAttempt,
        ttl: Duration,
    ) -> Result<IssuedVerification, StoreError> {
        let token = generate_verification_token();
        let now = Utc::now();
        let expires_at = now + ttl;

        let join_request = self
            .store
            .create_join_attempt(&attempt, &token, now, expires_at)
            .await?;

        tracing::info!(
            token_fp = %token_fingerprint(&token),
            user_id = attempt.user_id,
            chat_id = attempt.chat_id,
            origin = %attempt.origin,
            request_id = join_request.id,
            "Verification session issued"
        );

        Ok(IssuedVerification {
            join_request,
            expires_at,
        })
    }

    /// Returns the public state of a token, or `None` if it was never issued.
    pub async fn query_status(
        &self,
        token: &str,
    ) -> Result<Option<VerificationStatus>, StoreError> {
        let session = match self.store.find_session(token).await? {
            Some(session) => session,
            None => return Ok(None),
        };
        let status = self
            .store
            .find_join_request(token)
            .await?
            .map(|r| r.status);
        Ok(Some(VerificationStatus::from_session(
            &session,
            status,
            Utc::now(),
        )))
    }

    /// Administrative rejection of a pending request.
    pub async fn reject(&self, token: &str, admin_id: i64) -> Result<bool, StoreError> {
        let rejected = self.store.mark_rejected(token, admin_id, Utc::now()).await?;
        if rejected {
            tracing::info!(
                token_fp = %token_fingerprint(token),
                admin_id,
                "Join request rejected by admin"
            );
        }
        Ok(rejected)
    }

    pub async fn stats(&self, chat_id: Option<i64>) -> Result<VerificationStats, StoreError> {
        self.store.stats(chat_id).await
    }
}
