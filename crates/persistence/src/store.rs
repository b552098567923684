//! PostgreSQL implementation of the verification store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::models::{
    CompletionResult, JoinRequest, JoinRequestStatus, NewJoinAttempt, SessionCompletion,
    VerificationSession, VerificationStats,
};
use domain::services::{ApprovalClaim, StoreError, VerificationStore};
use sqlx::PgPool;

use crate::repositories::{JoinRequestRepository, VerificationSessionRepository};

/// PostgreSQL unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Maps sqlx errors onto store errors.
///
/// Unique violations on a token constraint are `DuplicateToken`; any other
/// unique violation is a racing pending request.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return match db_err.constraint() {
                Some(constraint) if constraint.contains("token") => StoreError::DuplicateToken,
                _ => StoreError::Conflict,
            };
        }
    }
    StoreError::Backend(err.to_string())
}

#[derive(Clone)]
pub struct PgVerificationStore {
    pool: PgPool,
    join_requests: JoinRequestRepository,
    sessions: VerificationSessionRepository,
}

impl PgVerificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            join_requests: JoinRequestRepository::new(pool.clone()),
            sessions: VerificationSessionRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl VerificationStore for PgVerificationStore {
    async fn create_join_attempt(
        &self,
        attempt: &NewJoinAttempt,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<JoinRequest, StoreError> {
        self.join_requests
            .create_or_refresh(attempt, token, now, expires_at)
            .await
            .map(Into::into)
            .map_err(map_sqlx_error)
    }

    async fn find_session(&self, token: &str) -> Result<Option<VerificationSession>, StoreError> {
        self.sessions
            .find_by_token(token)
            .await
            .map(|s| s.map(Into::into))
            .map_err(map_sqlx_error)
    }

    async fn find_join_request(&self, token: &str) -> Result<Option<JoinRequest>, StoreError> {
        self.join_requests
            .find_by_token(token)
            .await
            .map(|r| r.map(Into::into))
            .map_err(map_sqlx_error)
    }

    async fn complete_verification(
        &self,
        completion: SessionCompletion,
    ) -> Result<CompletionResult, StoreError> {
        if let Some(session) = self
            .sessions
            .complete(&completion)
            .await
            .map_err(map_sqlx_error)?
        {
            return Ok(CompletionResult::Completed(session.into()));
        }

        // Nothing transitioned; report why.
        let current = self.find_session(&completion.token).await?;
        Ok(match current {
            None => CompletionResult::NotFound,
            Some(s) if s.captcha_completed => CompletionResult::AlreadyCompleted,
            Some(_) => CompletionResult::Expired,
        })
    }

    async fn claim_for_approval(
        &self,
        token: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<ApprovalClaim, StoreError> {
        if let Some(entity) = self
            .join_requests
            .claim_for_approval(token, now, now - lease)
            .await
            .map_err(map_sqlx_error)?
        {
            return Ok(ApprovalClaim::Claimed(entity.into()));
        }

        Ok(match self.find_join_request(token).await? {
            None => ApprovalClaim::NotFound,
            Some(r) if r.status != JoinRequestStatus::Pending => ApprovalClaim::NotPending(r.status),
            Some(_) => ApprovalClaim::InFlight,
        })
    }

    async fn release_approval_claim(&self, token: &str) -> Result<(), StoreError> {
        self.join_requests
            .release_claim(token)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn mark_approved(
        &self,
        token: &str,
        actor_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.join_requests
            .mark_approved(token, actor_id, now)
            .await
            .map_err(map_sqlx_error)
    }

    async fn mark_rejected(
        &self,
        token: &str,
        actor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.join_requests
            .mark_rejected(token, actor_id, now)
            .await
            .map_err(map_sqlx_error)
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.join_requests
            .expire_overdue(now)
            .await
            .map_err(map_sqlx_error)
    }

    async fn stats(&self, chat_id: Option<i64>) -> Result<VerificationStats, StoreError> {
        let counts = self
            .join_requests
            .status_counts(chat_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(VerificationStats::from_counts(
            counts.pending,
            counts.approved,
            counts.rejected,
            counts.expired,
        ))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
