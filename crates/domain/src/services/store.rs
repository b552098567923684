//! Persistence seam for join requests and verification sessions.
//!
//! Every state transition the orchestrators depend on is a single call here,
//! so implementations can make each one atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::models::{
    CompletionResult, JoinRequest, JoinRequestStatus, NewJoinAttempt, SessionCompletion,
    VerificationSession, VerificationStats,
};

/// Store-level failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Verification token already exists")]
    DuplicateToken,

    #[error("Conflicting pending join request")]
    Conflict,

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Result of trying to take the approval claim on a join request.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalClaim {
    /// This caller holds the claim and may call the platform.
    Claimed(JoinRequest),
    NotFound,
    NotPending(JoinRequestStatus),
    /// Another caller holds an unexpired claim.
    InFlight,
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Creates a pending join request and its session, or refreshes the
    /// existing pending request for the same `(user_id, chat_id)`.
    ///
    /// On refresh the token is replaced, `verification_completed` is reset and
    /// the superseded session's deadline is moved into the past.
    async fn create_join_attempt(
        &self,
        attempt: &NewJoinAttempt,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<JoinRequest, StoreError>;

    async fn find_session(&self, token: &str) -> Result<Option<VerificationSession>, StoreError>;

    async fn find_join_request(&self, token: &str) -> Result<Option<JoinRequest>, StoreError>;

    /// Marks the session completed and flags its join request, only if the
    /// session is still uncompleted and unexpired at `completed_at`.
    async fn complete_verification(
        &self,
        completion: SessionCompletion,
    ) -> Result<CompletionResult, StoreError>;

    /// Claims a pending join request for a platform approval call. A claim
    /// older than `lease` may be taken over.
    async fn claim_for_approval(
        &self,
        token: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<ApprovalClaim, StoreError>;

    /// Drops a claim so the request stays pending and can be retried.
    async fn release_approval_claim(&self, token: &str) -> Result<(), StoreError>;

    /// Moves a pending request to `approved`. Returns false if it was not pending.
    async fn mark_approved(
        &self,
        token: &str,
        actor_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Moves a pending request to `rejected`. Returns false if it was not pending.
    async fn mark_rejected(
        &self,
        token: &str,
        actor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Expires pending requests whose current session is overdue and
    /// uncompleted. Returns the number of requests transitioned.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn stats(&self, chat_id: Option<i64>) -> Result<VerificationStats, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    next_request_id: i64,
    next_session_id: i64,
    requests: HashMap<i64, StoredRequest>,
    sessions: HashMap<String, VerificationSession>,
}

#[derive(Debug, Clone)]
struct StoredRequest {
    request: JoinRequest,
    claimed_at: Option<DateTime<Utc>>,
}

impl MemoryState {
    fn request_by_token(&mut self, token: &str) -> Option<&mut StoredRequest> {
        self.requests
            .values_mut()
            .find(|r| r.request.verification_token == token)
    }
}

/// Store backed by process memory.
///
/// Used by tests and local development. A single lock serializes every call,
/// which gives the same per-call atomicity as the PostgreSQL store.
#[derive(Debug, Default)]
pub struct InMemoryVerificationStore {
    state: Mutex<MemoryState>,
}

impl InMemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerificationStore for InMemoryVerificationStore {
    async fn create_join_attempt(
        &self,
        attempt: &NewJoinAttempt,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<JoinRequest, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.sessions.contains_key(token)
            || state
                .requests
                .values()
                .any(|r| r.request.verification_token == token)
        {
            return Err(StoreError::DuplicateToken);
        }

        let existing = state.requests.values_mut().find(|r| {
            r.request.user_id == attempt.user_id
                && r.request.chat_id == attempt.chat_id
                && r.request.status == JoinRequestStatus::Pending
        });

        let request = match existing {
            Some(stored) => {
                let previous_token =
                    std::mem::replace(&mut stored.request.verification_token, token.to_string());
                stored.request.request_time = now;
                stored.request.verification_completed = false;
                stored.request.display_name = attempt.display_name.clone();
                stored.claimed_at = None;
                let request = stored.request.clone();

                if let Some(previous) = state.sessions.get_mut(&previous_token) {
                    previous.expires_at = now - Duration::seconds(1);
                }
                request
            }
            None => {
                state.next_request_id += 1;
                let request = JoinRequest {
                    id: state.next_request_id,
                    user_id: attempt.user_id,
                    chat_id: attempt.chat_id,
                    display_name: attempt.display_name.clone(),
                    verification_token: token.to_string(),
                    status: JoinRequestStatus::Pending,
                    request_time: now,
                    processed_time: None,
                    processing_actor_id: None,
                    verification_completed: false,
                    origin: attempt.origin,
                };
                state.requests.insert(
                    request.id,
                    StoredRequest {
                        request: request.clone(),
                        claimed_at: None,
                    },
                );
                request
            }
        };

        state.next_session_id += 1;
        let session = VerificationSession {
            id: state.next_session_id,
            token: token.to_string(),
            user_id: attempt.user_id,
            chat_id: attempt.chat_id,
            captcha_completed: false,
            captcha_response: None,
            ip_address: None,
            user_agent: None,
            created_time: now,
            completed_time: None,
            expires_at,
        };
        state.sessions.insert(token.to_string(), session);

        Ok(request)
    }

    async fn find_session(&self, token: &str) -> Result<Option<VerificationSession>, StoreError> {
        Ok(self.state.lock().await.sessions.get(token).cloned())
    }

    async fn find_join_request(&self, token: &str) -> Result<Option<JoinRequest>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .request_by_token(token)
            .map(|r| r.request.clone()))
    }

    async fn complete_verification(
        &self,
        completion: SessionCompletion,
    ) -> Result<CompletionResult, StoreError> {
        let mut state = self.state.lock().await;

        let session = match state.sessions.get_mut(&completion.token) {
            Some(session) => session,
            None => return Ok(CompletionResult::NotFound),
        };
        if session.captcha_completed {
            return Ok(CompletionResult::AlreadyCompleted);
        }
        if session.is_expired_at(completion.completed_at) {
            return Ok(CompletionResult::Expired);
        }

        session.captcha_completed = true;
        session.captcha_response = Some(completion.captcha_response);
        session.ip_address = completion.ip_address;
        session.user_agent = completion.user_agent;
        session.completed_time = Some(completion.completed_at);
        let session = session.clone();

        if let Some(stored) = state.request_by_token(&completion.token) {
            stored.request.verification_completed = true;
        }

        Ok(CompletionResult::Completed(session))
    }

    async fn claim_for_approval(
        &self,
        token: &str,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<ApprovalClaim, StoreError> {
        let mut state = self.state.lock().await;
        let stored = match state.request_by_token(token) {
            Some(stored) => stored,
            None => return Ok(ApprovalClaim::NotFound),
        };

        if stored.request.status != JoinRequestStatus::Pending {
            return Ok(ApprovalClaim::NotPending(stored.request.status));
        }
        if let Some(claimed_at) = stored.claimed_at {
            if claimed_at > now - lease {
                return Ok(ApprovalClaim::InFlight);
            }
        }

        stored.claimed_at = Some(now);
        Ok(ApprovalClaim::Claimed(stored.request.clone()))
    }

    async fn release_approval_claim(&self, token: &str) -> Result<(), StoreError> {
        if let Some(stored) = self.state.lock().await.request_by_token(token) {
            stored.claimed_at = None;
        }
        Ok(())
    }

    async fn mark_approved(
        &self,
        token: &str,
        actor_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.request_by_token(token) {
            Some(stored) if stored.request.status == JoinRequestStatus::Pending => {
                stored.request.status = JoinRequestStatus::Approved;
                stored.request.processed_time = Some(now);
                stored.request.processing_actor_id = actor_id;
                stored.claimed_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_rejected(
        &self,
        token: &str,
        actor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.request_by_token(token) {
            Some(stored) if stored.request.status == JoinRequestStatus::Pending => {
                stored.request.status = JoinRequestStatus::Rejected;
                stored.request.processed_time = Some(now);
                stored.request.processing_actor_id = Some(actor_id);
                stored.claimed_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let mut expired = 0;
        for stored in state.requests.values_mut() {
            if stored.request.status != JoinRequestStatus::Pending {
                continue;
            }
            let overdue = state
                .sessions
                .get(&stored.request.verification_token)
                .map(|s| !s.captcha_completed && s.expires_at < now)
                .unwrap_or(false);
            if overdue {
                stored.request.status = JoinRequestStatus::Expired;
                stored.request.processed_time = Some(now);
                stored.claimed_at = None;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn stats(&self, chat_id: Option<i64>) -> Result<VerificationStats, StoreError> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for stored in state.requests.values() {
            if chat_id.map_or(true, |c| stored.request.chat_id == c) {
                *counts.entry(stored.request.status).or_insert(0i64) += 1;
            }
        }
        let count = |s: JoinRequestStatus| counts.get(&s).copied().unwrap_or(0);
        Ok(VerificationStats::from_counts(
            count(JoinRequestStatus::Pending),
            count(JoinRequestStatus::Approved),
            count(JoinRequestStatus::Rejected),
            count(JoinRequestStatus::Expired),
        ))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DisplayName, RequestOrigin};

    fn attempt(user_id: i64, chat_id: i64) -> NewJoinAttempt {
        NewJoinAttempt {
            user_id,
            chat_id,
            display_name: DisplayName::default(),
            origin: RequestOrigin::Platform,
        }
    }

    fn token(c: char) -> String {
        std::iter::repeat(c).take(32).collect()
    }

    #[tokio::test]
    async fn test_repeat_attempt_reuses_pending_row() {
        let store = InMemoryVerificationStore::new();
        let now = Utc::now();
        let ttl = now + Duration::minutes(10);

        let first = store
            .create_join_attempt(&attempt(42, 100), &token('a'), now, ttl)
            .await
            .unwrap();
        let second = store
            .create_join_attempt(&attempt(42, 100), &token('b'), now, ttl)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.verification_token, token('b'));
        assert!(store.find_join_request(&token('a')).await.unwrap().is_none());

        let old = store.find_session(&token('a')).await.unwrap().unwrap();
        assert!(old.is_expired_at(now));
    }

    #[tokio::test]
    async fn test_duplicate_token_rejected() {
        let store = InMemoryVerificationStore::new();
        let now = Utc::now();
        tokio_test::assert_ok!(
            store
                .create_join_attempt(&attempt(1, 1), &token('a'), now, now + Duration::minutes(1))
                .await
        );
        let err = tokio_test::assert_err!(
            store
                .create_join_attempt(&attempt(2, 2), &token('a'), now, now + Duration::minutes(1))
                .await
        );
        assert!(matches!(err, StoreError::DuplicateToken));
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_until_lease_elapses() {
        let store = InMemoryVerificationStore::new();
        let now = Utc::now();
        let lease = Duration::seconds(120);
        store
            .create_join_attempt(&attempt(1, 1), &token('a'), now, now + Duration::minutes(1))
            .await
            .unwrap();

        assert!(matches!(
            store.claim_for_approval(&token('a'), now, lease).await.unwrap(),
            ApprovalClaim::Claimed(_)
        ));
        assert_eq!(
            store.claim_for_approval(&token('a'), now, lease).await.unwrap(),
            ApprovalClaim::InFlight
        );
        assert!(matches!(
            store
                .claim_for_approval(&token('a'), now + Duration::seconds(121), lease)
                .await
                .unwrap(),
            ApprovalClaim::Claimed(_)
        ));
    }

    #[tokio::test]
    async fn test_stats_filter_by_chat() {
        let store = InMemoryVerificationStore::new();
        let now = Utc::now();
        let ttl = now + Duration::minutes(1);
        store.create_join_attempt(&attempt(1, 10), &token('a'), now, ttl).await.unwrap();
        store.create_join_attempt(&attempt(2, 10), &token('b'), now, ttl).await.unwrap();
        store.create_join_attempt(&attempt(3, 20), &token('c'), now, ttl).await.unwrap();
        store.mark_approved(&token('a'), None, now).await.unwrap();

        let chat = store.stats(Some(10)).await.unwrap();
        assert_eq!(chat.total, 2);
        assert_eq!(chat.approved, 1);
        assert_eq!(chat.approval_rate, 50.0);

        let global = store.stats(None).await.unwrap();
        assert_eq!(global.total, 3);
        assert_eq!(global.pending, 2);
    }
}
