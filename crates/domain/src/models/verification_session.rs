//! Verification session domain models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::join_request::JoinRequestStatus;

/// Bounded-lifetime record tracking whether a token's challenge was solved.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationSession {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub captcha_completed: bool,
    /// Raw challenge response, kept for audit.
    pub captcha_response: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_time: DateTime<Utc>,
    pub completed_time: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationSession {
    /// Whether the session is past its deadline at `now`.
    ///
    /// Monotonic in `now` for a fixed `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Data recorded when a challenge is solved.
#[derive(Debug, Clone)]
pub struct SessionCompletion {
    pub token: String,
    pub captcha_response: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Result of the conditional "mark completed" write.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResult {
    /// This call performed the transition.
    Completed(VerificationSession),
    /// Another call already completed the session.
    AlreadyCompleted,
    Expired,
    NotFound,
}

/// Public view of a token's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationStatus {
    pub token: String,
    pub completed: bool,
    pub expired: bool,
    /// Status of the join request still bound to this token, if any.
    pub status: Option<JoinRequestStatus>,
    pub created_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationStatus {
    pub fn from_session(
        session: &VerificationSession,
        status: Option<JoinRequestStatus>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token: session.token.clone(),
            completed: session.captcha_completed,
            expired: session.is_expired_at(now),
            status,
            created_time: session.created_time,
            expires_at: session.expires_at,
        }
    }
}
