//! Join request domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a join request.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl JoinRequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JoinRequestStatus::Pending)
    }
}

impl std::fmt::Display for JoinRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinRequestStatus::Pending => write!(f, "pending"),
            JoinRequestStatus::Approved => write!(f, "approved"),
            JoinRequestStatus::Rejected => write!(f, "rejected"),
            JoinRequestStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Where a join attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOrigin {
    /// A join request raised on the chat platform itself.
    Platform,
    /// A verification created through the external API. There is no
    /// platform-side request to approve.
    ExternalApi,
}

impl std::fmt::Display for RequestOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestOrigin::Platform => write!(f, "platform"),
            RequestOrigin::ExternalApi => write!(f, "external_api"),
        }
    }
}

/// Optional display name parts of the requester as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl DisplayName {
    /// Human-readable label: "First Last", then "@username", else `None`.
    pub fn label(&self) -> Option<String> {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return Some(full);
        }
        self.username
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(|u| format!("@{}", u))
    }
}

/// One admission attempt by a user for a chat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinRequest {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub display_name: DisplayName,
    pub verification_token: String,
    pub status: JoinRequestStatus,
    pub request_time: DateTime<Utc>,
    pub processed_time: Option<DateTime<Utc>>,
    /// Admin who processed the request; `None` for automatic decisions.
    pub processing_actor_id: Option<i64>,
    pub verification_completed: bool,
    pub origin: RequestOrigin,
}

/// Input for creating (or refreshing) a join attempt.
#[derive(Debug, Clone)]
pub struct NewJoinAttempt {
    pub user_id: i64,
    pub chat_id: i64,
    pub display_name: DisplayName,
    pub origin: RequestOrigin,
}

/// Aggregate counts of join requests by status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationStats {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub expired: i64,
    /// Percentage of all requests that were approved, rounded to two decimals.
    pub approval_rate: f64,
}

impl VerificationStats {
    pub fn from_counts(pending: i64, approved: i64, rejected: i64, expired: i64) -> Self {
        let total = pending + approved + rejected + expired;
        let approval_rate = if total > 0 {
            ((approved as f64 / total as f64) * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            total,
            pending,
            approved,
            rejected,
            expired,
            approval_rate,
        }
    }
}
