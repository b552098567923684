//! Join request entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{DisplayName, JoinRequest, JoinRequestStatus, RequestOrigin};
use sqlx::FromRow;

/// Database enum for join request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "join_request_status", rename_all = "lowercase")]
pub enum JoinRequestStatusDb {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl From<JoinRequestStatusDb> for JoinRequestStatus {
    fn from(status: JoinRequestStatusDb) -> Self {
        match status {
            JoinRequestStatusDb::Pending => JoinRequestStatus::Pending,
            JoinRequestStatusDb::Approved => JoinRequestStatus::Approved,
            JoinRequestStatusDb::Rejected => JoinRequestStatus::Rejected,
            JoinRequestStatusDb::Expired => JoinRequestStatus::Expired,
        }
    }
}

/// Database enum for where a join request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "request_origin", rename_all = "snake_case")]
pub enum RequestOriginDb {
    Platform,
    ExternalApi,
}

impl From<RequestOrigin> for RequestOriginDb {
    fn from(origin: RequestOrigin) -> Self {
        match origin {
            RequestOrigin::Platform => RequestOriginDb::Platform,
            RequestOrigin::ExternalApi => RequestOriginDb::ExternalApi,
        }
    }
}

impl From<RequestOriginDb> for RequestOrigin {
    fn from(origin: RequestOriginDb) -> Self {
        match origin {
            RequestOriginDb::Platform => RequestOrigin::Platform,
            RequestOriginDb::ExternalApi => RequestOrigin::ExternalApi,
        }
    }
}

/// Database row mapping for the join_requests table.
#[derive(Debug, Clone, FromRow)]
pub struct JoinRequestEntity {
    pub id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub verification_token: String,
    pub status: JoinRequestStatusDb,
    pub request_time: DateTime<Utc>,
    pub processed_time: Option<DateTime<Utc>>,
    pub processing_actor_id: Option<i64>,
    pub verification_completed: bool,
    pub origin: RequestOriginDb,
    pub approval_claimed_at: Option<DateTime<Utc>>,
}

impl From<JoinRequestEntity> for JoinRequest {
    fn from(entity: JoinRequestEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            chat_id: entity.chat_id,
            display_name: DisplayName {
                username: entity.username,
                first_name: entity.first_name,
                last_name: entity.last_name,
            },
            verification_token: entity.verification_token,
            status: entity.status.into(),
            request_time: entity.request_time,
            processed_time: entity.processed_time,
            processing_actor_id: entity.processing_actor_id,
            verification_completed: entity.verification_completed,
            origin: entity.origin.into(),
        }
    }
}

/// Per-status counts for statistics.
#[derive(Debug, Clone, FromRow)]
pub struct StatusCountsEntity {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub expired: i64,
}
