//! Verification session entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::VerificationSession;
use sqlx::FromRow;

/// Database row mapping for the verification_sessions table.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationSessionEntity {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub captcha_completed: bool,
    pub captcha_response: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_time: DateTime<Utc>,
    pub completed_time: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl From<VerificationSessionEntity> for VerificationSession {
    fn from(entity: VerificationSessionEntity) -> Self {
        Self {
            id: entity.id,
            token: entity.token,
            user_id: entity.user_id,
            chat_id: entity.chat_id,
            captcha_completed: entity.captcha_completed,
            captcha_response: entity.captcha_response,
            ip_address: entity.ip_address,
            user_agent: entity.user_agent,
            created_time: entity.created_time,
            completed_time: entity.completed_time,
            expires_at: entity.expires_at,
        }
    }
}
