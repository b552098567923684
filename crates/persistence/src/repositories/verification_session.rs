//! Verification session repository for database operations.

use domain::models::SessionCompletion;
use sqlx::PgPool;

use crate::entities::VerificationSessionEntity;
use crate::metrics::QueryTimer;

const SESSION_COLUMNS: &str = "id, token, user_id, chat_id, captcha_completed, captcha_response, \
     ip_address, user_agent, created_time, completed_time, expires_at";

/// Repository for verification session database operations.
#[derive(Clone)]
pub struct VerificationSessionRepository {
    pool: PgPool,
}

impl VerificationSessionRepository {
    /// Creates a new VerificationSessionRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a session by token.
    pub async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<Option<VerificationSessionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_verification_session_by_token");
        let result = sqlx::query_as::<_, VerificationSessionEntity>(&format!(
            "SELECT {} FROM verification_sessions WHERE token = $1",
            SESSION_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Mark a session completed and flag its join request, in one transaction.
    ///
    /// Only an uncompleted, unexpired session transitions. Returns `None` when
    /// no row matched; the caller decides why.
    pub async fn complete(
        &self,
        completion: &SessionCompletion,
    ) -> Result<Option<VerificationSessionEntity>, sqlx::Error> {
        let timer = QueryTimer::new("complete_verification_session");
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, VerificationSessionEntity>(&format!(
            r#"
            UPDATE verification_sessions
            SET captcha_completed = TRUE, captcha_response = $2, ip_address = $3,
                user_agent = $4, completed_time = $5
            WHERE token = $1 AND captcha_completed = FALSE AND expires_at >= $5
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(&completion.token)
        .bind(&completion.captcha_response)
        .bind(&completion.ip_address)
        .bind(&completion.user_agent)
        .bind(completion.completed_at)
        .fetch_optional(&mut *tx)
        .await?;

        if session.is_some() {
            sqlx::query(
                "UPDATE join_requests SET verification_completed = TRUE WHERE verification_token = $1",
            )
            .bind(&completion.token)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        timer.record();
        Ok(session)
    }
}
