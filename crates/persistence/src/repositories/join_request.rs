//! Join request repository for database operations.

use chrono::{DateTime, Duration, Utc};
use domain::models::NewJoinAttempt;
use sqlx::PgPool;

use crate::entities::{JoinRequestEntity, RequestOriginDb, StatusCountsEntity};
use crate::metrics::QueryTimer;

const JOIN_REQUEST_COLUMNS: &str = "id, user_id, chat_id, username, first_name, last_name, \
     verification_token, status, request_time, processed_time, processing_actor_id, \
     verification_completed, origin, approval_claimed_at";

/// Repository for join request database operations.
#[derive(Clone)]
pub struct JoinRequestRepository {
    pool: PgPool,
}

impl JoinRequestRepository {
    /// Creates a new JoinRequestRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a pending join request with a new session, or refreshes the
    /// pending request for the same user and chat.
    ///
    /// Runs in one transaction. The pending row is locked with `FOR UPDATE`
    /// so concurrent refreshes serialize; concurrent first inserts race on
    /// the partial unique index.
    pub async fn create_or_refresh(
        &self,
        attempt: &NewJoinAttempt,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<JoinRequestEntity, sqlx::Error> {
        let timer = QueryTimer::new("create_or_refresh_join_request");
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64, String)> = sqlx::query_as(
            r#"
            SELECT id, verification_token
            FROM join_requests
            WHERE user_id = $1 AND chat_id = $2 AND status = 'pending'
            FOR UPDATE
            "#,
        )
        .bind(attempt.user_id)
        .bind(attempt.chat_id)
        .fetch_optional(&mut *tx)
        .await?;

        let name = &attempt.display_name;
        let entity = match existing {
            Some((id, previous_token)) => {
                let entity = sqlx::query_as::<_, JoinRequestEntity>(&format!(
                    r#"
                    UPDATE join_requests
                    SET verification_token = $2, request_time = $3, verification_completed = FALSE,
                        username = $4, first_name = $5, last_name = $6, approval_claimed_at = NULL
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    JOIN_REQUEST_COLUMNS
                ))
                .bind(id)
                .bind(token)
                .bind(now)
                .bind(&name.username)
                .bind(&name.first_name)
                .bind(&name.last_name)
                .fetch_one(&mut *tx)
                .await?;

                // Soft-invalidate the superseded session
                sqlx::query("UPDATE verification_sessions SET expires_at = $2 WHERE token = $1")
                    .bind(&previous_token)
                    .bind(now - Duration::seconds(1))
                    .execute(&mut *tx)
                    .await?;

                entity
            }
            None => {
                sqlx::query_as::<_, JoinRequestEntity>(&format!(
                    r#"
                    INSERT INTO join_requests
                        (user_id, chat_id, username, first_name, last_name,
                         verification_token, request_time, origin)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING {}
                    "#,
                    JOIN_REQUEST_COLUMNS
                ))
                .bind(attempt.user_id)
                .bind(attempt.chat_id)
                .bind(&name.username)
                .bind(&name.first_name)
                .bind(&name.last_name)
                .bind(token)
                .bind(now)
                .bind(RequestOriginDb::from(attempt.origin))
                .fetch_one(&mut *tx)
                .await?
            }
        };

        sqlx::query(
            r#"
            INSERT INTO verification_sessions (token, user_id, chat_id, created_time, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(token)
        .bind(attempt.user_id)
        .bind(attempt.chat_id)
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        timer.record();
        Ok(entity)
    }

    /// Find the join request currently bound to a token.
    pub async fn find_by_token(
        &self,
        token: &str,
    ) -> Result<Option<JoinRequestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_join_request_by_token");
        let result = sqlx::query_as::<_, JoinRequestEntity>(&format!(
            "SELECT {} FROM join_requests WHERE verification_token = $1",
            JOIN_REQUEST_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Take the approval claim on a pending request.
    ///
    /// Succeeds only if the request is unclaimed or its claim was taken at or
    /// before `stale_before`. Returns `None` when the claim was not taken.
    pub async fn claim_for_approval(
        &self,
        token: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<JoinRequestEntity>, sqlx::Error> {
        let timer = QueryTimer::new("claim_join_request_for_approval");
        let result = sqlx::query_as::<_, JoinRequestEntity>(&format!(
            r#"
            UPDATE join_requests
            SET approval_claimed_at = $2
            WHERE verification_token = $1
              AND status = 'pending'
              AND (approval_claimed_at IS NULL OR approval_claimed_at <= $3)
            RETURNING {}
            "#,
            JOIN_REQUEST_COLUMNS
        ))
        .bind(token)
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Drop the approval claim on a still-pending request.
    pub async fn release_claim(&self, token: &str) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("release_join_request_claim");
        let result = sqlx::query(
            r#"
            UPDATE join_requests
            SET approval_claimed_at = NULL
            WHERE verification_token = $1 AND status = 'pending'
            "#,
        )
        .bind(token)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }

    /// Move a pending request to `approved`.
    pub async fn mark_approved(
        &self,
        token: &str,
        actor_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("mark_join_request_approved");
        let result = sqlx::query(
            r#"
            UPDATE join_requests
            SET status = 'approved', processed_time = $2, processing_actor_id = $3,
                approval_claimed_at = NULL
            WHERE verification_token = $1 AND status = 'pending'
            "#,
        )
        .bind(token)
        .bind(now)
        .bind(actor_id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }

    /// Move a pending request to `rejected`.
    pub async fn mark_rejected(
        &self,
        token: &str,
        actor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("mark_join_request_rejected");
        let result = sqlx::query(
            r#"
            UPDATE join_requests
            SET status = 'rejected', processed_time = $2, processing_actor_id = $3,
                approval_claimed_at = NULL
            WHERE verification_token = $1 AND status = 'pending'
            "#,
        )
        .bind(token)
        .bind(now)
        .bind(actor_id)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected() > 0)
    }

    /// Expire pending requests whose current session is overdue and uncompleted.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("expire_overdue_join_requests");
        let result = sqlx::query(
            r#"
            UPDATE join_requests jr
            SET status = 'expired', processed_time = $1, approval_claimed_at = NULL
            FROM verification_sessions vs
            WHERE vs.token = jr.verification_token
              AND jr.status = 'pending'
              AND vs.captcha_completed = FALSE
              AND vs.expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await;
        timer.record();
        result.map(|r| r.rows_affected())
    }

    /// Count requests by status, optionally for a single chat.
    pub async fn status_counts(
        &self,
        chat_id: Option<i64>,
    ) -> Result<StatusCountsEntity, sqlx::Error> {
        let timer = QueryTimer::new("join_request_status_counts");
        let result = sqlx::query_as::<_, StatusCountsEntity>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                COUNT(*) FILTER (WHERE status = 'rejected') AS rejected,
                COUNT(*) FILTER (WHERE status = 'expired') AS expired
            FROM join_requests
            WHERE $1::BIGINT IS NULL OR chat_id = $1
            "#,
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }
}
