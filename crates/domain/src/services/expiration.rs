//! Demotes overdue, uncompleted verifications to `expired`.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::store::{StoreError, VerificationStore};

pub struct ExpirationSweeper {
    store: Arc<dyn VerificationStore>,
}

impl ExpirationSweeper {
    pub fn new(store: Arc<dyn VerificationStore>) -> Self {
        Self { store }
    }

    /// Runs one sweep and returns how many join requests were expired.
    ///
    /// Idempotent: a second sweep over the same state returns 0.
    pub async fn sweep(&self) -> Result<u64, StoreError> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let expired = self.store.expire_overdue(now).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired overdue join requests");
        } else {
            tracing::debug!("No overdue join requests");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CompletionResult, DisplayName, JoinRequestStatus, NewJoinAttempt, RequestOrigin,
        SessionCompletion,
    };
    use crate::services::store::InMemoryVerificationStore;
    use chrono::Duration;

    async fn issue(store: &InMemoryVerificationStore, user_id: i64, ttl: Duration) -> String {
        let token = shared::crypto::generate_verification_token();
        let now = Utc::now();
        store
            .create_join_attempt(
                &NewJoinAttempt {
                    user_id,
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

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let store = Arc::new(InMemoryVerificationStore::new());
        let token = issue(&store, 1, Duration::seconds(-1)).await;
        let sweeper = ExpirationSweeper::new(store.clone());

        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        assert_eq!(sweeper.sweep().await.unwrap(), 0);

        let request = store.find_join_request(&token).await.unwrap().unwrap();
        assert_eq!(request.status, JoinRequestStatus::Expired);
        assert!(request.processed_time.is_some());
    }

    #[tokio::test]
    async fn test_sweep_ignores_live_and_completed_sessions() {
        let store = Arc::new(InMemoryVerificationStore::new());
        let live = issue(&store, 1, Duration::seconds(600)).await;
        let completed = issue(&store, 2, Duration::seconds(600)).await;

        let result = store
            .complete_verification(SessionCompletion {
                token: completed.clone(),
                captcha_response: "ok".into(),
                ip_address: None,
                user_agent: None,
                completed_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(matches!(result, CompletionResult::Completed(_)));

        // Both deadlines have passed from the sweeper's point of view.
        let sweeper = ExpirationSweeper::new(store.clone());
        let expired = sweeper
            .sweep_at(Utc::now() + Duration::seconds(601))
            .await
            .unwrap();

        assert_eq!(expired, 1);
        let live_request = store.find_join_request(&live).await.unwrap().unwrap();
        assert_eq!(live_request.status, JoinRequestStatus::Expired);
        let completed_request = store.find_join_request(&completed).await.unwrap().unwrap();
        assert_eq!(completed_request.status, JoinRequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_superseded_session_not_counted() {
        let store = Arc::new(InMemoryVerificationStore::new());
        issue(&store, 1, Duration::seconds(600)).await;
        issue(&store, 1, Duration::seconds(600)).await;

        let sweeper = ExpirationSweeper::new(store);
        assert_eq!(sweeper.sweep().await.unwrap(), 0);
    }
}
