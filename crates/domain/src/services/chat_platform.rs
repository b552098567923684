//! Chat platform seam: approvals and direct messages.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::ApprovalFailure;

/// Failures talking to the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The platform answered and refused the call.
    #[error("Platform rejected request: {description}")]
    Rejected {
        code: Option<i64>,
        description: String,
    },

    #[error("Platform returned HTTP {0}")]
    Http(u16),

    #[error("Platform unreachable: {0}")]
    Transport(String),

    #[error("Invalid platform response: {0}")]
    InvalidResponse(String),
}

impl PlatformError {
    /// Maps the error onto the approval failure taxonomy.
    pub fn classify(&self) -> ApprovalFailure {
        match self {
            PlatformError::Rejected { description, .. } => {
                ApprovalFailure::classify_platform_message(description)
            }
            other => ApprovalFailure::OtherPlatformError(other.to_string()),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, PlatformError::Transport(_) | PlatformError::Http(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: i64,
    pub title: Option<String>,
}

/// Result of a best-effort message send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    Sent,
    /// Sending failed; the caller carried on.
    Failed(String),
    /// Nothing was sent (disabled or not applicable).
    Skipped,
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn approve_join_request(&self, chat_id: i64, user_id: i64) -> Result<(), PlatformError>;

    /// Sends a MarkdownV2-formatted private message.
    async fn send_direct_message(&self, user_id: i64, text: &str) -> Result<(), PlatformError>;

    async fn get_chat_info(&self, chat_id: i64) -> Result<ChatInfo, PlatformError>;
}

/// Mock platform for development and testing.
///
/// Records calls instead of reaching the network.
#[derive(Debug, Default)]
pub struct MockChatPlatform {
    approve_error: Option<PlatformError>,
    message_error: Option<PlatformError>,
    chat_title: Option<String>,
    approve_calls: AtomicUsize,
    sent_messages: Mutex<Vec<(i64, String)>>,
}

impl MockChatPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform whose approval call always fails with `error`.
    pub fn failing_approval(error: PlatformError) -> Self {
        Self {
            approve_error: Some(error),
            ..Self::default()
        }
    }

    pub fn failing_messages(mut self, error: PlatformError) -> Self {
        self.message_error = Some(error);
        self
    }

    pub fn with_chat_title(mut self, title: &str) -> Self {
        self.chat_title = Some(title.to_string());
        self
    }

    pub fn approve_calls(&self) -> usize {
        self.approve_calls.load(Ordering::SeqCst)
    }

    pub async fn sent_messages(&self) -> Vec<(i64, String)> {
        self.sent_messages.lock().await.clone()
    }
}

#[async_trait]
impl ChatPlatform for MockChatPlatform {
    async fn approve_join_request(&self, chat_id: i64, user_id: i64) -> Result<(), PlatformError> {
        self.approve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.approve_error {
            tracing::warn!(chat_id, user_id, "Mock platform simulating approval failure");
            return Err(err.clone());
        }
        tracing::info!(chat_id, user_id, "Mock: Would approve join request");
        Ok(())
    }

    async fn send_direct_message(&self, user_id: i64, text: &str) -> Result<(), PlatformError> {
        if let Some(err) = &self.message_error {
            return Err(err.clone());
        }
        self.sent_messages
            .lock()
            .await
            .push((user_id, text.to_string()));
        Ok(())
    }

    async fn get_chat_info(&self, chat_id: i64) -> Result<ChatInfo, PlatformError> {
        Ok(ChatInfo {
            id: chat_id,
            title: self.chat_title.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rejected() {
        let err = PlatformError::Rejected {
            code: Some(400),
            description: "Bad Request: USER_ALREADY_PARTICIPANT".into(),
        };
        assert!(matches!(err.classify(), ApprovalFailure::OtherPlatformError(_)));

        let err = PlatformError::Rejected {
            code: Some(403),
            description: "Forbidden: bot is not a member of the channel chat".into(),
        };
        assert_eq!(err.classify(), ApprovalFailure::BotNotMember);
    }

    #[test]
    fn test_transport_errors_are_other_platform_errors() {
        let err = PlatformError::Transport("connection refused".into());
        assert!(err.is_transport());
        match err.classify() {
            ApprovalFailure::OtherPlatformError(msg) => assert!(msg.contains("connection refused")),
            other => panic!("unexpected classification {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let platform = MockChatPlatform::new().with_chat_title("Rustaceans");
        platform.approve_join_request(1, 2).await.unwrap();
        platform.send_direct_message(2, "hi").await.unwrap();

        assert_eq!(platform.approve_calls(), 1);
        assert_eq!(platform.sent_messages().await, vec![(2, "hi".to_string())]);
        assert_eq!(
            platform.get_chat_info(1).await.unwrap().title.as_deref(),
            Some("Rustaceans")
        );
    }
}
