//! Approval outcome and the closed failure taxonomy.

use serde::Serialize;

/// Why an auto-approval did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum ApprovalFailure {
    /// No join request is bound to the token.
    RequestNotFound,
    /// The join request is no longer pending, or another approval is in flight.
    AlreadyProcessed,
    UserNotFound,
    ChatNotFound,
    /// The platform has no matching pending join request.
    RequestNotFoundUpstream,
    BotNotMember,
    InsufficientPermissions,
    OtherPlatformError(String),
    /// Local failure before reaching the platform.
    Internal(String),
}

impl ApprovalFailure {
    /// Failures that require an operator to fix the bot's setup.
    pub fn is_configuration_problem(&self) -> bool {
        matches!(
            self,
            ApprovalFailure::BotNotMember | ApprovalFailure::InsufficientPermissions
        )
    }

    /// Classifies a platform error description.
    ///
    /// Matching is case-insensitive on the substrings the Bot API uses.
    pub fn classify_platform_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["user_not_found", "user not found"]) {
            ApprovalFailure::UserNotFound
        } else if has(&["chat_not_found", "chat not found"]) {
            ApprovalFailure::ChatNotFound
        } else if has(&["request_not_found", "hide_requester_missing"]) {
            ApprovalFailure::RequestNotFoundUpstream
        } else if has(&["bot_not_member", "bot is not a member"]) {
            ApprovalFailure::BotNotMember
        } else if has(&["not_enough_rights", "not enough rights", "chat_admin_required"]) {
            ApprovalFailure::InsufficientPermissions
        } else {
            ApprovalFailure::OtherPlatformError(message.to_string())
        }
    }

    /// Stable label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalFailure::RequestNotFound => "request_not_found",
            ApprovalFailure::AlreadyProcessed => "already_processed",
            ApprovalFailure::UserNotFound => "user_not_found",
            ApprovalFailure::ChatNotFound => "chat_not_found",
            ApprovalFailure::RequestNotFoundUpstream => "request_not_found_upstream",
            ApprovalFailure::BotNotMember => "bot_not_member",
            ApprovalFailure::InsufficientPermissions => "insufficient_permissions",
            ApprovalFailure::OtherPlatformError(_) => "other_platform_error",
            ApprovalFailure::Internal(_) => "internal",
        }
    }
}

impl std::fmt::Display for ApprovalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalFailure::OtherPlatformError(msg) => write!(f, "platform error: {}", msg),
            ApprovalFailure::Internal(msg) => write!(f, "internal error: {}", msg),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Result of an auto-approval attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<ApprovalFailure>,
}

impl ApprovalOutcome {
    pub fn approved() -> Self {
        Self {
            success: true,
            failure_reason: None,
        }
    }

    pub fn failed(reason: ApprovalFailure) -> Self {
        Self {
            success: false,
            failure_reason: Some(reason),
        }
    }
}
