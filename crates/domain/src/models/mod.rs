//! Domain models for Join Guard.

pub mod approval;
pub mod captcha;
pub mod join_request;
pub mod verification_session;

pub use approval::{ApprovalFailure, ApprovalOutcome};
pub use captcha::CaptchaVerificationOutcome;
pub use join_request::{
    DisplayName, JoinRequest, JoinRequestStatus, NewJoinAttempt, RequestOrigin, VerificationStats,
};
pub use verification_session::{
    CompletionResult, SessionCompletion, VerificationSession, VerificationStatus,
};
