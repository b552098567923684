//! Domain services for Join Guard.
//!
//! Services contain the verification lifecycle logic and the seams to
//! storage, CAPTCHA providers and the chat platform.

pub mod approval;
pub mod captcha;
pub mod chat_platform;
pub mod expiration;
pub mod join;
pub mod store;
pub mod verification;

pub use approval::{welcome_message, ApprovalOrchestrator, ApprovalSettings};
pub use captcha::{CaptchaError, CaptchaVerifier, MockCaptchaVerifier};
pub use chat_platform::{ChatInfo, ChatPlatform, MockChatPlatform, NotificationResult, PlatformError};
pub use expiration::ExpirationSweeper;
pub use join::{IssuedVerification, JoinAttemptService};
pub use store::{ApprovalClaim, InMemoryVerificationStore, StoreError, VerificationStore};
pub use verification::{
    ApprovalAttempted, VerificationError, VerificationOrchestrator, VerificationSubmission,
};
