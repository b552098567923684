//! Repository implementations for database operations.

pub mod join_request;
pub mod verification_session;

pub use join_request::JoinRequestRepository;
pub use verification_session::VerificationSessionRepository;
