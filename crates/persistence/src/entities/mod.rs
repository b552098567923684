//! Database entity definitions.

pub mod join_request;
pub mod verification_session;

pub use join_request::{JoinRequestEntity, JoinRequestStatusDb, RequestOriginDb, StatusCountsEntity};
pub use verification_session::VerificationSessionEntity;
