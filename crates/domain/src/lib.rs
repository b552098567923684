//! Domain layer for the Join Guard backend.
//!
//! This crate contains:
//! - Domain models (JoinRequest, VerificationSession, CAPTCHA and approval outcomes)
//! - The store, CAPTCHA verifier and chat platform seams
//! - The verification, approval and expiration orchestrators
//! - Domain error types

pub mod models;
pub mod services;
