//! Shared utilities for the Join Guard backend.
//!
//! This crate provides functionality used across all other crates:
//! - Verification token generation and log-safe fingerprints
//! - Telegram MarkdownV2 escaping
//! - Common validation logic

pub mod crypto;
pub mod markdown;
pub mod validation;
