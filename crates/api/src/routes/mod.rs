//! HTTP route handlers.

pub mod admin;
pub mod external;
pub mod health;
pub mod telegram_webhook;
pub mod verification;
