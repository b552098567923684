//! External service integrations.

pub mod captcha;
pub mod telegram;

pub use captcha::CaptchaProvider;
pub use telegram::TelegramClient;
