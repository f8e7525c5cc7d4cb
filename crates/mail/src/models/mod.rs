//! Domain models for the sync engine

mod credential;
mod mail;
mod user;

pub use credential::{Credential, SENTINEL_TOKEN, TokenResponse, is_sentinel};
pub use mail::{Attachment, MailObject};
pub use user::User;
