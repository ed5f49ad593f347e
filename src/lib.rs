//! Async client for the one-api key distribution platform.
//!
//! Every call goes through [`OneApiClient::send_request`], which speaks the
//! server's `{success, message, data}` envelope. On top of it sit typed user
//! and API key operations plus a few multi-call conveniences
//! ([`OneApiClient::create_openai_user`],
//! [`OneApiClient::generate_specific_name_key`],
//! [`OneApiClient::add_user_quota`]). Those conveniences are not
//! transactional: a failing step is reported with its name and anything the
//! earlier steps created stays on the server.
//!
//! ```no_run
//! # async fn run() -> one_api::Result<()> {
//! use one_api::{ClientConfig, OneApiClient};
//!
//! let client = OneApiClient::new(
//!     ClientConfig::new("https://one-api.example.com").with_system_token("root-token"),
//! )?;
//! let user = client.create_openai_user(None).await?;
//! let key = client
//!     .generate_specific_name_key(&user.access_token, "default", true)
//!     .await?;
//! println!("{} -> {}", user.id, key.key);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod users;

#[cfg(test)]
mod test_support;

pub use client::{Auth, OneApiClient, Request};
pub use config::ClientConfig;
pub use envelope::{ApiResponse, Envelope};
pub use error::{OneApiError, Result};
pub use keys::{AddTokenRequest, OpenAiKeyData, ProvisionedUser, TokenInfo};
pub use reqwest::Method;
pub use users::{BaseUserInfo, LoginSession, OneApiUser, UserCredentials};
