use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{Auth, OneApiClient, Request};
use crate::constants::{DEFAULT_KEY_NAME, KEY_ENDPOINT, KEY_SEARCH_ENDPOINT, NEVER_EXPIRES};
use crate::envelope::{ApiResponse, nullable_string};
use crate::error::{OneApiError, Result};
use crate::users::BaseUserInfo;

/// Body of API key creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddTokenRequest {
    pub name: String,
    pub remain_quota: i64,
    /// Unix seconds, `-1` for never
    pub expired_time: i64,
    pub unlimited_quota: bool,
    pub model_limits_enabled: bool,
    /// Comma separated model names
    pub model_limits: String,
    /// Comma separated IPs / subnets
    pub allow_ips: String,
    pub group: String,
}

impl AddTokenRequest {
    /// A never-expiring, unlimited key.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expired_time: NEVER_EXPIRES,
            unlimited_quota: true,
            ..Self::default()
        }
    }
}

/// An API key as listed by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub user_id: i64,
    pub key: String,
    pub status: i32,
    pub name: String,
    pub created_time: i64,
    pub accessed_time: i64,
    pub expired_time: i64,
    pub remain_quota: i64,
    pub unlimited_quota: bool,
    pub used_quota: i64,
    #[serde(default, deserialize_with = "nullable_string")]
    pub models: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub subnet: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiKeyData {
    pub key: String,
    pub models: String,
}

impl From<&TokenInfo> for OpenAiKeyData {
    fn from(token: &TokenInfo) -> Self {
        Self {
            key: token.key.clone(),
            models: token.models.clone(),
        }
    }
}

/// A bootstrapped user together with its API keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedUser {
    pub base_info: BaseUserInfo,
    pub key_data: Vec<OpenAiKeyData>,
}

/// Decode a key list; `null` data means no keys.
pub fn decode_token_list(response: &ApiResponse) -> Result<Vec<TokenInfo>> {
    let tokens: Option<Vec<TokenInfo>> = response.decode_data("token list")?;
    Ok(tokens.unwrap_or_default())
}

impl OneApiClient {
    /// Create an API key for the user owning `access_token`.
    pub async fn generate_key(&self, access_token: &str, req: &AddTokenRequest) -> Result<()> {
        let request = Request::post(KEY_ENDPOINT)
            .auth(Auth::Bearer(access_token))
            .json(req)?;
        self.send_request(request).await?;
        Ok(())
    }

    pub async fn list_keys(&self, access_token: &str) -> Result<Vec<TokenInfo>> {
        let request = Request::get(KEY_ENDPOINT).auth(Auth::Bearer(access_token));
        decode_token_list(&self.send_request(request).await?)
    }

    /// Keys whose name contains `keyword`.
    pub async fn search_keys(&self, access_token: &str, keyword: &str) -> Result<Vec<TokenInfo>> {
        let request = Request::get(KEY_SEARCH_ENDPOINT)
            .auth(Auth::Bearer(access_token))
            .query("keyword", keyword);
        decode_token_list(&self.send_request(request).await?)
    }

    /// First key named exactly `name`.
    pub async fn find_key_by_name(
        &self,
        access_token: &str,
        name: &str,
    ) -> Result<Option<TokenInfo>> {
        let found = self.search_keys(access_token, name).await?;
        Ok(found.into_iter().find(|token| token.name == name))
    }

    /// Return the key named `name`, creating it when missing.
    ///
    /// With `check` the existing key is looked up first; without it a new
    /// key is always created. Check-then-create is not atomic, so concurrent
    /// callers can end up with several keys of the same name.
    pub async fn generate_specific_name_key(
        &self,
        access_token: &str,
        name: &str,
        check: bool,
    ) -> Result<OpenAiKeyData> {
        if check
            && let Some(existing) = self
                .find_key_by_name(access_token, name)
                .await
                .map_err(OneApiError::step("search existing key"))?
        {
            return Ok(OpenAiKeyData::from(&existing));
        }

        self.generate_key(access_token, &AddTokenRequest::named(name))
            .await
            .map_err(OneApiError::step("generate key"))?;

        let created = self
            .find_key_by_name(access_token, name)
            .await
            .map_err(OneApiError::step("search created key"))?
            .ok_or_else(|| OneApiError::KeyNotFound(name.to_string()))?;

        info!(key_name = name, "Generated one-api key");
        Ok(OpenAiKeyData::from(&created))
    }

    /// Bootstrap a user, top up its quota and give it a default key.
    ///
    /// Same guarantees as `create_openai_user`: no rollback on failure.
    pub async fn provision_openai_user(
        &self,
        username: Option<&str>,
        quota: i64,
    ) -> Result<ProvisionedUser> {
        let base_info = self.create_openai_user(username).await?;

        if quota > 0 {
            self.add_user_quota(base_info.id, quota)
                .await
                .map_err(OneApiError::step("add quota"))?;
        }

        self.generate_specific_name_key(&base_info.access_token, DEFAULT_KEY_NAME, true)
            .await
            .map_err(OneApiError::step("create default key"))?;

        let key_data = self
            .list_keys(&base_info.access_token)
            .await
            .map_err(OneApiError::step("list keys"))?
            .iter()
            .map(OpenAiKeyData::from)
            .collect();

        Ok(ProvisionedUser {
            base_info,
            key_data,
        })
    }
}
