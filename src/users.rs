use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::client::{Auth, OneApiClient, Request};
use crate::constants::{
    ACCESS_TOKEN_ENDPOINT, GENERATED_PASSWORD_LEN, GENERATED_USERNAME_LEN, LOGIN_ENDPOINT,
    USER_ENDPOINT, USER_ID_HEADER,
};
use crate::envelope::decode_value;
use crate::error::{OneApiError, Result};

/// Full user record as returned by `GET /api/user/{id}` and sent back on update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneApiUser {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub role: i32,
    pub status: i32,
    pub email: String,
    pub github_id: String,
    pub wechat_id: String,
    #[serde(default)]
    pub lark_id: String,
    #[serde(default)]
    pub oidc_id: String,
    #[serde(default)]
    pub verification_code: String,
    pub access_token: String,
    pub quota: i64,
    pub used_quota: i64,
    pub request_count: i64,
    pub group: String,
    pub aff_code: String,
    pub inviter_id: i64,
}

/// Body of user creation and login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
}

impl UserCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            display_name: String::new(),
        }
    }
}

/// Identity of a freshly bootstrapped user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseUserInfo {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: i32,
    pub status: i32,
    pub access_token: String,
}

/// The part of the login record the bootstrap flow relies on.
#[derive(Debug, Deserialize)]
struct LoginIdentity {
    id: i64,
    username: String,
    display_name: String,
    role: i32,
    status: i32,
}

#[derive(Debug, Clone)]
pub struct LoginSession {
    pub session_id: String,
    /// Raw `data` of the login response, not validated
    pub user: Value,
}

impl OneApiClient {
    /// Create a regular user (system token).
    pub async fn add_user(&self, credentials: &UserCredentials) -> Result<()> {
        let request = Request::post(USER_ENDPOINT)
            .auth(self.system_auth()?)
            .json(credentials)?;
        self.send_request(request).await?;
        Ok(())
    }

    /// Log in to obtain a session id from the `session` cookie.
    pub async fn login(&self, credentials: &UserCredentials) -> Result<LoginSession> {
        let request = Request::post(LOGIN_ENDPOINT).json(credentials)?;
        let response = self.send_request(request).await?;
        let session_id = response.session_id.ok_or(OneApiError::MissingSession)?;
        Ok(LoginSession {
            session_id,
            user: response.envelope.data,
        })
    }

    /// Issue (or rotate) the access token of `user_id` using its login session.
    pub async fn issue_access_token(&self, user_id: i64, session_id: &str) -> Result<String> {
        let request = Request::get(ACCESS_TOKEN_ENDPOINT)
            .auth(Auth::Session(session_id))
            .header(
                HeaderName::from_static(USER_ID_HEADER),
                HeaderValue::from(user_id),
            );
        let response = self.send_request(request).await?;
        response.decode_data::<String>("access token")
    }

    /// Create a user, log in as it and fetch its access token.
    ///
    /// `username` must be unique (max 12 chars); `None` or empty picks a random
    /// one. The password is always random. A failure part way leaves the user
    /// created on the server.
    pub async fn create_openai_user(&self, username: Option<&str>) -> Result<BaseUserInfo> {
        let username = match username.filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => self.random_string(GENERATED_USERNAME_LEN),
        };
        let password = self.random_string(GENERATED_PASSWORD_LEN);
        let credentials = UserCredentials::new(username, password);

        self.add_user(&credentials)
            .await
            .map_err(OneApiError::step("add user"))?;

        let session = self
            .login(&credentials)
            .await
            .map_err(OneApiError::step("login"))?;
        let identity: LoginIdentity =
            decode_value(&session.user, "login user").map_err(OneApiError::step("login"))?;

        let access_token = self
            .issue_access_token(identity.id, &session.session_id)
            .await
            .map_err(OneApiError::step("issue access token"))?;

        info!(user_id = identity.id, username = %identity.username, "Created one-api user");

        Ok(BaseUserInfo {
            id: identity.id,
            username: identity.username,
            display_name: identity.display_name,
            role: identity.role,
            status: identity.status,
            access_token,
        })
    }

    pub async fn get_user(&self, user_id: i64) -> Result<OneApiUser> {
        let request =
            Request::get(format!("{USER_ENDPOINT}{user_id}")).auth(self.system_auth()?);
        self.send_request(request).await?.decode_data("user")
    }

    /// Write back a full user record. The server only applies username,
    /// password, quota, status and role.
    pub async fn update_user(&self, user: &OneApiUser) -> Result<()> {
        let request = Request::put(USER_ENDPOINT)
            .auth(self.system_auth()?)
            .json(user)?;
        self.send_request(request).await?;
        Ok(())
    }

    /// Add `quota` (may be negative) to a user's remaining quota.
    ///
    /// Read-modify-write without any guard: a concurrent writer between the
    /// two calls loses its update.
    pub async fn add_user_quota(&self, user_id: i64, quota: i64) -> Result<()> {
        let mut user = self
            .get_user(user_id)
            .await
            .map_err(OneApiError::step("get user"))?;
        user.quota = user.quota.saturating_add(quota);
        self.update_user(&user)
            .await
            .map_err(OneApiError::step("update user quota"))?;
        info!(user_id, quota = user.quota, "Adjusted one-api user quota");
        Ok(())
    }
}
