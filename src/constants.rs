use std::time::Duration;

/// User collection: POST creates, PUT updates (system token)
pub const USER_ENDPOINT: &str = "/api/user/";

/// Username/password login, returns the `session` cookie
pub const LOGIN_ENDPOINT: &str = "/api/user/login";

/// Access token issuance (session cookie + `New-Api-User` header)
pub const ACCESS_TOKEN_ENDPOINT: &str = "/api/user/token";

/// API key collection: POST creates, GET lists (user access token)
pub const KEY_ENDPOINT: &str = "/api/token/";

/// API key search by name keyword
pub const KEY_SEARCH_ENDPOINT: &str = "/api/token/search";

/// Cookie carrying the login session
pub const SESSION_COOKIE: &str = "session";

/// Header carrying the target user id on access token issuance (`New-Api-User`)
pub const USER_ID_HEADER: &str = "new-api-user";

/// Content type of every non-GET request body
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Server base URL fallback
pub const ENV_SERVER_URL: &str = "ONE_API_URL";

/// System (admin) token fallback
pub const ENV_SYSTEM_TOKEN: &str = "ONE_API_SYSTEM_TOKEN";

/// Request timeout in seconds, used when none is set explicitly
pub const ENV_HTTP_TIMEOUT_SECS: &str = "ONE_API_HTTP_TIMEOUT_SECS";

/// Request timeout when neither explicit nor from the environment
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Server side limit on username length
pub const GENERATED_USERNAME_LEN: usize = 12;

/// Length of passwords generated for bootstrapped users
pub const GENERATED_PASSWORD_LEN: usize = 20;

/// Name of the key created by `provision_openai_user`
pub const DEFAULT_KEY_NAME: &str = "default";

/// `expired_time` value meaning the key never expires
pub const NEVER_EXPIRES: i64 = -1;
