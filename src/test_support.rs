//! In-process stand-in for a one-api server, served by axum on 127.0.0.1:0.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{any, get, post},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};

use crate::client::OneApiClient;
use crate::config::ClientConfig;

pub const SYSTEM_TOKEN: &str = "root-system-token";

#[derive(Default)]
pub struct MockState {
    pub users: Vec<Value>,
    pub keys: Vec<Value>,
    /// session id -> user id
    pub sessions: HashMap<String, i64>,
    /// Answer token issuance with an object instead of a string
    pub token_as_object: bool,
    pub reject_key_creation: bool,
    counter: i64,
}

impl MockState {
    fn next_id(&mut self) -> i64 {
        self.counter += 1;
        self.counter
    }

    fn user_by_access_token(&self, headers: &HeaderMap) -> Option<i64> {
        let token = bearer(headers)?;
        self.users
            .iter()
            .find(|u| !token.is_empty() && u["access_token"] == token)
            .and_then(|u| u["id"].as_i64())
    }
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockServer {
    pub url: String,
    pub state: Shared,
}

impl MockServer {
    pub async fn spawn() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();

        let state: Shared = Arc::default();
        let app = Router::new()
            .route("/api/user/", post(create_user).put(update_user))
            .route("/api/user/login", post(login))
            .route("/api/user/token", get(issue_token))
            .route("/api/user/{id}", get(get_user))
            .route("/api/token/", post(create_key).get(list_keys))
            .route("/api/token/search", get(search_keys))
            .route("/echo", any(echo))
            .route("/fail", any(fail_with_session))
            .route("/garbage", any(garbage))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    pub fn client(&self) -> OneApiClient {
        // Fully explicit, so no env lookup races the env-mutating config test
        let config = ClientConfig::new(self.url.clone())
            .with_system_token(SYSTEM_TOKEN)
            .with_timeout(Duration::from_secs(10));
        OneApiClient::new(config)
            .unwrap()
            .with_rng(StdRng::seed_from_u64(7))
    }

    pub fn user_record(id: i64, username: &str, password: &str) -> Value {
        json!({
            "id": id,
            "username": username,
            "password": password,
            "display_name": username,
            "role": 1,
            "status": 1,
            "email": "",
            "github_id": "",
            "wechat_id": "",
            "verification_code": "",
            "access_token": "",
            "quota": 0,
            "used_quota": 0,
            "request_count": 0,
            "group": "default",
            "aff_code": format!("aff{id}"),
            "inviter_id": 0,
        })
    }
}

fn ok(data: Value) -> Response {
    Json(json!({"success": true, "message": "", "data": data})).into_response()
}

fn fail(message: &str) -> Response {
    Json(json!({"success": false, "message": message})).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn is_admin(headers: &HeaderMap) -> bool {
    bearer(headers) == Some(SYSTEM_TOKEN)
}

fn header_str(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn session_from_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie = header_str(headers, header::COOKIE)?;
    cookie.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == "session").then(|| value.to_string())
    })
}

fn without_password(user: &Value) -> Value {
    let mut user = user.clone();
    user["password"] = json!("");
    user
}

async fn create_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !is_admin(&headers) {
        return fail("unauthorized");
    }
    let mut state = state.lock().unwrap();
    let username = body["username"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();
    if username.is_empty() || password.is_empty() {
        return fail("invalid parameters");
    }
    if state.users.iter().any(|u| u["username"] == username.as_str()) {
        return fail("username already exists");
    }
    let id = state.next_id();
    let mut user = MockServer::user_record(id, &username, &password);
    if let Some(display) = body["display_name"].as_str().filter(|d| !d.is_empty()) {
        user["display_name"] = json!(display);
    }
    state.users.push(user);
    ok(Value::Null)
}

async fn update_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !is_admin(&headers) {
        return fail("unauthorized");
    }
    let mut state = state.lock().unwrap();
    let Some(user) = state.users.iter_mut().find(|u| u["id"] == body["id"]) else {
        return fail("user not found");
    };
    for field in ["username", "quota", "status", "role"] {
        user[field] = body[field].clone();
    }
    if body["password"].as_str().is_some_and(|p| !p.is_empty()) {
        user["password"] = body["password"].clone();
    }
    ok(Value::Null)
}

async fn get_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    if !is_admin(&headers) {
        return fail("unauthorized");
    }
    let state = state.lock().unwrap();
    match state.users.iter().find(|u| u["id"] == id) {
        Some(user) => ok(without_password(user)),
        None => fail("user not found"),
    }
}

async fn login(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    let Some(user) = state
        .users
        .iter()
        .find(|u| u["username"] == body["username"] && u["password"] == body["password"])
        .cloned()
    else {
        return fail("invalid username or password");
    };
    let id = user["id"].as_i64().unwrap_or_default();
    let session = format!("MTcw{}x{}", id, state.next_id());
    state.sessions.insert(session.clone(), id);
    let cookie = format!("session={session}; Path=/; Max-Age=2592000; HttpOnly; SameSite=Strict");
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({"success": true, "message": "", "data": without_password(&user)})),
    )
        .into_response()
}

async fn issue_token(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = state.lock().unwrap();
    let Some(session_user) =
        session_from_cookie(&headers).and_then(|s| state.sessions.get(&s).copied())
    else {
        return fail("not logged in");
    };
    let requested = header_str(&headers, "new-api-user").and_then(|v| v.parse::<i64>().ok());
    if requested != Some(session_user) {
        return fail("user id mismatch");
    }
    let token = format!("at{:030}", session_user * 7919 + state.next_id());
    let as_object = state.token_as_object;
    if let Some(user) = state.users.iter_mut().find(|u| u["id"] == session_user) {
        user["access_token"] = json!(token);
    }
    if as_object {
        ok(json!({"token": token}))
    } else {
        ok(json!(token))
    }
}

async fn create_key(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    let Some(user_id) = state.user_by_access_token(&headers) else {
        return fail("invalid access token");
    };
    if state.reject_key_creation {
        return fail("key creation disabled");
    }
    let id = state.next_id();
    let mut key = json!({
        "id": id,
        "user_id": user_id,
        "key": format!("sk{:046}", id * 104_729),
        "status": 1,
        "name": body["name"],
        "created_time": 1_700_000_000 + id,
        "accessed_time": 1_700_000_000 + id,
        "expired_time": body["expired_time"],
        "remain_quota": body["remain_quota"],
        "unlimited_quota": body["unlimited_quota"],
        "used_quota": 0,
    });
    // Older servers omit these columns when unset
    if let Some(models) = body["model_limits"].as_str().filter(|m| !m.is_empty()) {
        key["models"] = json!(models);
    }
    if let Some(subnet) = body["allow_ips"].as_str().filter(|s| !s.is_empty()) {
        key["subnet"] = json!(subnet);
    }
    state.keys.push(key);
    ok(Value::Null)
}

fn keys_of(state: &MockState, user_id: i64, keyword: Option<&str>) -> Value {
    let keys: Vec<Value> = state
        .keys
        .iter()
        .filter(|k| k["user_id"] == user_id)
        .filter(|k| {
            keyword.is_none_or(|kw| k["name"].as_str().is_some_and(|name| name.contains(kw)))
        })
        .cloned()
        .collect();
    Value::Array(keys)
}

async fn list_keys(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = state.lock().unwrap();
    match state.user_by_access_token(&headers) {
        Some(user_id) => ok(keys_of(&state, user_id, None)),
        None => fail("invalid access token"),
    }
}

async fn search_keys(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let state = state.lock().unwrap();
    let keyword = query.get("keyword").map(String::as_str).unwrap_or_default();
    match state.user_by_access_token(&headers) {
        Some(user_id) => ok(keys_of(&state, user_id, Some(keyword))),
        None => fail("invalid access token"),
    }
}

async fn echo(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> Response {
    let seen = json!({
        "method": method.as_str(),
        "query": query,
        "body": body,
        "content_type": header_str(&headers, header::CONTENT_TYPE),
        "authorization": header_str(&headers, header::AUTHORIZATION),
        "cookie": header_str(&headers, header::COOKIE),
        "user_agent": header_str(&headers, header::USER_AGENT),
    });
    (
        [(header::SET_COOKIE, "session=echo-session; Path=/; HttpOnly")],
        Json(json!({"success": true, "message": "", "data": seen})),
    )
        .into_response()
}

async fn fail_with_session() -> Response {
    (
        StatusCode::BAD_REQUEST,
        AppendHeaders([
            (header::SET_COOKIE, "theme=dark; Path=/"),
            (header::SET_COOKIE, "session=fail-session; Path=/"),
        ]),
        Json(json!({"success": false, "message": "quota exceeded", "data": {"partial": true}})),
    )
        .into_response()
}

async fn garbage() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        [(header::SET_COOKIE, "session=garbage-session; Path=/")],
        "<html>upstream down</html>",
    )
        .into_response()
}
