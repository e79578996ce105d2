#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use storedesk::auth::{MemoryTokenStore, TokenPair, TokenStore};
use storedesk::client::ApiClient;
use storedesk::config::DeskConfig;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn config(server: &MockServer) -> DeskConfig {
    DeskConfig::builder()
        .base_url(server.uri())
        .request_timeout(Duration::from_secs(5))
        .keep_unused_for(Duration::from_secs(60))
        .build()
}

pub fn pair(access: &str, refresh: Option<&str>) -> TokenPair {
    TokenPair::new(access, refresh.map(ToString::to_string))
}

/// Client against `server` whose store starts with `initial`.
pub fn client_with(
    server: &MockServer,
    initial: Option<TokenPair>,
) -> (ApiClient, Arc<MemoryTokenStore>) {
    let store = Arc::new(match initial {
        Some(pair) => MemoryTokenStore::with_pair(pair),
        None => MemoryTokenStore::new(),
    });
    let client = ApiClient::with_store(config(server), store.clone() as Arc<dyn TokenStore>)
        .expect("client");
    (client, store)
}

/// Standard success envelope around `data`.
pub fn envelope(data: Value) -> Value {
    json!({"message": "ok", "statusCode": 200, "data": data})
}

pub fn list_body(ids: &[&str]) -> Value {
    let items: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
    envelope(json!({"items": items}))
}

pub fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "message": "jwt expired",
        "statusCode": 401
    }))
}

/// `POST /auth/refresh` with `refresh` answered by a rotated pair.
pub async fn mount_refresh(
    server: &MockServer,
    refresh: &str,
    rotated: (&str, &str),
    delay: Duration,
    expected: u64,
) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": refresh})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(envelope(json!({
                    "accessToken": rotated.0,
                    "refreshToken": rotated.1
                })))
                .set_delay(delay),
        )
        .expect(expected)
        .mount(server)
        .await;
}

/// `GET {route}` answered with `body` for `Bearer {token}` and 401 for `Bearer {stale}`.
pub async fn mount_guarded_get(server: &MockServer, route: &str, stale: &str, token: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("authorization", format!("Bearer {stale}").as_str()))
        .respond_with(unauthorized())
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}
