use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{
        Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use tandem_api::auth::create_token;
use tandem_api::{AppState, AppStateInner, router};
use tandem_db::Database;
use tandem_delivery::{DeliveryConfig, DeliveryCoordinator, SqliteStore};
use tandem_gateway::{ConnectionHandle, ConnectionRegistry};

const SECRET: &str = "api-test-secret";

struct TestApp {
    router: Router,
    state: AppState,
}

struct TestResponse {
    status: StatusCode,
    json: Value,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().expect("open in-memory db"));
        let delivery = DeliveryCoordinator::new(
            Arc::new(SqliteStore::new(db)),
            ConnectionRegistry::new(),
            DeliveryConfig::default(),
        );
        let state: AppState = Arc::new(AppStateInner {
            delivery,
            jwt_secret: SECRET.into(),
            outbound_buffer: 16,
        });

        Self {
            router: router(state.clone()),
            state,
        }
    }

    fn token(user_id: i64) -> String {
        create_token(SECRET, user_id, chrono::Duration::minutes(10)).expect("mint token")
    }

    async fn request(&self, method: Method, uri: &str, body: Option<Value>, token: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let body = match body {
            Some(json_body) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json_body).expect("serialize body"))
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("dispatch request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse { status, json }
    }

    async fn send(&self, from: i64, to: i64, content: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/api/v1/messages/send",
            Some(json!({ "recipient_id": to, "content": content })),
            Some(&Self::token(from)),
        )
        .await
    }

    async fn history(&self, as_user: i64, query: &str) -> TestResponse {
        self.request(
            Method::GET,
            &format!("/api/v1/messages/history?{}", query),
            None,
            Some(&Self::token(as_user)),
        )
        .await
    }
}

#[tokio::test]
async fn send_returns_persisted_message() {
    let app = TestApp::new();

    let res = app.send(1, 2, "hi").await;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.json["id"].as_i64().unwrap() > 0);
    assert_eq!(res.json["sender_id"], 1);
    assert_eq!(res.json["content"], "hi");
    assert!(res.json["created_at"].is_string());
}

#[tokio::test]
async fn history_lists_newest_first() {
    let app = TestApp::new();
    let mut conversation_id = 0;
    for text in ["1", "2", "3"] {
        conversation_id = app.send(1, 2, text).await.json["conversation_id"].as_i64().unwrap();
    }

    let res = app.history(2, &format!("conversation_id={}", conversation_id)).await;
    assert_eq!(res.status, StatusCode::OK);
    let contents: Vec<&str> = res
        .json
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["3", "2", "1"]);

    let res = app
        .history(1, &format!("conversation_id={}&limit=1&offset=1", conversation_id))
        .await;
    assert_eq!(res.json.as_array().unwrap().len(), 1);
    assert_eq!(res.json[0]["content"], "2");
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let app = TestApp::new();
    let body = Some(json!({ "recipient_id": 2, "content": "hi" }));

    let res = app.request(Method::POST, "/api/v1/messages/send", body.clone(), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.json["error"], "Unauthorized");

    let res = app
        .request(Method::POST, "/api/v1/messages/send", body, Some("not-a-jwt"))
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn self_send_is_bad_request() {
    let app = TestApp::new();
    let res = app.send(3, 3, "me").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert!(res.json["message"].as_str().unwrap().contains("yourself"));
}

#[tokio::test]
async fn empty_content_is_bad_request() {
    let app = TestApp::new();
    assert_eq!(app.send(1, 2, "").await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = TestApp::new();
    let res = app
        .request(
            Method::POST,
            "/api/v1/messages/send",
            Some(json!({ "recipient_id": "two", "content": "hi" })),
            Some(&TestApp::token(1)),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .request(
            Method::POST,
            "/api/v1/messages/send",
            Some(json!({ "recipient_id": 2, "content": "hi", "created_at": "2020-01-01T00:00:00Z" })),
            Some(&TestApp::token(1)),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn outsider_cannot_read_history() {
    let app = TestApp::new();
    let conversation_id = app.send(1, 2, "private").await.json["conversation_id"].as_i64().unwrap();

    let res = app.history(9, &format!("conversation_id={}", conversation_id)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    let app = TestApp::new();
    let res = app.history(1, "conversation_id=12345").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.history(1, "limit=5").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn connected_recipient_is_pushed_on_send() {
    let app = TestApp::new();
    let (handle, mut rx) = ConnectionHandle::new(4);
    app.state.delivery.registry().register(2, handle).await;

    let res = app.send(1, 2, "ding").await;
    assert_eq!(res.status, StatusCode::OK);

    let frame: Value = serde_json::from_str(&rx.recv().await.expect("pushed frame")).unwrap();
    assert_eq!(frame["type"], "MessageCreate");
    assert_eq!(frame["data"]["message"]["id"], res.json["id"]);
}

#[tokio::test]
async fn health_reports_database() {
    let app = TestApp::new();
    let res = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json["status"], "ok");
    assert_eq!(res.json["service"], "tandem");
    assert_eq!(res.json["database"], "ok");
}
