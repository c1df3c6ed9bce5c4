use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{
        Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use futures_util::StreamExt;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

use tandem_api::auth::create_token;
use tandem_db::Database;
use tandem_server::config::Config;
use tandem_types::events::GatewayEvent;

const SECRET: &str = "e2e-test-secret-value";
const WAIT: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    router: Router,
    ws_base: String,
}

impl TestServer {
    async fn start() -> Self {
        let config = Config::from_vars(|key| match key {
            "TANDEM_JWT_SECRET" => Some(SECRET.into()),
            "TANDEM_HOST" => Some("127.0.0.1".into()),
            "TANDEM_PORT" => Some("0".into()),
            _ => None,
        })
        .expect("test config");

        let db = Database::open_in_memory().expect("open in-memory db");
        let router = tandem_server::app(tandem_server::build_state(&config, db));

        let listener = tokio::net::TcpListener::bind(config.bind_addr().unwrap())
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let served = router.clone();
        tokio::spawn(async move {
            axum::serve(listener, served).await.expect("serve");
        });

        Self {
            router,
            ws_base: format!("ws://{}/ws", addr),
        }
    }

    fn token(user_id: i64) -> String {
        create_token(SECRET, user_id, chrono::Duration::minutes(10)).unwrap()
    }

    async fn connect(&self, user_id: i64) -> Socket {
        let url = format!("{}?token={}", self.ws_base, Self::token(user_id));
        let (mut socket, _) = connect_async(url.as_str()).await.expect("ws connect");

        let ready = next_event(&mut socket).await;
        assert_eq!(ready, GatewayEvent::Ready { user_id });
        socket
    }

    async fn send(&self, from: i64, to: i64, content: &str) -> Value {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/messages/send")
            .header(AUTHORIZATION, format!("Bearer {}", Self::token(from)))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "recipient_id": to, "content": content }).to_string(),
            ))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}

/// Next text frame as a gateway event, skipping control frames.
async fn next_event(socket: &mut Socket) -> GatewayEvent {
    loop {
        let frame = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("frame before timeout")
            .expect("socket open")
            .expect("frame ok");

        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("gateway event json");
        }
    }
}

/// Whether the server ends the socket (close frame or EOF) within `WAIT`.
async fn closed_by_server(socket: &mut Socket) -> bool {
    let outcome = tokio::time::timeout(WAIT, async {
        loop {
            match socket.next().await {
                None | Some(Ok(WsMessage::Close(_))) | Some(Err(_)) => return true,
                Some(Ok(WsMessage::Text(_))) => return false,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    outcome.unwrap_or(false)
}

#[tokio::test]
async fn online_recipient_receives_message_over_websocket() {
    let server = TestServer::start().await;
    let mut bob = server.connect(2).await;

    let sent = server.send(1, 2, "hello bob").await;

    match next_event(&mut bob).await {
        GatewayEvent::MessageCreate { message } => {
            assert_eq!(message.id, sent["id"].as_i64().unwrap());
            assert_eq!(message.sender_id, 1);
            assert_eq!(message.content, "hello bob");
        }
        other => panic!("expected MessageCreate, got {:?}", other),
    }
}

#[tokio::test]
async fn sender_socket_gets_nothing() {
    let server = TestServer::start().await;
    let mut alice = server.connect(1).await;

    server.send(1, 2, "to someone offline").await;

    let frame = tokio::time::timeout(Duration::from_millis(200), alice.next()).await;
    assert!(frame.is_err(), "sender should not be pushed its own message");
}

#[tokio::test]
async fn reconnect_closes_previous_socket() {
    let server = TestServer::start().await;
    let mut first = server.connect(3).await;
    let mut second = server.connect(3).await;

    assert!(closed_by_server(&mut first).await);

    server.send(1, 3, "latest only").await;
    match next_event(&mut second).await {
        GatewayEvent::MessageCreate { message } => assert_eq!(message.content, "latest only"),
        other => panic!("expected MessageCreate, got {:?}", other),
    }
}

#[tokio::test]
async fn bearer_header_is_accepted_on_upgrade() {
    let server = TestServer::start().await;

    let mut request = server.ws_base.as_str().into_client_request().unwrap();
    request.headers_mut().insert(
        AUTHORIZATION,
        format!("Bearer {}", TestServer::token(4)).parse().unwrap(),
    );
    let (mut socket, _) = connect_async(request).await.expect("ws connect");

    assert_eq!(next_event(&mut socket).await, GatewayEvent::Ready { user_id: 4 });
}

#[tokio::test]
async fn upgrade_without_valid_token_is_rejected() {
    let server = TestServer::start().await;

    for url in [
        server.ws_base.clone(),
        format!("{}?token=garbage", server.ws_base),
    ] {
        match connect_async(url.as_str()).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), StatusCode::UNAUTHORIZED)
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("upgrade should be refused"),
        }
    }
}
