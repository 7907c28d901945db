//! Integration tests for the Hearth server: login, admission, delivery,
//! and retirement over real websockets.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hearth::prelude::*;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Fixtures
// =========================================================================

const ACCOUNTS: [(&str, &str); 2] = [("a@x.com", "secret"), ("b@x.com", "hunter2")];

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Forwards inbound client messages to the test.
struct Forward(mpsc::UnboundedSender<(Identity, String)>);

impl InboundHandler for Forward {
    fn handle(&self, identity: &Identity, message: String) {
        let _ = self.0.send((identity.clone(), message));
    }
}

/// Holds the registry lock for `delay` whenever `slow` comes online.
struct SlowArrival {
    slow: &'static str,
    delay: Duration,
}

impl PresenceHook for SlowArrival {
    fn on_arrival(&self, identity: &Identity) -> Option<String> {
        if identity.as_str() == self.slow {
            std::thread::sleep(self.delay);
        }
        None
    }

    fn on_departure(&self, _identity: &Identity) -> Option<String> {
        None
    }
}

fn gatekeeper() -> Gatekeeper {
    let store = CredentialStore::seed(HashCost::cheap(), ACCOUNTS).expect("seed accounts");
    let tokens = TokenIssuer::new(b"server-test-secret", Duration::from_secs(300));
    Gatekeeper::new(Arc::new(store), Arc::new(tokens))
}

fn builder() -> HearthServerBuilder {
    HearthServerBuilder::new()
        .bind("127.0.0.1:0")
        .identities(ACCOUNTS.map(|(identity, _)| identity))
}

/// Starts a server on a random port. Returns its address and registry.
async fn start(builder: HearthServerBuilder) -> (String, Arc<Registry>) {
    let server = builder
        .build(gatekeeper())
        .await
        .expect("server should build");
    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let registry = Arc::clone(server.registry());

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    (addr, registry)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send_frame(ws: &mut ClientWs, frame: &ClientFrame) {
    let text = serde_json::to_string(frame).unwrap();
    ws.send(Message::text(text)).await.unwrap();
}

/// Next text frame, or `None` once the server closes the socket.
async fn next_text(ws: &mut ClientWs) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.as_str().to_owned()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("server should answer in time")
}

async fn next_frame(ws: &mut ClientWs) -> ServerFrame {
    let text = next_text(ws).await.expect("expected a frame");
    serde_json::from_str(&text).expect("should be a server frame")
}

/// Logs in with a password and returns the socket plus the welcome.
async fn login(addr: &str, identity: &str, password: &str) -> (ClientWs, ConnectionId, String) {
    let mut ws = connect(addr).await;
    send_frame(
        &mut ws,
        &ClientFrame::Login {
            identity: identity.into(),
            password: password.into(),
        },
    )
    .await;
    match next_frame(&mut ws).await {
        ServerFrame::Welcome {
            identity: welcomed,
            connection_id,
            token,
        } => {
            assert_eq!(welcomed.as_str(), identity);
            (ws, connection_id, token)
        }
        other => panic!("expected Welcome, got {other:?}"),
    }
}

async fn wait_for_connections(registry: &Registry, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.connection_count().await.unwrap() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count should settle");
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test]
async fn test_login_correct_password_is_welcomed() {
    let (addr, registry) = start(builder()).await;

    let (_ws, id, token) = login(&addr, "a@x.com", "secret").await;

    assert_eq!(id, ConnectionId(0));
    assert!(!token.is_empty());
    assert_eq!(registry.connections_of("a@x.com").await.unwrap(), vec![id]);
}

#[tokio::test]
async fn test_login_wrong_password_is_rejected_and_closed() {
    let (addr, registry) = start(builder()).await;
    let mut ws = connect(&addr).await;

    send_frame(
        &mut ws,
        &ClientFrame::Login {
            identity: "a@x.com".into(),
            password: "wrong".into(),
        },
    )
    .await;

    assert_eq!(
        next_frame(&mut ws).await,
        ServerFrame::Rejected {
            reason: "invalid identity or password".into()
        }
    );
    assert_eq!(next_text(&mut ws).await, None);
    assert_eq!(registry.connection_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_login_unknown_identity_gets_same_rejection() {
    let (addr, _registry) = start(builder()).await;
    let mut ws = connect(&addr).await;

    send_frame(
        &mut ws,
        &ClientFrame::Login {
            identity: "nobody@x.com".into(),
            password: "secret".into(),
        },
    )
    .await;

    assert_eq!(
        next_frame(&mut ws).await,
        ServerFrame::Rejected {
            reason: "invalid identity or password".into()
        }
    );
}

#[tokio::test]
async fn test_login_with_token_from_earlier_login_is_welcomed() {
    let (addr, _registry) = start(builder()).await;
    let (_first, _, token) = login(&addr, "b@x.com", "hunter2").await;

    let mut second = connect(&addr).await;
    send_frame(&mut second, &ClientFrame::Token { token }).await;

    match next_frame(&mut second).await {
        ServerFrame::Welcome {
            identity,
            connection_id,
            ..
        } => {
            assert_eq!(identity.as_str(), "b@x.com");
            assert_eq!(connection_id, ConnectionId(1));
        }
        other => panic!("expected Welcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_login_malformed_frame_is_rejected() {
    let (addr, _registry) = start(builder()).await;
    let mut ws = connect(&addr).await;

    ws.send(Message::text("hello?")).await.unwrap();

    assert!(matches!(
        next_frame(&mut ws).await,
        ServerFrame::Rejected { .. }
    ));
    assert_eq!(next_text(&mut ws).await, None);
}

#[tokio::test]
async fn test_login_silence_times_out() {
    let (addr, _registry) =
        start(builder().handshake_timeout(Duration::from_millis(100))).await;
    let mut ws = connect(&addr).await;

    match next_frame(&mut ws).await {
        ServerFrame::Rejected { reason } => assert!(reason.contains("timed out")),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_upgrade_from_disallowed_origin_is_refused() {
    let (addr, _registry) = start(builder().allowed_origins(["https://play.example"])).await;

    let mut request =
        tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(format!(
            "ws://{addr}"
        ))
        .unwrap();
    request
        .headers_mut()
        .insert("origin", "https://evil.example".parse().unwrap());

    assert!(tokio_tungstenite::connect_async(request).await.is_err());
}

#[tokio::test]
async fn test_silent_socket_does_not_delay_other_logins() {
    let (addr, _registry) = start(builder()).await;

    // Opens TCP and never sends the upgrade request.
    let _silent = tokio::net::TcpStream::connect(&addr).await.unwrap();

    let welcomed = tokio::time::timeout(
        Duration::from_secs(1),
        login(&addr, "a@x.com", "secret"),
    )
    .await;
    assert!(welcomed.is_ok(), "login waited behind the silent socket");
}

// =========================================================================
// Delivery
// =========================================================================

#[tokio::test]
async fn test_notify_everyone_reaches_every_socket() {
    let (addr, registry) = start(builder()).await;
    let (mut a1, _, _) = login(&addr, "a@x.com", "secret").await;
    let (mut a2, _, _) = login(&addr, "a@x.com", "secret").await;
    let (mut b, _, _) = login(&addr, "b@x.com", "hunter2").await;

    assert_eq!(registry.notify_everyone("hi").await.unwrap(), 3);

    assert_eq!(next_text(&mut a1).await.as_deref(), Some("hi"));
    assert_eq!(next_text(&mut a2).await.as_deref(), Some("hi"));
    assert_eq!(next_text(&mut b).await.as_deref(), Some("hi"));
}

#[tokio::test]
async fn test_to_player_reaches_only_that_identity() {
    let (addr, registry) = start(builder()).await;
    let (mut a, _, _) = login(&addr, "a@x.com", "secret").await;
    let (mut b, _, _) = login(&addr, "b@x.com", "hunter2").await;

    registry.to_player("b@x.com", "just you").await.unwrap();
    registry.notify_everyone("everyone").await.unwrap();

    assert_eq!(next_text(&mut b).await.as_deref(), Some("just you"));
    assert_eq!(next_text(&mut b).await.as_deref(), Some("everyone"));
    assert_eq!(next_text(&mut a).await.as_deref(), Some("everyone"));
}

#[tokio::test]
async fn test_client_text_reaches_inbound_handler() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (addr, _registry) = start(builder().inbound_handler(Forward(tx))).await;
    let (mut first, _, _) = login(&addr, "a@x.com", "secret").await;
    let (mut second, _, _) = login(&addr, "a@x.com", "secret").await;

    first.send(Message::text("look")).await.unwrap();
    let (identity, message) = rx.recv().await.unwrap();
    assert_eq!((identity.as_str(), message.as_str()), ("a@x.com", "look"));

    second.send(Message::text("north")).await.unwrap();
    let (identity, message) = rx.recv().await.unwrap();
    assert_eq!((identity.as_str(), message.as_str()), ("a@x.com", "north"));
}

#[tokio::test]
async fn test_presence_announces_arrivals_to_others() {
    let (addr, _registry) = start(builder().presence(Announce)).await;
    let (mut b, _, _) = login(&addr, "b@x.com", "hunter2").await;
    assert_eq!(
        next_text(&mut b).await.as_deref(),
        Some("b@x.com has connected.")
    );

    let (a, _, _) = login(&addr, "a@x.com", "secret").await;
    assert_eq!(
        next_text(&mut b).await.as_deref(),
        Some("a@x.com has connected.")
    );

    drop(a);
    assert_eq!(
        next_text(&mut b).await.as_deref(),
        Some("a@x.com has disconnected.")
    );
}

// =========================================================================
// Retirement
// =========================================================================

#[tokio::test]
async fn test_client_close_disconnects_connection() {
    let (addr, registry) = start(builder()).await;
    let (mut first, first_id, _) = login(&addr, "a@x.com", "secret").await;
    let (_second, second_id, _) = login(&addr, "a@x.com", "secret").await;
    wait_for_connections(&registry, 2).await;

    first.close(None).await.unwrap();
    wait_for_connections(&registry, 1).await;

    assert_eq!(
        registry.connections_of("a@x.com").await.unwrap(),
        vec![second_id]
    );
    assert!(registry.identity_of(first_id).await.is_err());
    assert!(registry.is_online("a@x.com").await.unwrap());
}

#[tokio::test]
async fn test_dropped_socket_takes_identity_offline() {
    let (addr, registry) = start(builder()).await;
    let (ws, _, _) = login(&addr, "b@x.com", "hunter2").await;
    wait_for_connections(&registry, 1).await;

    drop(ws);
    wait_for_connections(&registry, 0).await;

    assert!(!registry.is_online("b@x.com").await.unwrap());
    assert!(registry.to_player("b@x.com", "anyone?").await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_socket_dropped_while_registry_is_contended_is_still_retired() {
    let config = RegistryConfig {
        lock_timeout_ms: Some(50),
        ..RegistryConfig::default()
    };
    let hook = SlowArrival {
        slow: "a@x.com",
        delay: Duration::from_millis(300),
    };
    let (addr, registry) = start(builder().registry_config(config).presence(hook)).await;
    let (b, b_id, _) = login(&addr, "b@x.com", "hunter2").await;

    let arriving = tokio::spawn({
        let addr = addr.clone();
        async move { login(&addr, "a@x.com", "secret").await }
    });
    // a@x.com's arrival now holds the lock for longer than the wait bound.
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(b);
    let (_a, _, _) = arriving.await.unwrap();

    wait_for_connections(&registry, 1).await;
    assert!(registry.identity_of(b_id).await.is_err());
    assert!(!registry.is_online("b@x.com").await.unwrap());
}
