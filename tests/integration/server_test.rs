// tests/integration/server_test.rs

use super::test_helpers::{EchoPlugin, TestClient, TestServer, test_config};
use hookline::connection::replies;
use hookline::core::kv::KeyValueStore;
use hookline::plugin::{Plugin, Registrar};
use std::path::PathBuf;

#[tokio::test]
async fn test_echo_replies_with_full_payload() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    let line = r#"{"cmd":"echo","data":"x"}"#;
    assert_eq!(client.request(line).await, format!("echo: {line}"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_line_keeps_connection_open() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    assert_eq!(client.request("this is not json").await, replies::MALFORMED);
    assert_eq!(client.request(r#"{"data":"no cmd"}"#).await, replies::MALFORMED);
    assert_eq!(client.request(r#"{"cmd":42}"#).await, replies::MALFORMED);
    assert_eq!(client.request(r#"["cmd","ping"]"#).await, replies::MALFORMED);
    assert_eq!(client.request(r#"{"cmd":"ping"}"#).await, "pong");

    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_utf8_line_is_malformed_and_keeps_connection_open() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    client.send_raw(b"\xff\xfe not json\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some(replies::MALFORMED));
    client.send_raw(b"{\"cmd\":\"echo\",\"data\":\"\xc3\"}\r\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some(replies::MALFORMED));
    assert_eq!(client.request(r#"{"cmd":"ping"}"#).await, "pong");

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_command() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    assert_eq!(
        client.request(r#"{"cmd":"nope"}"#).await,
        replies::UNKNOWN_COMMAND
    );
    // Command names are case-sensitive.
    assert_eq!(
        client.request(r#"{"cmd":"PING"}"#).await,
        replies::UNKNOWN_COMMAND
    );
    assert_eq!(client.request(r#"{"cmd":"ping"}"#).await, "pong");

    server.shutdown().await;
}

#[tokio::test]
async fn test_crlf_terminated_lines_are_accepted() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    client.send_raw(b"{\"cmd\":\"echo\"}\r\n").await;
    assert_eq!(
        client.read_line().await.as_deref(),
        Some(r#"echo: {"cmd":"echo"}"#)
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_pipelined_requests_are_answered_in_order() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    let mut batch = String::new();
    for i in 0..50 {
        batch.push_str(&format!("{{\"cmd\":\"echo\",\"n\":{i}}}\n"));
        batch.push_str("{\"cmd\":\"ping\"}\n");
    }
    client.send_raw(batch.as_bytes()).await;

    for i in 0..50 {
        assert_eq!(
            client.read_line().await.unwrap(),
            format!("echo: {{\"cmd\":\"echo\",\"n\":{i}}}")
        );
        assert_eq!(client.read_line().await.unwrap(), "pong");
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_login_and_session_use_the_store() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    assert_eq!(
        client.request(r#"{"cmd":"login","token":"abc"}"#).await,
        "login: ok"
    );
    assert_eq!(server.store.get("sess:abc").as_deref(), Some("valid"));

    assert_eq!(
        client.request(r#"{"cmd":"session","token":"abc"}"#).await,
        "session: valid"
    );
    assert_eq!(
        client.request(r#"{"cmd":"session","token":"other"}"#).await,
        "session: none"
    );
    assert_eq!(
        client.request(r#"{"cmd":"login"}"#).await,
        "login: missing token"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_quit_says_bye_and_closes() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    assert_eq!(client.request(r#"{"cmd":"quit"}"#).await, "bye");
    assert_eq!(client.read_line().await, None);
    server.wait_for_clients(0).await;

    server.shutdown().await;
}

#[tokio::test]
async fn test_clients_counts_live_connections() {
    let server = TestServer::start().await;
    let mut first = server.connect().await;
    let mut second = server.connect().await;
    assert_eq!(second.request(r#"{"cmd":"ping"}"#).await, "pong");
    server.wait_for_clients(2).await;

    assert_eq!(first.request(r#"{"cmd":"clients"}"#).await, "clients: 2");

    drop(second);
    server.wait_for_clients(1).await;
    assert_eq!(first.request(r#"{"cmd":"clients"}"#).await, "clients: 1");

    server.shutdown().await;
}

#[tokio::test]
async fn test_overlong_line_is_rejected_and_closed() {
    let mut config = test_config();
    config.max_line_length = 64;
    let server = TestServer::start_with(config, |builder| builder.with_plugin(EchoPlugin)).await;
    let mut client = server.connect().await;

    let long = format!(r#"{{"cmd":"echo","data":"{}"}}"#, "x".repeat(200));
    client.send_line(&long).await;
    assert_eq!(
        client.read_line().await.as_deref(),
        Some(replies::LINE_TOO_LONG)
    );
    assert_eq!(client.read_line().await, None);

    // Other connections are unaffected.
    let mut other = server.connect().await;
    assert_eq!(other.request(r#"{"cmd":"ping"}"#).await, "pong");

    server.shutdown().await;
}

#[tokio::test]
async fn test_connections_over_the_limit_are_refused() {
    let mut config = test_config();
    config.max_clients = 1;
    let server = TestServer::start_with(config, |builder| builder).await;

    let mut first = server.connect().await;
    assert_eq!(first.request(r#"{"cmd":"ping"}"#).await, "pong");

    let mut second = server.connect().await;
    assert_eq!(second.read_line().await.as_deref(), Some(replies::MAX_CLIENTS));
    assert_eq!(second.read_line().await, None);

    assert_eq!(first.request(r#"{"cmd":"quit"}"#).await, "bye");
    server.wait_for_clients(0).await;

    let mut third = server.connect().await;
    assert_eq!(third.request(r#"{"cmd":"ping"}"#).await, "pong");

    server.shutdown().await;
}

struct PanickingPlugin;

impl Plugin for PanickingPlugin {
    fn name(&self) -> &str {
        "boom"
    }

    fn initialize(&self, registrar: &mut Registrar) {
        registrar.register("boom", |_conn, _payload| panic!("handler exploded"));
    }
}

#[tokio::test]
async fn test_panicking_handler_reports_internal_error() {
    let server =
        TestServer::start_with(test_config(), |builder| builder.with_plugin(PanickingPlugin))
            .await;
    let mut client = server.connect().await;

    assert_eq!(client.request(r#"{"cmd":"boom"}"#).await, replies::INTERNAL);
    assert_eq!(client.request(r#"{"cmd":"ping"}"#).await, "pong");

    server.shutdown().await;
}

struct ShadowingPlugin;

impl Plugin for ShadowingPlugin {
    fn name(&self) -> &str {
        "shadow"
    }

    fn initialize(&self, registrar: &mut Registrar) {
        registrar.register("ping", |conn, _payload| {
            conn.send("pong from plugin");
        });
    }
}

#[tokio::test]
async fn test_plugin_can_shadow_builtin() {
    let server =
        TestServer::start_with(test_config(), |builder| builder.with_plugin(ShadowingPlugin))
            .await;
    let mut client = server.connect().await;

    assert_eq!(client.request(r#"{"cmd":"ping"}"#).await, "pong from plugin");

    server.shutdown().await;
}

#[tokio::test]
async fn test_missing_plugin_module_does_not_block_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.plugins.paths = vec![
        dir.path().join("missing.so"),
        PathBuf::from("/nonexistent/also-missing.so"),
    ];
    let server = TestServer::start_with(config, |builder| builder.with_plugin(EchoPlugin)).await;

    for builtin in ["clients", "login", "ping", "quit", "session"] {
        assert!(server.commands.iter().any(|c| c == builtin), "{builtin} missing");
    }
    let mut client = server.connect().await;
    assert_eq!(client.request(r#"{"cmd":"ping"}"#).await, "pong");
    assert_eq!(
        client.request(r#"{"cmd":"echo"}"#).await,
        r#"echo: {"cmd":"echo"}"#
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_notifies_connected_clients() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    assert_eq!(client.request(r#"{"cmd":"ping"}"#).await, "pong");
    let addr = server.addr;

    server.shutdown().await;

    assert_eq!(
        client.read_line().await.as_deref(),
        Some(replies::SHUTTING_DOWN)
    );
    assert_eq!(client.read_line().await, None);

    // The listener is gone.
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_connections_are_independent() {
    let server = TestServer::start().await;
    let mut clients = Vec::new();
    for _ in 0..8 {
        clients.push(server.connect().await);
    }

    let mut tasks = Vec::new();
    for (i, mut client) in clients.into_iter().enumerate() {
        tasks.push(tokio::spawn(async move {
            for j in 0..20 {
                let line = format!(r#"{{"cmd":"echo","client":{i},"seq":{j}}}"#);
                assert_eq!(client.request(&line).await, format!("echo: {line}"));
            }
            client
        }));
    }
    let mut done: Vec<TestClient> = Vec::new();
    for task in tasks {
        done.push(task.await.unwrap());
    }
    assert_eq!(server.state.client_count(), 8);

    drop(done);
    server.wait_for_clients(0).await;
    server.shutdown().await;
}
