// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use hookline::config::Config;
use hookline::core::kv::{KeyValueStore, MemoryStore};
use hookline::core::state::ServerState;
use hookline::plugin::{Plugin, Registrar};
use hookline::server::ServerBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Upper bound on any single wait in these tests.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A config that binds an ephemeral port, uses no external store and loads no modules.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.port = 0;
    config.store.enabled = false;
    config.plugins.dir = None;
    config.shutdown_grace = Duration::from_secs(2);
    config
}

fn init_tracing() {
    // Ignore the error if another test already installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A server running in the background on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<MemoryStore>,
    pub state: Arc<ServerState>,
    pub commands: Vec<String>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Starts a server with the built-in commands and the test echo plugin.
    pub async fn start() -> Self {
        Self::start_with(test_config(), |builder| builder.with_plugin(EchoPlugin)).await
    }

    /// Starts a server from `config`, letting the caller add plugins.
    pub async fn start_with<F>(config: Config, customize: F) -> Self
    where
        F: FnOnce(ServerBuilder) -> ServerBuilder,
    {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn KeyValueStore> = store.clone();
        let builder = ServerBuilder::new(config).with_store(shared);
        let server = customize(builder)
            .bind()
            .await
            .expect("server should bind");

        let addr = server.local_addr().expect("listener should have an address");
        let state = server.state();
        let commands = server.commands();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            store,
            state,
            commands,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Waits until the live-connection set holds exactly `n` connections.
    pub async fn wait_for_clients(&self, n: usize) {
        tokio::time::timeout(IO_TIMEOUT, async {
            while self.state.client_count() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {} clients, found {}",
                n,
                self.state.client_count()
            )
        });
    }

    /// Requests a graceful shutdown and waits for it to complete.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(IO_TIMEOUT, handle)
                .await
                .expect("server should shut down in time")
                .expect("server task should not panic");
        }
    }
}

/// A line-oriented test client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("client should connect");
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    /// Sends `line` followed by a newline.
    pub async fn send_line(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer
            .write_all(bytes)
            .await
            .expect("write should succeed");
    }

    /// Reads one reply line without its newline. `None` means the server
    /// closed the connection.
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(IO_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a reply")
            .unwrap_or(0);
        if n == 0 {
            return None;
        }
        Some(line.trim_end_matches('\n').to_string())
    }

    /// Sends one line and returns the first reply.
    pub async fn request(&mut self, line: &str) -> String {
        self.send_line(line).await;
        self.read_line()
            .await
            .expect("connection closed before a reply arrived")
    }
}

/// Replies to `echo` with the full payload, like the bundled echo plugin.
pub struct EchoPlugin;

impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        "test-echo"
    }

    fn initialize(&self, registrar: &mut Registrar) {
        registrar.register("echo", |conn, payload| {
            conn.send(format!("echo: {payload}"));
        });
    }
}
