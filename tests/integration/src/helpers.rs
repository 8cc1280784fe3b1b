//! Test helpers for integration tests
//!
//! Provides a gateway bound to an ephemeral port and a small WebSocket client
//! that speaks the gateway protocol.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chat_common::{
    AppConfig, AppSettings, Environment, GatewayConfig, JwtConfig, JwtService, ServerConfig,
    StoreConfig,
};
use chat_core::Snowflake;
use chat_gateway::protocol::{codec, Encoding, GatewayMessage, WireFrame};
use chat_gateway::{serve, GatewayState};
use chat_store::MemoryStore;
use flate2::write::ZlibDecoder;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::fixtures::seed_store;

/// How long a test waits for any single frame
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifetime of minted test tokens, in seconds
const TOKEN_LIFETIME: i64 = 900;

const TEST_SECRET: &str = "integration-test-secret";

/// Build a test configuration; the port is ignored since tests bind port 0
pub fn test_config() -> AppConfig {
    let server = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    AppConfig {
        app: AppSettings {
            name: "chat-gateway-test".to_string(),
            env: Environment::Development,
        },
        server,
        gateway: GatewayConfig::with_public_url("ws://gateway.test"),
        jwt: JwtConfig {
            secret: TEST_SECRET.to_string(),
        },
        store: StoreConfig::default(),
    }
}

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: GatewayState,
    pub store: Arc<MemoryStore>,
    jwt: Arc<JwtService>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a gateway over the fixture world
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    /// Start a gateway after adjusting the test configuration
    pub async fn start_with(configure: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        // Logs show up with RUST_LOG set; later calls are no-ops
        let _ = chat_common::try_init_tracing();

        let mut config = test_config();
        configure(&mut config);

        let store = Arc::new(MemoryStore::new());
        seed_store(&store);
        let jwt = Arc::new(JwtService::from_config(&config.jwt));
        let state = GatewayState::new(config, store.clone(), jwt.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            let signal = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = serve(listener, server_state, signal).await {
                eprintln!("test server failed: {e}");
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            addr,
            client,
            state,
            store,
            jwt,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL with the given query string (without `?`)
    pub fn ws_url(&self, query: &str) -> String {
        if query.is_empty() {
            format!("ws://{}/gateway", self.addr)
        } else {
            format!("ws://{}/gateway?{query}", self.addr)
        }
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Mint an access token for `user_id`
    pub fn token(&self, user_id: Snowflake) -> Result<String> {
        Ok(self.jwt.encode_token(user_id, TOKEN_LIFETIME)?)
    }

    /// Connect with JSON encoding and consume HELLO
    pub async fn connect(&self) -> Result<GatewayClient> {
        self.connect_with("v=6&encoding=json").await
    }

    /// Connect with a custom query and consume HELLO
    ///
    /// The client speaks whatever `encoding` and `compress` the query asks for.
    pub async fn connect_with(&self, query: &str) -> Result<GatewayClient> {
        let encoding = if query.contains("encoding=binary") {
            Encoding::Binary
        } else {
            Encoding::Json
        };
        let zlib = query.contains("compress=zlib-stream");
        let mut client = GatewayClient::open_encoded(&self.ws_url(query), encoding, zlib).await?;
        let hello = client.recv().await?;
        if hello["op"] != 10 {
            bail!("expected HELLO, got {hello}");
        }
        Ok(client)
    }

    /// Connect, IDENTIFY as `user_id` and return the client with READY
    pub async fn identify(&self, user_id: Snowflake) -> Result<(GatewayClient, Value)> {
        let mut client = self.connect().await?;
        client.identify(&self.token(user_id)?).await?;
        let ready = client.recv_dispatch("READY").await?;
        Ok((client, ready))
    }

    /// Wait until `check` holds for the server state, polling briefly
    pub async fn wait_for(&self, check: impl Fn(&GatewayState) -> bool) -> Result<()> {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        while !check(&self.state) {
            if tokio::time::Instant::now() > deadline {
                bail!("condition not reached in time");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    }

    /// Trigger graceful shutdown and wait for `serve` to return
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .context("server did not stop")??;
        }
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// What ended a connection, as seen by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closed {
    pub code: Option<u16>,
    pub reason: String,
}

/// Minimal gateway client
///
/// Frames are handed to tests as JSON values whatever the wire encoding.
pub struct GatewayClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    encoding: Encoding,
    inflater: Option<ZlibDecoder<Vec<u8>>>,
}

impl GatewayClient {
    /// Open a JSON socket; `zlib` inflates every binary frame through one stream
    pub async fn open(url: &str, zlib: bool) -> Result<Self> {
        Self::open_encoded(url, Encoding::Json, zlib).await
    }

    pub async fn open_encoded(url: &str, encoding: Encoding, zlib: bool) -> Result<Self> {
        let (ws, _) = connect_async(url).await?;
        Ok(Self {
            ws,
            encoding,
            inflater: zlib.then(|| ZlibDecoder::new(Vec::new())),
        })
    }

    /// Send a frame given as JSON, in the connection's encoding
    pub async fn send_json(&mut self, value: &Value) -> Result<()> {
        let message = match self.encoding {
            Encoding::Json => Message::Text(value.to_string()),
            Encoding::Binary => {
                let frame: GatewayMessage = serde_json::from_value(value.clone())?;
                match codec::encode(&frame, Encoding::Binary)? {
                    WireFrame::Binary(bytes) => Message::Binary(bytes),
                    WireFrame::Text(text) => Message::Text(text),
                }
            }
        };
        self.ws.send(message).await?;
        Ok(())
    }

    /// Send raw bytes as one binary message
    pub async fn send_bytes(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.ws.send(Message::Binary(bytes)).await?;
        Ok(())
    }

    pub async fn identify(&mut self, token: &str) -> Result<()> {
        self.send_json(&json!({
            "op": 2,
            "d": { "token": token, "properties": { "$os": "linux" } }
        }))
        .await
    }

    pub async fn resume(&mut self, token: &str, session_id: &str, seq: u64) -> Result<()> {
        self.send_json(&json!({
            "op": 6,
            "d": { "token": token, "session_id": session_id, "seq": seq }
        }))
        .await
    }

    pub async fn heartbeat(&mut self, seq: Option<u64>) -> Result<()> {
        self.send_json(&json!({ "op": 1, "d": seq })).await
    }

    /// Close from the client side with `code`
    pub async fn close(&mut self, code: u16) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        self.ws.close(Some(frame)).await?;
        Ok(())
    }

    /// Next decoded frame; fails on close or timeout
    pub async fn recv(&mut self) -> Result<Value> {
        loop {
            let message = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for a frame")?;
            match message {
                Some(Ok(Message::Text(text))) => match self.encoding {
                    Encoding::Json => return Ok(serde_json::from_str(&text)?),
                    Encoding::Binary => bail!("text frame on a binary connection: {text}"),
                },
                Some(Ok(Message::Binary(bytes))) => return self.decode_binary(bytes),
                Some(Ok(Message::Close(frame))) => bail!("connection closed: {frame:?}"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => bail!("connection ended"),
            }
        }
    }

    /// Skip frames until a dispatch named `event`, returning the whole frame
    pub async fn recv_dispatch(&mut self, event: &str) -> Result<Value> {
        loop {
            let frame = self.recv().await?;
            if frame["op"] == 0 && frame["t"] == event {
                return Ok(frame);
            }
        }
    }

    /// Skip frames until one with opcode `op`
    pub async fn recv_op(&mut self, op: u8) -> Result<Value> {
        loop {
            let frame = self.recv().await?;
            if frame["op"] == op {
                return Ok(frame);
            }
        }
    }

    /// Read until the server closes, discarding other frames
    pub async fn recv_close(&mut self) -> Result<Closed> {
        loop {
            let message = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for close")?;
            match message {
                Some(Ok(Message::Close(frame))) => {
                    return Ok(match frame {
                        Some(frame) => Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.into_owned(),
                        },
                        None => Closed {
                            code: None,
                            reason: String::new(),
                        },
                    });
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => {
                    return Ok(Closed {
                        code: None,
                        reason: String::new(),
                    })
                }
            }
        }
    }

    /// True if nothing arrives within `wait`
    pub async fn is_quiet(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.ws.next()).await.is_err()
    }

    fn decode_binary(&mut self, bytes: Vec<u8>) -> Result<Value> {
        let raw = match self.inflater.as_mut() {
            Some(inflater) => {
                inflater.write_all(&bytes)?;
                inflater.flush()?;
                std::mem::take(inflater.get_mut())
            }
            None => bytes,
        };
        match self.encoding {
            Encoding::Json if self.inflater.is_some() => Ok(serde_json::from_slice(&raw)?),
            Encoding::Json => bail!("unexpected binary frame"),
            Encoding::Binary => {
                let message = codec::decode(&WireFrame::Binary(raw), Encoding::Binary)?;
                Ok(serde_json::to_value(message)?)
            }
        }
    }
}
