//! Test helpers for integration tests
//!
//! Spawns a gateway on an ephemeral port backed by the in-memory user store
//! and provides a WebSocket client that speaks the gateway protocol.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chat_common::{AppError, JwtService, SessionConfig};
use chat_core::{DomainEvent, Snowflake};
use chat_db::MemoryUserStore;
use chat_gateway::protocol::{GatewayPayload, Intents, OpCode};
use chat_gateway::server::{create_state, serve, GatewayState};
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, StatusCode};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Secret used to mint test tokens
pub const TEST_JWT_SECRET: &str = "integration-test-secret";

/// How long a client waits for a single frame
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Session timing for tests: quick heartbeats, everything else roomy
pub fn test_session_config() -> SessionConfig {
    SessionConfig {
        resume_window: Duration::from_secs(60),
        heartbeat_interval: Duration::from_millis(500),
        heartbeat_timeout: Duration::from_secs(2),
        sweep_interval: Duration::from_secs(1),
        shutdown_timeout: Duration::from_secs(5),
        presence_retry_attempts: 3,
    }
}

/// Gateway instance that manages its own lifecycle
pub struct TestGateway {
    pub addr: SocketAddr,
    pub store: Arc<MemoryUserStore>,
    pub state: GatewayState,
    pub client: Client,
    jwt: Arc<JwtService>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), AppError>>>,
}

impl TestGateway {
    /// Start a gateway with the default test timing
    pub async fn start() -> Result<Self> {
        Self::start_with_config(test_session_config()).await
    }

    /// Start a gateway with custom session timing
    pub async fn start_with_config(config: SessionConfig) -> Result<Self> {
        let store = MemoryUserStore::new_shared();
        let jwt = Arc::new(JwtService::new(TEST_JWT_SECRET, 3600));
        let state = create_state(store.clone(), store.clone(), jwt.clone(), config);

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve(listener, state.clone(), None, async move {
            let _ = shutdown_rx.await;
        }));

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            addr,
            store,
            state,
            client,
            jwt,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get base URL for HTTP requests
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn gateway_url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// Mint an access token for `user_id`
    pub fn token(&self, user_id: Snowflake) -> String {
        self.jwt
            .issue_access_token(user_id)
            .unwrap_or_else(|e| panic!("failed to issue token: {e}"))
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Publish a domain event as if it arrived from the REST side
    pub async fn publish(&self, event: DomainEvent) -> usize {
        self.state.dispatcher().publish(event).await
    }

    /// Open a new session and consume its Hello
    pub async fn connect(&self, user_id: Snowflake, intents: Intents) -> Result<GatewayClient> {
        self.connect_with(ConnectOptions::new(user_id, intents)).await
    }

    /// Open or resume a session with explicit upgrade headers and consume its Hello
    pub async fn connect_with(&self, options: ConnectOptions) -> Result<GatewayClient> {
        let token = options.token.clone().unwrap_or_else(|| self.token(options.user_id));
        let mut client = match self.upgrade(Some(&token), &options.headers()).await? {
            Upgrade::Accepted(client) => client,
            Upgrade::Rejected { status, body } => {
                bail!("upgrade rejected with {status}: {body}")
            }
        };

        let hello = client.recv().await?;
        if hello.operation != OpCode::Hello {
            bail!("expected Hello, got {:?}", hello.operation);
        }
        let data = hello.data.context("Hello without data")?;
        client.session_id = data["session_id"]
            .as_str()
            .context("Hello without session_id")?
            .to_string();
        client.heartbeat_interval = data["heartbeat_interval"].as_u64().unwrap_or_default();

        Ok(client)
    }

    /// Attempt an upgrade with arbitrary headers
    pub async fn upgrade(
        &self,
        token: Option<&str>,
        headers: &[(&'static str, String)],
    ) -> Result<Upgrade> {
        let mut request = self.gateway_url().into_client_request()?;
        if let Some(token) = token {
            request
                .headers_mut()
                .insert("authorization", HeaderValue::from_str(&format!("Bearer {token}"))?);
        }
        for (name, value) in headers {
            request.headers_mut().insert(*name, HeaderValue::from_str(value)?);
        }

        match connect_async(request).await {
            Ok((stream, _)) => Ok(Upgrade::Accepted(GatewayClient::new(stream))),
            Err(WsError::Http(response)) => {
                let body = response
                    .body()
                    .as_deref()
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .unwrap_or_default();
                Ok(Upgrade::Rejected {
                    status: StatusCode::from_u16(response.status().as_u16())?,
                    body,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Trigger shutdown and wait for the server to finish
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let handle = self.handle.take().context("gateway already stopped")?;
        handle.await??;
        Ok(())
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Upgrade headers for one connection attempt
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub user_id: Snowflake,
    pub intents: Intents,
    pub presence: Option<u8>,
    pub session_id: Option<String>,
    pub token: Option<String>,
}

impl ConnectOptions {
    pub fn new(user_id: Snowflake, intents: Intents) -> Self {
        Self {
            user_id,
            intents,
            presence: None,
            session_id: None,
            token: None,
        }
    }

    pub fn presence(mut self, presence: u8) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("intents", self.intents.bits().to_string())];
        if let Some(presence) = self.presence {
            headers.push(("presence", presence.to_string()));
        }
        if let Some(session_id) = &self.session_id {
            headers.push(("sessionid", session_id.clone()));
        }
        headers
    }
}

/// Outcome of an upgrade attempt
pub enum Upgrade {
    Accepted(GatewayClient),
    Rejected { status: StatusCode, body: String },
}

impl Upgrade {
    /// Unwrap a rejection, failing the test if the upgrade went through
    pub fn rejection(self) -> (StatusCode, serde_json::Value) {
        match self {
            Self::Accepted(client) => panic!("upgrade unexpectedly accepted: {}", client.session_id),
            Self::Rejected { status, body } => {
                (status, serde_json::from_str(&body).unwrap_or(serde_json::Value::Null))
            }
        }
    }
}

/// WebSocket client speaking the gateway protocol
pub struct GatewayClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub session_id: String,
    pub heartbeat_interval: u64,
}

impl GatewayClient {
    fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            stream,
            session_id: String::new(),
            heartbeat_interval: 0,
        }
    }

    /// Receive the next gateway payload
    pub async fn recv(&mut self) -> Result<GatewayPayload> {
        loop {
            let message = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .context("timed out waiting for a frame")?
                .context("socket closed")??;

            match message {
                Message::Text(text) => return Ok(GatewayPayload::from_json(&text)?),
                Message::Close(frame) => bail!("socket closed by server: {frame:?}"),
                Message::Ping(_) | Message::Pong(_) => {}
                other => bail!("unexpected frame: {other:?}"),
            }
        }
    }

    /// Receive payloads until a Dispatch arrives
    pub async fn recv_dispatch(&mut self) -> Result<GatewayPayload> {
        loop {
            let payload = self.recv().await?;
            if payload.operation == OpCode::Dispatch {
                return Ok(payload);
            }
        }
    }

    /// Assert that nothing arrives within `window`
    pub async fn expect_silence(&mut self, window: Duration) -> Result<()> {
        match tokio::time::timeout(window, self.stream.next()).await {
            Err(_) => Ok(()),
            Ok(frame) => bail!("expected silence, got {frame:?}"),
        }
    }

    /// Wait for the server's close frame and return its code
    ///
    /// Text frames queued before the close are skipped.
    pub async fn expect_close(&mut self) -> Result<u16> {
        loop {
            let message = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .context("timed out waiting for close")?;

            match message {
                Some(Ok(Message::Close(Some(frame)))) => return Ok(frame.code.into()),
                Some(Ok(Message::Close(None))) => bail!("close frame without code"),
                Some(Ok(_)) => {}
                Some(Err(e)) => bail!("socket error before close frame: {e}"),
                None => bail!("socket ended without close frame"),
            }
        }
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    pub async fn send_heartbeat(&mut self) -> Result<()> {
        self.send_text(r#"{"operation":1}"#).await
    }

    /// Ask for a new presence (`0` invisible, `1` online)
    pub async fn send_presence(&mut self, presence: u8) -> Result<()> {
        self.send_text(format!(
            r#"{{"operation":0,"event":13,"data":{{"presence":{presence}}}}}"#
        ))
        .await
    }

    /// Close the socket from the client side
    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        // Drain until the server acknowledges.
        while let Ok(Some(Ok(_))) = tokio::time::timeout(RECV_TIMEOUT, self.stream.next()).await {}
        Ok(())
    }
}

/// Poll `condition` until it holds or `deadline` elapses
pub async fn eventually<F, Fut>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = tokio::time::Instant::now();
    loop {
        if condition().await {
            return true;
        }
        if started.elapsed() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Helper to check if a Redis instance is available for bridge tests
pub fn redis_url() -> Option<String> {
    match std::env::var("REDIS_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: REDIS_URL not set");
            None
        }
    }
}
