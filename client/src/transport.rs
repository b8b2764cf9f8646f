use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use arrosage_common::{ClientError, FrameSink, ReconnectPolicy, TransportConfig};

use crate::store::TokenStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type FrameHandler = Arc<dyn Fn(&str) + Send + Sync>;

const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// One authenticated WebSocket to the irrigation backend.
///
/// A background driver task owns the socket: it delivers inbound text frames
/// to the registered handlers, flushes queued writes and sends a ping every
/// keep-alive interval. When the socket drops, the configured
/// [`ReconnectPolicy`] decides whether the driver re-establishes it.
pub struct Transport {
    url: String,
    config: TransportConfig,
    tokens: TokenStore,
    connected: AtomicBool,
    shutdown: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    handlers: Mutex<Vec<FrameHandler>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl Transport {
    pub fn new(url: impl Into<String>, config: TransportConfig, tokens: TokenStore) -> Arc<Self> {
        let mut config = config;
        config.sanitize();
        Arc::new(Self {
            url: url.into(),
            config,
            tokens,
            connected: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            outbound: Mutex::new(None),
            handlers: Mutex::new(Vec::new()),
            driver: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn on_frame<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        lock(&self.handlers).push(Arc::new(handler));
    }

    /// Opens the socket, reading the token afresh. A no-op when already up.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            debug!("websocket already connected");
            return Ok(());
        }

        if let Some(previous) = lock(&self.driver).take() {
            previous.abort();
        }

        self.shutdown.store(false, Ordering::SeqCst);
        let stream = self.establish().await?;
        let outbound = self.open_channel();

        let transport = Arc::clone(self);
        let handle = tokio::spawn(async move { transport.drive(stream, outbound).await });
        *lock(&self.driver) = Some(handle);
        Ok(())
    }

    pub fn send(&self, frame: &str) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let outbound = lock(&self.outbound);
        let sender = outbound.as_ref().ok_or(ClientError::NotConnected)?;
        sender
            .send(Message::Text(frame.to_string()))
            .map_err(|_| ClientError::NotConnected)?;
        debug!("frame queued: {frame}");
        Ok(())
    }

    /// Closes the socket and stops any reconnection attempt.
    pub async fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the sender makes the driver send a close frame and exit.
        lock(&self.outbound).take();

        let driver = lock(&self.driver).take();
        if let Some(mut handle) = driver {
            if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        info!("websocket closed by client");
    }

    /// Stops the driver without waiting for a close handshake.
    pub fn abort(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.mark_disconnected();
        if let Some(driver) = lock(&self.driver).take() {
            driver.abort();
            debug!("websocket driver aborted");
        }
    }

    async fn establish(&self) -> Result<WsStream, ClientError> {
        let token = self
            .tokens
            .load()
            .await?
            .ok_or_else(|| ClientError::Auth("no token available".to_string()))?;

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|err| ClientError::Connect(err.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| ClientError::Auth(format!("unusable token: {err}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        info!("websocket connecting to {}", self.url);
        let (stream, response) = connect_async(request)
            .await
            .map_err(|err| ClientError::Connect(err.to_string()))?;
        info!("websocket connected (status {})", response.status());
        Ok(stream)
    }

    fn open_channel(&self) -> mpsc::UnboundedReceiver<Message> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *lock(&self.outbound) = Some(sender);
        self.connected.store(true, Ordering::SeqCst);
        receiver
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        lock(&self.outbound).take();
    }

    async fn drive(
        self: Arc<Self>,
        mut stream: WsStream,
        mut outbound: mpsc::UnboundedReceiver<Message>,
    ) {
        loop {
            self.run_connection(stream, outbound).await;
            self.mark_disconnected();

            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let ReconnectPolicy::Auto { delay_ms } = self.config.reconnect else {
                info!("websocket down; waiting for the session to re-initialize");
                return;
            };

            match self.reconnect_after(Duration::from_millis(delay_ms)).await {
                Some((next_stream, next_outbound)) => {
                    stream = next_stream;
                    outbound = next_outbound;
                }
                None => return,
            }
        }
    }

    async fn reconnect_after(
        &self,
        delay: Duration,
    ) -> Option<(WsStream, mpsc::UnboundedReceiver<Message>)> {
        loop {
            info!("websocket reconnecting in {} ms", delay.as_millis());
            tokio::time::sleep(delay).await;
            if self.shutdown.load(Ordering::SeqCst) {
                return None;
            }
            match self.establish().await {
                Ok(stream) => return Some((stream, self.open_channel())),
                Err(err) => warn!("websocket reconnect failed: {err}"),
            }
        }
    }

    async fn run_connection(
        &self,
        stream: WsStream,
        mut outbound: mpsc::UnboundedReceiver<Message>,
    ) {
        let (mut writer, mut reader) = stream.split();
        let period = Duration::from_millis(self.config.keepalive_interval_ms);
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                incoming = reader.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.deliver(&text),
                    Some(Ok(Message::Binary(bytes))) => {
                        self.deliver(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("websocket closed by server: {frame:?}");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("websocket read error: {err}");
                        break;
                    }
                    None => {
                        info!("websocket stream ended");
                        break;
                    }
                },
                message = outbound.recv() => match message {
                    Some(message) => {
                        if let Err(err) = writer.send(message).await {
                            warn!("websocket write failed: {err}");
                            break;
                        }
                    }
                    None => {
                        let _ = writer.close().await;
                        break;
                    }
                },
                _ = keepalive.tick() => {
                    if let Err(err) = writer.send(Message::Ping(Vec::new())).await {
                        warn!("keep-alive ping failed: {err}");
                        break;
                    }
                    debug!("keep-alive ping sent");
                }
            }
        }
    }

    fn deliver(&self, frame: &str) {
        let handlers = lock(&self.handlers).clone();
        if handlers.is_empty() {
            debug!("frame dropped, no handler registered");
        }
        for handler in handlers {
            handler(frame);
        }
    }
}

impl FrameSink for Transport {
    fn send_frame(&self, frame: &str) -> Result<(), ClientError> {
        self.send(frame)
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
