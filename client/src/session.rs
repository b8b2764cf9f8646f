use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, OnceLock, Weak,
    },
    time::{Duration, Instant},
};

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use arrosage_common::{
    classify, Action, ClientError, HistoryQuery, HistoryResult, InboundEvent, Mode,
    ModeActionState, NotificationLevel, PendingId, Resolution, SensorSnapshot, SessionConfig,
    StateStore, StoreEvent, Subscribers, SubscriptionId, WriteOutcome,
};

use crate::{
    api::ApiClient,
    store::TokenStore,
    transport::{lock, Transport},
};

type Waiter = oneshot::Sender<Result<ModeActionState, ClientError>>;

/// A logged-in connection to the irrigation backend.
///
/// Owns the transport, the reconciliation store and the timers that drive
/// pending-write expiry. Cloning is cheap; every clone talks to the same
/// session. Subscriber callbacks run after the store lock is released, so they
/// may read session state. They must not subscribe or unsubscribe from inside
/// a callback.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    store: Mutex<StateStore>,
    subscribers: Mutex<Subscribers>,
    /// Events raised under the store lock, waiting to be dispatched.
    outbox: Arc<Mutex<Vec<StoreEvent>>>,
    transport: Arc<Transport>,
    api: ApiClient,
    waiters: Mutex<HashMap<PendingId, Waiter>>,
    sensors: watch::Sender<SensorSnapshot>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Session {
    pub async fn start(config: SessionConfig, tokens: TokenStore) -> Result<Self, ClientError> {
        let mut config = config;
        config.sanitize();

        let transport = Transport::new(
            config.endpoints.ws_url.clone(),
            config.transport.clone(),
            tokens.clone(),
        );
        let api = ApiClient::new(config.endpoints.api_base_url.clone(), tokens);
        let mut store = StateStore::new(config.store.clone());
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let forward = Arc::clone(&outbox);
        store.subscribe(move |event| lock(&forward).push(event.clone()));
        let (sensors, _) = watch::channel(SensorSnapshot::default());

        let inner = Arc::new(SessionInner {
            config,
            store: Mutex::new(store),
            subscribers: Mutex::new(Subscribers::default()),
            outbox,
            transport,
            api,
            waiters: Mutex::new(HashMap::new()),
            sensors,
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        inner.transport.on_frame(move |frame| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_frame(frame);
            }
        });

        inner.transport.connect().await?;
        spawn_expiry_loop(&inner);
        spawn_poll_loop(&inner);
        info!("session started");

        Ok(Self { inner })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn latest_sensor_data(&self) -> SensorSnapshot {
        lock(&self.inner.store).latest_sensor_data()
    }

    pub fn latest_mode_state(&self) -> ModeActionState {
        lock(&self.inner.store).latest_mode_state()
    }

    pub fn pending_writes(&self) -> usize {
        lock(&self.inner.store).pending_count()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + Send + 'static,
    {
        lock(&self.inner.subscribers).subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.inner.subscribers).unsubscribe(id)
    }

    /// Writes `mode` (and `action`, if given) and waits for the server to
    /// echo a matching state.
    pub async fn request_write(
        &self,
        mode: Mode,
        action: Option<Action>,
    ) -> Result<ModeActionState, ClientError> {
        let (waiter, confirmation) = oneshot::channel();
        let id = {
            let mut store = lock(&self.inner.store);
            let id = store.request_write(mode, action, self.inner.transport.as_ref(), monotonic_ms())?;
            lock(&self.inner.waiters).insert(id, waiter);
            id
        };
        self.await_confirmation(id, confirmation).await
    }

    pub async fn switch_mode(&self, mode: Mode) -> Result<ModeActionState, ClientError> {
        let (waiter, confirmation) = oneshot::channel();
        let outcome = {
            let mut store = lock(&self.inner.store);
            let outcome = store.switch_mode(mode, self.inner.transport.as_ref(), monotonic_ms())?;
            if let WriteOutcome::Pending(id) = outcome {
                lock(&self.inner.waiters).insert(id, waiter);
            }
            outcome
        };
        self.inner.flush_events();

        match outcome {
            WriteOutcome::Local(state) => {
                info!("mode {} applied locally", state.mode.as_str());
                Ok(state)
            }
            WriteOutcome::Pending(id) => self.await_confirmation(id, confirmation).await,
        }
    }

    /// Starts or stops watering. Only valid in manual mode.
    pub async fn set_action(&self, action: Action) -> Result<ModeActionState, ClientError> {
        let (waiter, confirmation) = oneshot::channel();
        let id = {
            let mut store = lock(&self.inner.store);
            let id = store.set_action(action, self.inner.transport.as_ref(), monotonic_ms())?;
            lock(&self.inner.waiters).insert(id, waiter);
            id
        };
        self.await_confirmation(id, confirmation).await
    }

    /// Returns the current snapshot as soon as any channel is known, or waits
    /// for the first reading.
    pub async fn wait_for_sensor_data(
        &self,
        timeout: Option<Duration>,
    ) -> Result<SensorSnapshot, ClientError> {
        let mut updates = self.inner.sensors.subscribe();
        let snapshot = *updates.borrow_and_update();
        if !snapshot.is_empty() {
            return Ok(snapshot);
        }
        if !self.is_connected() && self.inner.config.poll_interval_ms.is_none() {
            return Err(ClientError::NotConnected);
        }

        let wait = timeout
            .unwrap_or_else(|| Duration::from_millis(self.inner.config.data_wait_timeout_ms));
        let first = async {
            updates
                .wait_for(|snapshot| !snapshot.is_empty())
                .await
                .map(|snapshot| *snapshot)
        };
        match tokio::time::timeout(wait, first).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => Err(ClientError::Timeout(
                "no sensor data received".to_string(),
            )),
        }
    }

    /// Reconnects after the socket dropped under the deferred policy.
    pub async fn reinit(&self) -> Result<(), ClientError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        self.inner.transport.connect().await
    }

    pub async fn fetch_history(
        &self,
        query: Option<HistoryQuery>,
    ) -> Result<HistoryResult, ClientError> {
        self.inner.api.fetch_history(query).await
    }

    /// Tears the session down. Pending writes fail with [`ClientError::Closed`].
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let tasks: Vec<JoinHandle<()>> = lock(&self.inner.tasks).drain(..).collect();
        for task in tasks {
            task.abort();
        }

        self.inner.transport.close().await;

        lock(&self.inner.subscribers).clear();
        lock(&self.inner.outbox).clear();
        let cancelled = lock(&self.inner.store).cancel_all();
        let mut waiters = lock(&self.inner.waiters);
        for (_, waiter) in waiters.drain() {
            let _ = waiter.send(Err(ClientError::Closed));
        }
        info!("session closed ({} writes cancelled)", cancelled.len());
    }

    async fn await_confirmation(
        &self,
        id: PendingId,
        confirmation: oneshot::Receiver<Result<ModeActionState, ClientError>>,
    ) -> Result<ModeActionState, ClientError> {
        debug!("write {id} sent, awaiting confirmation");
        confirmation.await.unwrap_or(Err(ClientError::Closed))
    }
}

impl SessionInner {
    fn handle_frame(&self, frame: &str) {
        let resolutions = {
            let mut store = lock(&self.store);
            let events = classify(frame, store.latest_mode_state().action);
            if events.is_empty() {
                debug!("frame ignored: {}", excerpt(frame));
            }

            let mut resolutions = Vec::new();
            for event in events {
                log_event(&event);
                resolutions.extend(store.apply_event(event));
            }

            let snapshot = store.latest_sensor_data();
            self.sensors.send_if_modified(|current| {
                if *current == snapshot {
                    return false;
                }
                *current = snapshot;
                true
            });
            resolutions
        };
        self.flush_events();
        self.complete(resolutions);
    }

    /// Hands queued store events to the session subscribers, in order.
    fn flush_events(&self) {
        let mut subscribers = lock(&self.subscribers);
        let events = std::mem::take(&mut *lock(&self.outbox));
        for event in &events {
            subscribers.dispatch(event);
        }
    }

    fn complete(&self, resolutions: Vec<Resolution>) {
        if resolutions.is_empty() {
            return;
        }
        let mut waiters = lock(&self.waiters);
        for resolution in resolutions {
            match resolution {
                Resolution::Confirmed { id, state } => {
                    info!(
                        "write {id} confirmed: mode={} action={}",
                        state.mode.as_str(),
                        state.action.as_str()
                    );
                    if let Some(waiter) = waiters.remove(&id) {
                        let _ = waiter.send(Ok(state));
                    }
                }
                Resolution::TimedOut { id } => {
                    warn!("write {id} timed out, state rolled back");
                    if let Some(waiter) = waiters.remove(&id) {
                        let _ = waiter.send(Err(ClientError::Timeout(format!(
                            "no confirmation for write {id}"
                        ))));
                    }
                }
            }
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        self.transport.abort();
    }
}

fn spawn_expiry_loop(inner: &Arc<SessionInner>) {
    let period = Duration::from_millis(inner.config.expiry_tick_ms);
    let weak: Weak<SessionInner> = Arc::downgrade(inner);
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            let resolutions = lock(&inner.store).expire_pending(monotonic_ms());
            inner.flush_events();
            inner.complete(resolutions);
        }
    });
    lock(&inner.tasks).push(handle);
}

fn spawn_poll_loop(inner: &Arc<SessionInner>) {
    let Some(interval_ms) = inner.config.poll_interval_ms else {
        return;
    };
    let weak = Arc::downgrade(inner);
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            interval.tick().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            match inner.api.fetch_latest().await {
                Ok(body) => inner.handle_frame(&body),
                Err(err) => warn!("latest readings poll failed: {err}"),
            }
        }
    });
    lock(&inner.tasks).push(handle);
}

fn log_event(event: &InboundEvent) {
    match event {
        InboundEvent::ModeState { mode, action } => {
            info!("state update: mode={} action={}", mode.as_str(), action.as_str());
        }
        InboundEvent::SensorReading(reading) => {
            debug!("reading {}={}", reading.channel.as_str(), reading.value);
        }
        InboundEvent::BatchSensorReading(readings) => {
            debug!("batch of {} readings", readings.len());
        }
        InboundEvent::Notification(notification) => match notification.level {
            NotificationLevel::Alert => warn!("server alert: {}", notification.message),
            NotificationLevel::Diagnostic => debug!("server message: {}", notification.message),
        },
    }
}

fn excerpt(frame: &str) -> String {
    frame.chars().take(80).collect()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
