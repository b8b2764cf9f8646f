use serde::Serialize;

use crate::{
    classifier::{classify, InboundEvent, Notification, NotificationLevel},
    config::StoreConfig,
    error::ClientError,
    types::{Action, Mode, ModeActionState, PendingId, SensorReading, SensorSnapshot},
    wire::encode_write,
};

pub const TIMEOUT_MESSAGE: &str = "Timeout: pas de réponse du serveur";

/// Outbound half of the connection as seen by the store.
pub trait FrameSink {
    fn send_frame(&self, frame: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeChange {
    pub mode: Mode,
    pub action: Action,
    /// False for notification-only events; the state fields then just echo
    /// the current state.
    #[serde(rename = "dataUpdate")]
    pub data_update: bool,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<NotificationLevel>,
}

impl ModeChange {
    fn update(state: ModeActionState) -> Self {
        Self {
            mode: state.mode,
            action: state.action,
            data_update: true,
            error_message: None,
            level: None,
        }
    }

    fn notification(state: ModeActionState, notification: Notification) -> Self {
        Self {
            mode: state.mode,
            action: state.action,
            data_update: false,
            error_message: Some(notification.message),
            level: Some(notification.level),
        }
    }

    fn rollback(state: ModeActionState) -> Self {
        Self {
            mode: state.mode,
            action: state.action,
            data_update: true,
            error_message: Some(TIMEOUT_MESSAGE.to_string()),
            level: Some(NotificationLevel::Diagnostic),
        }
    }

    pub fn state(&self) -> ModeActionState {
        ModeActionState::new(self.mode, self.action)
    }

    pub fn is_alert(&self) -> bool {
        self.level == Some(NotificationLevel::Alert)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorUpdate {
    pub readings: Vec<SensorReading>,
    pub snapshot: SensorSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Mode(ModeChange),
    Sensors(SensorUpdate),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Confirmed {
        id: PendingId,
        state: ModeActionState,
    },
    TimedOut {
        id: PendingId,
    },
}

impl Resolution {
    pub fn id(&self) -> PendingId {
        match self {
            Self::Confirmed { id, .. } | Self::TimedOut { id } => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A frame went out; the id resolves on confirmation or expiry.
    Pending(PendingId),
    /// Applied locally, nothing sent.
    Local(ModeActionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Subscriber = Box<dyn FnMut(&StoreEvent) + Send>;

/// Subscriber list with removable handles, dispatched in registration order.
#[derive(Default)]
pub struct Subscribers {
    entries: Vec<(SubscriptionId, Subscriber)>,
    next_id: u64,
}

impl Subscribers {
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dispatch(&mut self, event: &StoreEvent) {
        for (_, subscriber) in self.entries.iter_mut() {
            subscriber(event);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    id: PendingId,
    mode: Mode,
    action: Option<Action>,
    deadline_ms: u64,
    // Overridden by a later local mode choice; still awaits confirmation but
    // is no longer replayed.
    superseded: bool,
}

impl PendingRequest {
    fn matches(&self, state: &ModeActionState) -> bool {
        self.mode == state.mode && self.action.map_or(true, |action| action == state.action)
    }

    fn apply_to(&self, state: &mut ModeActionState) {
        state.mode = self.mode;
        if let Some(action) = self.action {
            state.action = action;
        }
    }
}

pub struct StateStore {
    config: StoreConfig,
    sensors: SensorSnapshot,
    current: ModeActionState,
    confirmed: ModeActionState,
    // Insertion order is the match order.
    pending: Vec<PendingRequest>,
    next_pending_id: u64,
    subscribers: Subscribers,
}

impl StateStore {
    pub fn new(mut config: StoreConfig) -> Self {
        config.sanitize();
        let initial = config.initial_state;
        Self {
            config,
            sensors: SensorSnapshot::default(),
            current: initial,
            confirmed: initial,
            pending: Vec::new(),
            next_pending_id: 1,
            subscribers: Subscribers::default(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn latest_sensor_data(&self) -> SensorSnapshot {
        self.sensors
    }

    pub fn latest_mode_state(&self) -> ModeActionState {
        self.current
    }

    pub fn confirmed_mode_state(&self) -> ModeActionState {
        self.confirmed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + Send + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn clear_subscribers(&mut self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn apply_frame(&mut self, frame: &str) -> Vec<Resolution> {
        classify(frame, self.current.action)
            .into_iter()
            .flat_map(|event| self.apply_event(event))
            .collect()
    }

    pub fn apply_event(&mut self, event: InboundEvent) -> Vec<Resolution> {
        match event {
            InboundEvent::ModeState { mode, action } => {
                let state = ModeActionState::new(mode, action);
                self.current = state;
                self.confirmed = state;
                let resolution = self.resolve_pending(state);
                self.dispatch(StoreEvent::Mode(ModeChange::update(state)));
                resolution.into_iter().collect()
            }
            InboundEvent::SensorReading(reading) => {
                self.merge_readings(vec![reading]);
                Vec::new()
            }
            InboundEvent::BatchSensorReading(readings) => {
                self.merge_readings(readings);
                Vec::new()
            }
            InboundEvent::Notification(notification) => {
                let change = ModeChange::notification(self.current, notification);
                self.dispatch(StoreEvent::Mode(change));
                Vec::new()
            }
        }
    }

    /// Sends a state write and tracks it until confirmed or expired.
    ///
    /// The live state is updated optimistically. If the sink refuses the
    /// frame, the optimistic change is undone and the error returned.
    pub fn request_write(
        &mut self,
        mode: Mode,
        action: Option<Action>,
        sink: &dyn FrameSink,
        now_ms: u64,
    ) -> Result<PendingId, ClientError> {
        let frame = encode_write(self.config.envelope, mode, action);
        let id = PendingId(self.next_pending_id);
        self.next_pending_id += 1;

        let request = PendingRequest {
            id,
            mode,
            action,
            deadline_ms: now_ms.saturating_add(self.config.pending_timeout_ms),
            superseded: false,
        };

        let previous = self.current;
        self.pending.push(request);
        request.apply_to(&mut self.current);

        if let Err(err) = sink.send_frame(&frame) {
            self.pending.retain(|pending| pending.id != id);
            self.current = previous;
            return Err(err);
        }

        Ok(id)
    }

    pub fn switch_mode(
        &mut self,
        mode: Mode,
        sink: &dyn FrameSink,
        now_ms: u64,
    ) -> Result<WriteOutcome, ClientError> {
        if mode == self.current.mode {
            return Ok(WriteOutcome::Local(self.current));
        }

        if mode == Mode::Manual && !self.config.manual_entry_requires_confirmation {
            self.current.mode = Mode::Manual;
            self.confirmed.mode = Mode::Manual;
            for pending in &mut self.pending {
                if pending.mode == Mode::Auto {
                    pending.superseded = true;
                }
            }
            let state = self.current;
            self.dispatch(StoreEvent::Mode(ModeChange::update(state)));
            return Ok(WriteOutcome::Local(state));
        }

        self.request_write(mode, None, sink, now_ms)
            .map(WriteOutcome::Pending)
    }

    pub fn set_action(
        &mut self,
        action: Action,
        sink: &dyn FrameSink,
        now_ms: u64,
    ) -> Result<PendingId, ClientError> {
        if self.current.mode != Mode::Manual {
            return Err(ClientError::InvalidTransition {
                current: self.current.mode,
            });
        }
        self.request_write(Mode::Manual, Some(action), sink, now_ms)
    }

    /// Drops every pending write whose deadline has passed.
    ///
    /// The live state falls back to the last confirmed state with the
    /// remaining in-flight writes replayed on top, and subscribers are told.
    pub fn expire_pending(&mut self, now_ms: u64) -> Vec<Resolution> {
        let mut expired = Vec::new();
        self.pending.retain(|pending| {
            if now_ms >= pending.deadline_ms {
                expired.push(pending.id);
                false
            } else {
                true
            }
        });

        if expired.is_empty() {
            return Vec::new();
        }

        self.current = self.replayed_state();
        self.dispatch(StoreEvent::Mode(ModeChange::rollback(self.current)));

        expired
            .into_iter()
            .map(|id| Resolution::TimedOut { id })
            .collect()
    }

    pub fn cancel_all(&mut self) -> Vec<PendingId> {
        let cancelled = self.pending.drain(..).map(|pending| pending.id).collect();
        self.current = self.confirmed;
        cancelled
    }

    fn resolve_pending(&mut self, state: ModeActionState) -> Option<Resolution> {
        let index = self.pending.iter().position(|pending| pending.matches(&state))?;
        let request = self.pending.remove(index);
        Some(Resolution::Confirmed {
            id: request.id,
            state,
        })
    }

    fn replayed_state(&self) -> ModeActionState {
        let mut state = self.confirmed;
        for pending in self.pending.iter().filter(|pending| !pending.superseded) {
            pending.apply_to(&mut state);
        }
        state
    }

    fn merge_readings(&mut self, readings: Vec<SensorReading>) {
        if readings.is_empty() {
            return;
        }
        for reading in &readings {
            self.sensors.apply(*reading);
        }
        let update = SensorUpdate {
            readings,
            snapshot: self.sensors,
        };
        self.dispatch(StoreEvent::Sensors(update));
    }

    fn dispatch(&mut self, event: StoreEvent) {
        self.subscribers.dispatch(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorChannel;
    use pretty_assertions::assert_eq;
    use std::{
        cell::RefCell,
        sync::{Arc, Mutex},
    };

    #[derive(Default)]
    struct RecordingSink {
        frames: RefCell<Vec<String>>,
        offline: bool,
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&self, frame: &str) -> Result<(), ClientError> {
            if self.offline {
                return Err(ClientError::NotConnected);
            }
            self.frames.borrow_mut().push(frame.to_string());
            Ok(())
        }
    }

    fn store_with(initial: ModeActionState) -> StateStore {
        StateStore::new(StoreConfig {
            initial_state: initial,
            pending_timeout_ms: 3_000,
            ..StoreConfig::default()
        })
    }

    fn recorded(store: &mut StateStore) -> Arc<Mutex<Vec<StoreEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn confirmation_resolves_pending_write_once() {
        let mut store = store_with(ModeActionState::new(Mode::Manual, Action::Deactivate));
        let sink = RecordingSink::default();

        let id = store
            .request_write(Mode::Manual, Some(Action::Activate), &sink, 0)
            .unwrap();
        assert_eq!(
            sink.frames.borrow().as_slice(),
            [r#"{"action":"activer","mode":"manuel"}"#]
        );
        assert_eq!(store.pending_count(), 1);

        let resolutions = store.apply_frame(r#"{"mode":"manuel","etat":"activer"}"#);
        assert_eq!(
            resolutions,
            vec![Resolution::Confirmed {
                id,
                state: ModeActionState::new(Mode::Manual, Action::Activate),
            }]
        );
        assert_eq!(store.pending_count(), 0);

        // A repeated confirmation finds nothing left to resolve.
        assert!(store
            .apply_frame(r#"{"mode":"manuel","etat":"activer"}"#)
            .is_empty());
        assert!(store.expire_pending(10_000).is_empty());
    }

    #[test]
    fn timeout_rolls_back_to_confirmed_state() {
        let confirmed = ModeActionState::new(Mode::Manual, Action::Deactivate);
        let mut store = store_with(confirmed);
        let events = recorded(&mut store);
        let sink = RecordingSink::default();

        let id = store
            .request_write(Mode::Manual, Some(Action::Activate), &sink, 1_000)
            .unwrap();
        assert_eq!(store.latest_mode_state().action, Action::Activate);

        assert!(store.expire_pending(3_999).is_empty());
        let resolutions = store.expire_pending(4_000);
        assert_eq!(resolutions, vec![Resolution::TimedOut { id }]);
        assert_eq!(store.latest_mode_state(), confirmed);
        assert_eq!(store.pending_count(), 0);

        let events = events.lock().unwrap();
        let Some(StoreEvent::Mode(change)) = events.last() else {
            panic!("expected a rollback notification");
        };
        assert_eq!(change.state(), confirmed);
        assert_eq!(change.error_message.as_deref(), Some(TIMEOUT_MESSAGE));
    }

    #[test]
    fn expiry_replays_remaining_writes() {
        let mut store = store_with(ModeActionState::new(Mode::Manual, Action::Deactivate));
        let sink = RecordingSink::default();

        store
            .request_write(Mode::Manual, Some(Action::Activate), &sink, 0)
            .unwrap();
        store.request_write(Mode::Auto, None, &sink, 2_000).unwrap();

        let expired = store.expire_pending(3_000);
        assert_eq!(expired.len(), 1);
        assert_eq!(
            store.latest_mode_state(),
            ModeActionState::new(Mode::Auto, Action::Deactivate)
        );
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn oldest_matching_request_resolves_first() {
        let mut store = store_with(ModeActionState::default());
        let sink = RecordingSink::default();

        let first = store.request_write(Mode::Auto, None, &sink, 0).unwrap();
        let second = store.request_write(Mode::Auto, None, &sink, 10).unwrap();

        let resolutions = store.apply_frame(r#"{"mode":"auto"}"#);
        assert_eq!(resolutions.len(), 1);
        assert_eq!(resolutions[0].id(), first);

        let resolutions = store.apply_frame(r#"{"mode":"auto","etat":"activer"}"#);
        assert_eq!(resolutions.len(), 1);
        assert_eq!(resolutions[0].id(), second);
    }

    #[test]
    fn mismatched_action_does_not_resolve() {
        let mut store = store_with(ModeActionState::new(Mode::Manual, Action::Deactivate));
        let sink = RecordingSink::default();

        store
            .request_write(Mode::Manual, Some(Action::Activate), &sink, 0)
            .unwrap();
        let resolutions = store.apply_frame(r#"{"mode":"manuel","etat":"desactiver"}"#);

        assert!(resolutions.is_empty());
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn auto_switch_sends_mode_only() {
        let mut store = store_with(ModeActionState::new(Mode::Manual, Action::Activate));
        let sink = RecordingSink::default();

        let outcome = store.switch_mode(Mode::Auto, &sink, 0).unwrap();
        assert!(matches!(outcome, WriteOutcome::Pending(_)));
        assert_eq!(sink.frames.borrow().as_slice(), [r#"{"mode":"auto"}"#]);
        assert_eq!(store.latest_mode_state().mode, Mode::Auto);
        assert_eq!(store.latest_mode_state().action, Action::Activate);
    }

    #[test]
    fn manual_entry_is_local_by_default() {
        let mut store = store_with(ModeActionState::default());
        let events = recorded(&mut store);
        let sink = RecordingSink::default();

        let outcome = store.switch_mode(Mode::Manual, &sink, 0).unwrap();
        assert_eq!(
            outcome,
            WriteOutcome::Local(ModeActionState::new(Mode::Manual, Action::Deactivate))
        );
        assert!(sink.frames.borrow().is_empty());
        assert_eq!(store.confirmed_mode_state().mode, Mode::Manual);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn manual_entry_can_require_confirmation() {
        let mut store = StateStore::new(StoreConfig {
            manual_entry_requires_confirmation: true,
            ..StoreConfig::default()
        });
        let sink = RecordingSink::default();

        let outcome = store.switch_mode(Mode::Manual, &sink, 0).unwrap();
        assert!(matches!(outcome, WriteOutcome::Pending(_)));
        assert_eq!(sink.frames.borrow().as_slice(), [r#"{"mode":"manuel"}"#]);
        assert_eq!(store.confirmed_mode_state().mode, Mode::Auto);
    }

    #[test]
    fn switching_to_current_mode_is_noop() {
        let mut store = store_with(ModeActionState::default());
        let sink = RecordingSink::default();

        let outcome = store.switch_mode(Mode::Auto, &sink, 0).unwrap();
        assert_eq!(outcome, WriteOutcome::Local(ModeActionState::default()));
        assert!(sink.frames.borrow().is_empty());
    }

    #[test]
    fn action_change_requires_manual_mode() {
        let mut store = store_with(ModeActionState::default());
        let sink = RecordingSink::default();

        let err = store.set_action(Action::Activate, &sink, 0).unwrap_err();
        assert_eq!(err, ClientError::InvalidTransition { current: Mode::Auto });
        assert!(sink.frames.borrow().is_empty());
    }

    #[test]
    fn failed_send_undoes_optimistic_update() {
        let initial = ModeActionState::new(Mode::Manual, Action::Deactivate);
        let mut store = store_with(initial);
        let sink = RecordingSink {
            offline: true,
            ..RecordingSink::default()
        };

        let err = store
            .request_write(Mode::Manual, Some(Action::Activate), &sink, 0)
            .unwrap_err();
        assert_eq!(err, ClientError::NotConnected);
        assert_eq!(store.latest_mode_state(), initial);
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn alias_readings_share_a_channel_last_wins() {
        let mut store = store_with(ModeActionState::default());

        store.apply_frame(r#"{"données":{"deviceName":"Débitmètre","valeur":"3.2"}}"#);
        assert_eq!(store.latest_sensor_data().flow_rate, Some(3.2));

        store.apply_frame(r#"{"données":{"deviceName":"Débimètre","valeur":"4.8"}}"#);
        assert_eq!(store.latest_sensor_data().flow_rate, Some(4.8));

        store.apply_frame(
            r#"{"dernieresDonnees":[{"deviceName":"Débimètre","valeur":"1"},{"deviceName":"Débitmètre","valeur":"2"}]}"#,
        );
        assert_eq!(store.latest_sensor_data().flow_rate, Some(2.0));
    }

    #[test]
    fn humidity_frame_updates_snapshot() {
        let mut store = store_with(ModeActionState::default());
        let events = recorded(&mut store);

        store.apply_frame(r#"{"données":{"deviceName":"Capteur d'humidité","valeur":"42.5"}}"#);

        assert_eq!(store.latest_sensor_data().humidity, Some(42.5));
        assert_eq!(store.latest_sensor_data().water_level, None);
        let events = events.lock().unwrap();
        assert_eq!(
            events.as_slice(),
            [StoreEvent::Sensors(SensorUpdate {
                readings: vec![SensorReading::new(SensorChannel::Humidity, 42.5)],
                snapshot: store.latest_sensor_data(),
            })]
        );
    }

    #[test]
    fn plain_text_alert_reaches_subscribers_without_data_update() {
        let initial = ModeActionState::new(Mode::Manual, Action::Activate);
        let mut store = store_with(initial);
        let events = recorded(&mut store);

        store.apply_frame("Attention: la cuve est vide");

        let events = events.lock().unwrap();
        assert_eq!(
            events.as_slice(),
            [StoreEvent::Mode(ModeChange {
                mode: Mode::Manual,
                action: Action::Activate,
                data_update: false,
                error_message: Some("Attention: la cuve est vide".to_string()),
                level: Some(NotificationLevel::Alert),
            })]
        );
        assert_eq!(store.latest_mode_state(), initial);
    }

    #[test]
    fn mode_frame_without_etat_keeps_action() {
        let mut store = store_with(ModeActionState::new(Mode::Manual, Action::Activate));

        store.apply_frame(r#"{"mode":"auto"}"#);
        assert_eq!(
            store.latest_mode_state(),
            ModeActionState::new(Mode::Auto, Action::Activate)
        );

        store.apply_frame(r#"{"mode":"manuel"}"#);
        assert_eq!(
            store.latest_mode_state(),
            ModeActionState::new(Mode::Manual, Action::Activate)
        );
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut store = store_with(ModeActionState::default());
        let kept = recorded(&mut store);
        let dropped = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&dropped);
        let id = store.subscribe(move |_| *counter.lock().unwrap() += 1);

        store.apply_frame(r#"{"mode":"auto"}"#);
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.apply_frame(r#"{"mode":"manuel"}"#);

        assert_eq!(*dropped.lock().unwrap(), 1);
        assert_eq!(kept.lock().unwrap().len(), 2);
        assert_eq!(store.subscriber_count(), 1);
    }

    #[test]
    fn cancel_all_restores_confirmed_state() {
        let mut store = store_with(ModeActionState::new(Mode::Manual, Action::Deactivate));
        let sink = RecordingSink::default();

        let id = store
            .request_write(Mode::Manual, Some(Action::Activate), &sink, 0)
            .unwrap();
        assert_eq!(store.cancel_all(), vec![id]);
        assert_eq!(
            store.latest_mode_state(),
            ModeActionState::new(Mode::Manual, Action::Deactivate)
        );
    }

    #[test]
    fn local_manual_entry_is_not_undone_by_a_stale_auto_write() {
        let mut store = StateStore::new(StoreConfig {
            initial_state: ModeActionState::new(Mode::Manual, Action::Deactivate),
            pending_timeout_ms: 2_500,
            ..StoreConfig::default()
        });
        let sink = RecordingSink::default();

        store.set_action(Action::Activate, &sink, 0).unwrap();
        store.switch_mode(Mode::Auto, &sink, 1_000).unwrap();
        assert_eq!(
            store.switch_mode(Mode::Manual, &sink, 1_500).unwrap(),
            WriteOutcome::Local(ModeActionState::new(Mode::Manual, Action::Activate))
        );

        // The activate write expires; the auto write is still in flight.
        assert_eq!(store.expire_pending(3_000).len(), 1);
        assert_eq!(store.pending_count(), 1);
        assert_eq!(
            store.latest_mode_state(),
            ModeActionState::new(Mode::Manual, Action::Deactivate)
        );

        // The superseded write still reports its own timeout.
        assert_eq!(store.expire_pending(3_500).len(), 1);
        assert_eq!(store.latest_mode_state().mode, Mode::Manual);
    }

    #[test]
    fn subscribers_can_be_dispatched_outside_the_store() {
        let mut subscribers = Subscribers::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = subscribers.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        let event = StoreEvent::Mode(ModeChange::update(ModeActionState::default()));
        subscribers.dispatch(&event);
        assert!(subscribers.unsubscribe(id));
        subscribers.dispatch(&event);

        assert_eq!(seen.lock().unwrap().as_slice(), [event]);
        assert!(subscribers.is_empty());
    }
}
