pub mod classifier;
pub mod config;
pub mod error;
pub mod history;
pub mod store;
pub mod types;
pub mod wire;

pub use classifier::{classify, InboundEvent, Notification, NotificationLevel};
pub use config::{
    EndpointConfig, ReconnectPolicy, RuntimeConfig, SessionConfig, StoreConfig, TransportConfig,
};
pub use error::ClientError;
pub use history::{normalize_history, HistoryPoint, HistoryQuery, HistoryResult, HistoryUnit};
pub use store::{
    FrameSink, ModeChange, Resolution, SensorUpdate, StateStore, StoreEvent, SubscriptionId,
    Subscribers, WriteOutcome,
};
pub use types::{
    Action, Mode, ModeActionState, ModePhase, PendingId, SensorChannel, SensorReading,
    SensorSnapshot,
};
pub use wire::WriteEnvelope;
