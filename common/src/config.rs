use serde::{Deserialize, Serialize};

use crate::{types::ModeActionState, wire::WriteEnvelope};

pub const DEFAULT_API_BASE_URL: &str = "https://api.arrosage.cielnewton.fr";
pub const DEFAULT_WS_URL: &str = "wss://api.arrosage.cielnewton.fr/ws";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub pending_timeout_ms: u64,
    /// When false, switching to manual mode is a local-only transition.
    pub manual_entry_requires_confirmation: bool,
    pub envelope: WriteEnvelope,
    pub initial_state: ModeActionState,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pending_timeout_ms: 5_000,
            manual_entry_requires_confirmation: false,
            envelope: WriteEnvelope::Bare,
            initial_state: ModeActionState::default(),
        }
    }
}

impl StoreConfig {
    pub fn sanitize(&mut self) {
        self.pending_timeout_ms = self.pending_timeout_ms.clamp(100, 60_000);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Reconnect blindly after `delay_ms`. Suits static credentials.
    Auto { delay_ms: u64 },
    /// Stay down until the session owner re-initializes the connection.
    #[default]
    Deferred,
}

impl ReconnectPolicy {
    pub const DEFAULT_AUTO_DELAY_MS: u64 = 2_000;

    pub fn auto() -> Self {
        Self::Auto {
            delay_ms: Self::DEFAULT_AUTO_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub keepalive_interval_ms: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_ms: 50_000,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl TransportConfig {
    pub fn sanitize(&mut self) {
        self.keepalive_interval_ms = self.keepalive_interval_ms.clamp(5_000, 300_000);
        if let ReconnectPolicy::Auto { delay_ms } = &mut self.reconnect {
            *delay_ms = (*delay_ms).clamp(100, 60_000);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub api_base_url: String,
    pub ws_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
        }
    }
}

impl EndpointConfig {
    pub fn sanitize(&mut self) {
        while self.api_base_url.ends_with('/') {
            self.api_base_url.pop();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub store: StoreConfig,
    pub transport: TransportConfig,
    pub endpoints: EndpointConfig,
    pub expiry_tick_ms: u64,
    pub data_wait_timeout_ms: u64,
    pub poll_interval_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            transport: TransportConfig::default(),
            endpoints: EndpointConfig::default(),
            expiry_tick_ms: 250,
            data_wait_timeout_ms: 3_000,
            poll_interval_ms: None,
        }
    }
}

impl SessionConfig {
    pub fn sanitize(&mut self) {
        self.store.sanitize();
        self.transport.sanitize();
        self.endpoints.sanitize();
        self.expiry_tick_ms = self.expiry_tick_ms.clamp(10, 1_000);
        self.data_wait_timeout_ms = self.data_wait_timeout_ms.clamp(100, 60_000);
        self.poll_interval_ms = self.poll_interval_ms.map(|ms| ms.max(1_000));
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub session: SessionConfig,
}
