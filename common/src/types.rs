use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "manuel")]
    Manual,
    #[serde(rename = "auto")]
    Auto,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manuel",
            Self::Auto => "auto",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "manuel" | "manual" => Some(Self::Manual),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "activer")]
    Activate,
    #[serde(rename = "desactiver")]
    Deactivate,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activate => "activer",
            Self::Deactivate => "desactiver",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "activer" => Some(Self::Activate),
            "desactiver" | "désactiver" => Some(Self::Deactivate),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Activate => Self::Deactivate,
            Self::Deactivate => Self::Activate,
        }
    }
}

/// Watering state as last seen by the client.
///
/// `action` only expresses client intent in manual mode; in auto mode it
/// mirrors whatever the server last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeActionState {
    pub mode: Mode,
    pub action: Action,
}

impl Default for ModeActionState {
    fn default() -> Self {
        Self {
            mode: Mode::Auto,
            action: Action::Deactivate,
        }
    }
}

impl ModeActionState {
    pub fn new(mode: Mode, action: Action) -> Self {
        Self { mode, action }
    }

    pub fn phase(&self) -> ModePhase {
        match (self.mode, self.action) {
            (Mode::Auto, _) => ModePhase::Auto,
            (Mode::Manual, Action::Activate) => ModePhase::ManualActive,
            (Mode::Manual, Action::Deactivate) => ModePhase::ManualInactive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModePhase {
    ManualActive,
    ManualInactive,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorChannel {
    Humidity,
    WaterLevel,
    FlowRate,
    Presence1,
    Presence2,
}

impl SensorChannel {
    pub const ALL: [SensorChannel; 5] = [
        Self::Humidity,
        Self::WaterLevel,
        Self::FlowRate,
        Self::Presence1,
        Self::Presence2,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Humidity => "humidity",
            Self::WaterLevel => "water_level",
            Self::FlowRate => "flow_rate",
            Self::Presence1 => "presence_1",
            Self::Presence2 => "presence_2",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::Humidity => "%",
            Self::WaterLevel => "cm",
            Self::FlowRate => "L/min",
            Self::Presence1 | Self::Presence2 => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub channel: SensorChannel,
    pub value: f64,
}

impl SensorReading {
    pub fn new(channel: SensorChannel, value: f64) -> Self {
        Self { channel, value }
    }
}

/// Latest reading per channel. `None` means the channel was never observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub humidity: Option<f64>,
    #[serde(rename = "waterLevel")]
    pub water_level: Option<f64>,
    #[serde(rename = "flowRate")]
    pub flow_rate: Option<f64>,
    pub presence1: Option<f64>,
    pub presence2: Option<f64>,
}

impl SensorSnapshot {
    pub fn get(&self, channel: SensorChannel) -> Option<f64> {
        match channel {
            SensorChannel::Humidity => self.humidity,
            SensorChannel::WaterLevel => self.water_level,
            SensorChannel::FlowRate => self.flow_rate,
            SensorChannel::Presence1 => self.presence1,
            SensorChannel::Presence2 => self.presence2,
        }
    }

    pub fn set(&mut self, channel: SensorChannel, value: f64) {
        let slot = match channel {
            SensorChannel::Humidity => &mut self.humidity,
            SensorChannel::WaterLevel => &mut self.water_level,
            SensorChannel::FlowRate => &mut self.flow_rate,
            SensorChannel::Presence1 => &mut self.presence1,
            SensorChannel::Presence2 => &mut self.presence2,
        };
        *slot = Some(value);
    }

    pub fn apply(&mut self, reading: SensorReading) {
        self.set(reading.channel, reading.value);
    }

    pub fn is_empty(&self) -> bool {
        SensorChannel::ALL.iter().all(|channel| self.get(*channel).is_none())
    }

    pub fn channels(&self) -> impl Iterator<Item = SensorReading> + '_ {
        SensorChannel::ALL
            .into_iter()
            .filter_map(|channel| self.get(channel).map(|value| SensorReading::new(channel, value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PendingId(pub u64);

impl std::fmt::Display for PendingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
