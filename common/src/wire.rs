use serde::{Deserialize, Serialize};

use crate::types::{Action, Mode, SensorChannel};

pub const KEY_MODE: &str = "mode";
pub const KEY_ETAT: &str = "etat";
pub const KEY_DONNEES: &str = "données";
pub const KEY_DERNIERES_DONNEES: &str = "dernieresDonnees";
pub const KEY_DEVICE_NAME: &str = "deviceName";
pub const KEY_VALEUR: &str = "valeur";
pub const KEY_CAPTEUR1: &str = "capteur1";
pub const KEY_CAPTEUR2: &str = "capteur2";

pub const PATH_LOGIN: &str = "/connexion";
pub const PATH_HISTORY: &str = "/bdd";
pub const PATH_EMAIL: &str = "/mail";
pub const PATH_CHANGE_PASSWORD: &str = "/modifier-mdp";
pub const PATH_LATEST: &str = "/emission";

pub const ALERT_TANK_EMPTY: &str = "cuve est vide";
pub const ALERT_PUMP_LEVEL: &str = "niveau de la pompe";
pub const ALERT_SUBSTRINGS: [&str; 2] = [ALERT_TANK_EMPTY, ALERT_PUMP_LEVEL];

pub const DIAGNOSTIC_PREFIX: &str = "Erreur serveur: ";
pub const DIAGNOSTIC_MAX_CHARS: usize = 100;

/// Composite device reporting both presence indicators through
/// `capteur1` / `capteur2`.
pub const LEVEL_SENSOR_DEVICE: &str = "level-sensor";

static DEVICE_ALIASES: &[(&str, SensorChannel)] = &[
    ("Capteur d'humidité", SensorChannel::Humidity),
    ("Capteur sol", SensorChannel::Humidity),
    ("Capteur de niveau d'eau", SensorChannel::WaterLevel),
    ("Capteur niveau", SensorChannel::WaterLevel),
    ("Débitmètre", SensorChannel::FlowRate),
    ("Débimètre", SensorChannel::FlowRate),
    ("Capteur de présence d'eau", SensorChannel::Presence1),
    ("Capteu de présence d'eau 1", SensorChannel::Presence1),
    ("Capteur eau supérieur à 500L", SensorChannel::Presence2),
    ("Capteu de présence d'eau 2", SensorChannel::Presence2),
];

static FIELD_ALIASES: &[(&str, SensorChannel)] = &[
    ("Humidité", SensorChannel::Humidity),
    ("NiveauDeau", SensorChannel::WaterLevel),
    ("Débit", SensorChannel::FlowRate),
    ("capteur1", SensorChannel::Presence1),
    ("capteur2", SensorChannel::Presence2),
];

pub fn channel_for_device(device_name: &str) -> Option<SensorChannel> {
    lookup(DEVICE_ALIASES, device_name)
}

pub fn channel_for_field(field: &str) -> Option<SensorChannel> {
    lookup(FIELD_ALIASES, field)
}

fn lookup(table: &[(&str, SensorChannel)], name: &str) -> Option<SensorChannel> {
    let name = name.trim();
    table
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, channel)| *channel)
}

pub fn is_known_alert(message: &str) -> bool {
    ALERT_SUBSTRINGS
        .iter()
        .any(|needle| message.contains(needle))
}

/// Outbound write framing. `SendData` is the older typed envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteEnvelope {
    #[default]
    Bare,
    SendData,
}

#[derive(Serialize)]
struct BareWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<Action>,
    mode: Mode,
}

#[derive(Serialize)]
struct SendDataWrite {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<Action>,
    mode: Mode,
}

pub fn encode_write(envelope: WriteEnvelope, mode: Mode, action: Option<Action>) -> String {
    let encoded = match envelope {
        WriteEnvelope::Bare => serde_json::to_string(&BareWrite { action, mode }),
        WriteEnvelope::SendData => serde_json::to_string(&SendDataWrite {
            kind: "sendData",
            action,
            mode,
        }),
    };
    // Plain enums and a static str cannot fail to serialize.
    encoded.unwrap_or_default()
}
