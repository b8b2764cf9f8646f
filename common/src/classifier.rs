use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    types::{Action, Mode, SensorChannel, SensorReading},
    wire::{
        channel_for_device, is_known_alert, DIAGNOSTIC_MAX_CHARS, DIAGNOSTIC_PREFIX,
        KEY_CAPTEUR1, KEY_CAPTEUR2, KEY_DERNIERES_DONNEES, KEY_DEVICE_NAME, KEY_DONNEES,
        KEY_ETAT, KEY_MODE, KEY_VALEUR, LEVEL_SENSOR_DEVICE,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// Known operational alert that needs an acknowledgement from the user.
    Alert,
    Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
}

impl Notification {
    pub fn from_text(message: &str) -> Self {
        let level = if is_known_alert(message) {
            NotificationLevel::Alert
        } else {
            NotificationLevel::Diagnostic
        };
        Self {
            message: message.to_string(),
            level,
        }
    }

    pub fn diagnostic_for(frame: &str) -> Self {
        let excerpt: String = frame.chars().take(DIAGNOSTIC_MAX_CHARS).collect();
        Self {
            message: format!("{DIAGNOSTIC_PREFIX}{excerpt}"),
            level: NotificationLevel::Diagnostic,
        }
    }

    pub fn is_alert(&self) -> bool {
        self.level == NotificationLevel::Alert
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    ModeState { mode: Mode, action: Action },
    SensorReading(SensorReading),
    BatchSensorReading(Vec<SensorReading>),
    Notification(Notification),
}

/// Turns one inbound frame into zero or more events.
///
/// Never fails: malformed input degrades to a diagnostic notification. A
/// frame can carry several shapes at once; events come out in the order
/// mode, single reading, batch.
pub fn classify(frame: &str, last_action: Action) -> Vec<InboundEvent> {
    let trimmed = frame.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return vec![InboundEvent::Notification(Notification::from_text(frame))];
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => {
            return vec![InboundEvent::Notification(Notification::diagnostic_for(
                frame,
            ))]
        }
    };

    let Some(object) = value.as_object() else {
        return Vec::new();
    };

    let mut events = Vec::new();

    if let Some(raw_mode) = object.get(KEY_MODE) {
        events.push(classify_mode(object, raw_mode, last_action, frame));
    }

    if let Some(single) = object.get(KEY_DONNEES) {
        events.extend(
            readings_from_device(single)
                .into_iter()
                .map(InboundEvent::SensorReading),
        );
    }

    if let Some(batch) = object.get(KEY_DERNIERES_DONNEES).and_then(Value::as_array) {
        let readings: Vec<SensorReading> = batch.iter().flat_map(readings_from_device).collect();
        if !readings.is_empty() {
            events.push(InboundEvent::BatchSensorReading(readings));
        }
    }

    events
}

fn classify_mode(
    object: &Map<String, Value>,
    raw_mode: &Value,
    last_action: Action,
    frame: &str,
) -> InboundEvent {
    let Some(mode) = raw_mode.as_str().and_then(Mode::from_wire) else {
        return InboundEvent::Notification(Notification::diagnostic_for(frame));
    };

    let action = match object.get(KEY_ETAT) {
        None | Some(Value::Null) => last_action,
        Some(raw) => match raw.as_str().and_then(Action::from_wire) {
            Some(action) => action,
            None => return InboundEvent::Notification(Notification::diagnostic_for(frame)),
        },
    };

    InboundEvent::ModeState { mode, action }
}

/// Readings carried by one `{deviceName, valeur, capteur1?, capteur2?}` entry.
/// Anything unrecognized or unparseable yields nothing.
fn readings_from_device(entry: &Value) -> Vec<SensorReading> {
    let Some(device) = entry.as_object() else {
        return Vec::new();
    };
    let Some(name) = device.get(KEY_DEVICE_NAME).and_then(Value::as_str) else {
        return Vec::new();
    };

    if name.trim() == LEVEL_SENSOR_DEVICE {
        return [
            (KEY_CAPTEUR1, SensorChannel::Presence1),
            (KEY_CAPTEUR2, SensorChannel::Presence2),
        ]
        .into_iter()
        .filter_map(|(key, channel)| {
            device
                .get(key)
                .and_then(parse_number)
                .map(|value| SensorReading::new(channel, value))
        })
        .collect();
    }

    channel_for_device(name)
        .and_then(|channel| {
            device
                .get(KEY_VALEUR)
                .and_then(parse_number)
                .map(|value| SensorReading::new(channel, value))
        })
        .into_iter()
        .collect()
}

/// Accepts JSON numbers and decimal strings; rejects non-finite values.
pub fn parse_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reading(channel: SensorChannel, value: f64) -> SensorReading {
        SensorReading::new(channel, value)
    }

    #[test]
    fn mode_frame_without_etat_keeps_previous_action() {
        let events = classify(r#"{"mode":"manuel"}"#, Action::Activate);
        assert_eq!(
            events,
            vec![InboundEvent::ModeState {
                mode: Mode::Manual,
                action: Action::Activate,
            }]
        );

        let events = classify(r#"{"mode":"auto","etat":null}"#, Action::Deactivate);
        assert_eq!(
            events,
            vec![InboundEvent::ModeState {
                mode: Mode::Auto,
                action: Action::Deactivate,
            }]
        );
    }

    #[test]
    fn mode_frame_with_etat_replaces_action() {
        let events = classify(r#"{"mode":"manuel","etat":"activer"}"#, Action::Deactivate);
        assert_eq!(
            events,
            vec![InboundEvent::ModeState {
                mode: Mode::Manual,
                action: Action::Activate,
            }]
        );
    }

    #[test]
    fn unknown_mode_degrades_to_diagnostic() {
        let events = classify(r#"{"mode":"eco"}"#, Action::Deactivate);
        assert_eq!(events.len(), 1);
        match &events[0] {
            InboundEvent::Notification(notification) => {
                assert_eq!(notification.level, NotificationLevel::Diagnostic);
                assert!(notification.message.starts_with(DIAGNOSTIC_PREFIX));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn single_humidity_reading_from_string_value() {
        let events = classify(
            r#"{"données":{"deviceName":"Capteur d'humidité","valeur":"42.5"}}"#,
            Action::Deactivate,
        );
        assert_eq!(
            events,
            vec![InboundEvent::SensorReading(reading(
                SensorChannel::Humidity,
                42.5
            ))]
        );
    }

    #[test]
    fn level_sensor_feeds_both_presence_channels() {
        let events = classify(
            r#"{"données":{"deviceName":"level-sensor","capteur1":1,"capteur2":0}}"#,
            Action::Deactivate,
        );
        assert_eq!(
            events,
            vec![
                InboundEvent::SensorReading(reading(SensorChannel::Presence1, 1.0)),
                InboundEvent::SensorReading(reading(SensorChannel::Presence2, 0.0)),
            ]
        );
    }

    #[test]
    fn batch_skips_nulls_and_bad_entries_in_order() {
        let frame = r#"{"dernieresDonnees":[
            null,
            {"deviceName":"Capteur d'humidité","valeur":"40"},
            {"deviceName":"Débitmètre","valeur":"n/a"},
            42,
            {"deviceName":"Inconnu","valeur":"3"},
            null,
            {"deviceName":"Débimètre","valeur":12.5},
            {"valeur":"7"}
        ]}"#;

        let events = classify(frame, Action::Deactivate);
        assert_eq!(
            events,
            vec![InboundEvent::BatchSensorReading(vec![
                reading(SensorChannel::Humidity, 40.0),
                reading(SensorChannel::FlowRate, 12.5),
            ])]
        );
    }

    #[test]
    fn batch_of_only_nulls_yields_nothing() {
        let events = classify(r#"{"dernieresDonnees":[null,null]}"#, Action::Deactivate);
        assert!(events.is_empty());
    }

    #[test]
    fn combined_frame_emits_mode_then_readings() {
        let frame = r#"{
            "dernieresDonnees":[{"deviceName":"Capteur niveau","valeur":"18"}],
            "données":{"deviceName":"Capteur sol","valeur":"55"},
            "mode":"auto"
        }"#;

        let events = classify(frame, Action::Activate);
        assert_eq!(
            events,
            vec![
                InboundEvent::ModeState {
                    mode: Mode::Auto,
                    action: Action::Activate,
                },
                InboundEvent::SensorReading(reading(SensorChannel::Humidity, 55.0)),
                InboundEvent::BatchSensorReading(vec![reading(SensorChannel::WaterLevel, 18.0)]),
            ]
        );
    }

    #[test]
    fn plain_text_alert_keeps_exact_message() {
        let events = classify("Attention: la cuve est vide", Action::Deactivate);
        assert_eq!(
            events,
            vec![InboundEvent::Notification(Notification {
                message: "Attention: la cuve est vide".to_string(),
                level: NotificationLevel::Alert,
            })]
        );
    }

    #[test]
    fn plain_text_garbage_is_diagnostic() {
        let events = classify("hello there", Action::Deactivate);
        assert_eq!(
            events,
            vec![InboundEvent::Notification(Notification {
                message: "hello there".to_string(),
                level: NotificationLevel::Diagnostic,
            })]
        );
    }

    #[test]
    fn malformed_json_is_truncated_diagnostic() {
        let frame = format!("{{\"mode\": {}", "x".repeat(300));
        let events = classify(&frame, Action::Deactivate);
        assert_eq!(events.len(), 1);
        let InboundEvent::Notification(notification) = &events[0] else {
            panic!("expected notification");
        };
        assert_eq!(notification.level, NotificationLevel::Diagnostic);
        assert_eq!(
            notification.message.chars().count(),
            DIAGNOSTIC_PREFIX.chars().count() + DIAGNOSTIC_MAX_CHARS
        );
    }

    #[test]
    fn unrelated_json_yields_nothing() {
        assert!(classify(r#"{"hello":"world"}"#, Action::Deactivate).is_empty());
        assert!(classify("[1,2,3]", Action::Deactivate).is_empty());
        assert!(classify("   ", Action::Deactivate).is_empty());
    }

    #[test]
    fn parse_number_rejects_non_finite() {
        assert_eq!(parse_number(&Value::String(" 3.5 ".into())), Some(3.5));
        assert_eq!(parse_number(&Value::String("NaN".into())), None);
        assert_eq!(parse_number(&Value::String("inf".into())), None);
        assert_eq!(parse_number(&Value::Bool(true)), None);
    }
}
