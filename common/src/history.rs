use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    classifier::parse_number,
    error::ClientError,
    types::SensorChannel,
    wire::{channel_for_device, channel_for_field, KEY_DEVICE_NAME, KEY_DONNEES, KEY_VALEUR},
};

const KEY_HISTORY: &str = "historique";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryUnit {
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "d")]
    Days,
    #[serde(rename = "w")]
    Weeks,
}

impl HistoryUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minutes => "m",
            Self::Hours => "h",
            Self::Days => "d",
            Self::Weeks => "w",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "m" => Some(Self::Minutes),
            "h" => Some(Self::Hours),
            "d" => Some(Self::Days),
            "w" => Some(Self::Weeks),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    pub duration: u32,
    pub unit: HistoryUnit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRequestBody {
    pub duree: String,
    pub unite: HistoryUnit,
}

impl HistoryQuery {
    pub fn new(duration: u32, unit: HistoryUnit) -> Self {
        Self { duration, unit }
    }

    /// Builds a query from user-entered text, rejecting it before any
    /// request is made.
    pub fn parse(duration: &str, unit: &str) -> Result<Self, ClientError> {
        let duration = duration
            .trim()
            .parse::<u32>()
            .map_err(|_| ClientError::Validation(format!("invalid duration: {duration:?}")))?;
        let unit = HistoryUnit::from_code(unit).ok_or_else(|| {
            ClientError::Validation(format!("invalid unit {unit:?} (expected m, h, d or w)"))
        })?;
        let query = Self { duration, unit };
        query.validate()?;
        Ok(query)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.duration == 0 {
            return Err(ClientError::Validation(
                "duration must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn body(&self) -> HistoryRequestBody {
        HistoryRequestBody {
            duree: self.duration.to_string(),
            unite: self.unit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub channel: SensorChannel,
    pub timestamp: Option<DateTime<Utc>>,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryResult {
    pub points: Vec<HistoryPoint>,
    pub error: Option<String>,
}

impl HistoryResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            points: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn for_channel(&self, channel: SensorChannel) -> impl Iterator<Item = &HistoryPoint> {
        self.points
            .iter()
            .filter(move |point| point.channel == channel)
    }
}

/// Normalizes both the time-series rows (`_time`, `_value`, `_field`,
/// `tagname`) and the legacy rows (`date`, `deviceName`, `valeur`).
pub fn normalize_history(body: &Value) -> Vec<HistoryPoint> {
    let rows = history_rows(body);
    let rows: Vec<&Value> = if let Some(items) = rows.as_array() {
        items.iter().collect()
    } else if rows.is_object() {
        vec![rows]
    } else {
        Vec::new()
    };

    rows.into_iter().filter_map(normalize_row).collect()
}

// Older servers wrapped the rows in `historique` or `données.historique`.
fn history_rows(body: &Value) -> &Value {
    if let Some(rows) = body.get(KEY_HISTORY).filter(|rows| rows.is_array()) {
        return rows;
    }
    if let Some(rows) = body
        .get(KEY_DONNEES)
        .and_then(|inner| inner.get(KEY_HISTORY))
        .filter(|rows| rows.is_array())
    {
        return rows;
    }
    body
}

fn normalize_row(row: &Value) -> Option<HistoryPoint> {
    let row = row.as_object()?;

    let channel = row
        .get("_field")
        .and_then(Value::as_str)
        .and_then(channel_for_field)
        .or_else(|| {
            row.get("tagname")
                .and_then(Value::as_str)
                .and_then(channel_for_device)
        })
        .or_else(|| {
            row.get(KEY_DEVICE_NAME)
                .and_then(Value::as_str)
                .and_then(channel_for_device)
        })?;

    let value = row
        .get("_value")
        .or_else(|| row.get(KEY_VALEUR))
        .and_then(parse_number)?;

    let timestamp = row
        .get("_time")
        .or_else(|| row.get("date"))
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    Some(HistoryPoint {
        channel,
        timestamp,
        value,
    })
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
