use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// What caused a snapshot to be published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// Placeholder published before the first refresh
    Init,
    /// REST snapshot (and possibly historical summary) merged
    Rest,
    /// MQTT push update applied
    Mqtt,
    /// MQTT connection state changed
    Connection,
}

/// Immutable view of the canonical state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    /// Monotonic publish counter, 0 before the first refresh
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    pub source: UpdateSource,
    pub mqtt_connected: bool,
    /// Flattened field paths (`pcsAPhase.vol`, `errCode[0]`, ...)
    pub fields: BTreeMap<String, Value>,
}

impl StateSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            updated_at: Utc::now(),
            source: UpdateSource::Init,
            mqtt_connected: false,
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.fields.get(path)
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        match self.fields.get(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        match self.fields.get(path)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.fields.get(path)?.as_str()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Leaves addressed below `prefix` (`prefix.x` or `prefix[i]...`)
    pub fn children<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.fields
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .filter(move |(k, _)| {
                matches!(k.as_bytes().get(prefix.len()), Some(b'.') | Some(b'['))
            })
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Fields as a flat JSON object keyed by path
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
