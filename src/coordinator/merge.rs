//! Path-addressed merging of REST, historical and MQTT fields

use crate::config::MergePolicy;
use crate::signature::flatten_fields;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub type FieldMap = BTreeMap<String, Value>;

/// Flatten a REST snapshot into path-addressed leaves
pub fn flatten_snapshot(data: &Map<String, Value>) -> FieldMap {
    flatten_fields(data, "").into_iter().collect()
}

/// Flatten a historical summary under `key`; an empty key merges at the root
pub fn flatten_history(data: &Map<String, Value>, key: &str) -> FieldMap {
    if key.is_empty() {
        return flatten_snapshot(data);
    }
    let mut wrapped = Map::new();
    wrapped.insert(key.to_string(), Value::Object(data.clone()));
    flatten_snapshot(&wrapped)
}

fn is_boundary(byte: Option<&u8>) -> bool {
    matches!(byte, Some(b'.') | Some(b'['))
}

/// Paths strictly above `path` (`a`, `a.b` for `a.b[0]`)
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.char_indices()
        .filter(|(i, c)| *i > 0 && (*c == '.' || *c == '['))
        .map(move |(i, _)| &path[..i])
}

fn descendants<'a, V>(map: &'a BTreeMap<String, V>, path: &'a str) -> impl Iterator<Item = &'a String> {
    map.range::<str, _>((std::ops::Bound::Excluded(path), std::ops::Bound::Unbounded))
        .map(|(k, _)| k)
        .take_while(move |k| k.starts_with(path))
        .filter(move |k| is_boundary(k.as_bytes().get(path.len())))
}

/// Whether `path` overlaps an existing entry: the same key, a parent leaf or a nested leaf
pub fn conflicts<V>(map: &BTreeMap<String, V>, path: &str) -> bool {
    map.contains_key(path)
        || ancestors(path).any(|a| map.contains_key(a))
        || descendants(map, path).next().is_some()
}

/// Insert `value` at `path`, evicting any leaves whose shape it replaces
///
/// Writing `errCode = []` over `errCode[0]`, `errCode[1]` removes both
/// indexed leaves; writing `a.b` over a leaf `a` removes `a`.
pub fn overlay<V>(map: &mut BTreeMap<String, V>, path: String, value: V) {
    let stale: Vec<String> = descendants(map, &path)
        .cloned()
        .chain(
            ancestors(&path)
                .filter(|a| map.contains_key(*a))
                .map(str::to_string),
        )
        .collect();
    for key in stale {
        map.remove(&key);
    }
    map.insert(path, value);
}

/// Whether `path` is `root` or lies underneath it
fn within(path: &str, root: &str) -> bool {
    path == root || (path.starts_with(root) && is_boundary(path.as_bytes().get(root.len())))
}

/// Remove `root` and every leaf underneath it
fn evict<V>(map: &mut BTreeMap<String, V>, root: &str) {
    let stale: Vec<String> = descendants(map, root).cloned().collect();
    for key in stale {
        map.remove(&key);
    }
    map.remove(root);
}

/// Outermost array paths carried by an update; each replaces its previous contents
fn array_roots(fields: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in fields {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Array(_) => out.push(path),
            Value::Object(map) => array_roots(map, &path, out),
            _ => {}
        }
    }
}

/// MQTT-derived leaves not yet superseded by a REST snapshot
#[derive(Debug, Default)]
pub struct MqttBuffer {
    entries: BTreeMap<String, (u64, Value)>,
    /// Array paths rewritten wholesale, with the message that last wrote them
    replaced: BTreeMap<String, u64>,
    last_seq: u64,
}

impl MqttBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one decoded message; returns the flattened paths it touched
    pub fn apply(&mut self, fields: &Map<String, Value>) -> Vec<String> {
        self.last_seq += 1;
        let seq = self.last_seq;

        let mut roots = Vec::new();
        array_roots(fields, "", &mut roots);
        for root in roots {
            evict(&mut self.entries, &root);
            evict(&mut self.replaced, &root);
            self.replaced.insert(root, seq);
        }

        flatten_fields(fields, "")
            .into_iter()
            .map(|(path, value)| {
                let nested: Vec<String> = descendants(&self.replaced, &path).cloned().collect();
                for root in nested {
                    self.replaced.remove(&root);
                }
                overlay(&mut self.entries, path.clone(), (seq, value));
                path
            })
            .collect()
    }

    /// Sequence number of the most recent message
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Drop entries recorded at or before `seq`
    pub fn discard_through(&mut self, seq: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (s, _)| *s > seq);
        self.replaced.retain(|_, s| *s > seq);
        before - self.entries.len()
    }

    /// Array paths whose earlier contents, from any source, are void
    pub fn replaced_arrays(&self) -> impl Iterator<Item = &String> {
        self.replaced.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().map(|(k, (_, v))| (k, v))
    }
}

/// Result of composing the canonical state
#[derive(Debug, Default)]
pub struct Composed {
    pub fields: FieldMap,
    /// MQTT paths rejected under [`MergePolicy::RestWins`]
    pub dropped: Vec<String>,
}

/// REST snapshot, overlaid by the historical summary, overlaid by buffered MQTT fields
pub fn compose(
    rest: &FieldMap,
    history: &FieldMap,
    mqtt: &MqttBuffer,
    policy: MergePolicy,
) -> Composed {
    let mut fields = rest.clone();
    for (path, value) in history {
        overlay(&mut fields, path.clone(), value.clone());
    }

    let mut dropped = Vec::new();
    match policy {
        MergePolicy::MqttWins => {
            for root in mqtt.replaced_arrays() {
                evict(&mut fields, root);
            }
            for (path, value) in mqtt.iter() {
                overlay(&mut fields, path.clone(), value.clone());
            }
        }
        MergePolicy::RestWins => {
            // Decide against the REST side only so MQTT leaves never block each other
            let base = fields.clone();
            let blocked: Vec<&String> = mqtt
                .replaced_arrays()
                .filter(|root| conflicts(&base, root))
                .collect();
            for (path, value) in mqtt.iter() {
                if conflicts(&base, path) || blocked.iter().any(|root| within(path, root)) {
                    dropped.push(path.clone());
                } else {
                    overlay(&mut fields, path.clone(), value.clone());
                }
            }
        }
    }
    Composed { fields, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn mqtt_wins_precedence() {
        let rest = flatten_snapshot(&obj(json!({"x": 1, "y": 2})));
        let history = flatten_history(&obj(json!({"h": 3})), "");
        let mut mqtt = MqttBuffer::new();
        mqtt.apply(&obj(json!({"y": 9})));

        let out = compose(&rest, &history, &mqtt, MergePolicy::MqttWins);
        assert_eq!(
            out.fields,
            flatten_snapshot(&obj(json!({"x": 1, "y": 9, "h": 3})))
        );
        assert!(out.dropped.is_empty());
    }

    #[test]
    fn rest_wins_precedence() {
        let rest = flatten_snapshot(&obj(json!({"x": 1, "y": 2})));
        let history = flatten_history(&obj(json!({"h": 3})), "");
        let mut mqtt = MqttBuffer::new();
        mqtt.apply(&obj(json!({"y": 9, "z": 4})));

        let out = compose(&rest, &history, &mqtt, MergePolicy::RestWins);
        assert_eq!(
            out.fields,
            flatten_snapshot(&obj(json!({"x": 1, "y": 2, "h": 3, "z": 4})))
        );
        assert_eq!(out.dropped, vec!["y".to_string()]);
    }

    #[test]
    fn rest_wins_applies_to_nested_collisions() {
        let rest = flatten_snapshot(&obj(json!({"pcsAPhase": {"vol": 230}})));
        let mut mqtt = MqttBuffer::new();
        mqtt.apply(&obj(json!({"pcsAPhase": {"vol": 231, "amp": 2}})));

        let out = compose(&rest, &FieldMap::new(), &mqtt, MergePolicy::RestWins);
        assert_eq!(out.fields.get("pcsAPhase.vol"), Some(&json!(230)));
        assert_eq!(out.fields.get("pcsAPhase.amp"), Some(&json!(2)));
        assert_eq!(out.dropped, vec!["pcsAPhase.vol".to_string()]);
    }

    #[test]
    fn history_is_nested_under_key() {
        let history = flatten_history(
            &obj(json!({"data": [{"indexName": "Self-sufficiency", "indexValue": 91}]})),
            "historical_data",
        );
        assert_eq!(
            history.get("historical_data.data[0].indexValue"),
            Some(&json!(91))
        );

        let empty = flatten_history(&Map::new(), "historical_data");
        assert_eq!(empty.get("historical_data"), Some(&json!({})));
    }

    #[test]
    fn overlay_replaces_shape() {
        let mut map = flatten_snapshot(&obj(json!({"emsErrCode": {"errCode": [3, 7]}, "a": 1})));
        overlay(&mut map, "emsErrCode.errCode".to_string(), json!([]));
        assert_eq!(map.get("emsErrCode.errCode"), Some(&json!([])));
        assert!(map.get("emsErrCode.errCode[0]").is_none());
        assert!(map.get("emsErrCode.errCode[1]").is_none());

        overlay(&mut map, "a.b".to_string(), json!(2));
        assert!(map.get("a").is_none());
        assert_eq!(map.get("a.b"), Some(&json!(2)));
    }

    #[test]
    fn overlay_keeps_siblings_with_shared_prefix() {
        let mut map = flatten_snapshot(&obj(json!({"bpSoc": 80, "bpSocMax": 100})));
        overlay(&mut map, "bpSoc".to_string(), json!(81));
        assert_eq!(map.get("bpSocMax"), Some(&json!(100)));
        assert!(!conflicts(&map, "bpSo"));
        assert!(conflicts(&map, "bpSoc"));
        assert!(conflicts(&map, "bpSoc.x"));
    }

    #[test]
    fn buffer_discards_superseded_entries() {
        let mut mqtt = MqttBuffer::new();
        mqtt.apply(&obj(json!({"bpSoc": 81})));
        let cut = mqtt.last_seq();
        mqtt.apply(&obj(json!({"bpPwr": 500})));

        assert_eq!(mqtt.discard_through(cut), 1);
        assert!(mqtt.get("bpSoc").is_none());
        assert_eq!(mqtt.get("bpPwr"), Some(&json!(500)));
    }

    #[test]
    fn buffer_later_value_wins() {
        let mut mqtt = MqttBuffer::new();
        mqtt.apply(&obj(json!({"bpSoc": 81})));
        let touched = mqtt.apply(&obj(json!({"bpSoc": 82})));
        assert_eq!(touched, vec!["bpSoc".to_string()]);
        assert_eq!(mqtt.len(), 1);
        assert_eq!(mqtt.get("bpSoc"), Some(&json!(82)));
    }

    #[test]
    fn shorter_mqtt_array_replaces_rest_array() {
        let rest = flatten_snapshot(&obj(json!({"emsErrCode": {"errCode": [3, 7]}, "bpSoc": 80})));
        let mut mqtt = MqttBuffer::new();
        mqtt.apply(&obj(json!({"emsErrCode": {"errCode": [5]}})));

        let out = compose(&rest, &FieldMap::new(), &mqtt, MergePolicy::MqttWins);
        assert_eq!(
            out.fields,
            flatten_snapshot(&obj(json!({"emsErrCode": {"errCode": [5]}, "bpSoc": 80})))
        );
    }

    #[test]
    fn shorter_array_replaces_buffered_array() {
        let mut mqtt = MqttBuffer::new();
        mqtt.apply(&obj(json!({"errCode": [3, 7]})));
        mqtt.apply(&obj(json!({"errCode": [5]})));

        let entries: Vec<(&String, &Value)> = mqtt.iter().collect();
        assert_eq!(entries, vec![(&"errCode[0]".to_string(), &json!(5))]);
    }

    #[test]
    fn rest_wins_keeps_whole_rest_array() {
        let rest = flatten_snapshot(&obj(json!({"errCode": [3]})));
        let mut mqtt = MqttBuffer::new();
        mqtt.apply(&obj(json!({"errCode": [5, 9]})));

        let out = compose(&rest, &FieldMap::new(), &mqtt, MergePolicy::RestWins);
        assert_eq!(out.fields, rest);
        assert_eq!(
            out.dropped,
            vec!["errCode[0]".to_string(), "errCode[1]".to_string()]
        );
    }

    #[test]
    fn array_reset_is_superseded_with_its_message() {
        let rest = flatten_snapshot(&obj(json!({"errCode": [3, 7]})));
        let mut mqtt = MqttBuffer::new();
        mqtt.apply(&obj(json!({"errCode": [5]})));
        let cut = mqtt.last_seq();
        mqtt.apply(&obj(json!({"bpSoc": 81})));
        mqtt.discard_through(cut);
        assert_eq!(mqtt.replaced_arrays().count(), 0);

        let out = compose(&rest, &FieldMap::new(), &mqtt, MergePolicy::MqttWins);
        assert_eq!(out.fields.get("errCode[1]"), Some(&json!(7)));
    }
}
