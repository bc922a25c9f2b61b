use crate::cloud::types::value_kind;
use crate::error::PowerOceanError;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a push payload was dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("payload carries no fields")]
    Empty,
}

impl From<DecodeError> for PowerOceanError {
    fn from(err: DecodeError) -> Self {
        Self::decode(err.to_string())
    }
}

/// Decode a push payload into the fields it updates
///
/// The update body is the `params` object when present, otherwise the whole
/// top-level object.
pub fn decode_payload(bytes: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))?;
    if text.trim().is_empty() {
        return Err(DecodeError::Empty);
    }
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let mut root = match value {
        Value::Object(map) => map,
        other => return Err(DecodeError::NotAnObject(value_kind(&other))),
    };

    let fields = match root.remove("params") {
        Some(Value::Object(params)) => params,
        Some(other) => return Err(DecodeError::NotAnObject(value_kind(&other))),
        None => root,
    };
    if fields.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_params() {
        let fields = decode_payload(br#"{"id":1,"version":"1.0","params":{"bpSoc":81}}"#).unwrap();
        assert_eq!(Value::Object(fields), json!({"bpSoc": 81}));
    }

    #[test]
    fn whole_object_without_params() {
        let fields = decode_payload(br#"{"bpSoc":81,"bpPwr":-300}"#).unwrap();
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn rejects_malformed() {
        assert!(matches!(
            decode_payload(&[0xff, 0xfe]),
            Err(DecodeError::InvalidUtf8(_))
        ));
        assert!(matches!(
            decode_payload(b"{not json"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert_eq!(decode_payload(b"[1,2]"), Err(DecodeError::NotAnObject("array")));
        assert_eq!(
            decode_payload(br#"{"params":"x"}"#),
            Err(DecodeError::NotAnObject("string"))
        );
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(decode_payload(b""), Err(DecodeError::Empty));
        assert_eq!(decode_payload(b"  \n"), Err(DecodeError::Empty));
        assert_eq!(decode_payload(b"{}"), Err(DecodeError::Empty));
        assert_eq!(decode_payload(br#"{"params":{}}"#), Err(DecodeError::Empty));
    }

    #[test]
    fn converts_to_crate_error() {
        let err: PowerOceanError = DecodeError::Empty.into();
        assert!(matches!(err, PowerOceanError::Decode { .. }));
    }
}
