use crate::error::{PowerOceanError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

/// Timestamp layout used by the historical endpoint
pub const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Success code carried by every envelope
pub const SUCCESS_CODE: &str = "0";

/// `{code, message, data}` wrapper returned by every REST call
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(deserialize_with = "string_or_number")]
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Unwrap `data` of a successful envelope, or turn the code into an API error
    pub fn into_data(self) -> Result<Value> {
        if !self.is_success() {
            return Err(PowerOceanError::api(
                self.code,
                self.message.unwrap_or_default(),
            ));
        }
        Ok(self.data.unwrap_or(Value::Null))
    }

    /// Like [`Envelope::into_data`] but requires an object (null yields an empty map)
    pub fn into_object(self) -> Result<Map<String, Value>> {
        match self.into_data()? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(PowerOceanError::serialization(format!(
                "expected object in envelope data, got {}",
                value_kind(&other)
            ))),
        }
    }
}

/// Broker credentials handed out by the certification endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttCertificate {
    pub url: String,
    #[serde(deserialize_with = "port_from_string_or_number")]
    pub port: u16,
    pub certificate_account: String,
    pub certificate_password: String,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "mqtts".to_string()
}

impl MqttCertificate {
    /// Whether the broker expects an encrypted transport
    pub fn uses_tls(&self) -> bool {
        matches!(
            self.protocol.trim().to_ascii_lowercase().as_str(),
            "mqtts" | "ssl" | "tls"
        )
    }
}

impl fmt::Debug for MqttCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttCertificate")
            .field("url", &self.url)
            .field("port", &self.port)
            .field("certificate_account", &self.certificate_account)
            .field("certificate_password", &"<redacted>")
            .field("protocol", &self.protocol)
            .finish()
    }
}

/// Local-time window requested from the historical endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl HistoryWindow {
    pub fn new(begin: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { begin, end }
    }

    /// Monday 00:00:00 through Sunday 23:59:59 of the week containing `now` in `tz`
    pub fn current_week<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> Self {
        let local = now.with_timezone(tz).naive_local();
        let date = local.date();
        let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
        let begin = monday.and_time(chrono::NaiveTime::MIN);
        let end = begin + Duration::days(7) - Duration::seconds(1);
        Self { begin, end }
    }

    pub fn begin_time(&self) -> String {
        self.begin.format(HISTORY_TIME_FORMAT).to_string()
    }

    pub fn end_time(&self) -> String {
        self.end.format(HISTORY_TIME_FORMAT).to_string()
    }

    /// Parse a window from the endpoint's timestamp layout
    pub fn parse(begin: &str, end: &str) -> Result<Self> {
        Ok(Self {
            begin: NaiveDateTime::parse_from_str(begin, HISTORY_TIME_FORMAT)?,
            end: NaiveDateTime::parse_from_str(end, HISTORY_TIME_FORMAT)?,
        })
    }
}

/// Body of the historical summary POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub serial: String,
    pub code: String,
    pub window: HistoryWindow,
}

impl HistoryRequest {
    pub fn new(serial: &str, code: &str, window: HistoryWindow) -> Self {
        Self {
            serial: serial.to_string(),
            code: code.to_string(),
            window,
        }
    }

    pub fn to_body(&self) -> Value {
        json!({
            "sn": self.serial,
            "params": {
                "code": self.code,
                "beginTime": self.window.begin_time(),
                "endTime": self.window.end_time(),
            }
        })
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            value_kind(&other)
        ))),
    }
}

fn port_from_string_or_number<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = string_or_number(deserializer)?;
    raw.trim()
        .parse::<u16>()
        .map_err(|e| serde::de::Error::custom(format!("invalid port '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn envelope_code_as_string_or_number() {
        let env: Envelope =
            serde_json::from_str(r#"{"code":"0","message":"Success","data":{"a":1}}"#).unwrap();
        assert!(env.is_success());
        assert_eq!(env.into_object().unwrap().get("a"), Some(&json!(1)));

        let env: Envelope = serde_json::from_str(r#"{"code":0,"data":null}"#).unwrap();
        assert!(env.is_success());
        assert!(env.into_object().unwrap().is_empty());
    }

    #[test]
    fn envelope_failure_becomes_api_error() {
        let env: Envelope =
            serde_json::from_str(r#"{"code":"8521","message":"signature is wrong"}"#).unwrap();
        match env.into_data() {
            Err(PowerOceanError::Api { code, message }) => {
                assert_eq!(code, "8521");
                assert_eq!(message, "signature is wrong");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn envelope_non_object_data_is_rejected() {
        let env: Envelope = serde_json::from_str(r#"{"code":"0","data":[1,2]}"#).unwrap();
        assert!(matches!(
            env.into_object(),
            Err(PowerOceanError::Serialization { .. })
        ));
    }

    #[test]
    fn certificate_parses_string_port() {
        let cert: MqttCertificate = serde_json::from_value(json!({
            "url": "mqtt-e.ecoflow.com",
            "port": "8883",
            "certificateAccount": "open-abc",
            "certificatePassword": "pw",
            "protocol": "mqtts"
        }))
        .unwrap();
        assert_eq!(cert.port, 8883);
        assert!(cert.uses_tls());
        assert!(!format!("{:?}", cert).contains("pw\""));
    }

    #[test]
    fn certificate_defaults_protocol() {
        let cert: MqttCertificate = serde_json::from_value(json!({
            "url": "broker",
            "port": 1883,
            "certificateAccount": "a",
            "certificatePassword": "b"
        }))
        .unwrap();
        assert_eq!(cert.protocol, "mqtts");

        let plain = MqttCertificate {
            protocol: "mqtt".to_string(),
            ..cert
        };
        assert!(!plain.uses_tls());
    }

    #[test]
    fn current_week_spans_monday_to_sunday() {
        let now = Utc.with_ymd_and_hms(2024, 6, 19, 12, 0, 0).unwrap();
        let window = HistoryWindow::current_week(now, &Utc);
        assert_eq!(window.begin_time(), "2024-06-17 00:00:00");
        assert_eq!(window.end_time(), "2024-06-23 23:59:59");
    }

    #[test]
    fn current_week_uses_local_date() {
        // Sunday evening in UTC is already Monday in Amsterdam
        let now = Utc.with_ymd_and_hms(2024, 6, 16, 23, 30, 0).unwrap();
        let window = HistoryWindow::current_week(now, &chrono_tz::Europe::Amsterdam);
        assert_eq!(
            window.begin.date(),
            NaiveDate::from_ymd_opt(2024, 6, 17).unwrap()
        );

        let utc_window = HistoryWindow::current_week(now, &Utc);
        assert_eq!(utc_window.begin_time(), "2024-06-10 00:00:00");
    }

    #[test]
    fn history_request_body_shape() {
        let window = HistoryWindow::parse("2024-06-17 00:00:00", "2024-06-23 23:59:59").unwrap();
        let body = HistoryRequest::new("HJ31", "JT303_Dashboard_Overview_Summary_Week", window)
            .to_body();
        assert_eq!(
            body,
            json!({
                "sn": "HJ31",
                "params": {
                    "code": "JT303_Dashboard_Overview_Summary_Week",
                    "beginTime": "2024-06-17 00:00:00",
                    "endTime": "2024-06-23 23:59:59"
                }
            })
        );
    }

    #[test]
    fn window_parse_rejects_garbage() {
        assert!(HistoryWindow::parse("yesterday", "2024-06-23 23:59:59").is_err());
    }
}
