//! EcoFlow open API REST client
//!
//! Three signed calls are used: the current quota snapshot, the historical
//! summary report and the MQTT certification request. [`CloudApi`] is the seam
//! the coordinator depends on so tests can substitute an in-process mock.

pub mod client;
pub mod types;

pub use client::{CloudClient, DEFAULT_REPORT_CODE};
pub use types::{Envelope, HistoryRequest, HistoryWindow, MqttCertificate};

use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub const QUOTA_ALL_PATH: &str = "/iot-open/sign/device/quota/all";
pub const HISTORY_PATH: &str = "/iot-open/sign/device/quota/data";
pub const CERTIFICATION_PATH: &str = "/iot-open/sign/certification";

/// Cloud calls used by the coordinator
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Current values of every quota reported by the device
    async fn fetch_current_snapshot(&self, serial: &str) -> Result<Map<String, Value>>;

    /// Summary report covering `window`
    async fn fetch_historical_summary(
        &self,
        serial: &str,
        window: &HistoryWindow,
    ) -> Result<Map<String, Value>>;

    /// Broker credentials; `Ok(None)` when the API declines to issue them
    async fn fetch_mqtt_certificate(&self) -> Result<Option<MqttCertificate>>;
}
