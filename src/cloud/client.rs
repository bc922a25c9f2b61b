use super::types::{Envelope, HistoryRequest, HistoryWindow, MqttCertificate};
use super::{CERTIFICATION_PATH, CloudApi, HISTORY_PATH, QUOTA_ALL_PATH};
use crate::config::ApiConfig;
use crate::error::{PowerOceanError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::signature::{Credentials, NonceMode, RequestSigner};
use async_trait::async_trait;
use reqwest::{Method, Response};
use serde_json::{Map, Value, json};
use std::time::Duration;

/// Report requested when none is configured
pub const DEFAULT_REPORT_CODE: &str = "JT303_Dashboard_Overview_Summary_Week";

/// Signed REST client for the EcoFlow open API
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    signer: RequestSigner,
    report_code: String,
    logger: StructuredLogger,
}

impl CloudClient {
    /// Build a client with the configured timeout and nonce strategy
    pub fn new(api: &ApiConfig, credentials: Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(api.request_timeout_ms))
            .user_agent(concat!("powerocean/", env!("APP_VERSION")))
            .build()
            .map_err(|e| PowerOceanError::network(format!("HTTP client build failed: {}", e)))?;

        let logger = get_logger_with_context(
            LogContext::new("cloud").with_device_sn(credentials.device_sn()),
        );

        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            signer: RequestSigner::new(credentials, NonceMode::from(api)),
            report_code: DEFAULT_REPORT_CODE.to_string(),
            logger,
        })
    }

    /// Override the historical report code
    pub fn with_report_code(mut self, code: impl Into<String>) -> Self {
        self.report_code = code.into();
        self
    }

    pub fn credentials(&self) -> &Credentials {
        self.signer.credentials()
    }

    pub fn report_code(&self) -> &str {
        &self.report_code
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_envelope(&self, path: &str, query: &[(&str, &str)]) -> Result<Envelope> {
        let params: Map<String, Value> = query
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect();
        let headers = self
            .signer
            .sign(&Value::Object(params), &Method::GET, path);

        let request = self.http.get(self.url(path)).query(query);
        let response = headers.apply(request).send().await?;
        Self::read_envelope(path, response).await
    }

    async fn post_envelope(&self, path: &str, body: &Value) -> Result<Envelope> {
        let headers = self.signer.sign(body, &Method::POST, path);
        // Content type comes from the signed headers; serialize the body by hand
        let request = self.http.post(self.url(path)).body(body.to_string());
        let response = headers.apply(request).send().await?;
        Self::read_envelope(path, response).await
    }

    async fn read_envelope(path: &str, response: Response) -> Result<Envelope> {
        let status = response.status();
        if !status.is_success() {
            return Err(PowerOceanError::network(format!(
                "{} returned HTTP {}",
                path, status
            )));
        }
        let text = response.text().await?;
        Ok(serde_json::from_str::<Envelope>(&text)?)
    }
}

#[async_trait]
impl CloudApi for CloudClient {
    async fn fetch_current_snapshot(&self, serial: &str) -> Result<Map<String, Value>> {
        let envelope = self
            .get_envelope(QUOTA_ALL_PATH, &[("sn", serial)])
            .await
            .inspect_err(|e| self.logger.warn(&format!("Snapshot request failed: {}", e)))?;
        let data = envelope.into_object()?;
        self.logger
            .debug(&format!("Snapshot received with {} top-level keys", data.len()));
        Ok(data)
    }

    async fn fetch_historical_summary(
        &self,
        serial: &str,
        window: &HistoryWindow,
    ) -> Result<Map<String, Value>> {
        let body = HistoryRequest::new(serial, &self.report_code, *window).to_body();
        let envelope = self
            .post_envelope(HISTORY_PATH, &body)
            .await
            .inspect_err(|e| self.logger.warn(&format!("History request failed: {}", e)))?;
        let data = envelope.into_object()?;
        self.logger.debug(&format!(
            "History {} .. {} received",
            window.begin_time(),
            window.end_time()
        ));
        Ok(data)
    }

    async fn fetch_mqtt_certificate(&self) -> Result<Option<MqttCertificate>> {
        let envelope = self.get_envelope(CERTIFICATION_PATH, &[]).await?;
        if !envelope.is_success() {
            self.logger.error(&format!(
                "MQTT certificate request rejected (code {}): {}",
                envelope.code,
                envelope.message.as_deref().unwrap_or("")
            ));
            return Ok(None);
        }
        let data = envelope.data.unwrap_or_else(|| json!({}));
        match serde_json::from_value::<MqttCertificate>(data) {
            Ok(cert) => {
                self.logger.info(&format!(
                    "MQTT certificate obtained for {}:{} ({})",
                    cert.url, cert.port, cert.protocol
                ));
                Ok(Some(cert))
            }
            Err(e) => {
                self.logger
                    .error(&format!("MQTT certificate payload is incomplete: {}", e));
                Ok(None)
            }
        }
    }
}
