use super::*;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-e.ecoflow.com".to_string(),
            request_timeout_ms: 10_000,
            nonce: NonceSetting::Random,
            fixed_nonce: "123456".to_string(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id_prefix: "powerocean".to_string(),
            keep_alive_secs: 60,
            reconnect_delay_ms: 5_000,
            channels: vec![
                MqttChannel::Quota,
                MqttChannel::Status,
                MqttChannel::Set,
                MqttChannel::SetReply,
                MqttChannel::Get,
                MqttChannel::GetReply,
            ],
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            history_interval_secs: 3_600,
            history_report_code: "JT303_Dashboard_Overview_Summary_Week".to_string(),
            history_key: "historical_data".to_string(),
            merge_policy: MergePolicy::MqttWins,
            history_failure_policy: HistoryFailurePolicy::Advance,
            timezone: "UTC".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/powerocean.log".to_string(),
            console_output: true,
            json_format: false,
            backup_count: 5,
        }
    }
}
