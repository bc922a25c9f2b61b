//! Component lifecycle
//!
//! Startup order: MQTT certificate (when enabled), first refresh, coordinator
//! task, MQTT subscriber. Only the first refresh can abort startup.

use crate::cloud::{CloudApi, CloudClient};
use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorHandle, SnapshotListener};
use crate::error::{PowerOceanError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::mqtt::MqttSubscriber;
use crate::signature::Credentials;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A running coordinator plus its optional MQTT subscriber
pub struct Bridge {
    handle: CoordinatorHandle,
    task: Option<JoinHandle<Result<()>>>,
    subscriber: Option<MqttSubscriber>,
    logger: StructuredLogger,
}

impl Bridge {
    /// Start against the EcoFlow cloud using `config`
    pub async fn start(config: &Config) -> Result<Self> {
        Self::start_with_listeners(config, Vec::new()).await
    }

    /// Start with observers registered before the first publish
    pub async fn start_with_listeners(
        config: &Config,
        listeners: Vec<SnapshotListener>,
    ) -> Result<Self> {
        let credentials = Credentials::from(&config.credentials);
        let cloud = CloudClient::new(&config.api, credentials)?
            .with_report_code(config.coordinator.history_report_code.clone());
        Self::start_with(config, Arc::new(cloud), listeners).await
    }

    /// Start against any [`CloudApi`] implementation
    pub async fn start_with(
        config: &Config,
        cloud: Arc<dyn CloudApi>,
        listeners: Vec<SnapshotListener>,
    ) -> Result<Self> {
        config.validate()?;
        let serial = config.credentials.device_sn.trim();
        let logger = get_logger_with_context(LogContext::new("bridge").with_device_sn(serial));

        let mut coordinator = Coordinator::new(&config.coordinator, serial, cloud)?;
        for listener in listeners {
            coordinator.add_listener(listener);
        }

        let certificate = if config.mqtt.enabled {
            coordinator.fetch_mqtt_certificate().await
        } else {
            logger.info("MQTT disabled, polling REST only");
            None
        };

        coordinator.initialize().await?;
        let handle = coordinator.handle();
        let task = tokio::spawn(coordinator.run());

        let subscriber = certificate.and_then(|cert| {
            match MqttSubscriber::start(&cert, serial, &config.mqtt, handle.clone()) {
                Ok(subscriber) => Some(subscriber),
                Err(e) => {
                    logger.warn(&format!("MQTT subscriber not started: {}", e));
                    None
                }
            }
        });

        logger.info("Bridge started");
        Ok(Self {
            handle,
            task: Some(task),
            subscriber,
            logger,
        })
    }

    pub fn handle(&self) -> &CoordinatorHandle {
        &self.handle
    }

    /// Whether an MQTT subscriber was started for this session
    pub fn mqtt_active(&self) -> bool {
        self.subscriber.is_some()
    }

    /// Stop the subscriber, then the coordinator; safe to call repeatedly
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(mut subscriber) = self.subscriber.take() {
            subscriber.stop().await;
        }
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        self.handle.shutdown();
        let result = task
            .await
            .map_err(|e| PowerOceanError::shutdown(format!("coordinator task failed: {}", e)))?;
        self.logger.info("Bridge stopped");
        result
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.logger.debug("Bridge dropped without stop, signalling coordinator");
            self.handle.shutdown();
        }
    }
}
