//! Merge coordinator for REST and MQTT data
//!
//! A single task owns the canonical state. REST refreshes run on spawned
//! tasks and report back through the event channel; MQTT updates arrive
//! through the same channel from the subscriber task. Only the coordinator
//! task mutates state and publishes snapshots, so observers always see whole
//! versions in publish order.

pub mod handle;
pub mod history;
pub mod merge;
pub mod state;


pub use handle::CoordinatorHandle;
pub use state::{StateSnapshot, UpdateSource};

use crate::cloud::{CloudApi, HistoryWindow, MqttCertificate};
use crate::config::CoordinatorConfig;
use crate::error::{PowerOceanError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use history::HistoryTracker;
use merge::{FieldMap, MqttBuffer, flatten_snapshot};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};

/// Messages processed by the coordinator task
#[derive(Debug)]
pub enum CoordinatorEvent {
    /// Decoded MQTT fields for one message
    MqttFields {
        topic: String,
        fields: Map<String, Value>,
    },
    /// MQTT connection came up or went down
    MqttStatus(bool),
    /// Out-of-band refresh request
    Refresh {
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// A spawned refresh cycle finished
    RefreshDone(RefreshOutcome),
    Shutdown,
}

/// Results of one REST refresh cycle
#[derive(Debug)]
pub struct RefreshOutcome {
    started_at: DateTime<Utc>,
    started_seq: u64,
    snapshot: Result<Map<String, Value>>,
    history: Option<Result<Map<String, Value>>>,
}

/// Observer invoked on the coordinator task after each publish
pub type SnapshotListener = Box<dyn Fn(&StateSnapshot) + Send + 'static>;

pub struct Coordinator {
    config: CoordinatorConfig,
    serial: String,
    cloud: Arc<dyn CloudApi>,
    logger: StructuredLogger,

    rest_base: FieldMap,
    history: HistoryTracker,
    mqtt: MqttBuffer,
    certificate: Option<MqttCertificate>,
    mqtt_connected: bool,

    version: u64,
    snapshot_tx: watch::Sender<Arc<StateSnapshot>>,
    listeners: Vec<SnapshotListener>,

    events_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    events_rx: mpsc::UnboundedReceiver<CoordinatorEvent>,

    /// Waiters of the refresh cycle in flight, `None` when idle
    in_flight: Option<Vec<oneshot::Sender<Result<()>>>>,
}

impl Coordinator {
    pub fn new(config: &CoordinatorConfig, serial: &str, cloud: Arc<dyn CloudApi>) -> Result<Self> {
        if config.poll_interval_ms == 0 {
            return Err(PowerOceanError::validation(
                "coordinator.poll_interval_ms",
                "Must be greater than 0",
            ));
        }
        let tz: Tz = config.timezone.parse().map_err(|_| {
            PowerOceanError::validation(
                "coordinator.timezone",
                format!("Unknown time zone '{}'", config.timezone).as_str(),
            )
        })?;
        let (snapshot_tx, _) = watch::channel(Arc::new(StateSnapshot::empty()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let logger =
            get_logger_with_context(LogContext::new("coordinator").with_device_sn(serial));

        Ok(Self {
            history: HistoryTracker::new(
                config.history_interval_secs,
                config.history_failure_policy,
                &config.history_key,
                tz,
            ),
            config: config.clone(),
            serial: serial.to_string(),
            cloud,
            logger,
            rest_base: FieldMap::new(),
            mqtt: MqttBuffer::new(),
            certificate: None,
            mqtt_connected: false,
            version: 0,
            snapshot_tx,
            listeners: Vec::new(),
            events_tx,
            events_rx,
            in_flight: None,
        })
    }

    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.events_tx.clone(), self.snapshot_tx.subscribe())
    }

    /// Register an observer; it runs on the coordinator task
    pub fn add_listener<F>(&mut self, listener: F)
    where
        F: Fn(&StateSnapshot) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn certificate(&self) -> Option<&MqttCertificate> {
        self.certificate.as_ref()
    }

    pub fn history(&self) -> &HistoryTracker {
        &self.history
    }

    /// Fetch broker credentials once for the lifetime of this coordinator
    ///
    /// Failures are logged and yield `None`; the session then runs REST-only.
    pub async fn fetch_mqtt_certificate(&mut self) -> Option<MqttCertificate> {
        if let Some(cert) = &self.certificate {
            return Some(cert.clone());
        }
        match self.cloud.fetch_mqtt_certificate().await {
            Ok(Some(cert)) => {
                self.certificate = Some(cert.clone());
                Some(cert)
            }
            Ok(None) => {
                self.logger
                    .warn("No MQTT certificate issued, continuing with REST polling only");
                None
            }
            Err(e) => {
                self.logger.warn(&format!(
                    "MQTT certificate fetch failed, continuing with REST polling only: {}",
                    e
                ));
                None
            }
        }
    }

    /// First refresh; any snapshot failure aborts startup
    pub async fn initialize(&mut self) -> Result<()> {
        self.logger.info("Fetching initial snapshot");
        let outcome = fetch_cycle(
            Arc::clone(&self.cloud),
            self.serial.clone(),
            self.history.due_window(Utc::now()),
            self.mqtt.last_seq(),
        )
        .await;

        if let Err(e) = &outcome.snapshot {
            self.logger
                .error(&format!("Initial snapshot fetch failed: {}", e));
            return Err(PowerOceanError::init(format!(
                "initial snapshot fetch failed: {}",
                e
            )));
        }
        self.apply_outcome(outcome)?;
        self.logger.info(&format!(
            "Initial snapshot merged ({} fields)",
            self.snapshot_tx.borrow().len()
        ));
        Ok(())
    }

    /// Main loop: periodic refresh plus event processing until shutdown
    pub async fn run(mut self) -> Result<()> {
        let period = Duration::from_millis(self.config.poll_interval_ms);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.logger.info(&format!(
            "Coordinator running (poll every {} ms, history every {} s, {:?})",
            self.config.poll_interval_ms,
            self.config.history_interval_secs,
            self.config.merge_policy
        ));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.start_refresh(None);
                }
                event = self.events_rx.recv() => {
                    match event {
                        Some(CoordinatorEvent::Shutdown) | None => {
                            self.logger.info("Shutdown signal received");
                            break;
                        }
                        Some(event) => self.handle_event(event),
                    }
                }
            }
        }

        if let Some(waiters) = self.in_flight.take() {
            for waiter in waiters {
                let _ = waiter.send(Err(PowerOceanError::shutdown(
                    "coordinator stopped during refresh",
                )));
            }
        }
        self.events_rx.close();
        self.logger.info("Coordinator stopped");
        Ok(())
    }

    fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::MqttFields { topic, fields } => self.apply_mqtt(&topic, &fields),
            CoordinatorEvent::MqttStatus(connected) => {
                if connected != self.mqtt_connected {
                    self.mqtt_connected = connected;
                    self.logger.info(&format!(
                        "MQTT {}",
                        if connected { "connected" } else { "disconnected" }
                    ));
                    self.publish(UpdateSource::Connection);
                }
            }
            CoordinatorEvent::Refresh { reply } => self.start_refresh(reply),
            CoordinatorEvent::RefreshDone(outcome) => {
                let result = self.apply_outcome(outcome);
                if let Err(e) = &result {
                    self.logger
                        .warn(&format!("Refresh failed, keeping previous state: {}", e));
                }
                for waiter in self.in_flight.take().unwrap_or_default() {
                    let _ = waiter.send(result.clone());
                }
            }
            CoordinatorEvent::Shutdown => {}
        }
    }

    /// Spawn a refresh cycle, or join the one already in flight
    fn start_refresh(&mut self, reply: Option<oneshot::Sender<Result<()>>>) {
        if let Some(waiters) = &mut self.in_flight {
            self.logger.debug("Refresh already in flight, coalescing");
            waiters.extend(reply);
            return;
        }
        self.in_flight = Some(reply.into_iter().collect());

        let cloud = Arc::clone(&self.cloud);
        let serial = self.serial.clone();
        let window = self.history.due_window(Utc::now());
        let started_seq = self.mqtt.last_seq();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = fetch_cycle(cloud, serial, window, started_seq).await;
            let _ = events.send(CoordinatorEvent::RefreshDone(outcome));
        });
    }

    fn apply_outcome(&mut self, outcome: RefreshOutcome) -> Result<()> {
        let data = outcome.snapshot?;
        self.rest_base = flatten_snapshot(&data);
        if let Some(history) = outcome.history {
            self.history
                .record(history, outcome.started_at, &self.logger);
        }
        let superseded = self.mqtt.discard_through(outcome.started_seq);
        if superseded > 0 {
            self.logger.debug(&format!(
                "{} buffered MQTT fields superseded by snapshot",
                superseded
            ));
        }
        self.publish(UpdateSource::Rest);
        Ok(())
    }

    fn apply_mqtt(&mut self, topic: &str, fields: &Map<String, Value>) {
        if fields.is_empty() {
            self.logger
                .debug(&format!("Ignoring empty MQTT update on {}", topic));
            return;
        }
        let touched = self.mqtt.apply(fields);
        self.logger.trace(&format!(
            "MQTT update on {} touched {} fields",
            topic,
            touched.len()
        ));
        let dropped = self.publish(UpdateSource::Mqtt);
        let rejected: Vec<&String> = touched.iter().filter(|p| dropped.contains(*p)).collect();
        if !rejected.is_empty() {
            self.logger.warn(&format!(
                "Dropped MQTT fields that collide with REST data: {:?}",
                rejected
            ));
        }
    }

    /// Recompute and publish the canonical state; returns MQTT paths dropped by policy
    fn publish(&mut self, source: UpdateSource) -> Vec<String> {
        let composed = merge::compose(
            &self.rest_base,
            self.history.fields(),
            &self.mqtt,
            self.config.merge_policy,
        );
        self.version += 1;
        let snapshot = Arc::new(StateSnapshot {
            version: self.version,
            updated_at: Utc::now(),
            source,
            mqtt_connected: self.mqtt_connected,
            fields: composed.fields,
        });
        self.snapshot_tx.send_replace(Arc::clone(&snapshot));
        for listener in &self.listeners {
            listener(&snapshot);
        }
        composed.dropped
    }
}

async fn fetch_cycle(
    cloud: Arc<dyn CloudApi>,
    serial: String,
    window: Option<HistoryWindow>,
    started_seq: u64,
) -> RefreshOutcome {
    let started_at = Utc::now();
    let snapshot = cloud.fetch_current_snapshot(&serial).await;
    let history = match (&snapshot, window) {
        (Ok(_), Some(window)) => Some(cloud.fetch_historical_summary(&serial, &window).await),
        _ => None,
    };
    RefreshOutcome {
        started_at,
        started_seq,
        snapshot,
        history,
    }
}
