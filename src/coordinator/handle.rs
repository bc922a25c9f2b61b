use super::CoordinatorEvent;
use super::state::StateSnapshot;
use crate::error::{PowerOceanError, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;

/// Cloneable access to a running coordinator
///
/// Reads never block: the current snapshot is an `Arc` swapped atomically by
/// the coordinator task. Writes are queued onto that task.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    snapshot: watch::Receiver<Arc<StateSnapshot>>,
}

impl CoordinatorHandle {
    pub(super) fn new(
        events: mpsc::UnboundedSender<CoordinatorEvent>,
        snapshot: watch::Receiver<Arc<StateSnapshot>>,
    ) -> Self {
        Self { events, snapshot }
    }

    /// Current canonical state
    pub fn get_snapshot(&self) -> Arc<StateSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every publish
    pub fn subscribe(&self) -> watch::Receiver<Arc<StateSnapshot>> {
        self.snapshot.clone()
    }

    /// Stream of snapshots starting with the current one
    pub fn subscribe_stream(&self) -> WatchStream<Arc<StateSnapshot>> {
        WatchStream::new(self.snapshot.clone())
    }

    /// Run a refresh cycle now and wait for it to be merged
    ///
    /// Joins the cycle already in flight, if any.
    pub async fn request_refresh(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(CoordinatorEvent::Refresh { reply: Some(tx) })?;
        rx.await
            .map_err(|_| PowerOceanError::shutdown("refresh dropped before completion"))?
    }

    /// Queue a refresh without waiting for it
    pub fn trigger_refresh(&self) -> Result<()> {
        self.send(CoordinatorEvent::Refresh { reply: None })
    }

    /// Hand decoded MQTT fields to the coordinator
    ///
    /// Safe to call from any task; the merge and publish happen on the
    /// coordinator task.
    pub fn on_mqtt_message(&self, topic: &str, fields: Map<String, Value>) -> Result<()> {
        self.send(CoordinatorEvent::MqttFields {
            topic: topic.to_string(),
            fields,
        })
    }

    pub fn set_mqtt_connected(&self, connected: bool) -> Result<()> {
        self.send(CoordinatorEvent::MqttStatus(connected))
    }

    /// Ask the coordinator task to stop
    pub fn shutdown(&self) {
        let _ = self.events.send(CoordinatorEvent::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }

    fn send(&self, event: CoordinatorEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| PowerOceanError::shutdown("coordinator task is not running"))
    }
}
