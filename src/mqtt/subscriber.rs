use crate::cloud::MqttCertificate;
use crate::config::MqttConfig;
use crate::coordinator::CoordinatorHandle;
use crate::error::{PowerOceanError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "mqtt")]
use super::dispatch_payload;
#[cfg(feature = "mqtt")]
use super::topics::TopicSet;
#[cfg(feature = "mqtt")]
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubscribeFilter, Transport,
};
#[cfg(feature = "mqtt")]
use std::time::Duration;
#[cfg(feature = "mqtt")]
use tokio::sync::watch;
#[cfg(feature = "mqtt")]
use tokio::task::JoinHandle;

#[cfg(feature = "mqtt")]
const STOP_TIMEOUT: Duration = Duration::from_secs(3);
#[cfg(feature = "mqtt")]
const MAX_PACKET_SIZE: usize = 256 * 1024;

/// Broker connection forwarding push updates to the coordinator
pub struct MqttSubscriber {
    #[cfg(feature = "mqtt")]
    client: AsyncClient,
    #[cfg(feature = "mqtt")]
    shutdown_tx: watch::Sender<bool>,
    #[cfg(feature = "mqtt")]
    task: Option<JoinHandle<()>>,
    #[cfg(feature = "mqtt")]
    stopping: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    logger: StructuredLogger,
}

impl MqttSubscriber {
    /// Connect with the certificate credentials and start the network task
    ///
    /// Only option errors fail here; broker refusals are logged by the task
    /// and leave the subscriber disconnected.
    pub fn start(
        cert: &MqttCertificate,
        serial: &str,
        config: &MqttConfig,
        handle: CoordinatorHandle,
    ) -> Result<Self> {
        let logger = get_logger_with_context(
            LogContext::new("mqtt")
                .with_device_sn(serial)
                .with_field("broker", format!("{}:{}", cert.url, cert.port)),
        );
        let connected = Arc::new(AtomicBool::new(false));

        #[cfg(feature = "mqtt")]
        {
            if cert.url.trim().is_empty() {
                return Err(PowerOceanError::mqtt("certificate carries no broker host"));
            }
            let client_id = format!(
                "{}-{}",
                config.client_id_prefix,
                uuid::Uuid::new_v4().simple()
            );
            let mut options = MqttOptions::new(client_id, cert.url.trim(), cert.port);
            options.set_credentials(
                cert.certificate_account.clone(),
                cert.certificate_password.clone(),
            );
            options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
            options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
            if cert.uses_tls() {
                options.set_transport(Transport::tls_with_default_config());
            }

            let (client, eventloop) = AsyncClient::new(options, 64);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let stopping = Arc::new(AtomicBool::new(false));
            let topics = TopicSet::new(&cert.certificate_account, serial, &config.channels);

            logger.info(&format!(
                "Connecting ({}, {} topics)",
                if cert.uses_tls() { "tls" } else { "tcp" },
                topics.len()
            ));

            let ctx = LoopContext {
                client: client.clone(),
                topics,
                handle,
                connected: Arc::clone(&connected),
                stopping: Arc::clone(&stopping),
                shutdown_rx,
                reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
                logger: logger.clone(),
            };
            let task = tokio::spawn(run_event_loop(eventloop, ctx));

            Ok(Self {
                client,
                shutdown_tx,
                task: Some(task),
                stopping,
                connected,
                logger,
            })
        }
        #[cfg(not(feature = "mqtt"))]
        {
            let _ = (config, handle, connected);
            logger.warn("Built without MQTT support; push updates unavailable");
            Err(PowerOceanError::mqtt("built without the mqtt feature"))
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Disconnect and wait for the network task; safe to call repeatedly
    pub async fn stop(&mut self) {
        #[cfg(feature = "mqtt")]
        {
            let Some(mut task) = self.task.take() else {
                return;
            };
            self.stopping.store(true, Ordering::SeqCst);
            if !self.connected.load(Ordering::SeqCst) {
                // No session to close; wake the loop out of its reconnect wait
                let _ = self.shutdown_tx.send(true);
            } else if let Err(e) = self.client.try_disconnect() {
                self.logger
                    .debug(&format!("Disconnect request not queued: {}", e));
            }
            if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
                self.logger
                    .warn("Broker did not acknowledge disconnect in time, aborting loop");
                let _ = self.shutdown_tx.send(true);
                let _ = task.await;
            }
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            self.logger.debug("Marked disconnected on stop");
        }
        self.logger.info("MQTT subscriber stopped");
    }
}

/// Readable reason for a CONNACK refusal
#[cfg(feature = "mqtt")]
pub fn refusal_reason(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Success => "connection accepted",
        ConnectReturnCode::RefusedProtocolVersion => "unacceptable protocol version",
        ConnectReturnCode::BadClientId => "client identifier rejected",
        ConnectReturnCode::ServiceUnavailable => "server unavailable",
        ConnectReturnCode::BadUserNamePassword => "bad username or password",
        ConnectReturnCode::NotAuthorized => "not authorised",
    }
}

#[cfg(feature = "mqtt")]
fn describe_error(err: &ConnectionError) -> String {
    match err {
        ConnectionError::ConnectionRefused(code) => {
            format!("connection refused: {}", refusal_reason(*code))
        }
        other => other.to_string(),
    }
}

#[cfg(feature = "mqtt")]
struct LoopContext {
    client: AsyncClient,
    topics: TopicSet,
    handle: CoordinatorHandle,
    connected: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_delay: Duration,
    logger: StructuredLogger,
}

#[cfg(feature = "mqtt")]
impl LoopContext {
    fn mark_connected(&self, up: bool) {
        if self.connected.swap(up, Ordering::SeqCst) != up {
            let _ = self.handle.set_mqtt_connected(up);
        }
    }

    fn subscribe_all(&self) {
        let filters: Vec<SubscribeFilter> = self
            .topics
            .topics()
            .map(|t| SubscribeFilter::new(t.to_string(), QoS::AtLeastOnce))
            .collect();
        match self.client.try_subscribe_many(filters) {
            Ok(()) => self
                .logger
                .info(&format!("Subscribed to {} topics", self.topics.len())),
            Err(e) => self.logger.error(&format!("Subscribe failed: {}", e)),
        }
    }
}

#[cfg(feature = "mqtt")]
async fn run_event_loop(mut eventloop: EventLoop, mut ctx: LoopContext) {
    loop {
        let event = tokio::select! {
            _ = ctx.shutdown_rx.changed() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    ctx.logger.info("Connected to broker");
                    ctx.mark_connected(true);
                    // Subscriptions are re-issued on every reconnect
                    ctx.subscribe_all();
                } else {
                    ctx.logger.error(&format!(
                        "Connection refused: {}",
                        refusal_reason(ack.code)
                    ));
                    ctx.mark_connected(false);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if ctx.topics.channel_of(&publish.topic).is_none() {
                    ctx.logger
                        .debug(&format!("Message on unexpected topic {}", publish.topic));
                }
                dispatch_payload(&ctx.handle, &publish.topic, &publish.payload, &ctx.logger);
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                ctx.logger
                    .debug(&format!("Subscription acknowledged: {:?}", ack.return_codes));
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                ctx.logger.warn("Broker closed the session");
                ctx.mark_connected(false);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                ctx.logger.info("Disconnected gracefully");
                ctx.mark_connected(false);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if ctx.stopping.load(Ordering::SeqCst) {
                    ctx.logger.info("Connection closed during shutdown");
                    break;
                }
                let was_connected = ctx.connected.load(Ordering::SeqCst);
                ctx.mark_connected(false);
                if was_connected {
                    ctx.logger
                        .warn(&format!("Unexpected disconnect: {}", describe_error(&e)));
                } else {
                    ctx.logger
                        .error(&format!("Connection failed: {}", describe_error(&e)));
                }
                tokio::select! {
                    _ = ctx.shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(ctx.reconnect_delay) => {}
                }
            }
        }
    }
    ctx.mark_connected(false);
}
