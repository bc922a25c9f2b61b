//! MQTT push updates
//!
//! The broker publishes device reports under
//! `/open/<certificateAccount>/<serial>/<channel>`. Payloads are decoded here
//! and handed to the coordinator, which owns the merge.

pub mod decode;
pub mod subscriber;
pub mod topics;

pub use decode::{DecodeError, decode_payload};
pub use subscriber::MqttSubscriber;
pub use topics::{TopicSet, topic_for};

use crate::coordinator::CoordinatorHandle;
use crate::logging::StructuredLogger;

/// Decode one message and forward its fields
///
/// Malformed or empty payloads are logged and dropped. Returns whether the
/// fields reached the coordinator.
pub fn dispatch_payload(
    handle: &CoordinatorHandle,
    topic: &str,
    payload: &[u8],
    logger: &StructuredLogger,
) -> bool {
    let fields = match decode_payload(payload) {
        Ok(fields) => fields,
        Err(DecodeError::Empty) => {
            logger.debug(&format!("Dropping empty message on {}", topic));
            return false;
        }
        Err(e) => {
            logger.warn(&format!("Dropping message on {}: {}", topic, e));
            return false;
        }
    };
    match handle.on_mqtt_message(topic, fields) {
        Ok(()) => true,
        Err(e) => {
            logger.debug(&format!("Message on {} not delivered: {}", topic, e));
            false
        }
    }
}
