//! # PowerOcean - EcoFlow cloud data coordinator
//!
//! Keeps one consistent view of an EcoFlow PowerOcean home energy hub by
//! combining the signed EcoFlow open API with the broker's MQTT push updates.
//!
//! ## Features
//!
//! - **Signed REST client**: HMAC-SHA256 request signing, quota snapshot,
//!   weekly historical summary and MQTT certificate calls
//! - **MQTT push updates**: TLS broker connection with the full device topic set
//! - **Merge coordinator**: single-writer canonical state published as
//!   immutable snapshots with configurable REST/MQTT precedence
//! - **Typed accessors**: battery, PV, grid phases, heat pump, EV charger
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `signature`: Payload flattening and request signing
//! - `cloud`: REST client for the open API
//! - `mqtt`: Push subscription and payload decoding
//! - `coordinator`: Canonical state, merge policy and refresh scheduling
//! - `fields`: Typed readers and device grouping
//! - `bridge`: Startup and shutdown sequencing

pub mod bridge;
pub mod cloud;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fields;
pub mod logging;
pub mod mqtt;
pub mod signature;


// Re-export commonly used types
pub use bridge::Bridge;
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorHandle, StateSnapshot};
pub use error::{PowerOceanError, Result};
