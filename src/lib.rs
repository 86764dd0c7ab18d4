//! # MQTT Explorer Core
//!
//! Connects to an MQTT broker, subscribes to every topic and keeps a
//! hierarchical, history-bounded view of the traffic. A front end drives it
//! through the [`Explorer`](explorer::Explorer) facade.
//!
//! ## Architecture
//!
//! ```text
//! Broker ◄──► MqttTransport ◄──► BrokerSession task
//!                                      │
//!                                      ▼
//!                               MessageRouter ──► inbound broadcast ──► Dashboard
//!                                      │
//!                                 TopicFilter
//!                                      │
//!                                      ▼
//!                               TopicStore ──► accepted broadcast ──► views, logging
//! ```
//!
//! ## Modules
//!
//! - [`topics`]: topic paths, the topic tree with bounded history, the prefix
//!   filter and the directory export
//! - [`mqtt`]: transport boundary, broker session with reconnect handling,
//!   publisher
//! - [`router`]: per-message glue between session, filter and store
//! - [`simulator`]: test traffic on a companion session
//! - [`dashboard`]: switch, display and text widgets bound to topics
//! - [`config`]: TOML configuration file
//! - [`explorer`]: facade tying everything together

pub mod config;
pub mod dashboard;
pub mod error;
pub mod explorer;
pub mod mqtt;
pub mod router;
pub mod simulator;
pub mod topics;

pub use explorer::Explorer;
