//! # MQTT Integration Module
//!
//! Everything that talks to the broker. The session keeps one connection
//! alive, hands every inbound publish to the [`MessageRouter`](crate::router::MessageRouter)
//! and exposes a synchronous [`Publisher`] for the way back.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs     - Session options and reconnect policy
//! ├── message.rs    - Message representation
//! ├── transport.rs  - Wire capability boundary and the rumqttc transport
//! └── session.rs    - Connection state machine, session handle, publisher
//! ```
//!
//! ## Connection Policy
//!
//! - The client always subscribes to every topic (`#`) plus the broker's
//!   control topics (`$SYS/#`); filtering happens locally.
//! - QoS is always 0 and messages are never retained.
//! - A failed initial connect is reported immediately. A lost link is retried
//!   every 2.5 seconds, at most 5 times, before the session is declared failed.

pub mod config;
pub mod message;
pub mod session;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;

pub use config::{ReconnectPolicy, SessionOptions};
pub use message::MqttMessage;
pub use session::{BrokerSession, ConnectionState, Publisher, SessionHandle, SessionStatus};
pub use transport::{MqttTransport, Outbound, Transport};
