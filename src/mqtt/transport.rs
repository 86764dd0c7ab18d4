//! Capability boundary between the broker session and the wire client.
//!
//! The session only needs a handshake, a stream of inbound publishes, a way
//! to leave, and an outbound half it can hand to publishers. [`MqttTransport`]
//! provides these on top of `rumqttc`; tests drive the session with a
//! scripted transport instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tracing::{debug, warn};

use super::config::SessionOptions;
use super::message::MqttMessage;
use crate::error::TransportError;

/// Capacity of rumqttc's request queue
const REQUEST_CAPACITY: usize = 100;

/// How long a clean disconnect may take before the link is just dropped
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Inbound half of a broker connection, owned by exactly one session task.
pub trait Transport: Send + 'static {
    /// Outbound half, shareable with publishers on other tasks
    fn outbound(&self) -> Arc<dyn Outbound>;

    /// Runs the handshake. Calling it again after a failure or a link loss
    /// attempts a fresh connection.
    fn connect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next wire event. `Ok(None)` for events that carry no
    /// message, `Err` when the link dropped.
    fn next_message(
        &mut self,
    ) -> impl Future<Output = Result<Option<MqttMessage>, TransportError>> + Send;

    /// Leaves the broker. Never fails; a dead link is simply dropped.
    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;
}

/// Outbound half of a broker connection.
///
/// Always QoS 0 (at most once) and never retained.
pub trait Outbound: Send + Sync {
    fn subscribe(&self, filter: &str) -> Result<(), TransportError>;

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// `rumqttc` backed transport.
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttTransport {
    pub fn new(options: &SessionOptions) -> Self {
        let mut mqtt_options =
            MqttOptions::new(options.client_id.clone(), options.address.clone(), options.port);
        mqtt_options
            .set_keep_alive(options.keep_alive())
            .set_clean_session(options.clean_session);

        if let (Some(user), Some(password)) = (&options.username, &options.password) {
            mqtt_options.set_credentials(user.clone(), password.clone());
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        MqttTransport { client, eventloop }
    }
}

impl Transport for MqttTransport {
    fn outbound(&self) -> Arc<dyn Outbound> {
        Arc::new(MqttOutbound {
            client: self.client.clone(),
        })
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return if ack.code == ConnectReturnCode::Success {
                        Ok(())
                    } else {
                        Err(TransportError::Connect(format!(
                            "broker refused connection: {:?}",
                            ack.code
                        )))
                    };
                }
                Ok(event) => debug!("Ignoring {:?} during handshake", event),
                Err(e) => return Err(TransportError::Connect(e.to_string())),
            }
        }
    }

    async fn next_message(&mut self) -> Result<Option<MqttMessage>, TransportError> {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => Ok(Some(MqttMessage::new(
                publish.topic,
                publish.payload.to_vec(),
            ))),
            Ok(_) => Ok(None),
            Err(e) => Err(TransportError::LinkLost(e.to_string())),
        }
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.client.try_disconnect() {
            warn!("Could not queue disconnect: {}", e);
            return;
        }

        // The DISCONNECT packet only leaves when the event loop is polled
        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
            warn!("Broker did not take the disconnect in time, dropping link");
        }
    }
}

struct MqttOutbound {
    client: AsyncClient,
}

impl Outbound for MqttOutbound {
    fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.client
            .try_subscribe(filter, QoS::AtMostOnce)
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}
