//! In-memory transport for driving sessions in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::message::MqttMessage;
use super::transport::{Outbound, Transport};
use crate::error::TransportError;

type Event = Result<Option<MqttMessage>, TransportError>;

/// Transport whose connect outcomes are scripted up front and whose inbound
/// events are pushed through a [`Script`].
pub struct ScriptedTransport {
    connects: VecDeque<Result<(), TransportError>>,
    events: mpsc::UnboundedReceiver<Event>,
    attempts: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    outbound: Arc<RecordingOutbound>,
}

/// Test side of a [`ScriptedTransport`].
pub struct Script {
    events: mpsc::UnboundedSender<Event>,
    pub attempts: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
    pub outbound: Arc<RecordingOutbound>,
}

impl ScriptedTransport {
    /// Connect attempts beyond the scripted outcomes succeed.
    pub fn new(connects: Vec<Result<(), TransportError>>) -> (Self, Script) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let attempts = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let outbound = Arc::new(RecordingOutbound::default());

        let transport = ScriptedTransport {
            connects: connects.into(),
            events: receiver,
            attempts: attempts.clone(),
            disconnects: disconnects.clone(),
            outbound: outbound.clone(),
        };
        let script = Script {
            events: sender,
            attempts,
            disconnects,
            outbound,
        };
        (transport, script)
    }
}

impl Transport for ScriptedTransport {
    fn outbound(&self) -> Arc<dyn Outbound> {
        self.outbound.clone()
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.connects.pop_front().unwrap_or(Ok(()))
    }

    async fn next_message(&mut self) -> Result<Option<MqttMessage>, TransportError> {
        match self.events.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

impl Script {
    pub fn message(&self, topic: &str, payload: &str) {
        let _ = self
            .events
            .send(Ok(Some(MqttMessage::new(topic, payload.as_bytes().to_vec()))));
    }

    pub fn drop_link(&self) {
        let _ = self
            .events
            .send(Err(TransportError::LinkLost("connection reset".to_string())));
    }
}

/// Outbound half that records every request.
#[derive(Default)]
pub struct RecordingOutbound {
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail_publish: AtomicBool,
}

impl RecordingOutbound {
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }
}

impl Outbound for RecordingOutbound {
    fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.subscriptions.lock().unwrap().push(filter.to_string());
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Request("request queue closed".to_string()));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }
}
