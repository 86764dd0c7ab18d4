//! Traffic simulator with statum state machine
//!
//! Publishes numbered test messages on its own broker session so the explorer
//! has something to look at. Runs in a tokio task and stops cooperatively: the
//! cancellation token is checked between sends, an in-flight publish is never
//! interrupted.
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Running ──► Finished
//!            │            ▲
//!            └────────────┘
//!        (count reached or cancelled)
//! ```

use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::mqtt::{Publisher, SessionHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub enabled: bool,
    pub topic: String,
    /// Every payload is this prefix followed by the message number
    pub payload_prefix: String,
    pub interval_ms: u64,
    pub count: usize,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            topic: "Test topic".to_string(),
            payload_prefix: "Hello ".to_string(),
            interval_ms: 2000,
            count: 100,
        }
    }
}

impl SimulatorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// States for the simulator lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum SimulatorState {
    Idle,     // Publisher attached, nothing sent yet
    Running,  // Sending messages
    Finished, // Count reached or cancelled
}

#[machine]
pub struct Simulator<S: SimulatorState> {
    publisher: Publisher,
    settings: SimulatorSettings,
    sent: usize,
}

impl<S: SimulatorState> Simulator<S> {
    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn settings(&self) -> &SimulatorSettings {
        &self.settings
    }
}

impl Simulator<Idle> {
    pub fn create(publisher: Publisher, settings: SimulatorSettings) -> Self {
        debug!("Creating simulator for topic {}", settings.topic);
        Self::new(publisher, settings, 0)
    }

    pub fn start(self) -> Simulator<Running> {
        info!(
            "Starting simulator: {} messages to '{}' every {}ms",
            self.settings.count, self.settings.topic, self.settings.interval_ms
        );
        self.transition()
    }
}

impl Simulator<Running> {
    /// Sends until the count is reached or `cancel` fires.
    ///
    /// A failed publish is logged and skipped, the run goes on.
    pub async fn run_until_cancelled(mut self, cancel: CancellationToken) -> Simulator<Finished> {
        for number in 0..self.settings.count {
            if cancel.is_cancelled() {
                break;
            }

            let payload = format!("{}{}", self.settings.payload_prefix, number);
            match self.publisher.publish(&self.settings.topic, payload) {
                Ok(()) => self.sent += 1,
                Err(e) => warn!("Simulator message {} not sent: {}", number, e),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval()) => {}
            }
        }

        info!("Simulator finished after {} messages", self.sent);
        self.transition()
    }
}

impl Simulator<Finished> {}

/// Handle for a simulator running in a tokio task together with its session.
pub struct SimulatorHandle {
    session: SessionHandle,
    cancel: CancellationToken,
    task: Option<JoinHandle<usize>>,
}

impl SimulatorHandle {
    /// Starts sending on `session`. The handle owns the session and tears it
    /// down when stopped.
    pub fn spawn(session: SessionHandle, settings: SimulatorSettings) -> Self {
        let simulator = Simulator::<Idle>::create(session.publisher(), settings).start();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let finished = simulator.run_until_cancelled(token).await;
            finished.sent()
        });

        SimulatorHandle {
            session,
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops sending, closes the simulator's session and returns the number
    /// of messages sent.
    pub async fn stop(&mut self) -> usize {
        debug!("Sending stop signal to simulator");
        self.cancel.cancel();

        let sent = match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                error!("Simulator task panicked: {}", e);
                0
            }),
            None => 0,
        };

        if let Err(e) = self.session.shutdown().await {
            warn!("Simulator session ended with error: {}", e);
        }
        sent
    }
}

impl Drop for SimulatorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
