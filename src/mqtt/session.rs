//! Broker session: connection lifecycle and reconnection state machine.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──(link loss)──► Reconnecting
//!                      │              ▲                         │   │
//!                      ▼              └─────────(success)───────┘   │
//!                    Failed ◄──────────(ceiling reached)────────────┘
//! ```
//!
//! The initial connect is never retried: a failure is reported to the caller
//! right away. Only an unexpected link loss after a successful connect starts
//! the reconnect loop, which waits a fixed interval before every attempt and
//! gives up after a fixed number of failed attempts. Explicit shutdown never
//! reconnects.
//!
//! # Ownership
//!
//! The loop runs in a tokio task owned by a [`SessionHandle`]. Shutting the
//! handle down, or dropping it, cancels the task wherever it is waiting,
//! including the backoff sleep.

use std::sync::Arc;

use chrono::Local;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{ReconnectPolicy, SessionOptions};
use super::message::MqttMessage;
use super::transport::{Outbound, Transport};
use crate::error::{PublishError, SessionError, TransportError};
use crate::router::MessageRouter;

/// Error messages kept in the status for display
const MAX_ERROR_MESSAGES: usize = 20;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Observable state of a session, published through a watch channel.
#[derive(Clone, Debug, Default)]
pub struct SessionStatus {
    pub connection_state: ConnectionState,
    /// Failed reconnect attempts since the last successful connect
    pub retry_count: u32,
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<chrono::DateTime<chrono::Local>>,
}

impl SessionStatus {
    fn push_error(&mut self, error: &TransportError) {
        self.error_messages.push(error.to_string());
        if self.error_messages.len() > MAX_ERROR_MESSAGES {
            self.error_messages.remove(0);
        }
    }
}

/// Session with exclusive ownership of one transport.
pub struct BrokerSession<T: Transport> {
    options: SessionOptions,
    policy: ReconnectPolicy,
    transport: T,
    outbound: Arc<dyn Outbound>,
    status: Arc<watch::Sender<SessionStatus>>,
    router: Option<MessageRouter>,
}

impl<T: Transport> BrokerSession<T> {
    /// `router` receives every inbound message; publish-only sessions pass `None`.
    pub fn new(
        transport: T,
        options: SessionOptions,
        policy: ReconnectPolicy,
        router: Option<MessageRouter>,
    ) -> Self {
        let outbound = transport.outbound();
        let (status, _) = watch::channel(SessionStatus::default());

        BrokerSession {
            options,
            policy,
            transport,
            outbound,
            status: Arc::new(status),
            router,
        }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher {
            outbound: self.outbound.clone(),
            status: self.status.clone(),
        }
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().connection_state
    }

    /// Current status, including the error of a failed initial connect.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Initial handshake. Fails fast, no retries.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        self.update(|status| status.connection_state = ConnectionState::Connecting);
        info!(
            "Connecting to {} as {}",
            self.options.endpoint(),
            self.options.client_id
        );

        match self.transport.connect().await {
            Ok(()) => {
                self.enter_connected();
                Ok(())
            }
            Err(e) => {
                error!("Connection to {} failed: {}", self.options.endpoint(), e);
                self.update(|status| {
                    status.push_error(&e);
                    status.connection_state = ConnectionState::Failed;
                });
                Err(SessionError::Connect {
                    address: self.options.address.clone(),
                    port: self.options.port,
                    source: e,
                })
            }
        }
    }

    /// Delivers inbound messages until cancelled or until reconnecting fails
    /// for good.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SessionError> {
        debug!("Session loop started for {}", self.options.client_id);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    if self.state() == ConnectionState::Connected {
                        self.transport.disconnect().await;
                    }
                    self.update(|status| status.connection_state = ConnectionState::Disconnected);
                    info!("Disconnected {} from {}", self.options.client_id, self.options.endpoint());
                    return Ok(());
                }

                event = self.transport.next_message() => match event {
                    Ok(Some(message)) => self.deliver(message).await,
                    Ok(None) => {}
                    Err(e) => {
                        warn!("Link to {} lost: {}", self.options.endpoint(), e);
                        self.update(|status| status.push_error(&e));
                        self.reconnect(&cancel).await?;
                    }
                }
            }
        }
    }

    /// Bounded reconnect loop. Returns `Ok` once connected again or when
    /// cancelled while waiting.
    async fn reconnect(&mut self, cancel: &CancellationToken) -> Result<(), SessionError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut retry_count = 0;
        self.update(|status| {
            status.connection_state = ConnectionState::Reconnecting;
            status.retry_count = 0;
        });

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.policy.interval()) => {}
            }

            info!(
                "Reconnecting to {} (attempt {}/{})",
                self.options.endpoint(),
                retry_count + 1,
                max_attempts
            );
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                result = self.transport.connect() => result,
            };

            match attempt {
                Ok(()) => {
                    self.enter_connected();
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    warn!("Reconnect attempt {} failed: {}", retry_count, e);
                    self.update(|status| {
                        status.push_error(&e);
                        status.retry_count = retry_count;
                    });

                    if retry_count >= max_attempts {
                        error!(
                            "Giving up on {} after {} failed attempts",
                            self.options.endpoint(),
                            retry_count
                        );
                        self.update(|status| status.connection_state = ConnectionState::Failed);
                        return Err(SessionError::RetryExhausted {
                            attempts: retry_count,
                        });
                    }
                }
            }
        }
    }

    /// Marks the session connected and issues the configured subscriptions.
    fn enter_connected(&self) {
        self.update(|status| {
            status.connection_state = ConnectionState::Connected;
            status.retry_count = 0;
            status.last_activity = Some(Local::now());
        });
        info!(
            "Connected to {} as {}",
            self.options.endpoint(),
            self.options.client_id
        );

        for filter in &self.options.subscriptions {
            match self.outbound.subscribe(filter) {
                Ok(()) => debug!("Subscribed to {}", filter),
                Err(e) => {
                    warn!("Subscribing to {} failed: {}", filter, e);
                    self.update(|status| status.push_error(&e));
                }
            }
        }
    }

    async fn deliver(&mut self, message: MqttMessage) {
        if let Some(router) = &self.router {
            router.route(message).await;
        }
        self.update(|status| {
            status.messages_received += 1;
            status.last_activity = Some(Local::now());
        });
    }

    fn update(&self, modify: impl FnOnce(&mut SessionStatus)) {
        self.status.send_modify(modify);
    }
}

/// Synchronous publish handle onto a live session.
///
/// Messages go out with QoS 0 and without the retain flag. Nothing is
/// buffered: a message that can't be handed to the client is dropped and
/// the error returned.
#[derive(Clone)]
pub struct Publisher {
    outbound: Arc<dyn Outbound>,
    status: Arc<watch::Sender<SessionStatus>>,
}

impl Publisher {
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<(), PublishError> {
        if topic.is_empty() {
            return Err(PublishError::EmptyTopic);
        }
        if self.status.borrow().connection_state != ConnectionState::Connected {
            return Err(PublishError::NotConnected);
        }

        let payload = payload.into();
        let size = payload.len();
        if let Err(e) = self.outbound.publish(topic, payload) {
            warn!("Publishing to {} failed: {}", topic, e);
            self.status.send_modify(|status| status.push_error(&e));
            return Err(PublishError::Transport(e));
        }

        debug!("Published {} bytes to {}", size, topic);
        self.status.send_modify(|status| {
            status.messages_sent += 1;
            status.last_activity = Some(Local::now());
        });
        Ok(())
    }
}

/// Owner of a running session task.
pub struct SessionHandle {
    options: SessionOptions,
    publisher: Publisher,
    status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), SessionError>>>,
}

impl SessionHandle {
    /// Connects and, on success, spawns the session loop.
    ///
    /// # Errors
    ///
    /// [`SessionError::Connect`] when the handshake fails. No task is
    /// spawned in that case.
    pub async fn connect<T: Transport>(
        transport: T,
        options: SessionOptions,
        policy: ReconnectPolicy,
        router: Option<MessageRouter>,
    ) -> Result<Self, SessionError> {
        let mut session = BrokerSession::new(transport, options, policy, router);
        session.connect().await?;
        Ok(Self::spawn(session))
    }

    /// Runs an already connected session in its own task.
    pub fn spawn<T: Transport>(session: BrokerSession<T>) -> Self {
        let options = session.options.clone();
        let publisher = session.publisher();
        let status = session.watch_status();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(session.run(cancel.clone()));

        SessionHandle {
            options,
            publisher,
            status,
            cancel,
            task: Some(task),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().connection_state
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the session loop to end and returns how it ended.
    ///
    /// Cancel safe: if the returned future is dropped the task keeps running
    /// and can be waited on again.
    pub async fn wait(&mut self) -> Result<(), SessionError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.task = None;

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Session task for {} panicked: {}", self.options.client_id, e);
                Err(SessionError::Task(e.to_string()))
            }
        }
    }

    /// Explicit disconnect. Never triggers reconnection.
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        debug!("Shutting down session {}", self.options.client_id);
        self.cancel.cancel();
        self.wait().await
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
