//! # Explorer Facade
//!
//! The single entry point a front end talks to. It owns the message router,
//! the broker session, the optional simulator and the dashboard, and exposes
//! the operations a user can trigger:
//!
//! ```text
//!                 ┌──────────── Explorer ────────────┐
//! connect ──────► │ SessionHandle ──► MessageRouter  │ ──► accepted / inbound broadcasts
//! publish ──────► │ Publisher                        │
//! subscribe ────► │ TopicFilter (inside the router)  │
//! export ───────► │ TopicStore snapshot              │
//! simulator ────► │ SimulatorHandle (own session)    │
//! dashboard ────► │ Dashboard ──► Publisher          │
//!                 └──────────────────────────────────┘
//! ```
//!
//! Connecting again supersedes the previous session. Disconnecting stops the
//! simulator as well.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dashboard::{self, Dashboard, WidgetConfig, WidgetPublish};
use crate::error::{DashboardError, ExportError, FilterError, PublishError, SessionError};
use crate::mqtt::{
    BrokerSession, ConnectionState, MqttMessage, MqttTransport, ReconnectPolicy, SessionHandle,
    SessionOptions, SessionStatus, Transport,
};
use crate::router::MessageRouter;
use crate::simulator::{SimulatorHandle, SimulatorSettings};
use crate::topics::{HistoryLimit, TopicPath};

/// Suffix appended to the explorer's client id for the simulator session
const SIMULATOR_SUFFIX: &str = "simulator";

pub struct Explorer {
    router: MessageRouter,
    session: Option<SessionHandle>,
    /// Status of the last connect that failed, until the next connect or disconnect
    failed: Option<SessionStatus>,
    simulator: Option<SimulatorHandle>,
    dashboard: Arc<Mutex<Dashboard>>,
}

impl Default for Explorer {
    fn default() -> Self {
        Self::new(HistoryLimit::default())
    }
}

impl Explorer {
    pub fn new(history_limit: HistoryLimit) -> Self {
        Explorer {
            router: MessageRouter::new(history_limit),
            session: None,
            failed: None,
            simulator: None,
            dashboard: Arc::new(Mutex::new(Dashboard::new())),
        }
    }

    pub fn with_dashboard(mut self, dashboard: Dashboard) -> Self {
        self.dashboard = Arc::new(Mutex::new(dashboard));
        self
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Messages that passed the filter and were stored.
    pub fn accepted_messages(&self) -> broadcast::Receiver<MqttMessage> {
        self.router.subscribe()
    }

    // ---------------------------------------------------------------------
    // Session
    // ---------------------------------------------------------------------

    /// Connects to the broker described by `options` over MQTT.
    pub async fn connect(
        &mut self,
        options: SessionOptions,
        policy: ReconnectPolicy,
    ) -> Result<(), SessionError> {
        let transport = MqttTransport::new(&options);
        self.connect_with(transport, options, policy).await
    }

    /// Connects over an arbitrary transport.
    ///
    /// A running session is shut down before the new handshake starts, so a
    /// failed connect leaves the explorer without a session. The old one is
    /// not kept as a fallback: it would hold the same client id the new
    /// connection presents to the broker. The failed attempt stays visible
    /// through [`status`](Self::status).
    pub async fn connect_with<T: Transport>(
        &mut self,
        transport: T,
        options: SessionOptions,
        policy: ReconnectPolicy,
    ) -> Result<(), SessionError> {
        if let Some(mut previous) = self.session.take() {
            info!(
                "Replacing session {} with a new connection",
                previous.options().client_id
            );
            if let Err(e) = previous.shutdown().await {
                warn!("Previous session ended with error: {}", e);
            }
        }

        let router = Some(self.router.clone());
        let mut session = BrokerSession::new(transport, options, policy, router);
        if let Err(e) = session.connect().await {
            self.failed = Some(session.status());
            return Err(e);
        }

        let handle = SessionHandle::spawn(session);
        info!("Connected to {}", handle.options().endpoint());
        self.failed = None;
        self.session = Some(handle);
        Ok(())
    }

    /// Closes the session and stops the simulator. Never triggers a reconnect.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.stop_simulator().await;
        self.failed = None;

        match self.session.take() {
            Some(mut session) => {
                info!("Disconnecting from {}", session.options().endpoint());
                session.shutdown().await
            }
            None => {
                debug!("Disconnect requested without a session");
                Ok(())
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.state() == ConnectionState::Connected)
    }

    /// Status of the current session, or of the last failed connect.
    /// `None` before the first connect and after a disconnect.
    pub fn status(&self) -> Option<SessionStatus> {
        match &self.session {
            Some(session) => Some(session.status()),
            None => self.failed.clone(),
        }
    }

    pub fn watch_status(&self) -> Option<watch::Receiver<SessionStatus>> {
        self.session.as_ref().map(SessionHandle::watch_status)
    }

    /// Waits until the session loop ends, e.g. after the retries ran out.
    /// Returns immediately without a session.
    pub async fn wait_session(&mut self) -> Result<(), SessionError> {
        match self.session.as_mut() {
            Some(session) => session.wait().await,
            None => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // Publishing
    // ---------------------------------------------------------------------

    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<(), PublishError> {
        let session = self.session.as_ref().ok_or(PublishError::NotConnected)?;
        session.publisher().publish(topic, payload)
    }

    pub fn publish_text(&self, topic: &str, text: &str) -> Result<(), PublishError> {
        self.publish(topic, text.as_bytes().to_vec())
    }

    /// Publishes the raw contents of the file at `path`.
    pub async fn publish_file(&self, topic: &str, path: &Path) -> Result<(), PublishError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| PublishError::File {
                path: path.to_path_buf(),
                source,
            })?;

        if content.is_empty() {
            warn!("Not publishing empty file {}", path.display());
            return Err(PublishError::EmptyPayload);
        }

        debug!("Publishing {} ({} bytes) to {}", path.display(), content.len(), topic);
        self.publish(topic, content)
    }

    // ---------------------------------------------------------------------
    // View
    // ---------------------------------------------------------------------

    /// Narrows the view to topics below `filter`.
    pub async fn subscribe(&self, filter: &str) -> Result<(), FilterError> {
        if filter.is_empty() {
            return Err(FilterError::EmptyFilter);
        }
        self.router.set_filter(filter).await;
        Ok(())
    }

    pub async fn reset_filter(&self) {
        self.router.reset_filter().await;
    }

    /// Zero or below keeps every message.
    pub async fn set_history_limit(&self, limit: i64) {
        self.router.set_history_limit(HistoryLimit::new(limit)).await;
    }

    pub async fn messages(&self, topic: &str) -> Option<Vec<Vec<u8>>> {
        self.router.messages(&TopicPath::parse(topic)).await
    }

    pub async fn export(&self, directory: &Path) -> Result<usize, ExportError> {
        info!("Exporting topic tree to {}", directory.display());
        self.router.export(directory).await
    }

    // ---------------------------------------------------------------------
    // Simulator
    // ---------------------------------------------------------------------

    /// Starts the simulator on its own session next to `broker`.
    ///
    /// Does nothing while a simulator is already running.
    pub async fn start_simulator(
        &mut self,
        broker: &SessionOptions,
        policy: ReconnectPolicy,
        settings: SimulatorSettings,
    ) -> Result<(), SessionError> {
        if self.simulator_running() {
            info!("Simulator already running");
            return Ok(());
        }

        let options = broker.companion(SIMULATOR_SUFFIX);
        let transport = MqttTransport::new(&options);
        self.start_simulator_with(transport, options, policy, settings)
            .await
    }

    pub async fn start_simulator_with<T: Transport>(
        &mut self,
        transport: T,
        options: SessionOptions,
        policy: ReconnectPolicy,
        settings: SimulatorSettings,
    ) -> Result<(), SessionError> {
        if self.simulator_running() {
            info!("Simulator already running");
            return Ok(());
        }
        // A finished run still holds its session
        self.stop_simulator().await;

        let session = SessionHandle::connect(transport, options, policy, None).await?;
        self.simulator = Some(SimulatorHandle::spawn(session, settings));
        Ok(())
    }

    /// Returns how many messages the stopped simulator sent.
    pub async fn stop_simulator(&mut self) -> usize {
        match self.simulator.take() {
            Some(mut simulator) => simulator.stop().await,
            None => 0,
        }
    }

    pub fn simulator_running(&self) -> bool {
        self.simulator
            .as_ref()
            .is_some_and(SimulatorHandle::is_running)
    }

    // ---------------------------------------------------------------------
    // Dashboard
    // ---------------------------------------------------------------------

    pub fn dashboard(&self) -> Arc<Mutex<Dashboard>> {
        self.dashboard.clone()
    }

    /// Starts feeding every inbound message, filtered or not, to the dashboard.
    pub fn spawn_dashboard_feed(&self) -> JoinHandle<()> {
        dashboard::spawn_feed(self.dashboard.clone(), self.router.subscribe_inbound())
    }

    pub async fn add_widget(&self, config: WidgetConfig) -> Result<(), DashboardError> {
        self.dashboard.lock().await.add_widget(config)
    }

    pub async fn remove_widget(&self, name: &str) -> Result<WidgetConfig, DashboardError> {
        self.dashboard.lock().await.remove_widget(name)
    }

    /// Flips the named switch and publishes its new state.
    pub async fn toggle_switch(&self, name: &str) -> Result<(), DashboardError> {
        let request = self.dashboard.lock().await.toggle_switch(name)?;
        self.send_widget_publish(request)
    }

    /// Publishes trimmed `text` from the named text widget.
    pub async fn send_text(&self, name: &str, text: &str) -> Result<(), DashboardError> {
        let request = self.dashboard.lock().await.send_text(name, text)?;
        self.send_widget_publish(request)
    }

    fn send_widget_publish(&self, request: WidgetPublish) -> Result<(), DashboardError> {
        self.publish(&request.topic, request.payload.into_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{WidgetKind, WidgetState};
    use crate::mqtt::testing::{Script, ScriptedTransport};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn connected(limit: HistoryLimit) -> (Explorer, Script) {
        let (transport, script) = ScriptedTransport::new(vec![Ok(())]);
        let mut explorer = Explorer::new(limit);
        explorer
            .connect_with(transport, SessionOptions::default(), ReconnectPolicy::default())
            .await
            .unwrap();
        (explorer, script)
    }

    /// Waits until the session has handled `count` inbound messages in total.
    async fn received(explorer: &Explorer, count: usize) {
        let mut status = explorer.watch_status().unwrap();
        status
            .wait_for(|status| status.messages_received >= count)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn publish_needs_a_session() {
        let explorer = Explorer::default();
        assert!(matches!(
            explorer.publish_text("a", "b"),
            Err(PublishError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn inbound_messages_reach_the_store() {
        let (mut explorer, script) = connected(HistoryLimit::new(5)).await;
        assert!(explorer.is_connected());

        script.message("sensors/kitchen/temp", "21.5");
        script.message("sensors/kitchen/temp", "21.7");
        received(&explorer, 2).await;

        assert_eq!(
            explorer.messages("sensors/kitchen/temp").await,
            Some(vec![b"21.5".to_vec(), b"21.7".to_vec()])
        );
        assert_eq!(explorer.status().unwrap().messages_received, 2);

        explorer.disconnect().await.unwrap();
        assert!(!explorer.is_connected());
        assert!(explorer.status().is_none());
    }

    #[tokio::test]
    async fn subscribe_filters_the_view() {
        let (explorer, script) = connected(HistoryLimit::new(10)).await;

        assert_eq!(explorer.subscribe("").await, Err(FilterError::EmptyFilter));
        explorer.subscribe("sensors/livingroom").await.unwrap();

        script.message("sensors/kitchen/temp", "21.5");
        script.message("sensors/livingroom/temp", "19.0");
        received(&explorer, 2).await;

        assert_eq!(explorer.messages("sensors/kitchen/temp").await, None);
        assert_eq!(
            explorer.messages("sensors/livingroom/temp").await,
            Some(vec![b"19.0".to_vec()])
        );

        explorer.reset_filter().await;
        script.message("sensors/kitchen/temp", "21.5");
        received(&explorer, 3).await;
        assert!(explorer.messages("sensors/kitchen/temp").await.is_some());
    }

    #[tokio::test]
    async fn publish_goes_out_on_the_session() {
        let (explorer, script) = connected(HistoryLimit::default()).await;

        explorer.publish_text("cmd/light", "ON").unwrap();
        assert_eq!(
            script.outbound.published(),
            [("cmd/light".to_string(), b"ON".to_vec())]
        );
        assert_eq!(explorer.status().unwrap().messages_sent, 1);
    }

    #[tokio::test]
    async fn publish_file_reads_the_whole_file() {
        let (explorer, script) = connected(HistoryLimit::default()).await;
        let dir = TempDir::new().unwrap();

        let file = dir.path().join("blob.bin");
        tokio::fs::write(&file, [0u8, 159, 146, 150]).await.unwrap();
        explorer.publish_file("upload", &file).await.unwrap();
        assert_eq!(script.outbound.published()[0].1, vec![0u8, 159, 146, 150]);

        let empty = dir.path().join("empty.txt");
        tokio::fs::write(&empty, b"").await.unwrap();
        assert!(matches!(
            explorer.publish_file("upload", &empty).await,
            Err(PublishError::EmptyPayload)
        ));

        assert!(matches!(
            explorer.publish_file("upload", &dir.path().join("missing")).await,
            Err(PublishError::File { .. })
        ));
        assert_eq!(script.outbound.published().len(), 1);
    }

    #[tokio::test]
    async fn history_limit_applies_to_existing_topics() {
        let (explorer, script) = connected(HistoryLimit::UNBOUNDED).await;
        for payload in ["1", "2", "3", "4"] {
            script.message("t", payload);
        }
        received(&explorer, 4).await;

        explorer.set_history_limit(2).await;
        assert_eq!(
            explorer.messages("t").await,
            Some(vec![b"3".to_vec(), b"4".to_vec()])
        );

        explorer.set_history_limit(0).await;
        script.message("t", "5");
        received(&explorer, 5).await;
        assert_eq!(explorer.messages("t").await.map(|m| m.len()), Some(3));
    }

    #[tokio::test]
    async fn export_writes_the_last_message() {
        let (explorer, script) = connected(HistoryLimit::new(3)).await;
        script.message("home/lamp", "off");
        script.message("home/lamp", "on");
        received(&explorer, 2).await;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("dump");
        assert_eq!(explorer.export(&target).await.unwrap(), 1);

        let payload = tokio::fs::read_to_string(target.join("home/lamp/payload.txt"))
            .await
            .unwrap();
        assert_eq!(payload, "on");
        assert!(!target.join("home/payload.txt").exists());

        assert!(matches!(
            explorer.export(&target).await,
            Err(ExportError::DirectoryNotEmpty(_))
        ));
    }

    #[tokio::test]
    async fn reconnecting_supersedes_the_old_session() {
        let (mut explorer, first) = connected(HistoryLimit::default()).await;

        let (transport, second) = ScriptedTransport::new(vec![Ok(())]);
        explorer
            .connect_with(transport, SessionOptions::default(), ReconnectPolicy::default())
            .await
            .unwrap();

        assert_eq!(first.disconnects.load(Ordering::SeqCst), 1);
        explorer.publish_text("x", "y").unwrap();
        assert!(first.outbound.published().is_empty());
        assert_eq!(second.outbound.published().len(), 1);
    }

    #[tokio::test]
    async fn failed_connect_keeps_its_status() {
        let (transport, _script) = ScriptedTransport::new(vec![Err(
            crate::error::TransportError::Connect("refused".to_string()),
        )]);
        let mut explorer = Explorer::default();

        let result = explorer
            .connect_with(transport, SessionOptions::default(), ReconnectPolicy::default())
            .await;
        assert!(matches!(result, Err(SessionError::Connect { .. })));
        assert!(!explorer.is_connected());
        assert!(explorer.wait_session().await.is_ok());

        let status = explorer.status().unwrap();
        assert_eq!(status.connection_state, ConnectionState::Failed);
        assert_eq!(status.error_messages.len(), 1);

        explorer.disconnect().await.unwrap();
        assert!(explorer.status().is_none());
    }

    #[tokio::test]
    async fn failed_reconnect_replaces_the_running_session() {
        let (mut explorer, first) = connected(HistoryLimit::default()).await;
        let (transport, _second) = ScriptedTransport::new(vec![Err(
            crate::error::TransportError::Connect("refused".to_string()),
        )]);

        let result = explorer
            .connect_with(transport, SessionOptions::default(), ReconnectPolicy::default())
            .await;
        assert!(result.is_err());
        assert_eq!(first.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(
            explorer.status().unwrap().connection_state,
            ConnectionState::Failed
        );
        assert!(matches!(
            explorer.publish_text("x", "y"),
            Err(PublishError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn simulator_runs_once_and_stops_with_disconnect() {
        let (mut explorer, _script) = connected(HistoryLimit::default()).await;
        let settings = SimulatorSettings {
            enabled: true,
            ..SimulatorSettings::default()
        };
        let options = SessionOptions::default().companion(SIMULATOR_SUFFIX);

        let (transport, simulated) = ScriptedTransport::new(vec![]);
        explorer
            .start_simulator_with(
                transport,
                options.clone(),
                ReconnectPolicy::default(),
                settings.clone(),
            )
            .await
            .unwrap();
        assert!(explorer.simulator_running());

        let (ignored, unused) = ScriptedTransport::new(vec![]);
        explorer
            .start_simulator_with(ignored, options, ReconnectPolicy::default(), settings)
            .await
            .unwrap();
        assert_eq!(unused.attempts.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(4500)).await;
        explorer.disconnect().await.unwrap();
        assert!(!explorer.simulator_running());
        assert_eq!(simulated.outbound.published().len(), 3);
        assert_eq!(simulated.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dashboard_sees_filtered_messages_and_publishes() {
        let (explorer, script) = connected(HistoryLimit::default()).await;
        explorer
            .add_widget(WidgetConfig {
                name: "lamp".to_string(),
                topic: "home/lamp".to_string(),
                kind: WidgetKind::Switch,
            })
            .await
            .unwrap();
        let feed = explorer.spawn_dashboard_feed();

        explorer.subscribe("other").await.unwrap();
        script.message("home/lamp", "ON");
        received(&explorer, 1).await;
        // The feed runs in its own task; paused time only advances once it is idle
        tokio::time::sleep(Duration::from_millis(10)).await;

        let dashboard = explorer.dashboard();
        assert_eq!(
            dashboard.lock().await.widget("lamp").unwrap().state(),
            &WidgetState::Switch { on: true }
        );

        explorer.toggle_switch("lamp").await.unwrap();
        assert_eq!(
            script.outbound.published(),
            [("home/lamp".to_string(), b"OFF".to_vec())]
        );
        assert!(matches!(
            explorer.send_text("lamp", "hi").await,
            Err(DashboardError::WrongKind(..))
        ));
        feed.abort();
    }
}
