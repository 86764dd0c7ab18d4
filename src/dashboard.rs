//! Dashboard widget model
//!
//! A dashboard is a small set of named widgets, each bound to one exact topic.
//! Widgets see every inbound message, filter or not, and turn user
//! interactions into publish requests. Layout is left to the front end.
//!
//! ## Widget Kinds
//!
//! | Kind    | Inbound message            | Interaction                      |
//! |---------|----------------------------|----------------------------------|
//! | Switch  | ON for `on`/`On`/`ON`/`1`  | toggle, publishes `ON` or `OFF`  |
//! | Display | shows the payload text     | none                             |
//! | Text    | appends the payload        | send text, appended and published|

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DashboardError;
use crate::mqtt::MqttMessage;

/// Maximum number of widgets on one dashboard
pub const MAX_WIDGETS: usize = 12;

const SWITCH_ON: &str = "ON";
const SWITCH_OFF: &str = "OFF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetKind {
    Switch,
    Display,
    Text,
}

impl WidgetKind {
    fn label(self) -> &'static str {
        match self {
            WidgetKind::Switch => "switch",
            WidgetKind::Display => "display",
            WidgetKind::Text => "text",
        }
    }
}

/// Widget definition as stored in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub name: String,
    pub topic: String,
    pub kind: WidgetKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetState {
    Switch { on: bool },
    Display { text: String },
    Text { lines: Vec<String> },
}

impl WidgetState {
    fn initial(kind: WidgetKind) -> Self {
        match kind {
            WidgetKind::Switch => WidgetState::Switch { on: false },
            WidgetKind::Display => WidgetState::Display {
                text: String::new(),
            },
            WidgetKind::Text => WidgetState::Text { lines: Vec::new() },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Widget {
    config: WidgetConfig,
    state: WidgetState,
}

impl Widget {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn topic(&self) -> &str {
        &self.config.topic
    }

    pub fn kind(&self) -> WidgetKind {
        self.config.kind
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn state(&self) -> &WidgetState {
        &self.state
    }

    fn apply(&mut self, payload: &str) {
        match &mut self.state {
            WidgetState::Switch { on } => *on = is_switch_on(payload),
            WidgetState::Display { text } => *text = payload.to_string(),
            WidgetState::Text { lines } => lines.push(payload.to_string()),
        }
    }
}

/// A publish the front end should send on behalf of a widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetPublish {
    pub topic: String,
    pub payload: String,
}

/// Payloads that turn a switch on; anything else turns it off.
pub fn is_switch_on(payload: &str) -> bool {
    matches!(payload, "on" | "On" | "ON" | "1")
}

#[derive(Debug, Clone, Default)]
pub struct Dashboard {
    widgets: Vec<Widget>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dashboard from config entries. Invalid entries are logged and
    /// skipped so one bad line does not cost the whole dashboard.
    pub fn from_configs(configs: impl IntoIterator<Item = WidgetConfig>) -> Self {
        let mut dashboard = Dashboard::new();
        for config in configs {
            let name = config.name.clone();
            if let Err(e) = dashboard.add_widget(config) {
                warn!("Skipping widget '{}': {}", name, e);
            }
        }
        dashboard
    }

    pub fn add_widget(&mut self, config: WidgetConfig) -> Result<(), DashboardError> {
        if self.widgets.len() >= MAX_WIDGETS {
            return Err(DashboardError::Full(MAX_WIDGETS));
        }
        if config.name.trim().is_empty() {
            return Err(DashboardError::EmptyName);
        }
        if self.widget(&config.name).is_some() {
            return Err(DashboardError::DuplicateName(config.name));
        }

        info!(
            "Adding {} widget '{}' on {}",
            config.kind.label(),
            config.name,
            config.topic
        );
        let state = WidgetState::initial(config.kind);
        self.widgets.push(Widget { config, state });
        Ok(())
    }

    pub fn remove_widget(&mut self, name: &str) -> Result<WidgetConfig, DashboardError> {
        let index = self
            .widgets
            .iter()
            .position(|widget| widget.name() == name)
            .ok_or_else(|| DashboardError::UnknownWidget(name.to_string()))?;

        info!("Removing widget '{}'", name);
        Ok(self.widgets.remove(index).config)
    }

    pub fn widget(&self, name: &str) -> Option<&Widget> {
        self.widgets.iter().find(|widget| widget.name() == name)
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Updates every widget bound to exactly `message.topic`.
    ///
    /// Returns how many widgets changed.
    pub fn handle_message(&mut self, message: &MqttMessage) -> usize {
        let payload = message.payload_text();
        let mut updated = 0;

        for widget in self
            .widgets
            .iter_mut()
            .filter(|widget| widget.config.topic == message.topic)
        {
            widget.apply(&payload);
            updated += 1;
        }

        if updated > 0 {
            debug!("Message on {} updated {} widget(s)", message.topic, updated);
        }
        updated
    }

    /// Flips a switch and returns the matching publish request.
    pub fn toggle_switch(&mut self, name: &str) -> Result<WidgetPublish, DashboardError> {
        let widget = self.widget_mut(name)?;
        let WidgetState::Switch { on } = &mut widget.state else {
            return Err(DashboardError::WrongKind(
                name.to_string(),
                WidgetKind::Switch.label(),
            ));
        };

        *on = !*on;
        let payload = if *on { SWITCH_ON } else { SWITCH_OFF };
        Ok(WidgetPublish {
            topic: widget.config.topic.clone(),
            payload: payload.to_string(),
        })
    }

    /// Appends trimmed `text` to a text widget and returns the publish request.
    pub fn send_text(&mut self, name: &str, text: &str) -> Result<WidgetPublish, DashboardError> {
        let widget = self.widget_mut(name)?;
        let WidgetState::Text { lines } = &mut widget.state else {
            return Err(DashboardError::WrongKind(
                name.to_string(),
                WidgetKind::Text.label(),
            ));
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(DashboardError::EmptyMessage);
        }

        lines.push(text.to_string());
        Ok(WidgetPublish {
            topic: widget.config.topic.clone(),
            payload: text.to_string(),
        })
    }

    fn widget_mut(&mut self, name: &str) -> Result<&mut Widget, DashboardError> {
        self.widgets
            .iter_mut()
            .find(|widget| widget.name() == name)
            .ok_or_else(|| DashboardError::UnknownWidget(name.to_string()))
    }
}

/// Feeds every message from `inbound` into `dashboard` until the channel closes.
pub fn spawn_feed(
    dashboard: Arc<Mutex<Dashboard>>,
    mut inbound: broadcast::Receiver<MqttMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match inbound.recv().await {
                Ok(message) => {
                    dashboard.lock().await.handle_message(&message);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dashboard fell behind, {} messages skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Dashboard feed stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(name: &str, topic: &str, kind: WidgetKind) -> WidgetConfig {
        WidgetConfig {
            name: name.to_string(),
            topic: topic.to_string(),
            kind,
        }
    }

    fn dashboard() -> Dashboard {
        Dashboard::from_configs([
            widget("lamp", "home/lamp", WidgetKind::Switch),
            widget("temp", "home/temp", WidgetKind::Display),
            widget("chat", "home/chat", WidgetKind::Text),
        ])
    }

    #[test]
    fn switch_payloads() {
        for payload in ["on", "On", "ON", "1"] {
            assert!(is_switch_on(payload), "{payload}");
        }
        for payload in ["oN", "off", "true", " on", "0", ""] {
            assert!(!is_switch_on(payload), "{payload}");
        }
    }

    #[test]
    fn messages_update_widgets_on_the_exact_topic() {
        let mut dashboard = dashboard();

        assert_eq!(dashboard.handle_message(&MqttMessage::new("home/lamp", "On")), 1);
        assert_eq!(dashboard.handle_message(&MqttMessage::new("home/temp", "21.5")), 1);
        assert_eq!(dashboard.handle_message(&MqttMessage::new("home/chat", "hi")), 1);
        assert_eq!(dashboard.handle_message(&MqttMessage::new("home/chat", "there")), 1);
        assert_eq!(dashboard.handle_message(&MqttMessage::new("home/lamp/x", "1")), 0);
        assert_eq!(dashboard.handle_message(&MqttMessage::new("home", "1")), 0);

        assert_eq!(
            dashboard.widget("lamp").unwrap().state(),
            &WidgetState::Switch { on: true }
        );
        assert_eq!(
            dashboard.widget("temp").unwrap().state(),
            &WidgetState::Display {
                text: "21.5".to_string()
            }
        );
        assert_eq!(
            dashboard.widget("chat").unwrap().state(),
            &WidgetState::Text {
                lines: vec!["hi".to_string(), "there".to_string()]
            }
        );

        dashboard.handle_message(&MqttMessage::new("home/lamp", "off"));
        assert_eq!(
            dashboard.widget("lamp").unwrap().state(),
            &WidgetState::Switch { on: false }
        );
    }

    #[test]
    fn toggle_alternates_on_and_off() {
        let mut dashboard = dashboard();

        let first = dashboard.toggle_switch("lamp").unwrap();
        assert_eq!(first.topic, "home/lamp");
        assert_eq!(first.payload, "ON");
        assert_eq!(dashboard.toggle_switch("lamp").unwrap().payload, "OFF");

        assert!(matches!(
            dashboard.toggle_switch("temp"),
            Err(DashboardError::WrongKind(_, "switch"))
        ));
        assert!(matches!(
            dashboard.toggle_switch("nope"),
            Err(DashboardError::UnknownWidget(_))
        ));
    }

    #[test]
    fn send_text_trims_and_rejects_blank() {
        let mut dashboard = dashboard();

        let request = dashboard.send_text("chat", "  hello  ").unwrap();
        assert_eq!(request.payload, "hello");
        assert_eq!(request.topic, "home/chat");
        assert!(matches!(
            dashboard.send_text("chat", "   "),
            Err(DashboardError::EmptyMessage)
        ));
        assert_eq!(
            dashboard.widget("chat").unwrap().state(),
            &WidgetState::Text {
                lines: vec!["hello".to_string()]
            }
        );
    }

    #[test]
    fn capacity_and_names_are_enforced() {
        let mut dashboard = Dashboard::new();
        for i in 0..MAX_WIDGETS {
            dashboard
                .add_widget(widget(&format!("w{i}"), "t", WidgetKind::Display))
                .unwrap();
        }
        assert!(matches!(
            dashboard.add_widget(widget("extra", "t", WidgetKind::Display)),
            Err(DashboardError::Full(MAX_WIDGETS))
        ));

        dashboard.remove_widget("w0").unwrap();
        assert!(matches!(
            dashboard.add_widget(widget("w1", "t", WidgetKind::Switch)),
            Err(DashboardError::DuplicateName(_))
        ));
        assert!(matches!(
            dashboard.add_widget(widget(" ", "t", WidgetKind::Switch)),
            Err(DashboardError::EmptyName)
        ));
        dashboard.add_widget(widget("w0", "t", WidgetKind::Switch)).unwrap();
        assert_eq!(dashboard.len(), MAX_WIDGETS);

        // Every widget on the shared topic sees the message
        assert_eq!(dashboard.handle_message(&MqttMessage::new("t", "x")), MAX_WIDGETS);
    }

    #[test]
    fn widget_kinds_parse_from_toml() {
        #[derive(Deserialize)]
        struct File {
            dashboard: Vec<WidgetConfig>,
        }

        let file: File = toml::from_str(
            r#"
            [[dashboard]]
            name = "lamp"
            topic = "home/lamp"
            kind = "switch"
            "#,
        )
        .unwrap();
        assert_eq!(file.dashboard[0].kind, WidgetKind::Switch);
    }

    #[tokio::test]
    async fn feed_applies_broadcast_messages() {
        let (sender, receiver) = broadcast::channel(8);
        let dashboard = Arc::new(Mutex::new(dashboard()));
        let feed = spawn_feed(dashboard.clone(), receiver);

        sender.send(MqttMessage::new("home/lamp", "1")).unwrap();
        drop(sender);
        feed.await.unwrap();

        assert_eq!(
            dashboard.lock().await.widget("lamp").unwrap().state(),
            &WidgetState::Switch { on: true }
        );
    }
}
