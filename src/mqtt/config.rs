use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection identity and wire options of a broker session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub address: String,
    pub port: u16,
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Issued with QoS 0 every time the session enters Connected
    pub subscriptions: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 1883,
            client_id: "mqtt_explorer".to_string(),
            clean_session: true,
            keep_alive_secs: 5,
            username: None,
            password: None,
            // Control topics first, then everything else
            subscriptions: vec!["$SYS/#".to_string(), "#".to_string()],
        }
    }
}

impl SessionOptions {
    pub fn new(address: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Options for a publish-only companion session (simulator).
    pub fn companion(&self, suffix: &str) -> Self {
        Self {
            client_id: format!("{}_{}", self.client_id, suffix),
            subscriptions: Vec::new(),
            ..self.clone()
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Backoff and ceiling applied after an unexpected link loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub interval_ms: u64,
    /// Failed attempts tolerated before the session gives up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 2500,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
