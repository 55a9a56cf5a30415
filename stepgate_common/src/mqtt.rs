//! `[mqtt]` broker connection settings.

use crate::config::ConfigError;
use crate::consts::{DEFAULT_CLIENT_ID, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_MQTT_PORT, DEFAULT_TOPIC};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_keep_alive_secs() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

/// Broker and subscription settings for the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Topic carrying encrypted engine control envelopes.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_MQTT_PORT,
            topic: default_topic(),
            client_id: default_client_id(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
        }
    }
}

impl MqttConfig {
    /// Keep-alive as a `Duration`.
    #[inline]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Validate the broker settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::ValidationError(
                "mqtt.host cannot be empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::ValidationError(
                "mqtt.port must be greater than 0".to_string(),
            ));
        }
        if self.topic.is_empty() || self.topic.contains(['#', '+']) {
            return Err(ConfigError::ValidationError(format!(
                "mqtt.topic must be a concrete topic name, got {:?}",
                self.topic
            )));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "mqtt.client_id cannot be empty".to_string(),
            ));
        }
        // rumqttc rejects keep-alive below 5 seconds.
        if self.keep_alive_secs < 5 {
            return Err(ConfigError::ValidationError(
                "mqtt.keep_alive_secs must be at least 5".to_string(),
            ));
        }
        Ok(())
    }
}
