#![cfg_attr(not(test), no_std)]

//! ESP32-C3 Telescope Server Library
//!
//! This library provides modules for a WiFi-attached telescope node that joins a
//! publish/subscribe broker, answers remote pings in a binary and a legacy text
//! format, and reports its connectivity through a status LED.

pub mod broker;
pub mod connectivity;
pub mod dispatcher;
pub mod health;
pub mod indicator;
pub mod network;
pub mod protocol;
pub mod session;
pub mod topics;

#[cfg(feature = "esp32c3")]
pub mod mqtt;
#[cfg(feature = "esp32c3")]
pub mod wifi;

/// Project version information
pub const VERSION: &str = "0.1.0-dev";

/// Default configuration constants
pub mod config {
    use crate::broker::QoS;
    use crate::indicator::BlinkPattern;

    /// Status LED GPIO pin
    pub const LED_PIN: u8 = 2;

    /// WiFi configuration
    /// Read from environment variables at compile time
    pub const WIFI_SSID: &str = env!("WIFI_SSID");
    pub const WIFI_PASSWORD: &str = env!("WIFI_PASSWORD");

    /// Node identity used to derive the private command/response topics
    pub const NODE_NAME: &str = env!("NODE_NAME");

    /// Broker endpoint and credentials (empty credentials mean anonymous)
    pub const MQTT_BROKER_HOST: &str = env!("MQTT_BROKER_HOST");
    pub const MQTT_BROKER_PORT: &str = env!("MQTT_BROKER_PORT");
    pub const MQTT_USERNAME: &str = env!("MQTT_USERNAME");
    pub const MQTT_PASSWORD: &str = env!("MQTT_PASSWORD");

    /// "1" routes every reply to the shared legacy test topic
    pub const LEGACY_TOPICS: &str = env!("TELESCOPE_LEGACY_TOPICS");

    /// QoS used for every subscription and reply
    pub const MQTT_QOS: QoS = QoS::AtLeastOnce;

    /// Command topic shared by every node
    pub const BROADCAST_COMMAND_TOPIC: &str = "servers/ALL/command";

    /// Shared test topic used by legacy deployments
    pub const LEGACY_TEST_TOPIC: &str = "home/testing";

    /// Health loop wake interval in milliseconds
    pub const HEALTH_PERIOD_MS: u32 = 100;

    /// Quiet time held after every blink sequence before the LED is released
    pub const INDICATOR_QUIESCENT_MS: u32 = 500;

    /// Delay before reopening the broker session after a transport failure
    pub const MQTT_RECONNECT_INTERVAL_MS: u64 = 5000;

    /// Blink patterns
    pub const NETWORK_UP: BlinkPattern = BlinkPattern::new(3, 100);
    pub const BROKER_CLIENT_STARTED: BlinkPattern = BlinkPattern::new(3, 500);
    pub const BROKER_CONNECTED: BlinkPattern = BlinkPattern::new(3, 100);
    pub const BINARY_PING_ACK: BlinkPattern = BlinkPattern::new(1, 25);
    pub const LEGACY_PING_ACK: BlinkPattern = BlinkPattern::new(1, 100);
    pub const DEGRADED: BlinkPattern = BlinkPattern::new(5, 50);
}

/// Error types for the telescope server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    /// WiFi connection error
    WiFiError,
    /// Broker client or session error
    BrokerError,
    /// Invalid compile-time configuration (node name, broker address)
    ConfigError,
}

impl core::fmt::Display for BoardError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            BoardError::WiFiError => "wifi connection failed",
            BoardError::BrokerError => "broker session failed",
            BoardError::ConfigError => "invalid configuration",
        };
        f.write_str(msg)
    }
}
