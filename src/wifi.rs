//! WiFi module for ESP32-C3 board
//!
//! Handles WiFi network connection using esp-wifi 0.14.1 with embassy-net DHCP

use crate::network::NetworkLink;
use crate::{BoardError, config};
use embassy_net::Stack;
use embassy_time::{Duration, Timer, with_timeout};
use esp_wifi::wifi::{AuthMethod, ClientConfiguration, WifiController};
use heapless::String;
use log::{info, warn};

/// Association polls before giving up
const CONNECT_ATTEMPTS: u32 = 50;

/// Time allowed for DHCP to hand out an address
const DHCP_TIMEOUT: Duration = Duration::from_secs(30);

/// WiFi manager for station-mode association with DHCP through embassy-net
pub struct WiFiManager<'a> {
    controller: WifiController<'a>,
    stack: Stack<'a>,
    access_point: Option<String<32>>,
}

impl<'a> WiFiManager<'a> {
    /// Create a new WiFi manager instance
    pub fn new(controller: WifiController<'a>, stack: Stack<'a>) -> Self {
        Self {
            controller,
            stack,
            access_point: None,
        }
    }

    fn associate(&mut self, ssid: &str, password: &str) -> Result<(), BoardError> {
        info!("[WIFI] Connecting to WiFi network: {}", ssid);

        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let client_config = ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| BoardError::WiFiError)?,
            password: password.try_into().map_err(|_| BoardError::WiFiError)?,
            auth_method,
            ..Default::default()
        };

        self.controller
            .set_configuration(&esp_wifi::wifi::Configuration::Client(client_config))
            .map_err(|_| BoardError::WiFiError)?;

        self.controller.start().map_err(|_| BoardError::WiFiError)?;
        self.controller.connect().map_err(|_| BoardError::WiFiError)
    }

    /// Get current IP address from DHCP
    pub fn get_ip_address(&self) -> Option<[u8; 4]> {
        self.stack
            .config_v4()
            .map(|config| config.address.address().octets())
    }
}

impl NetworkLink for WiFiManager<'_> {
    async fn connect(&mut self) -> Result<(), BoardError> {
        self.associate(config::WIFI_SSID, config::WIFI_PASSWORD)?;

        // Wait for connection
        let mut attempts = 0;
        while !self.controller.is_connected().unwrap_or(false) {
            attempts += 1;
            if attempts >= CONNECT_ATTEMPTS {
                warn!(
                    "[WIFI] Failed to connect to WiFi network after {} attempts",
                    attempts
                );
                return Err(BoardError::WiFiError);
            }
            Timer::after(Duration::from_millis(100)).await;
        }

        info!("[WIFI] Associated, waiting for DHCP...");
        with_timeout(DHCP_TIMEOUT, self.stack.wait_config_up())
            .await
            .map_err(|_| BoardError::WiFiError)?;

        if let Some(ip) = self.get_ip_address() {
            info!(
                "[DHCP] IP address obtained: {}.{}.{}.{}",
                ip[0], ip[1], ip[2], ip[3]
            );
        }

        // esp-wifi does not expose the AP record; the configured SSID is what we joined
        let mut ssid = String::new();
        ssid.push_str(config::WIFI_SSID)
            .map_err(|_| BoardError::WiFiError)?;
        self.access_point = Some(ssid);

        Ok(())
    }

    fn access_point(&self) -> Option<&str> {
        if self.controller.is_connected().unwrap_or(false) {
            self.access_point.as_deref()
        } else {
            None
        }
    }
}
