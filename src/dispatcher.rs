//! Broker event dispatcher
//!
//! Single entry point for every event the broker transport delivers. Connect
//! and error events update [`ConnectivityState`]; data events are decoded and
//! answered on the node's response topic. The dispatcher makes no assumption
//! about which task delivers an event.

use crate::broker::{BrokerClient, BrokerEvent};
use crate::config;
use crate::connectivity::ConnectivityState;
use crate::indicator::Indicator;
use crate::protocol::{self, Inbound, PacketKind};
use crate::topics::Topics;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::{info, trace, warn};

/// What handling one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Connect handled; `accepted` subscription requests were sent
    Subscribed { accepted: usize },
    /// Binary ping echo written to the broker
    BinaryPingAnswered { sequence_id: u32 },
    /// Legacy text ping answered
    LegacyPingAnswered,
    /// A ping was recognized but the reply could not be published
    ReplyFailed,
    /// Body was not a ping; nothing sent
    Ignored,
    /// Error event recorded
    BrokerDown,
}

/// Protocol state machine invoked on every broker event
pub struct MessageDispatcher<'a, M, P, D>
where
    M: RawMutex,
{
    broker: &'a str,
    topics: &'a Topics,
    state: &'a ConnectivityState,
    indicator: &'a Indicator<M, P, D>,
}

impl<'a, M, P, D> MessageDispatcher<'a, M, P, D>
where
    M: RawMutex,
    P: OutputPin,
    D: DelayNs,
{
    /// `broker` is only used to label log records
    pub fn new(
        broker: &'a str,
        topics: &'a Topics,
        state: &'a ConnectivityState,
        indicator: &'a Indicator<M, P, D>,
    ) -> Self {
        Self {
            broker,
            topics,
            state,
            indicator,
        }
    }

    /// Handle one broker event
    pub async fn handle_event<B: BrokerClient>(
        &self,
        client: &mut B,
        event: BrokerEvent<'_>,
    ) -> DispatchOutcome {
        match event {
            BrokerEvent::Connected => self.on_connected(client).await,
            BrokerEvent::Data { topic, payload } => self.on_data(client, topic, payload).await,
            BrokerEvent::Error => self.on_error(),
        }
    }

    async fn on_connected<B: BrokerClient>(&self, client: &mut B) -> DispatchOutcome {
        self.state.set_broker_reachable(true);
        info!("[MQTT] Connected to broker {}", self.broker);

        self.indicator.blink(config::BROKER_CONNECTED).await;

        // Recovery from a failed subscribe is left to the transport's reconnect
        let mut accepted = 0;
        for topic in self.topics.subscriptions() {
            match client.subscribe(topic, config::MQTT_QOS).await {
                Ok(()) => {
                    info!("[MQTT] Subscribed to {} on {}", topic, self.broker);
                    accepted += 1;
                }
                Err(e) => warn!("[MQTT] Subscribe to {} failed: {:?}", topic, e),
            }
        }

        DispatchOutcome::Subscribed { accepted }
    }

    fn on_error(&self) -> DispatchOutcome {
        info!("[MQTT] Error occurred");
        self.state.set_broker_reachable(false);
        DispatchOutcome::BrokerDown
    }

    async fn on_data<B: BrokerClient>(
        &self,
        client: &mut B,
        topic: Option<&str>,
        payload: &[u8],
    ) -> DispatchOutcome {
        match protocol::classify(payload) {
            Inbound::Binary(packet) if packet.kind == PacketKind::Ping => {
                info!("[MQTT] Received ping packet {}", packet.sequence_id);
                self.indicator.blink(config::BINARY_PING_ACK).await;

                // Echo the original buffer untouched
                if self.reply(client, payload).await {
                    DispatchOutcome::BinaryPingAnswered {
                        sequence_id: packet.sequence_id,
                    }
                } else {
                    DispatchOutcome::ReplyFailed
                }
            }
            Inbound::Binary(packet) => {
                trace!(
                    "[MQTT] Ignoring packet kind {:?} on {:?}",
                    packet.kind, topic
                );
                DispatchOutcome::Ignored
            }
            Inbound::LegacyPing => {
                info!("[MQTT] Received ping from base");
                self.indicator.blink(config::LEGACY_PING_ACK).await;

                let reply = protocol::legacy_ping_reply(self.topics.node_name());
                if self.reply(client, reply.as_bytes()).await {
                    DispatchOutcome::LegacyPingAnswered
                } else {
                    DispatchOutcome::ReplyFailed
                }
            }
            Inbound::Unrecognized => {
                trace!(
                    "[MQTT] Ignoring {} byte message on {:?}",
                    payload.len(),
                    topic
                );
                DispatchOutcome::Ignored
            }
        }
    }

    async fn reply<B: BrokerClient>(&self, client: &mut B, payload: &[u8]) -> bool {
        let topic = self.topics.response();
        match client.publish(topic, payload, config::MQTT_QOS, false).await {
            Ok(()) => true,
            Err(e) => {
                warn!("[MQTT] Publish to {} failed: {:?}", topic, e);
                false
            }
        }
    }
}
