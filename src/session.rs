//! Broker session driver
//!
//! One reader owns the connection. Replies are written without waiting for
//! their acknowledgement; PUBACK, SUBACK and PINGRESP are picked up by the
//! same loop that delivers application messages, so an inbound message is
//! never consumed while a publish waits for its ack.
//!
//! Keep-alive is measured on outbound traffic: a PINGREQ goes out whenever
//! nothing has been sent for half the negotiated interval, whatever arrives.

use crate::broker::{BrokerClient, BrokerEvent, QoS};
use crate::dispatcher::MessageDispatcher;
use crate::topics::{MAX_NODE_NAME_LEN, MAX_TOPIC_LEN};
use crate::BoardError;
use core::fmt::{Debug, Write};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::{debug, info, trace, warn};

/// MQTT packet buffer size; larger inbound messages are dropped
pub const BUFFER_SIZE: usize = 512;

/// Unacknowledged QoS 1 publishes remembered by the session
pub const MAX_IN_FLIGHT: usize = 8;

/// Idle wait between two empty polls of the connection
pub const POLL_INTERVAL_MS: u32 = 20;

const CLIENT_ID_PREFIX: &str = "telescope-";

/// MQTT client identifier, `telescope-<NAME>`
pub type ClientId = heapless::String<{ CLIENT_ID_PREFIX.len() + MAX_NODE_NAME_LEN }>;

/// Client identifier announced in CONNECT
pub fn client_id(node_name: &str) -> Result<ClientId, BoardError> {
    let mut id = ClientId::new();
    write!(id, "{}{}", CLIENT_ID_PREFIX, node_name).map_err(|_| BoardError::ConfigError)?;
    Ok(id)
}

/// Complete packet read from the broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    Message { topic: &'a str, payload: &'a [u8] },
    /// `delivered` is false when the broker had no matching subscribers
    Puback { id: u16, delivered: bool },
    Suback { id: u16 },
    Pingresp,
    /// A fully read packet carrying a failure reason code; the stream is intact
    Refused { code: u8 },
    /// Broker sent DISCONNECT
    Disconnect,
    /// Anything else the session has no use for
    Other,
}

/// Packet-level access to an established MQTT connection
#[allow(async_fn_in_trait)]
pub trait PacketLink {
    type Error: Debug;

    /// Write a PUBLISH, returning its packet identifier
    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<u16, Self::Error>;

    /// Write a SUBSCRIBE for one topic, returning its packet identifier
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, Self::Error>;

    /// Write a PINGREQ
    async fn ping(&mut self) -> Result<(), Self::Error>;

    /// Read the next packet if data is waiting. Once a packet has started
    /// arriving it is read to the end.
    async fn poll_ready(&mut self) -> Result<Option<Packet<'_>>, Self::Error>;
}

/// Monotonic milliseconds
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Outbound keep-alive bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    interval_ms: u64,
    last_sent_ms: u64,
    ping_sent_ms: Option<u64>,
}

impl KeepAlive {
    /// `now_ms` is when CONNECT was written
    pub const fn new(keep_alive_secs: u16, now_ms: u64) -> Self {
        Self {
            interval_ms: keep_alive_secs as u64 * 1000,
            last_sent_ms: now_ms,
            ping_sent_ms: None,
        }
    }

    pub fn record_send(&mut self, now_ms: u64) {
        self.last_sent_ms = self.last_sent_ms.max(now_ms);
    }

    /// Nothing sent for half the interval and no ping already outstanding
    pub fn ping_due(&self, now_ms: u64) -> bool {
        self.ping_sent_ms.is_none()
            && now_ms.saturating_sub(self.last_sent_ms) >= self.interval_ms / 2
    }

    pub fn record_ping(&mut self, now_ms: u64) {
        self.record_send(now_ms);
        self.ping_sent_ms = Some(now_ms);
    }

    pub fn record_pingresp(&mut self) {
        self.ping_sent_ms = None;
    }

    /// The outstanding ping went unanswered for a whole interval
    pub fn expired(&self, now_ms: u64) -> bool {
        self.ping_sent_ms
            .is_some_and(|sent| now_ms.saturating_sub(sent) >= self.interval_ms)
    }
}

/// Broker session over a [`PacketLink`]
pub struct Session<L, C> {
    link: L,
    clock: C,
    keep_alive: KeepAlive,
    in_flight: heapless::Vec<u16, MAX_IN_FLIGHT>,
}

impl<L: PacketLink, C: Clock> Session<L, C> {
    /// Wrap a link whose CONNECT has just been acknowledged
    pub fn new(link: L, clock: C, keep_alive_secs: u16) -> Self {
        let keep_alive = KeepAlive::new(keep_alive_secs, clock.now_ms());
        Self {
            link,
            clock,
            keep_alive,
            in_flight: heapless::Vec::new(),
        }
    }

    /// Packet identifiers of publishes still waiting for PUBACK
    pub fn in_flight(&self) -> &[u16] {
        &self.in_flight
    }

    pub fn keep_alive(&self) -> &KeepAlive {
        &self.keep_alive
    }

    /// Deliver `Connected`, then read and dispatch until the connection
    /// fails. Returns the reason the session ended.
    pub async fn serve<M, P, D, T>(
        &mut self,
        dispatcher: &MessageDispatcher<'_, M, P, D>,
        idle: &mut T,
    ) -> BoardError
    where
        M: RawMutex,
        P: OutputPin,
        D: DelayNs,
        T: DelayNs,
    {
        dispatcher.handle_event(self, BrokerEvent::Connected).await;

        let mut topic: heapless::String<MAX_TOPIC_LEN> = heapless::String::new();
        let mut payload: heapless::Vec<u8, BUFFER_SIZE> = heapless::Vec::new();

        loop {
            let now = self.clock.now_ms();
            if self.keep_alive.expired(now) {
                warn!("[MQTT] No PINGRESP within keep-alive");
                return BoardError::BrokerError;
            }
            if self.keep_alive.ping_due(now) {
                if let Err(e) = self.link.ping().await {
                    warn!("[MQTT] Keep-alive failed: {:?}", e);
                    return BoardError::BrokerError;
                }
                trace!("[MQTT] PINGREQ sent");
                self.keep_alive.record_ping(now);
            }

            topic.clear();
            payload.clear();

            let packet = match self.link.poll_ready().await {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    idle.delay_ms(POLL_INTERVAL_MS).await;
                    continue;
                }
                Err(e) => {
                    warn!("[MQTT] Receive failed: {:?}", e);
                    return BoardError::BrokerError;
                }
            };

            match packet {
                Packet::Message { topic: t, payload: p } => {
                    if topic.push_str(t).is_err() || payload.extend_from_slice(p).is_err() {
                        warn!("[MQTT] Dropping oversized message ({} bytes)", p.len());
                        continue;
                    }
                }
                Packet::Puback { id, delivered } => {
                    self.settle(id, delivered);
                    continue;
                }
                Packet::Suback { id } => {
                    debug!("[MQTT] Subscription #{} granted", id);
                    continue;
                }
                Packet::Pingresp => {
                    trace!("[MQTT] PINGRESP");
                    self.keep_alive.record_pingresp();
                    continue;
                }
                Packet::Refused { code } => {
                    warn!("[MQTT] Broker refused a request: 0x{:02X}", code);
                    continue;
                }
                Packet::Disconnect => {
                    warn!("[MQTT] Broker closed the session");
                    return BoardError::BrokerError;
                }
                Packet::Other => continue,
            }

            let outcome = dispatcher
                .handle_event(
                    self,
                    BrokerEvent::Data {
                        topic: Some(topic.as_str()),
                        payload: &payload,
                    },
                )
                .await;
            trace!("[MQTT] {:?}", outcome);
        }
    }

    fn track(&mut self, id: u16) {
        if self.in_flight.is_full() {
            let dropped = self.in_flight.remove(0);
            warn!("[MQTT] Giving up on PUBACK for #{}", dropped);
        }
        let _ = self.in_flight.push(id);
    }

    fn settle(&mut self, id: u16, delivered: bool) {
        match self.in_flight.iter().position(|pending| *pending == id) {
            Some(index) => {
                self.in_flight.remove(index);
                if delivered {
                    trace!("[MQTT] PUBACK #{}", id);
                } else {
                    debug!("[MQTT] PUBACK #{}: no matching subscribers", id);
                }
            }
            None => trace!("[MQTT] PUBACK for unknown #{}", id),
        }
    }
}

impl<L: PacketLink, C: Clock> BrokerClient for Session<L, C> {
    type Error = L::Error;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), L::Error> {
        let id = self.link.subscribe(topic, qos).await?;
        self.keep_alive.record_send(self.clock.now_ms());
        info!("[MQTT] SUBSCRIBE {} sent as #{}", topic, id);
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), L::Error> {
        let id = self.link.publish(topic, payload, qos, retain).await?;
        self.keep_alive.record_send(self.clock.now_ms());
        if qos != QoS::AtMostOnce {
            self.track(id);
        }
        Ok(())
    }
}
