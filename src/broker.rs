//! Broker client abstraction
//!
//! The dispatcher talks to the broker only through [`BrokerClient`], so the
//! protocol logic is independent of the MQTT crate and transport in use.

use core::fmt::Debug;

/// MQTT delivery guarantee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    /// QoS 0
    AtMostOnce,
    /// QoS 1
    AtLeastOnce,
    /// QoS 2
    ExactlyOnce,
}

/// Connection lifecycle and data events delivered by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerEvent<'a> {
    /// Session established
    Connected,
    /// Message received on a subscribed topic
    Data {
        topic: Option<&'a str>,
        payload: &'a [u8],
    },
    /// Session failed or was lost
    Error,
}

/// Subscribe/publish operations needed by the node
#[allow(async_fn_in_trait)]
pub trait BrokerClient {
    type Error: Debug;

    /// Subscribe to `topic`. Fire-and-forget from the caller's point of view.
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error>;

    /// Publish `payload` to `topic`
    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), Self::Error>;
}
