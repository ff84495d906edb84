//! MQTT transport over embassy-net TCP
//!
//! Adapts rust-mqtt's raw client to [`PacketLink`] and runs the reconnect
//! loop. Reading, acknowledgements and keep-alive live in [`crate::session`].

use crate::broker::{BrokerClient, BrokerEvent, QoS};
use crate::dispatcher::MessageDispatcher;
use crate::session::{self, BUFFER_SIZE, Clock, Packet, PacketLink, Session};
use crate::{BoardError, config};
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpEndpoint, Ipv4Address, Stack};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Delay, Duration, Instant, Timer, with_timeout};
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::{info, warn};
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::client::raw_client::{Event, RawMqttClient};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;

/// Keep-alive negotiated with the broker
const KEEP_ALIVE_SECS: u16 = 60;

/// Time allowed for CONNACK after CONNECT
const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_PROPERTIES: usize = 5;

/// Topics per SUBSCRIBE; the session subscribes one at a time
const MAX_TOPICS: usize = 1;

impl From<QoS> for QualityOfService {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => QualityOfService::QoS0,
            QoS::AtLeastOnce => QualityOfService::QoS1,
            QoS::ExactlyOnce => QualityOfService::QoS2,
        }
    }
}

/// Broker address parsed from the build configuration
pub fn broker_endpoint() -> Result<IpEndpoint, BoardError> {
    let address: Ipv4Address = config::MQTT_BROKER_HOST
        .parse()
        .map_err(|_| BoardError::ConfigError)?;
    let port: u16 = config::MQTT_BROKER_PORT
        .parse()
        .map_err(|_| BoardError::ConfigError)?;
    Ok(IpEndpoint::new(address.into(), port))
}

/// embassy-time as the session clock
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

/// Raw rust-mqtt client over one TCP connection
pub struct MqttLink<'a> {
    client: RawMqttClient<'a, TcpSocket<'a>, MAX_PROPERTIES, CountingRng>,
}

impl PacketLink for MqttLink<'_> {
    type Error = ReasonCode;

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<u16, ReasonCode> {
        self.client
            .send_message(topic, payload, qos.into(), retain)
            .await
    }

    async fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<u16, ReasonCode> {
        // Subscription QoS is negotiated once in the client config.
        // The topic list type belongs to rust-mqtt's own heapless version.
        let topics = core::iter::once(topic).collect();
        self.client.subscribe_to_topics::<MAX_TOPICS>(&topics).await
    }

    async fn ping(&mut self) -> Result<(), ReasonCode> {
        self.client.send_ping().await
    }

    async fn poll_ready(&mut self) -> Result<Option<Packet<'_>>, ReasonCode> {
        let event = match self.client.poll_if_ready::<MAX_TOPICS>().await {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(None),
            // The packet could not be read or decoded; the stream is unusable
            Err(
                code @ (ReasonCode::NetworkError
                | ReasonCode::BuffError
                | ReasonCode::ProtocolError),
            ) => return Err(code),
            Err(code) => return Ok(Some(Packet::Refused { code: code.into() })),
        };

        Ok(Some(match event {
            Event::Message(topic, payload) => Packet::Message { topic, payload },
            Event::Puback(id, delivered) => Packet::Puback { id, delivered },
            Event::Suback(id) => Packet::Suback { id },
            Event::Pingresp => Packet::Pingresp,
            Event::Disconnect(code) => {
                warn!("[MQTT] DISCONNECT from broker: {:?}", code);
                Packet::Disconnect
            }
            Event::Connack | Event::Unsuback(_) => Packet::Other,
        }))
    }
}

/// Run broker sessions forever
pub async fn run_sessions<M, P, D>(
    stack: Stack<'_>,
    endpoint: IpEndpoint,
    dispatcher: &MessageDispatcher<'_, M, P, D>,
    node_name: &str,
) -> !
where
    M: RawMutex,
    P: OutputPin,
    D: DelayNs,
{
    let client_id = match session::client_id(node_name) {
        Ok(id) => id,
        Err(e) => panic!("Client id for {:?} rejected: {}", node_name, e),
    };

    loop {
        let reason = connect_and_serve(stack, endpoint, dispatcher, &client_id).await;
        warn!("[MQTT] Session ended: {}", reason);
        dispatcher.handle_event(&mut Offline, BrokerEvent::Error).await;

        Timer::after(Duration::from_millis(config::MQTT_RECONNECT_INTERVAL_MS)).await;
    }
}

async fn connect_and_serve<M, P, D>(
    stack: Stack<'_>,
    endpoint: IpEndpoint,
    dispatcher: &MessageDispatcher<'_, M, P, D>,
    client_id: &str,
) -> BoardError
where
    M: RawMutex,
    P: OutputPin,
    D: DelayNs,
{
    let mut rx_buffer = [0u8; 1024];
    let mut tx_buffer = [0u8; 1024];
    let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
    socket.set_timeout(Some(Duration::from_secs(KEEP_ALIVE_SECS as u64 * 2)));

    info!("[MQTT] Opening TCP connection to {}", endpoint);
    if let Err(e) = socket.connect(endpoint).await {
        warn!("[MQTT] TCP connect failed: {:?}", e);
        return BoardError::BrokerError;
    }

    let mut client_config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(20000));
    client_config.add_max_subscribe_qos(config::MQTT_QOS.into());
    client_config.add_client_id(client_id);
    if !config::MQTT_USERNAME.is_empty() {
        client_config.add_username(config::MQTT_USERNAME);
        client_config.add_password(config::MQTT_PASSWORD);
    }
    client_config.max_packet_size = BUFFER_SIZE as u32;
    client_config.keep_alive = KEEP_ALIVE_SECS;

    let mut write_buffer = [0u8; BUFFER_SIZE];
    let mut recv_buffer = [0u8; BUFFER_SIZE];
    let mut client = RawMqttClient::<_, MAX_PROPERTIES, _>::new(
        socket,
        &mut write_buffer,
        BUFFER_SIZE,
        &mut recv_buffer,
        BUFFER_SIZE,
        client_config,
    );

    if let Err(code) = client.connect_to_broker().await {
        warn!("[MQTT] CONNECT failed: {:?}", code);
        return BoardError::BrokerError;
    }
    // Nothing else can arrive before CONNACK, so a blocking read is safe here
    match with_timeout(CONNACK_TIMEOUT, client.poll::<MAX_TOPICS>()).await {
        Ok(Ok(Event::Connack)) => {}
        Ok(Ok(_)) => {
            warn!("[MQTT] Expected CONNACK");
            return BoardError::BrokerError;
        }
        Ok(Err(code)) => {
            warn!("[MQTT] CONNECT refused: {:?}", code);
            return BoardError::BrokerError;
        }
        Err(_) => {
            warn!("[MQTT] No CONNACK within {} s", CONNACK_TIMEOUT.as_secs());
            return BoardError::BrokerError;
        }
    }

    let mut session = Session::new(MqttLink { client }, EmbassyClock, KEEP_ALIVE_SECS);
    session.serve(dispatcher, &mut Delay).await
}

/// Stand-in client for events raised before a session exists
struct Offline;

impl BrokerClient for Offline {
    type Error = BoardError;

    async fn subscribe(&mut self, _topic: &str, _qos: QoS) -> Result<(), BoardError> {
        Err(BoardError::BrokerError)
    }

    async fn publish(
        &mut self,
        _topic: &str,
        _payload: &[u8],
        _qos: QoS,
        _retain: bool,
    ) -> Result<(), BoardError> {
        Err(BoardError::BrokerError)
    }
}
