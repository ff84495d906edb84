#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal_async::delay::DelayNs;
use telescope_server::broker::{BrokerClient, QoS};
use telescope_server::connectivity::ConnectivityState;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Level(bool),
    Wait(u32),
}

pub type Trace = Arc<Mutex<Vec<Step>>>;

/// LED pin that records every level change
pub struct TracePin(pub Trace);

impl ErrorType for TracePin {
    type Error = Infallible;
}

impl OutputPin for TracePin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.lock().unwrap().push(Step::Level(false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.lock().unwrap().push(Step::Level(true));
        Ok(())
    }
}

/// Delay that records the requested time and gives other callers a chance to run
pub struct TraceDelay(pub Trace);

impl DelayNs for TraceDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.delay_ms(ns / 1_000_000).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.0.lock().unwrap().push(Step::Wait(ms));
        std::thread::yield_now();
        embassy_futures::yield_now().await;
    }
}

/// One blink sequence reconstructed from a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    pub cycles: u32,
    pub period_ms: u32,
}

/// Split a trace into blink sequences, each ending with `quiescent_ms`.
/// Panics if the steps of two sequences are interleaved.
pub fn sequences(trace: &[Step], quiescent_ms: u32) -> Vec<Sequence> {
    let mut out = Vec::new();
    let mut steps = trace.iter().copied().peekable();

    while let Some(first) = steps.next() {
        assert_eq!(first, Step::Level(false), "sequence must start by resetting the pin");

        let mut cycles = 0;
        let mut period_ms = None;
        loop {
            match steps.next() {
                Some(Step::Level(true)) => {
                    let on = steps.next();
                    let off = steps.next();
                    let rest = steps.next();
                    let (Some(Step::Wait(a)), Some(Step::Level(false)), Some(Step::Wait(b))) =
                        (on, off, rest)
                    else {
                        panic!("broken on/off cycle: {:?} {:?} {:?}", on, off, rest);
                    };
                    assert_eq!(a, b, "on and off time differ inside one cycle");
                    match period_ms {
                        None => period_ms = Some(a),
                        Some(p) => assert_eq!(p, a, "two patterns interleaved"),
                    }
                    cycles += 1;
                }
                Some(Step::Wait(q)) if q == quiescent_ms => break,
                other => panic!("unexpected step {:?}", other),
            }
        }

        out.push(Sequence {
            cycles,
            period_ms: period_ms.unwrap_or(0),
        });
    }

    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Subscribe(String, QoS),
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
}

/// Broker client that records every request. When given the connectivity
/// state it also samples `broker_reachable` at each subscribe.
#[derive(Default)]
pub struct RecordingBroker<'a> {
    pub calls: Vec<Call>,
    pub reachable_at_subscribe: Vec<bool>,
    pub state: Option<&'a ConnectivityState>,
}

impl<'a> RecordingBroker<'a> {
    pub fn observing(state: &'a ConnectivityState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    pub fn publishes(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Publish { .. }))
            .collect()
    }
}

impl BrokerClient for RecordingBroker<'_> {
    type Error = Infallible;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Infallible> {
        if let Some(state) = self.state {
            self.reachable_at_subscribe.push(state.broker_reachable());
        }
        self.calls.push(Call::Subscribe(topic.to_string(), qos));
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), Infallible> {
        self.calls.push(Call::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(())
    }
}
