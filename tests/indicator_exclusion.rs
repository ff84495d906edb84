mod common;

use common::{RecordingBroker, Sequence, Trace, TraceDelay, TracePin, init_logging, sequences};
use embassy_futures::block_on;
use embassy_futures::join::{join, join3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use telescope_server::broker::BrokerEvent;
use telescope_server::config;
use telescope_server::connectivity::ConnectivityState;
use telescope_server::dispatcher::{DispatchOutcome, MessageDispatcher};
use telescope_server::health::HealthLoop;
use telescope_server::indicator::Indicator;
use telescope_server::protocol::{PAYLOAD_SIZE, encode_ping};
use telescope_server::topics::Topics;

const QUIESCENT_MS: u32 = 7;

type TestLed = Indicator<CriticalSectionRawMutex, TracePin, TraceDelay>;

fn led() -> (TestLed, Trace) {
    let trace = Trace::default();
    let indicator =
        Indicator::with_quiescent(TracePin(trace.clone()), TraceDelay(trace.clone()), QUIESCENT_MS);
    (indicator, trace)
}

fn sorted(mut seqs: Vec<Sequence>) -> Vec<Sequence> {
    seqs.sort_by_key(|s| (s.period_ms, s.cycles));
    seqs
}

#[test]
fn concurrent_requests_on_one_executor_do_not_interleave() {
    init_logging();
    let (indicator, trace) = led();

    block_on(join(indicator.signal(3, 10), indicator.signal(2, 20)));

    let seqs = sequences(&trace.lock().unwrap(), QUIESCENT_MS);
    assert_eq!(
        sorted(seqs),
        [
            Sequence { cycles: 3, period_ms: 10 },
            Sequence { cycles: 2, period_ms: 20 },
        ]
    );
}

#[test]
fn zero_repeat_request_only_holds_quiet_time() {
    let (indicator, trace) = led();

    block_on(join(indicator.signal(0, 10), indicator.signal(1, 20)));

    let seqs = sequences(&trace.lock().unwrap(), QUIESCENT_MS);
    assert_eq!(
        sorted(seqs),
        [
            Sequence { cycles: 0, period_ms: 0 },
            Sequence { cycles: 1, period_ms: 20 },
        ]
    );
}

#[test]
fn requests_from_separate_threads_do_not_interleave() {
    init_logging();
    let (indicator, trace) = led();
    const ROUNDS: usize = 20;

    std::thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..ROUNDS {
                block_on(indicator.signal(4, 11));
            }
        });
        s.spawn(|| {
            for _ in 0..ROUNDS {
                block_on(indicator.signal(2, 13));
            }
        });
    });

    let seqs = sequences(&trace.lock().unwrap(), QUIESCENT_MS);
    assert_eq!(seqs.len(), 2 * ROUNDS);
    assert_eq!(
        seqs.iter().filter(|s| **s == Sequence { cycles: 4, period_ms: 11 }).count(),
        ROUNDS
    );
    assert_eq!(
        seqs.iter().filter(|s| **s == Sequence { cycles: 2, period_ms: 13 }).count(),
        ROUNDS
    );
}

#[test]
fn health_alert_and_ping_ack_share_the_led() {
    init_logging();
    let topics = Topics::new("BRAVO").unwrap();
    let state = ConnectivityState::new();
    let (indicator, trace) = led();
    let dispatcher = MessageDispatcher::new("10.0.0.2", &topics, &state, &indicator);
    let health = HealthLoop::new(&state, &indicator);
    let mut broker = RecordingBroker::default();
    let packet = encode_ping(1, 2, &[0u8; PAYLOAD_SIZE]);

    // Both flags are down, so the health tick raises the degraded pattern
    let (alerted, outcome, _) = block_on(join3(
        health.tick(),
        dispatcher.handle_event(
            &mut broker,
            BrokerEvent::Data {
                topic: Some("servers/ALL/command"),
                payload: &packet,
            },
        ),
        indicator.blink(config::LEGACY_PING_ACK),
    ));

    assert!(alerted);
    assert_eq!(outcome, DispatchOutcome::BinaryPingAnswered { sequence_id: 1 });

    let seqs = sorted(sequences(&trace.lock().unwrap(), QUIESCENT_MS));
    let mut expected = vec![
        Sequence {
            cycles: config::DEGRADED.repeat,
            period_ms: config::DEGRADED.period_ms,
        },
        Sequence {
            cycles: config::BINARY_PING_ACK.repeat,
            period_ms: config::BINARY_PING_ACK.period_ms,
        },
        Sequence {
            cycles: config::LEGACY_PING_ACK.repeat,
            period_ms: config::LEGACY_PING_ACK.period_ms,
        },
    ];
    expected.sort_by_key(|s| (s.period_ms, s.cycles));
    assert_eq!(seqs, expected);
}
