//! Status LED driver
//!
//! Wraps the LED pin behind a blocking "blink N times at period P" operation.
//! The pin and its delay source live inside an async mutex that is held for the
//! whole blink sequence, so the health loop and the message dispatcher never
//! interleave their on/off cycles.

use crate::config;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

/// Blink sequence: `repeat` on/off cycles, `period_ms` on and `period_ms` off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkPattern {
    pub repeat: u32,
    pub period_ms: u32,
}

impl BlinkPattern {
    pub const fn new(repeat: u32, period_ms: u32) -> Self {
        Self { repeat, period_ms }
    }
}

struct IndicatorDevice<P, D> {
    pin: P,
    delay: D,
}

/// LED indicator with exclusive access per blink sequence
pub struct Indicator<M, P, D>
where
    M: RawMutex,
{
    device: Mutex<M, IndicatorDevice<P, D>>,
    quiescent_ms: u32,
}

impl<M, P, D> Indicator<M, P, D>
where
    M: RawMutex,
    P: OutputPin,
    D: DelayNs,
{
    /// Create an indicator with the default trailing quiet time
    pub const fn new(pin: P, delay: D) -> Self {
        Self::with_quiescent(pin, delay, config::INDICATOR_QUIESCENT_MS)
    }

    /// Create an indicator holding `quiescent_ms` of quiet time after each sequence
    pub const fn with_quiescent(pin: P, delay: D, quiescent_ms: u32) -> Self {
        Self {
            device: Mutex::new(IndicatorDevice { pin, delay }),
            quiescent_ms,
        }
    }

    /// Drive `repeat_count` on/off cycles of `period_ms` each, then hold the
    /// quiet time. Waits until no other caller is using the LED.
    pub async fn signal(&self, repeat_count: u32, period_ms: u32) {
        let mut guard = self.device.lock().await;
        let device = &mut *guard;

        // Pin faults are not recoverable here; the GPIO driver is infallible on the board
        let _ = device.pin.set_low();

        for _ in 0..repeat_count {
            let _ = device.pin.set_high();
            device.delay.delay_ms(period_ms).await;
            let _ = device.pin.set_low();
            device.delay.delay_ms(period_ms).await;
        }

        device.delay.delay_ms(self.quiescent_ms).await;
    }

    /// Play a predefined pattern
    pub async fn blink(&self, pattern: BlinkPattern) {
        self.signal(pattern.repeat, pattern.period_ms).await;
    }
}
