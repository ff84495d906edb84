//! Connectivity health loop
//!
//! Wakes every [`config::HEALTH_PERIOD_MS`] and plays the degraded pattern
//! while the network or the broker is unreachable. Never writes the state.

use crate::config;
use crate::connectivity::ConnectivityState;
use crate::indicator::Indicator;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::debug;

pub struct HealthLoop<'a, M, P, D>
where
    M: RawMutex,
{
    state: &'a ConnectivityState,
    indicator: &'a Indicator<M, P, D>,
}

impl<'a, M, P, D> HealthLoop<'a, M, P, D>
where
    M: RawMutex,
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(state: &'a ConnectivityState, indicator: &'a Indicator<M, P, D>) -> Self {
        Self { state, indicator }
    }

    /// One observation. Returns true if the degraded pattern was played.
    pub async fn tick(&self) -> bool {
        let connectivity = self.state.snapshot();
        if !connectivity.is_degraded() {
            return false;
        }

        debug!(
            "[HEALTH] Degraded: network={} broker={}",
            connectivity.network_reachable, connectivity.broker_reachable
        );
        self.indicator.blink(config::DEGRADED).await;
        true
    }

    /// Run forever, sleeping one health period between observations
    pub async fn run<T: DelayNs>(&self, timer: &mut T) -> ! {
        loop {
            self.tick().await;
            timer.delay_ms(config::HEALTH_PERIOD_MS).await;
        }
    }
}
