//! Network bring-up sequence
//!
//! The link itself (association, DHCP) is provided by the platform; this module
//! only turns its result into connectivity state and LED feedback.

use crate::connectivity::ConnectivityState;
use crate::indicator::Indicator;
use crate::{BoardError, config};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use log::{info, warn};

/// Platform network link
#[allow(async_fn_in_trait)]
pub trait NetworkLink {
    /// Associate and wait until the link is usable
    async fn connect(&mut self) -> Result<(), BoardError>;

    /// SSID of the associated access point, if any
    fn access_point(&self) -> Option<&str>;
}

/// Connect the link and record the result. A connect failure is returned to
/// the caller as fatal.
pub async fn bring_up_network<L, M, P, D>(
    link: &mut L,
    state: &ConnectivityState,
    indicator: &Indicator<M, P, D>,
) -> Result<(), BoardError>
where
    L: NetworkLink,
    M: RawMutex,
    P: OutputPin,
    D: DelayNs,
{
    link.connect().await?;

    match link.access_point() {
        Some(ssid) => {
            info!("[WIFI] Connected to {}", ssid);
            state.set_network_reachable(true);
            indicator.blink(config::NETWORK_UP).await;
        }
        None => warn!("[WIFI] Link up but no access point information"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::tests::{count_cycles, traced_indicator};
    use embassy_futures::block_on;

    struct FakeLink {
        result: Result<(), BoardError>,
        ssid: Option<&'static str>,
        attempts: u32,
    }

    impl NetworkLink for FakeLink {
        async fn connect(&mut self) -> Result<(), BoardError> {
            self.attempts += 1;
            self.result
        }

        fn access_point(&self) -> Option<&str> {
            self.ssid
        }
    }

    #[test]
    fn associated_link_marks_network_reachable() {
        let state = ConnectivityState::new();
        let (indicator, trace) = traced_indicator(0);
        let mut link = FakeLink {
            result: Ok(()),
            ssid: Some("observatory"),
            attempts: 0,
        };

        assert_eq!(block_on(bring_up_network(&mut link, &state, &indicator)), Ok(()));
        assert!(state.network_reachable());
        assert!(!state.broker_reachable());
        assert_eq!(count_cycles(&trace.borrow()), 3);
    }

    #[test]
    fn missing_access_point_leaves_network_down() {
        let state = ConnectivityState::new();
        let (indicator, trace) = traced_indicator(0);
        let mut link = FakeLink {
            result: Ok(()),
            ssid: None,
            attempts: 0,
        };

        assert_eq!(block_on(bring_up_network(&mut link, &state, &indicator)), Ok(()));
        assert!(!state.network_reachable());
        assert!(trace.borrow().is_empty());
    }

    #[test]
    fn connect_failure_is_fatal_and_not_retried() {
        let state = ConnectivityState::new();
        let (indicator, _trace) = traced_indicator(0);
        let mut link = FakeLink {
            result: Err(BoardError::WiFiError),
            ssid: Some("observatory"),
            attempts: 0,
        };

        assert_eq!(
            block_on(bring_up_network(&mut link, &state, &indicator)),
            Err(BoardError::WiFiError)
        );
        assert_eq!(link.attempts, 1);
        assert!(!state.network_reachable());
    }
}
