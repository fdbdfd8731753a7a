//! Mock PowerDriver for unit testing
//!
//! Stores a power state per management address in memory and can be
//! configured to delay or fail specific addresses, so that orchestration
//! tests run without BMCs or agents. Every call is recorded.

use crate::driver::{PowerAction, PowerDriver};
use crate::error::PowerError;
use models::{ManagementEndpoint, PowerState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A call received by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Management address of the endpoint
    pub address: String,
    /// `None` for a status query, the action otherwise
    pub action: Option<PowerAction>,
}

#[derive(Default)]
struct MockState {
    power: HashMap<String, PowerState>,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, PowerError>,
    calls: Vec<MockCall>,
    in_flight: usize,
    peak_in_flight: usize,
}

/// Counts a call as in flight until dropped, including when the caller
/// times out and drops the call.
struct InFlight(Arc<Mutex<MockState>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.lock().in_flight -= 1;
    }
}

/// Mock driver for testing
///
/// Serves every endpoint variant, keyed by its address. Addresses without a
/// configured state report `Unknown`.
#[derive(Clone, Default)]
pub struct MockPowerDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockPowerDriver {
    /// Create a new mock driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the power state reported for an address (for test setup)
    pub fn set_power(&self, address: &str, power: PowerState) {
        self.state.lock().power.insert(address.to_string(), power);
    }

    /// Current power state of an address
    pub fn power(&self, address: &str) -> PowerState {
        self.state
            .lock()
            .power
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    /// Delay every call for an address
    pub fn set_delay(&self, address: &str, delay: Duration) {
        self.state.lock().delays.insert(address.to_string(), delay);
    }

    /// Make every call for an address fail with `error`
    pub fn fail_with(&self, address: &str, error: PowerError) {
        self.state.lock().failures.insert(address.to_string(), error);
    }

    /// Stop failing calls for an address
    pub fn clear_failure(&self, address: &str) {
        self.state.lock().failures.remove(address);
    }

    /// All calls received so far, in arrival order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Highest number of calls that were running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.state.lock().peak_in_flight
    }

    /// Actions (not status queries) received for an address
    pub fn actions_for(&self, address: &str) -> Vec<PowerAction> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.address == address)
            .filter_map(|c| c.action)
            .collect()
    }

    /// Records the call and applies the configured delay and failure.
    async fn begin(
        &self,
        endpoint: &ManagementEndpoint,
        action: Option<PowerAction>,
    ) -> Result<String, PowerError> {
        let address = endpoint.address().unwrap_or_default().to_string();
        let (delay, _in_flight) = {
            let mut state = self.state.lock();
            state.calls.push(MockCall {
                address: address.clone(),
                action,
            });
            state.in_flight += 1;
            state.peak_in_flight = state.peak_in_flight.max(state.in_flight);
            (
                state.delays.get(&address).copied(),
                InFlight(Arc::clone(&self.state)),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.state.lock().failures.get(&address).cloned();
        match failure {
            Some(error) => Err(error),
            None => Ok(address),
        }
    }
}

#[async_trait::async_trait]
impl PowerDriver for MockPowerDriver {
    async fn status(&self, endpoint: &ManagementEndpoint) -> Result<PowerState, PowerError> {
        let address = self.begin(endpoint, None).await?;
        Ok(self.power(&address))
    }

    async fn execute(
        &self,
        endpoint: &ManagementEndpoint,
        action: PowerAction,
    ) -> Result<(), PowerError> {
        let address = self.begin(endpoint, Some(action)).await?;
        self.set_power(&address, action.resulting_state());
        Ok(())
    }
}
