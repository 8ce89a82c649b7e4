//! Link health watchdog.
//!
//! Tracks the arrival time of the last decoded batch and flips between
//! `Nominal` and `Stale` when the silence crosses the timeout. Each crossing
//! produces exactly one event; repeated checks in the same state are silent.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Nominal,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    /// Link went silent. `elapsed` is `None` when nothing ever arrived.
    Stale { elapsed: Option<Duration> },
    Recovered { elapsed: Duration },
}

#[derive(Debug)]
pub struct LinkHealthMonitor {
    timeout: Duration,
    last_arrival: Option<Instant>,
    state: HealthState,
}

impl LinkHealthMonitor {
    pub fn new(timeout: Duration) -> Self {
        LinkHealthMonitor {
            timeout,
            last_arrival: None,
            state: HealthState::Nominal,
        }
    }

    pub fn record_arrival(&mut self, now: Instant) {
        self.last_arrival = Some(now);
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Evaluate the link at `now`. Returns an event only on a state change.
    pub fn check(&mut self, now: Instant) -> Option<HealthEvent> {
        let elapsed = self.last_arrival.map(|t| now.saturating_duration_since(t));
        let silent = match elapsed {
            None => true,
            Some(e) => e > self.timeout,
        };

        match (self.state, silent) {
            (HealthState::Nominal, true) => {
                self.state = HealthState::Stale;
                match elapsed {
                    None => warn!("[Link] No data received from sensor node yet."),
                    Some(e) => warn!(
                        "[Link] No data for {:.2}s (timeout {:.2}s). Check Wi-Fi, firewall, or node power.",
                        e.as_secs_f64(), self.timeout.as_secs_f64()
                    ),
                }
                Some(HealthEvent::Stale { elapsed })
            }
            (HealthState::Stale, false) => {
                self.state = HealthState::Nominal;
                // silent == false implies an arrival exists
                let e = elapsed.unwrap_or_default();
                info!("[Link] Data flowing again ({:.2}s since last packet).", e.as_secs_f64());
                Some(HealthEvent::Recovered { elapsed: e })
            }
            _ => None,
        }
    }
}
