// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Simulated time.
//!
//! `SimTime` is a monotonically non-decreasing count of nanoseconds since the
//! start of the simulation. Unlike `steam_engine::time::clock::Clock`, there
//! is a single global clock (owned by the master scheduler); components don't
//! register their own frequencies, they simply request a wakeup at an
//! absolute `SimTime`.

use std::fmt;
use std::ops::Add;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Nanoseconds of simulated time, monotonic across a run. Zero at simulation
/// start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    #[must_use]
    pub fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    #[must_use]
    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// The wall-clock duration to wait to advance from `self` to `until`,
    /// scaled by `simulation_speed` (simulated nanoseconds per wall
    /// nanosecond). Saturates at zero if `until <= self`.
    #[must_use]
    pub fn wall_delay(self, until: SimTime, simulation_speed: f64) -> Duration {
        let delta_ns = until.0.saturating_sub(self.0) as f64;
        if simulation_speed <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((delta_ns / simulation_speed) / 1_000_000_000.0)
    }
}

impl Add<u64> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: u64) -> SimTime {
        SimTime(self.0 + rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_delay_scales_by_speed() {
        let t0 = SimTime::ZERO;
        let t1 = SimTime::from_nanos(2_000);
        assert_eq!(t0.wall_delay(t1, 1.0), Duration::from_nanos(2_000));
        assert_eq!(t0.wall_delay(t1, 2.0), Duration::from_nanos(1_000));
    }

    #[test]
    fn wall_delay_saturates_at_zero() {
        let t0 = SimTime::from_nanos(5_000);
        let t1 = SimTime::from_nanos(1_000);
        assert_eq!(t0.wall_delay(t1, 1.0), Duration::ZERO);
    }
}
