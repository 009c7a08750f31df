// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Clock drift detection and peripheral clock synchronization.

use chrono::{Local, Timelike};
use std::time::Duration;
use tracing::debug;

use crate::bluetooth::{codec, with_timeout, PeripheralLink, PillboxCharacteristic};
use crate::error::Result;

/// Seconds in a day.
pub const SECONDS_PER_DAY: u32 = 86_400;

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn seconds_since_midnight(&self) -> u32;

    fn minutes_since_midnight(&self) -> u32 {
        self.seconds_since_midnight() / 60
    }
}

/// The system clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn seconds_since_midnight(&self) -> u32 {
        Local::now().num_seconds_from_midnight()
    }
}

/// Decides when the peripheral clock has drifted far enough to rewrite it.
///
/// A drift at or below `min_drift` is BLE round-trip jitter. A drift at or
/// above `max_drift` means one side has already rolled past midnight and is
/// treated as in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSyncPolicy {
    pub min_drift: u32,
    pub max_drift: u32,
}

impl Default for TimeSyncPolicy {
    fn default() -> Self {
        Self {
            min_drift: 10,
            max_drift: 86_390,
        }
    }
}

impl TimeSyncPolicy {
    pub fn new(min_drift: u32, max_drift: u32) -> Self {
        Self {
            min_drift,
            max_drift,
        }
    }

    pub fn should_resync(&self, local_seconds: u32, device_seconds: u32) -> bool {
        let diff = local_seconds.abs_diff(device_seconds);
        self.min_drift < diff && diff < self.max_drift
    }
}

/// [`TimeSyncPolicy::should_resync`] with the default thresholds.
pub fn should_resync(local_seconds: u32, device_seconds: u32) -> bool {
    TimeSyncPolicy::default().should_resync(local_seconds, device_seconds)
}

/// Write the local seconds-since-midnight to the peripheral clock.
///
/// Returns the value written.
pub async fn resync<L>(link: &L, clock: &dyn Clock, deadline: Duration) -> Result<u32>
where
    L: PeripheralLink + ?Sized,
{
    let seconds = clock.seconds_since_midnight();
    let value = codec::encode_field(PillboxCharacteristic::CurrentTime, seconds as i64)?;
    with_timeout(
        "time sync",
        deadline,
        link.write(PillboxCharacteristic::CurrentTime, &value),
    )
    .await?;
    debug!("Peripheral clock set to {}s", seconds);
    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_sync() {
        assert!(!should_resync(100, 100));
        assert!(!should_resync(100, 95));
        assert!(!should_resync(100, 110));
    }

    #[test]
    fn test_drifted() {
        assert!(should_resync(100, 85));
        assert!(should_resync(100, 111));
        assert!(should_resync(50_000, 10_000));
    }

    #[test]
    fn test_midnight_band() {
        assert!(!should_resync(0, 86_395));
        assert!(!should_resync(86_395, 0));
        assert!(!should_resync(0, 86_390));
        assert!(should_resync(0, 86_389));
    }

    #[test]
    fn test_custom_policy() {
        let policy = TimeSyncPolicy::new(2, 100);
        assert!(policy.should_resync(10, 13));
        assert!(!policy.should_resync(10, 12));
        assert!(!policy.should_resync(0, 100));
    }

    #[test]
    fn test_local_clock_is_within_day() {
        let clock = LocalClock;
        assert!(clock.seconds_since_midnight() < SECONDS_PER_DAY);
        assert!(clock.minutes_since_midnight() < 1440);
    }
}
