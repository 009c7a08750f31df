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

//! Alarm schedule: form parsing and next-alarm calculation.

use crate::error::ValidationError;

/// Minutes in a day.
pub const MINUTES_PER_DAY: u32 = 1440;

/// Largest alarm count the peripheral accepts.
pub const MAX_ALARM_COUNT: u32 = 20;

/// Alarm program written to the peripheral.
///
/// Invariant: `start_minutes < 1440`, `frequency_minutes >= 1`,
/// `1 <= count <= 20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    start_minutes: u32,
    frequency_minutes: u32,
    count: u32,
}

impl ScheduleConfig {
    pub fn new(
        start_minutes: u32,
        frequency_minutes: u32,
        count: u32,
    ) -> Result<Self, ValidationError> {
        check_range("start time", start_minutes as u64, 0, MINUTES_PER_DAY as u64 - 1)?;
        check_range("frequency", frequency_minutes as u64, 1, u32::MAX as u64)?;
        check_range("count", count as u64, 1, MAX_ALARM_COUNT as u64)?;

        Ok(Self {
            start_minutes,
            frequency_minutes,
            count,
        })
    }

    pub fn start_minutes(&self) -> u32 {
        self.start_minutes
    }

    pub fn frequency_minutes(&self) -> u32 {
        self.frequency_minutes
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Next alarm after `now_minutes`, see [`next_alarm`].
    pub fn next_alarm(&self, now_minutes: u32) -> Option<u32> {
        next_alarm(
            self.start_minutes,
            self.frequency_minutes,
            self.count,
            now_minutes,
        )
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Earliest of the `count` alarms whose unwrapped time is later than
/// `now_minutes`, as minutes-of-day.
///
/// Returns `None` once every alarm of the day has elapsed; it does not
/// roll over to the first alarm of the next day.
pub fn next_alarm(start: u32, frequency: u32, count: u32, now_minutes: u32) -> Option<u32> {
    (0..count as u64)
        .map(|i| start as u64 + i * frequency as u64)
        .find(|&alarm| alarm > now_minutes as u64)
        .map(|alarm| (alarm % MINUTES_PER_DAY as u64) as u32)
}

/// Parse a wall-clock "HH:MM" into minutes since midnight.
pub fn parse_clock_time(value: &str) -> Result<u32, ValidationError> {
    let invalid = || ValidationError::InvalidTime(value.to_string());

    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    Ok(hours * 60 + minutes)
}

/// Format minutes-of-day as "HH:MM".
pub fn format_minutes(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Format seconds-since-midnight as "HH:MM:SS".
pub fn format_seconds(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Raw alarm form input as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmForm {
    pub start_time: String,
    pub frequency: String,
    pub count: String,
}

impl AlarmForm {
    pub fn new(
        start_time: impl Into<String>,
        frequency: impl Into<String>,
        count: impl Into<String>,
    ) -> Self {
        Self {
            start_time: start_time.into(),
            frequency: frequency.into(),
            count: count.into(),
        }
    }

    /// Validate every field and build the schedule.
    pub fn parse(&self) -> Result<ScheduleConfig, ValidationError> {
        let start_time = required("start time", &self.start_time)?;
        let frequency = required("frequency", &self.frequency)?;
        let count = required("count", &self.count)?;

        let start = parse_clock_time(start_time)?;
        let frequency = parse_number("frequency", frequency)?;
        let count = parse_number("count", count)?;

        ScheduleConfig::new(start, frequency, count)
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(value)
}

fn parse_number(field: &'static str, value: &str) -> Result<u32, ValidationError> {
    value.parse().map_err(|_| ValidationError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_future_alarm() {
        assert_eq!(next_alarm(360, 120, 5, 400), Some(480));
        assert_eq!(next_alarm(360, 120, 5, 450), Some(480));
        assert_eq!(next_alarm(360, 120, 5, 0), Some(360));
    }

    #[test]
    fn test_all_elapsed_is_unset() {
        assert_eq!(next_alarm(360, 120, 5, 900), None);
        // equal to now does not count as upcoming
        assert_eq!(next_alarm(360, 120, 5, 840), None);
    }

    #[test]
    fn test_wraps_past_midnight() {
        // 22:00, 02:00 (+1 day), 06:00 (+1 day)
        assert_eq!(next_alarm(1320, 240, 3, 1400), Some(120));
        // 3000 minutes is two days and 120 minutes in
        assert_eq!(next_alarm(0, 1000, 4, 2500), Some(120));
    }

    #[test]
    fn test_no_overflow_with_huge_frequency() {
        let expected = ((1439u64 + u32::MAX as u64) % 1440) as u32;
        assert_eq!(next_alarm(1439, u32::MAX, 20, 1439), Some(expected));
    }

    #[test]
    fn test_schedule_invariants() {
        assert!(ScheduleConfig::new(0, 1, 1).is_ok());
        assert!(ScheduleConfig::new(1439, 1, 20).is_ok());
        assert!(ScheduleConfig::new(1440, 1, 1).is_err());
        assert!(ScheduleConfig::new(0, 0, 1).is_err());
        assert!(ScheduleConfig::new(0, 1, 0).is_err());
        assert!(ScheduleConfig::new(0, 1, 21).is_err());
    }

    #[test]
    fn test_parse_clock_time() {
        assert_eq!(parse_clock_time("06:00").unwrap(), 360);
        assert_eq!(parse_clock_time("23:59").unwrap(), 1439);
        assert_eq!(parse_clock_time("7:30").unwrap(), 450);
        assert!(parse_clock_time("24:00").is_err());
        assert!(parse_clock_time("12:60").is_err());
        assert!(parse_clock_time("noon").is_err());
        assert!(parse_clock_time("12").is_err());
    }

    #[test]
    fn test_format() {
        assert_eq!(format_minutes(480), "08:00");
        assert_eq!(format_minutes(0), "00:00");
        assert_eq!(format_seconds(45_296), "12:34:56");
    }

    #[test]
    fn test_form_parse() {
        let config = AlarmForm::new("06:00", "120", "5").parse().unwrap();
        assert_eq!(config.start_minutes(), 360);
        assert_eq!(config.frequency_minutes(), 120);
        assert_eq!(config.count(), 5);
    }

    #[test]
    fn test_form_missing_field() {
        assert_eq!(
            AlarmForm::new("06:00", "", "5").parse(),
            Err(ValidationError::MissingField("frequency"))
        );
        assert_eq!(
            AlarmForm::new(" ", "120", "5").parse(),
            Err(ValidationError::MissingField("start time"))
        );
    }

    #[test]
    fn test_form_bad_values() {
        assert!(matches!(
            AlarmForm::new("06:00", "often", "5").parse(),
            Err(ValidationError::InvalidNumber { field: "frequency", .. })
        ));
        assert!(matches!(
            AlarmForm::new("06:00", "120", "25").parse(),
            Err(ValidationError::OutOfRange { field: "count", value: 25, .. })
        ));
        assert!(matches!(
            AlarmForm::new("06:00", "0", "5").parse(),
            Err(ValidationError::OutOfRange { field: "frequency", .. })
        ));
    }
}
