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

//! Observable device state.

use std::fmt;

use crate::schedule::{format_minutes, format_seconds, ScheduleConfig};

/// Process-local device identifier.
pub type DeviceId = u64;

/// Connection status of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alarm status reported by the peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AlarmStatus {
    #[default]
    NoAlarm,
    Armed,
    Triggered,
    Dismissed,
    /// Peripheral-defined value this app does not know about.
    Other(String),
}

impl AlarmStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "no_alarm" => AlarmStatus::NoAlarm,
            "armed" => AlarmStatus::Armed,
            "triggered" => AlarmStatus::Triggered,
            "dismissed" => AlarmStatus::Dismissed,
            other => AlarmStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AlarmStatus::NoAlarm => "no_alarm",
            AlarmStatus::Armed => "armed",
            AlarmStatus::Triggered => "triggered",
            AlarmStatus::Dismissed => "dismissed",
            AlarmStatus::Other(value) => value,
        }
    }
}

impl fmt::Display for AlarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of a session for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: DeviceId,
    pub display_name: String,
    pub connection: ConnectionState,
    pub alarm_status: AlarmStatus,
    pub schedule: Option<ScheduleConfig>,
    pub next_alarm: Option<u32>,
    pub device_time: Option<u32>,
}

impl SessionSnapshot {
    pub fn next_alarm_text(&self) -> String {
        self.next_alarm
            .map(format_minutes)
            .unwrap_or_else(|| "Not set".to_string())
    }

    pub fn device_time_text(&self) -> String {
        self.device_time
            .map(format_seconds)
            .unwrap_or_else(|| "--:--:--".to_string())
    }

    /// One-line summary of the alarm program.
    pub fn config_text(&self) -> String {
        match (self.next_alarm, self.schedule) {
            (Some(next), Some(schedule)) => format!(
                "Opens at {}: ?/{} every {} mins",
                format_minutes(next),
                schedule.count(),
                schedule.frequency_minutes()
            ),
            _ => "Not configured".to_string(),
        }
    }
}

impl fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} - {} - {}",
            self.id,
            self.display_name,
            self.connection,
            self.config_text()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            id: 1,
            display_name: "Pillbox 1".to_string(),
            connection: ConnectionState::Connected,
            alarm_status: AlarmStatus::Armed,
            schedule: None,
            next_alarm: None,
            device_time: None,
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(AlarmStatus::parse("triggered"), AlarmStatus::Triggered);
        assert_eq!(AlarmStatus::parse("no_alarm"), AlarmStatus::NoAlarm);
        assert_eq!(
            AlarmStatus::parse("low_battery"),
            AlarmStatus::Other("low_battery".to_string())
        );
        assert_eq!(AlarmStatus::parse("low_battery").as_str(), "low_battery");
    }

    #[test]
    fn test_unconfigured_text() {
        let snap = snapshot();
        assert_eq!(snap.config_text(), "Not configured");
        assert_eq!(snap.next_alarm_text(), "Not set");
        assert_eq!(snap.device_time_text(), "--:--:--");
    }

    #[test]
    fn test_configured_text() {
        let mut snap = snapshot();
        snap.schedule = Some(ScheduleConfig::new(360, 120, 5).unwrap());
        snap.next_alarm = Some(480);
        snap.device_time = Some(27_000);
        assert_eq!(snap.config_text(), "Opens at 08:00: ?/5 every 120 mins");
        assert_eq!(snap.device_time_text(), "07:30:00");
        assert_eq!(
            snap.to_string(),
            "[1] Pillbox 1 - Connected - Opens at 08:00: ?/5 every 120 mins"
        );
    }
}
