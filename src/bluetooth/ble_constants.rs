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

//! BLE service and characteristic UUIDs for the pillbox peripheral.

use std::fmt;
use uuid::Uuid;

use super::codec::FieldWidth;

/// Pillbox GATT service UUID.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x19b10000_e8f2_537e_4f6c_d104768a1214);

/// Alarm start time, minutes since midnight.
/// Properties: Write
pub const START_TIME_UUID: Uuid = Uuid::from_u128(0x19b10001_e8f2_537e_4f6c_d104768a1214);

/// Minutes between alarms.
/// Properties: Write
pub const FREQUENCY_UUID: Uuid = Uuid::from_u128(0x19b10002_e8f2_537e_4f6c_d104768a1214);

/// Number of alarms.
/// Properties: Write
pub const COUNT_UUID: Uuid = Uuid::from_u128(0x19b10003_e8f2_537e_4f6c_d104768a1214);

/// Alarm status string (no_alarm, armed, triggered, dismissed).
/// Properties: Read, Notify
pub const STATUS_UUID: Uuid = Uuid::from_u128(0x19b10004_e8f2_537e_4f6c_d104768a1214);

/// Peripheral clock, seconds since midnight.
/// Properties: Read, Write
pub const CURRENT_TIME_UUID: Uuid = Uuid::from_u128(0x19b10005_e8f2_537e_4f6c_d104768a1214);

/// Any nonzero byte resets the alarm program.
/// Properties: Write
pub const RESET_UUID: Uuid = Uuid::from_u128(0x19b10006_e8f2_537e_4f6c_d104768a1214);

/// Characteristic roles exposed by the pillbox service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PillboxCharacteristic {
    StartTime,
    Frequency,
    Count,
    Status,
    CurrentTime,
    Reset,
}

impl PillboxCharacteristic {
    /// Every role a connected session must resolve.
    pub const ALL: [PillboxCharacteristic; 6] = [
        Self::StartTime,
        Self::Frequency,
        Self::Count,
        Self::Status,
        Self::CurrentTime,
        Self::Reset,
    ];

    pub fn uuid(&self) -> Uuid {
        match self {
            Self::StartTime => START_TIME_UUID,
            Self::Frequency => FREQUENCY_UUID,
            Self::Count => COUNT_UUID,
            Self::Status => STATUS_UUID,
            Self::CurrentTime => CURRENT_TIME_UUID,
            Self::Reset => RESET_UUID,
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.uuid() == uuid)
    }

    /// Width of the binary field, `None` for the UTF-8 status string.
    pub fn width(&self) -> Option<FieldWidth> {
        match self {
            Self::StartTime | Self::Frequency | Self::CurrentTime => Some(FieldWidth::U32),
            Self::Count => Some(FieldWidth::U16),
            Self::Reset => Some(FieldWidth::U8),
            Self::Status => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartTime => "startTime",
            Self::Frequency => "frequency",
            Self::Count => "count",
            Self::Status => "status",
            Self::CurrentTime => "currentTime",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for PillboxCharacteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value written to the reset characteristic.
pub const RESET_FLAG: i64 = 1;
