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

//! Error types for the pillbox companion.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::bluetooth::PillboxCharacteristic;

/// Result type alias for pillbox operations.
pub type Result<T> = std::result::Result<T, PillboxError>;

/// Peripheral selection, connection, read and write failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bluetooth error: {0}")]
    Bluetooth(String),

    #[error("no matching device found")]
    NoDeviceSelected,

    #[error("service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("characteristic {0} has not been resolved")]
    NotResolved(PillboxCharacteristic),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("peripheral {0} is already in use by another device")]
    AlreadyClaimed(String),

    #[error("connection attempt aborted")]
    Aborted,

    #[error("peripheral disconnected")]
    Disconnected,
}

/// Missing or malformed alarm form input, or a session that is not ready.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill in all fields ({0} is missing)")]
    MissingField(&'static str),

    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("{field} must be a whole number, got '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("device is not connected")]
    NotConnected,
}

/// A value that cannot be represented in its binary field.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("value {value} does not fit in a {width}-byte field")]
    OutOfRange { value: i64, width: usize },

    #[error("expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("{0} is not a numeric field")]
    NotNumeric(PillboxCharacteristic),
}

/// Errors surfaced by sessions and the registry.
#[derive(Debug, Error)]
pub enum PillboxError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// A later alarm field failed after earlier ones reached the peripheral.
    #[error("writing {failed} failed{}: {source}", written_suffix(.written))]
    AlarmWrite {
        written: Vec<PillboxCharacteristic>,
        failed: PillboxCharacteristic,
        #[source]
        source: TransportError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn written_suffix(written: &[PillboxCharacteristic]) -> String {
    if written.is_empty() {
        return String::new();
    }
    let names: Vec<&str> = written.iter().map(|c| c.as_str()).collect();
    format!(" ({} already written)", names.join(", "))
}
