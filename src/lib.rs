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

//! Companion for BLE pillbox peripherals.
//!
//! Keeps the peripheral clock in sync, programs alarm series and relays the
//! alarm status the peripheral reports.

pub mod bluetooth;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod schedule;
pub mod session;
pub mod state;
pub mod storage;
pub mod time_sync;
pub mod ui;

pub use error::{PillboxError, Result};
pub use registry::{ActionOutcome, DeviceRegistry, UserAction};
pub use session::{DeviceSession, SessionContext, SessionSettings};
