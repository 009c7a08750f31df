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

//! Bluetooth communication module.
//!
//! Talks to pillbox peripherals as a BLE GATT client.

pub mod ble_constants;
pub mod bluez;
pub mod codec;
pub mod transport;

pub use ble_constants::{PillboxCharacteristic, SERVICE_UUID};
pub use bluez::{BluezLink, BluezPicker};
pub use codec::{ByteOrder, FieldWidth};
pub use transport::{with_timeout, DevicePicker, PeripheralClaims, PeripheralLink};
