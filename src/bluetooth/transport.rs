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

//! Transport seam between device sessions and the Bluetooth stack.

use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::ble_constants::PillboxCharacteristic;
use crate::error::TransportError;

/// Selects a peripheral advertising a given service.
#[async_trait]
pub trait DevicePicker: Send + Sync + 'static {
    type Link: PeripheralLink;

    /// Find a peripheral offering `service`, skipping ids listed in `exclude`.
    async fn request_device(
        &self,
        service: Uuid,
        exclude: &[String],
    ) -> Result<Self::Link, TransportError>;
}

/// GATT client link to a single peripheral.
///
/// Characteristics are addressed by role once
/// [`resolve_characteristics`](PeripheralLink::resolve_characteristics)
/// has succeeded.
#[async_trait]
pub trait PeripheralLink: Send + Sync + 'static {
    /// Stable identifier of the peripheral (the BLE address for BlueZ).
    fn id(&self) -> String;

    /// Human readable name reported during discovery.
    fn name(&self) -> String;

    async fn connect(&self) -> Result<(), TransportError>;

    async fn resolve_characteristics(
        &self,
        service: Uuid,
        roles: &[PillboxCharacteristic],
    ) -> Result<(), TransportError>;

    async fn read(&self, role: PillboxCharacteristic) -> Result<Vec<u8>, TransportError>;

    async fn write(&self, role: PillboxCharacteristic, value: &[u8]) -> Result<(), TransportError>;

    /// Subscribe to value-changed notifications of `role`.
    async fn notifications(
        &self,
        role: PillboxCharacteristic,
    ) -> Result<BoxStream<'static, Vec<u8>>, TransportError>;

    /// Stream yielding once per peripheral-initiated disconnection.
    async fn disconnections(&self) -> Result<BoxStream<'static, ()>, TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Run a transport operation under a deadline.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout { operation, after }),
    }
}

/// Peripheral ids currently held by a session.
///
/// Shared between a registry and its sessions so that one peripheral is
/// never driven by two sessions at once.
#[derive(Debug, Clone, Default)]
pub struct PeripheralClaims {
    held: Arc<Mutex<HashSet<String>>>,
}

impl PeripheralClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the id is already held.
    pub fn claim(&self, id: &str) -> bool {
        self.held.lock().insert(id.to_string())
    }

    pub fn release(&self, id: &str) {
        self.held.lock().remove(id);
    }

    pub fn is_claimed(&self, id: &str) -> bool {
        self.held.lock().contains(id)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.held.lock().iter().cloned().collect()
    }
}
