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

//! BlueZ GATT client implementation.

use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{
    Adapter, AdapterEvent, Device, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport,
};
use futures::stream::BoxStream;
use futures::{pin_mut, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::ble_constants::PillboxCharacteristic;
use super::transport::{DevicePicker, PeripheralLink};
use crate::error::TransportError;

/// Delay between checks while BlueZ resolves remote services.
const SERVICES_RESOLVE_POLL: Duration = Duration::from_millis(100);

impl From<bluer::Error> for TransportError {
    fn from(e: bluer::Error) -> Self {
        TransportError::Bluetooth(e.to_string())
    }
}

/// Picks pillbox peripherals through BlueZ discovery.
pub struct BluezPicker {
    adapter: Adapter,
}

impl BluezPicker {
    /// Open a BlueZ session on the default adapter.
    pub async fn new() -> Result<Self, TransportError> {
        info!("Initializing BLE central...");

        let session = bluer::Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        Ok(Self { adapter })
    }

    async fn offers_service(device: &Device, service: Uuid) -> Result<bool, TransportError> {
        Ok(device
            .uuids()
            .await?
            .map(|uuids| uuids.contains(&service))
            .unwrap_or(false))
    }
}

#[async_trait]
impl DevicePicker for BluezPicker {
    type Link = BluezLink;

    /// Scan until a device advertising `service` shows up.
    ///
    /// Runs until the caller's deadline expires when nothing matches.
    async fn request_device(
        &self,
        service: Uuid,
        exclude: &[String],
    ) -> Result<BluezLink, TransportError> {
        let filter = DiscoveryFilter {
            uuids: HashSet::from([service]),
            transport: DiscoveryTransport::Le,
            ..Default::default()
        };
        self.adapter.set_discovery_filter(filter).await?;

        info!("Scanning for pillbox devices (service {})", service);
        let events = self.adapter.discover_devices().await?;
        pin_mut!(events);

        while let Some(event) = events.next().await {
            let AdapterEvent::DeviceAdded(address) = event else {
                continue;
            };
            let id = address.to_string();
            if exclude.contains(&id) {
                debug!("Skipping {}: already in use", id);
                continue;
            }

            let device = self.adapter.device(address)?;
            if !Self::offers_service(&device, service).await? {
                continue;
            }

            let name = device.alias().await.unwrap_or_else(|_| id.clone());
            info!("Found pillbox {} ({})", name, id);
            return Ok(BluezLink::new(device, name));
        }

        Err(TransportError::NoDeviceSelected)
    }
}

/// Connected (or connectable) pillbox peripheral.
pub struct BluezLink {
    device: Device,
    name: String,
    characteristics: Mutex<HashMap<PillboxCharacteristic, Characteristic>>,
}

impl BluezLink {
    fn new(device: Device, name: String) -> Self {
        Self {
            device,
            name,
            characteristics: Mutex::new(HashMap::new()),
        }
    }

    fn characteristic(&self, role: PillboxCharacteristic) -> Result<Characteristic, TransportError> {
        self.characteristics
            .lock()
            .get(&role)
            .cloned()
            .ok_or(TransportError::NotResolved(role))
    }

    async fn wait_services_resolved(&self) -> Result<(), TransportError> {
        while !self.device.is_services_resolved().await? {
            tokio::time::sleep(SERVICES_RESOLVE_POLL).await;
        }
        Ok(())
    }
}

#[async_trait]
impl PeripheralLink for BluezLink {
    fn id(&self) -> String {
        self.device.address().to_string()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if !self.device.is_connected().await? {
            self.device.connect().await?;
        }
        info!("Connected to {}", self.device.address());
        Ok(())
    }

    async fn resolve_characteristics(
        &self,
        service: Uuid,
        roles: &[PillboxCharacteristic],
    ) -> Result<(), TransportError> {
        self.wait_services_resolved().await?;

        let mut found = HashMap::new();
        let mut service_found = false;
        for remote in self.device.services().await? {
            if remote.uuid().await? != service {
                continue;
            }
            service_found = true;

            for characteristic in remote.characteristics().await? {
                let uuid = characteristic.uuid().await?;
                match PillboxCharacteristic::from_uuid(uuid) {
                    Some(role) if roles.contains(&role) => {
                        found.insert(role, characteristic);
                    }
                    _ => debug!("Ignoring characteristic {}", uuid),
                }
            }
        }

        if !service_found {
            return Err(TransportError::ServiceNotFound(service));
        }
        if let Some(missing) = roles.iter().find(|role| !found.contains_key(*role)) {
            return Err(TransportError::CharacteristicNotFound(missing.uuid()));
        }

        debug!("Resolved {} characteristics", found.len());
        *self.characteristics.lock() = found;
        Ok(())
    }

    async fn read(&self, role: PillboxCharacteristic) -> Result<Vec<u8>, TransportError> {
        Ok(self.characteristic(role)?.read().await?)
    }

    async fn write(&self, role: PillboxCharacteristic, value: &[u8]) -> Result<(), TransportError> {
        debug!("Writing {} bytes to {}", value.len(), role);
        Ok(self.characteristic(role)?.write(value).await?)
    }

    async fn notifications(
        &self,
        role: PillboxCharacteristic,
    ) -> Result<BoxStream<'static, Vec<u8>>, TransportError> {
        let stream = self.characteristic(role)?.notify().await?;
        Ok(stream.boxed())
    }

    async fn disconnections(&self) -> Result<BoxStream<'static, ()>, TransportError> {
        let events = self.device.events().await?;
        Ok(events
            .filter_map(|event| async move {
                match event {
                    DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) => Some(()),
                    _ => None,
                }
            })
            .boxed())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.characteristics.lock().clear();
        if self.device.is_connected().await? {
            self.device.disconnect().await?;
        }
        info!("Disconnected from {}", self.device.address());
        Ok(())
    }
}
