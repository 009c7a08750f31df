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

//! Registry of known devices.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bluetooth::DevicePicker;
use crate::error::Result;
use crate::schedule::AlarmForm;
use crate::session::{ConfirmPrompt, DeviceSession, SessionContext};
use crate::state::{DeviceId, SessionSnapshot};
use crate::storage::{DeviceRecord, DeviceStore};

/// User action routed to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Add,
    Remove(DeviceId),
    Connect(DeviceId),
    Disconnect(DeviceId),
    SetAlarm(DeviceId, AlarmForm),
    Reset(DeviceId),
    Rename(DeviceId, String),
}

/// Result of a dispatched action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Added(DeviceId),
    Done,
    /// Alarm programmed; next alarm in minutes-of-day if any is left today.
    AlarmSet(Option<u32>),
    /// The user declined the confirmation.
    Declined,
    UnknownDevice(DeviceId),
}

struct RegistryInner<P: DevicePicker> {
    sessions: Vec<DeviceSession<P>>,
    last_id: DeviceId,
}

/// Owns every device session; insertion order is display order.
pub struct DeviceRegistry<P: DevicePicker> {
    context: SessionContext<P>,
    store: Option<DeviceStore>,
    inner: Mutex<RegistryInner<P>>,
}

impl<P: DevicePicker> DeviceRegistry<P> {
    /// Registry without persistence.
    pub fn new(context: SessionContext<P>) -> Self {
        Self {
            context,
            store: None,
            inner: Mutex::new(RegistryInner {
                sessions: Vec::new(),
                last_id: 0,
            }),
        }
    }

    /// Registry backed by `store`, restoring the persisted devices.
    pub fn with_store(context: SessionContext<P>, store: DeviceStore) -> Result<Self> {
        let records = store.get_all()?;
        let highest = records.iter().map(|r| r.device_id).max().unwrap_or(0);
        let last_id = store.last_device_id()?.max(highest);

        let sessions: Vec<_> = records
            .into_iter()
            .map(|record| {
                DeviceSession::with_name(record.device_id, record.device_name, context.clone())
            })
            .collect();
        info!("Restored {} device(s)", sessions.len());

        Ok(Self {
            context,
            store: Some(store),
            inner: Mutex::new(RegistryInner { sessions, last_id }),
        })
    }

    /// Create a session with the next unused id.
    pub fn add_device(&self) -> DeviceId {
        let session = {
            let mut inner = self.inner.lock();
            inner.last_id += 1;
            let session = DeviceSession::new(inner.last_id, self.context.clone());
            inner.sessions.push(session.clone());
            session
        };

        let id = session.id();
        info!("Added device {}", id);
        if let Some(store) = &self.store {
            // the counter must advance even if the record cannot be saved
            if let Err(e) = store.set_last_device_id(id) {
                warn!("Failed to persist device counter {}: {}", id, e);
            }
            if let Err(e) = store.add(&DeviceRecord::new(id, session.display_name())) {
                warn!("Failed to persist device {}: {}", id, e);
            }
        }
        id
    }

    /// Remove a device, disconnecting or aborting its connection.
    ///
    /// Returns false when `id` is unknown.
    pub async fn remove_device(&self, id: DeviceId) -> bool {
        let session = {
            let mut inner = self.inner.lock();
            let Some(index) = inner.sessions.iter().position(|s| s.id() == id) else {
                debug!("Remove of unknown device {}", id);
                return false;
            };
            inner.sessions.remove(index)
        };

        session.disconnect().await;
        if let Some(store) = &self.store {
            if let Err(e) = store.delete(id) {
                warn!("Failed to delete device {}: {}", id, e);
            }
        }
        info!("Removed device {}", id);
        true
    }

    pub fn find(&self, id: DeviceId) -> Option<DeviceSession<P>> {
        self.inner
            .lock()
            .sessions
            .iter()
            .find(|s| s.id() == id)
            .cloned()
    }

    /// Sessions in insertion order.
    pub fn sessions(&self) -> Vec<DeviceSession<P>> {
        self.inner.lock().sessions.clone()
    }

    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions().iter().map(|s| s.snapshot()).collect()
    }

    /// Rename a device. Returns false when `id` is unknown.
    pub fn rename(&self, id: DeviceId, name: &str) -> bool {
        let Some(session) = self.find(id) else {
            return false;
        };
        session.rename(name);
        if let Some(store) = &self.store {
            if let Err(e) = store.put(&DeviceRecord::new(id, name)) {
                warn!("Failed to persist name of device {}: {}", id, e);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().sessions.is_empty()
    }

    /// Disconnect every session.
    pub async fn shutdown(&self) {
        for session in self.sessions() {
            session.disconnect().await;
        }
        info!("All devices disconnected");
    }

    /// Route a user action to its session.
    ///
    /// Actions on unknown ids are no-ops reported as
    /// [`ActionOutcome::UnknownDevice`].
    pub async fn dispatch(
        &self,
        action: UserAction,
        prompt: &dyn ConfirmPrompt,
    ) -> Result<ActionOutcome> {
        match action {
            UserAction::Add => Ok(ActionOutcome::Added(self.add_device())),
            UserAction::Remove(id) => Ok(if self.remove_device(id).await {
                ActionOutcome::Done
            } else {
                ActionOutcome::UnknownDevice(id)
            }),
            UserAction::Rename(id, name) => Ok(if self.rename(id, &name) {
                ActionOutcome::Done
            } else {
                ActionOutcome::UnknownDevice(id)
            }),
            UserAction::Connect(id) => {
                let Some(session) = self.find(id) else {
                    return Ok(ActionOutcome::UnknownDevice(id));
                };
                session.connect().await?;
                Ok(ActionOutcome::Done)
            }
            UserAction::Disconnect(id) => {
                let Some(session) = self.find(id) else {
                    return Ok(ActionOutcome::UnknownDevice(id));
                };
                session.disconnect().await;
                Ok(ActionOutcome::Done)
            }
            UserAction::SetAlarm(id, form) => {
                let Some(session) = self.find(id) else {
                    return Ok(ActionOutcome::UnknownDevice(id));
                };
                let next = session.set_alarm(&form).await?;
                Ok(ActionOutcome::AlarmSet(next))
            }
            UserAction::Reset(id) => {
                let Some(session) = self.find(id) else {
                    return Ok(ActionOutcome::UnknownDevice(id));
                };
                Ok(if session.reset(prompt).await? {
                    ActionOutcome::Done
                } else {
                    ActionOutcome::Declined
                })
            }
        }
    }
}
