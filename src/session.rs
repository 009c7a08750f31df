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

//! Per-device session: connection lifecycle, clock polling and alarm programming.
//!
//! Every successful connect opens a new epoch. Background tasks (clock poll,
//! status notifications, disconnect watch) capture the epoch they were
//! started for and re-check it under the state lock before touching
//! anything, so a task that outlives its connection is inert.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bluetooth::ble_constants::RESET_FLAG;
use crate::bluetooth::{
    codec, with_timeout, DevicePicker, PeripheralClaims, PeripheralLink, PillboxCharacteristic,
    SERVICE_UUID,
};
use crate::error::{PillboxError, Result, TransportError, ValidationError};
use crate::events::{EventSender, Notice, NoticeLevel, SessionEvent};
use crate::schedule::{AlarmForm, ScheduleConfig};
use crate::state::{AlarmStatus, ConnectionState, DeviceId, SessionSnapshot};
use crate::time_sync::{self, Clock, TimeSyncPolicy};

/// Poll interval used when the configured one is zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Asks the user to confirm a destructive action.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

/// Timing knobs of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Interval of the clock check while connected.
    pub poll_interval: Duration,
    /// Deadline for finding a peripheral.
    pub scan_timeout: Duration,
    /// Deadline for every other transport call.
    pub operation_timeout: Duration,
    /// How long user-visible messages stay up.
    pub message_duration: Duration,
    pub policy: TimeSyncPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(10),
            message_duration: Duration::from_millis(3000),
            policy: TimeSyncPolicy::default(),
        }
    }
}

/// Collaborators shared by every session of a registry.
pub struct SessionContext<P: DevicePicker> {
    pub picker: Arc<P>,
    pub clock: Arc<dyn Clock>,
    pub settings: SessionSettings,
    pub claims: PeripheralClaims,
    pub events: EventSender,
}

impl<P: DevicePicker> Clone for SessionContext<P> {
    fn clone(&self) -> Self {
        Self {
            picker: self.picker.clone(),
            clock: self.clock.clone(),
            settings: self.settings.clone(),
            claims: self.claims.clone(),
            events: self.events.clone(),
        }
    }
}

struct Connection<L> {
    link: Arc<L>,
    peripheral: String,
    cancel: CancellationToken,
}

enum Phase<L> {
    Disconnected,
    Connecting,
    Connected(Connection<L>),
}

impl<L> Phase<L> {
    fn state(&self) -> ConnectionState {
        match self {
            Phase::Disconnected => ConnectionState::Disconnected,
            Phase::Connecting => ConnectionState::Connecting,
            Phase::Connected(_) => ConnectionState::Connected,
        }
    }
}

struct SessionInner<L> {
    display_name: String,
    epoch: u64,
    phase: Phase<L>,
    alarm_status: AlarmStatus,
    schedule: Option<ScheduleConfig>,
    next_alarm: Option<u32>,
    device_time: Option<u32>,
}

impl<L> SessionInner<L> {
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && matches!(self.phase, Phase::Connected(_))
    }

    fn link_for(&self, epoch: u64) -> Option<Arc<L>> {
        match &self.phase {
            Phase::Connected(connection) if self.epoch == epoch => Some(connection.link.clone()),
            _ => None,
        }
    }
}

/// What a teardown found.
enum Teardown<L> {
    Idle,
    Aborted,
    Closed(Arc<L>),
}

struct Shared<P: DevicePicker> {
    id: DeviceId,
    context: SessionContext<P>,
    inner: Mutex<SessionInner<P::Link>>,
}

/// Session with one pillbox peripheral.
pub struct DeviceSession<P: DevicePicker> {
    shared: Arc<Shared<P>>,
}

impl<P: DevicePicker> Clone for DeviceSession<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Default display name of a device.
pub fn default_name(id: DeviceId) -> String {
    format!("Pillbox {}", id)
}

impl<P: DevicePicker> DeviceSession<P> {
    pub fn new(id: DeviceId, context: SessionContext<P>) -> Self {
        Self::with_name(id, default_name(id), context)
    }

    pub fn with_name(id: DeviceId, name: impl Into<String>, context: SessionContext<P>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id,
                context,
                inner: Mutex::new(SessionInner {
                    display_name: name.into(),
                    epoch: 0,
                    phase: Phase::Disconnected,
                    alarm_status: AlarmStatus::default(),
                    schedule: None,
                    next_alarm: None,
                    device_time: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.shared.id
    }

    pub fn display_name(&self) -> String {
        self.shared.inner.lock().display_name.clone()
    }

    pub fn rename(&self, name: impl Into<String>) {
        self.shared.inner.lock().display_name = name.into();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.inner.lock().phase.state()
    }

    pub fn alarm_status(&self) -> AlarmStatus {
        self.shared.inner.lock().alarm_status.clone()
    }

    pub fn schedule(&self) -> Option<ScheduleConfig> {
        self.shared.inner.lock().schedule
    }

    pub fn next_alarm(&self) -> Option<u32> {
        self.shared.inner.lock().next_alarm
    }

    pub fn device_time(&self) -> Option<u32> {
        self.shared.inner.lock().device_time
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.shared.inner.lock();
        SessionSnapshot {
            id: self.shared.id,
            display_name: inner.display_name.clone(),
            connection: inner.phase.state(),
            alarm_status: inner.alarm_status.clone(),
            schedule: inner.schedule,
            next_alarm: inner.next_alarm,
            device_time: inner.device_time,
        }
    }

    /// Select a peripheral, connect, and start polling its clock.
    ///
    /// A no-op unless the session is disconnected. Failures leave the
    /// session disconnected and are surfaced as a notice.
    pub async fn connect(&self) -> Result<()> {
        let shared = &self.shared;
        let epoch = {
            let mut inner = shared.inner.lock();
            if !matches!(inner.phase, Phase::Disconnected) {
                debug!("Device {} is already {}", shared.id, inner.phase.state());
                return Ok(());
            }
            inner.epoch += 1;
            inner.phase = Phase::Connecting;
            inner.epoch
        };

        info!("Connecting device {}...", shared.id);
        shared.emit_state(ConnectionState::Connecting);
        shared.notify(NoticeLevel::Success, "Connecting...");

        match shared.establish(epoch).await {
            Ok(link) => {
                shared.notify(NoticeLevel::Success, "Connected!");
                shared.sync_time(epoch, &link).await;
                Ok(())
            }
            Err(e) => {
                let reverted = {
                    let mut inner = shared.inner.lock();
                    let pending = inner.epoch == epoch && matches!(inner.phase, Phase::Connecting);
                    if pending {
                        inner.phase = Phase::Disconnected;
                    }
                    pending
                };
                if reverted {
                    shared.emit_state(ConnectionState::Disconnected);
                }
                error!("Connection failed for device {}: {}", shared.id, e);
                shared.notify(NoticeLevel::Error, format!("Connection failed: {}", e));
                Err(e)
            }
        }
    }

    /// Close the connection, or abort a connect in flight.
    ///
    /// A no-op when already disconnected.
    pub async fn disconnect(&self) {
        let torn = self.shared.teardown(None);
        self.shared.announce_disconnect(&torn);

        if let Teardown::Closed(link) = torn {
            let deadline = self.shared.context.settings.operation_timeout;
            if let Err(e) = with_timeout("disconnect", deadline, link.disconnect()).await {
                warn!("Disconnect of device {} failed: {}", self.shared.id, e);
            }
        }
    }

    /// The peripheral dropped the connection (out of range, powered off).
    pub fn on_peripheral_disconnected(&self) {
        let torn = self.shared.teardown(None);
        self.shared.announce_disconnect(&torn);
    }

    /// Read the peripheral clock and rewrite it when it drifted.
    ///
    /// Returns the clock value read, `None` when not connected or when the
    /// connection closed while the read was in flight.
    pub async fn check_and_sync_time(&self) -> Result<Option<u32>> {
        let Some((epoch, _)) = self.shared.connected() else {
            return Ok(None);
        };
        self.shared.check_time(epoch).await
    }

    /// Program an alarm series and recompute the next alarm.
    ///
    /// Fields are written in order start time, frequency, count. A failed
    /// write does not roll back the fields already written; the error lists
    /// them.
    pub async fn set_alarm(&self, form: &AlarmForm) -> Result<Option<u32>> {
        let result = self.shared.program_alarm(form).await;
        match &result {
            Ok(_) => self.shared.notify(NoticeLevel::Success, "Alarm set!"),
            Err(PillboxError::Validation(e)) => self.shared.notify(NoticeLevel::Error, e.to_string()),
            Err(e) => self
                .shared
                .notify(NoticeLevel::Error, format!("Failed to set alarm: {}", e)),
        }
        result
    }

    /// Reset the alarm program after the user confirms.
    ///
    /// Returns false when the user declined.
    pub async fn reset(&self, prompt: &dyn ConfirmPrompt) -> Result<bool> {
        let Some((epoch, link)) = self.shared.connected() else {
            let e = PillboxError::from(ValidationError::NotConnected);
            self.shared
                .notify(NoticeLevel::Error, format!("Reset failed: {}", e));
            return Err(e);
        };

        let question = format!("Reset {}?", self.display_name());
        if !prompt.confirm(&question).await {
            debug!("Reset of device {} declined", self.shared.id);
            return Ok(false);
        }

        match self.shared.write_reset(epoch, &link).await {
            Ok(()) => {
                self.shared.notify(NoticeLevel::Success, "Reset successful!");
                Ok(true)
            }
            Err(e) => {
                self.shared
                    .notify(NoticeLevel::Error, format!("Reset failed: {}", e));
                Err(e)
            }
        }
    }

    /// Apply a status notification payload.
    pub fn on_status_notification(&self, value: &[u8]) -> AlarmStatus {
        self.shared.apply_status(None, value)
    }
}

impl<P: DevicePicker> Shared<P> {
    fn emit(&self, event: SessionEvent) {
        let _ = self.context.events.send(event);
    }

    fn emit_state(&self, state: ConnectionState) {
        self.emit(SessionEvent::ConnectionChanged {
            device: self.id,
            state,
        });
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice::new(level, message, self.context.settings.message_duration);
        self.emit(SessionEvent::Notice {
            device: self.id,
            notice,
        });
    }

    fn connected(&self) -> Option<(u64, Arc<P::Link>)> {
        let inner = self.inner.lock();
        let epoch = inner.epoch;
        inner.link_for(epoch).map(|link| (epoch, link))
    }

    fn link_for(&self, epoch: u64) -> Option<Arc<P::Link>> {
        self.inner.lock().link_for(epoch)
    }

    async fn establish(self: &Arc<Self>, epoch: u64) -> Result<Arc<P::Link>> {
        let settings = &self.context.settings;
        let exclude = self.context.claims.snapshot();
        let link = with_timeout(
            "device selection",
            settings.scan_timeout,
            self.context.picker.request_device(SERVICE_UUID, &exclude),
        )
        .await?;

        let peripheral = link.id();
        if !self.context.claims.claim(&peripheral) {
            return Err(TransportError::AlreadyClaimed(peripheral).into());
        }
        info!("Device {} selected {} ({})", self.id, link.name(), peripheral);

        let link = Arc::new(link);
        match self.open(epoch, &link, &peripheral).await {
            Ok(()) => Ok(link),
            Err(e) => {
                self.context.claims.release(&peripheral);
                let deadline = settings.operation_timeout;
                if let Err(close) = with_timeout("disconnect", deadline, link.disconnect()).await {
                    warn!("Cleanup after failed connect of device {}: {}", self.id, close);
                }
                Err(e)
            }
        }
    }

    async fn open(self: &Arc<Self>, epoch: u64, link: &Arc<P::Link>, peripheral: &str) -> Result<()> {
        let deadline = self.context.settings.operation_timeout;

        let disconnections =
            with_timeout("disconnect watch", deadline, link.disconnections()).await?;
        with_timeout("connect", deadline, link.connect()).await?;
        with_timeout(
            "service discovery",
            deadline,
            link.resolve_characteristics(SERVICE_UUID, &PillboxCharacteristic::ALL),
        )
        .await?;
        let status = with_timeout(
            "status subscription",
            deadline,
            link.notifications(PillboxCharacteristic::Status),
        )
        .await?;

        let cancel = CancellationToken::new();
        {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch || !matches!(inner.phase, Phase::Connecting) {
                info!("Connect of device {} was aborted", self.id);
                return Err(TransportError::Aborted.into());
            }
            inner.phase = Phase::Connected(Connection {
                link: link.clone(),
                peripheral: peripheral.to_string(),
                cancel: cancel.clone(),
            });
        }

        let weak = Arc::downgrade(self);
        tokio::spawn(watch_status(weak.clone(), epoch, status, cancel.clone()));
        tokio::spawn(watch_disconnect(weak.clone(), epoch, disconnections, cancel.clone()));
        tokio::spawn(poll_time(weak, epoch, self.context.settings.poll_interval, cancel));

        info!("Device {} connected", self.id);
        self.emit_state(ConnectionState::Connected);
        Ok(())
    }

    /// Cancel background work and leave the connected/connecting phase.
    ///
    /// With `expected` set, only tears down that epoch.
    fn teardown(&self, expected: Option<u64>) -> Teardown<P::Link> {
        let mut inner = self.inner.lock();
        if expected.is_some_and(|epoch| epoch != inner.epoch) {
            return Teardown::Idle;
        }

        match std::mem::replace(&mut inner.phase, Phase::Disconnected) {
            Phase::Disconnected => Teardown::Idle,
            Phase::Connecting => {
                inner.epoch += 1;
                Teardown::Aborted
            }
            Phase::Connected(connection) => {
                // cancel before the epoch moves so no task observes a half state
                connection.cancel.cancel();
                inner.epoch += 1;
                self.context.claims.release(&connection.peripheral);
                Teardown::Closed(connection.link)
            }
        }
    }

    fn announce_disconnect(&self, torn: &Teardown<P::Link>) {
        match torn {
            Teardown::Idle => {}
            Teardown::Aborted => {
                info!("Connect of device {} aborted", self.id);
                self.emit_state(ConnectionState::Disconnected);
            }
            Teardown::Closed(_) => {
                info!("Device {} disconnected", self.id);
                self.emit_state(ConnectionState::Disconnected);
                self.notify(NoticeLevel::Error, "Disconnected");
            }
        }
    }

    fn on_peripheral_disconnected(&self, epoch: u64) {
        let torn = self.teardown(Some(epoch));
        if matches!(torn, Teardown::Closed(_)) {
            info!("Device {} dropped the connection", self.id);
        }
        self.announce_disconnect(&torn);
    }

    /// Write local time to the peripheral; failures are only logged.
    async fn sync_time(&self, epoch: u64, link: &Arc<P::Link>) {
        if self.link_for(epoch).is_none() {
            return;
        }
        let deadline = self.context.settings.operation_timeout;
        match time_sync::resync(link.as_ref(), self.context.clock.as_ref(), deadline).await {
            Ok(seconds) => debug!("Device {} clock synced to {}s", self.id, seconds),
            Err(e) => warn!("Time sync failed for device {}: {}", self.id, e),
        }
    }

    async fn check_time(&self, epoch: u64) -> Result<Option<u32>> {
        let Some(link) = self.link_for(epoch) else {
            return Ok(None);
        };
        let deadline = self.context.settings.operation_timeout;

        let local_seconds = self.context.clock.seconds_since_midnight();
        let value = with_timeout(
            "clock read",
            deadline,
            link.read(PillboxCharacteristic::CurrentTime),
        )
        .await?;
        let device_seconds = codec::decode_u32_le(&value)?;

        if self
            .context
            .settings
            .policy
            .should_resync(local_seconds, device_seconds)
        {
            if self.link_for(epoch).is_none() {
                return Ok(None);
            }
            info!(
                "Device {} clock drifted (local {}s, device {}s), resyncing",
                self.id, local_seconds, device_seconds
            );
            time_sync::resync(link.as_ref(), self.context.clock.as_ref(), deadline).await?;
        }

        {
            let mut inner = self.inner.lock();
            if !inner.is_current(epoch) {
                debug!("Dropping clock reading of closed connection {}", epoch);
                return Ok(None);
            }
            inner.device_time = Some(device_seconds);
        }
        self.emit(SessionEvent::DeviceTime {
            device: self.id,
            seconds: device_seconds,
        });
        Ok(Some(device_seconds))
    }

    async fn program_alarm(&self, form: &AlarmForm) -> Result<Option<u32>> {
        let (epoch, link) = self.connected().ok_or(ValidationError::NotConnected)?;
        let config = form.parse()?;

        // encode everything up front so a bad value cannot leave a partial program
        let fields = [
            (PillboxCharacteristic::StartTime, config.start_minutes()),
            (PillboxCharacteristic::Frequency, config.frequency_minutes()),
            (PillboxCharacteristic::Count, config.count()),
        ];
        let mut writes = Vec::with_capacity(fields.len());
        for (role, value) in fields {
            writes.push((role, codec::encode_field(role, value as i64)?));
        }

        self.sync_time(epoch, &link).await;

        let deadline = self.context.settings.operation_timeout;
        let mut written = Vec::with_capacity(writes.len());
        for (role, value) in writes {
            if let Err(source) = with_timeout("alarm write", deadline, link.write(role, &value)).await
            {
                warn!(
                    "Device {}: writing {} failed after {:?}",
                    self.id, role, written
                );
                return Err(PillboxError::AlarmWrite {
                    written,
                    failed: role,
                    source,
                });
            }
            written.push(role);
        }

        let next = config.next_alarm(self.context.clock.minutes_since_midnight());
        {
            let mut inner = self.inner.lock();
            if !inner.is_current(epoch) {
                return Err(TransportError::Disconnected.into());
            }
            inner.schedule = Some(config);
            inner.next_alarm = next;
        }

        info!(
            "Device {} alarm set: start {} every {} min x{}, next {:?}",
            self.id,
            config.start_minutes(),
            config.frequency_minutes(),
            config.count(),
            next
        );
        self.emit(SessionEvent::NextAlarm {
            device: self.id,
            minutes: next,
        });
        Ok(next)
    }

    async fn write_reset(&self, epoch: u64, link: &Arc<P::Link>) -> Result<()> {
        let value = codec::encode_field(PillboxCharacteristic::Reset, RESET_FLAG)?;
        let deadline = self.context.settings.operation_timeout;
        with_timeout(
            "reset",
            deadline,
            link.write(PillboxCharacteristic::Reset, &value),
        )
        .await?;

        {
            let mut inner = self.inner.lock();
            if inner.is_current(epoch) {
                inner.next_alarm = None;
                inner.schedule = None;
            }
        }
        info!("Device {} reset", self.id);
        self.emit(SessionEvent::NextAlarm {
            device: self.id,
            minutes: None,
        });
        Ok(())
    }

    /// Decode and store a status payload. With `expected` set it is only
    /// stored while that epoch is connected.
    fn apply_status(&self, expected: Option<u64>, value: &[u8]) -> AlarmStatus {
        let status = AlarmStatus::parse(&codec::decode_utf8(value));
        {
            let mut inner = self.inner.lock();
            if expected.is_some_and(|epoch| !inner.is_current(epoch)) {
                debug!("Dropping status {} of closed connection", status);
                return status;
            }
            inner.alarm_status = status.clone();
        }

        debug!("Device {} status: {}", self.id, status);
        match status {
            AlarmStatus::Triggered => self.notify(NoticeLevel::Error, "Alarm triggered!"),
            AlarmStatus::Dismissed => self.notify(NoticeLevel::Success, "Dismissed"),
            _ => {}
        }
        self.emit(SessionEvent::StatusChanged {
            device: self.id,
            status: status.clone(),
        });
        status
    }
}

async fn poll_time<P: DevicePicker>(
    shared: Weak<Shared<P>>,
    epoch: u64,
    period: Duration,
    cancel: CancellationToken,
) {
    let period = if period.is_zero() {
        warn!("Zero clock poll interval, using {:?}", MIN_POLL_INTERVAL);
        MIN_POLL_INTERVAL
    } else {
        period
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    result = shared.check_time(epoch) => {
                        if let Err(e) = result {
                            warn!("Time check failed for device {}: {}", shared.id, e);
                        }
                    }
                }
            }
        }
    }
    debug!("Clock poll of connection {} stopped", epoch);
}

async fn watch_status<P: DevicePicker>(
    shared: Weak<Shared<P>>,
    epoch: u64,
    mut status: BoxStream<'static, Vec<u8>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            value = status.next() => {
                let Some(value) = value else {
                    debug!("Status notifications of connection {} ended", epoch);
                    break;
                };
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.apply_status(Some(epoch), &value);
            }
        }
    }
}

async fn watch_disconnect<P: DevicePicker>(
    shared: Weak<Shared<P>>,
    epoch: u64,
    mut disconnections: BoxStream<'static, ()>,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        event = disconnections.next() => match event {
            Some(()) => {
                if let Some(shared) = shared.upgrade() {
                    shared.on_peripheral_disconnected(epoch);
                }
            }
            None => {
                // no more events says nothing about the link itself
                debug!("Disconnect events of connection {} ended", epoch);
                cancel.cancelled().await;
            }
        }
    }
}
