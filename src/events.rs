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

//! Session events and their rendering.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::schedule::format_minutes;
use crate::state::{AlarmStatus, ConnectionState, DeviceId};

/// Severity of a user-visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Transient user-visible message.
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub raised_at: Instant,
    pub dismiss_after: Duration,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>, dismiss_after: Duration) -> Self {
        Self {
            level,
            message: message.into(),
            raised_at: Instant::now(),
            dismiss_after,
        }
    }

    /// Whether the message is still within its display window.
    pub fn is_visible(&self) -> bool {
        self.raised_at.elapsed() < self.dismiss_after
    }
}

/// Events emitted by device sessions.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ConnectionChanged {
        device: DeviceId,
        state: ConnectionState,
    },
    StatusChanged {
        device: DeviceId,
        status: AlarmStatus,
    },
    /// Peripheral clock read by the poll loop.
    DeviceTime { device: DeviceId, seconds: u32 },
    /// Next alarm recomputed, `None` when unset.
    NextAlarm {
        device: DeviceId,
        minutes: Option<u32>,
    },
    Notice { device: DeviceId, notice: Notice },
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Latest notice per device, shared between the event task and the console.
#[derive(Clone, Default)]
pub struct NoticeBoard {
    notices: Arc<Mutex<HashMap<DeviceId, Notice>>>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, device: DeviceId, notice: Notice) {
        self.notices.lock().insert(device, notice);
    }

    /// Latest notice for `device` if it has not been dismissed yet.
    pub fn visible(&self, device: DeviceId) -> Option<Notice> {
        self.notices
            .lock()
            .get(&device)
            .filter(|notice| notice.is_visible())
            .cloned()
    }

    /// Forget notices of a removed device.
    pub fn forget(&self, device: DeviceId) {
        self.notices.lock().remove(&device);
    }
}

/// Renders session events as console lines and posts notices to a board.
pub struct EventProcessor<W: Write> {
    out: W,
    board: NoticeBoard,
}

impl<W: Write> EventProcessor<W> {
    pub fn new(out: W, board: NoticeBoard) -> Self {
        Self { out, board }
    }

    /// Process a single event.
    pub fn process_event(&mut self, event: SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::ConnectionChanged { device, state } => {
                info!("Device {} is {}", device, state);
                writeln!(self.out, "[{}] {}", device, state)?;
            }
            SessionEvent::StatusChanged { device, status } => {
                info!("Device {} status: {}", device, status);
                writeln!(self.out, "[{}] status: {}", device, status)?;
            }
            SessionEvent::DeviceTime { device, seconds } => {
                debug!("Device {} clock at {}s", device, seconds);
            }
            SessionEvent::NextAlarm { device, minutes } => {
                let text = minutes
                    .map(format_minutes)
                    .unwrap_or_else(|| "Not set".to_string());
                writeln!(self.out, "[{}] next alarm: {}", device, text)?;
            }
            SessionEvent::Notice { device, notice } => {
                let marker = match notice.level {
                    NoticeLevel::Success => "ok",
                    NoticeLevel::Error => "!!",
                };
                if notice.level == NoticeLevel::Error {
                    warn!("Device {}: {}", device, notice.message);
                }
                writeln!(self.out, "[{}] {} {}", device, marker, notice.message)?;
                self.board.post(device, notice);
            }
        }
        self.out.flush()
    }
}
