//! In-memory peripheral, picker and clock for session tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use pillbox_companion::bluetooth::{DevicePicker, PeripheralClaims, PeripheralLink, PillboxCharacteristic};
use pillbox_companion::error::TransportError;
use pillbox_companion::events::{self, EventReceiver, SessionEvent};
use pillbox_companion::session::{ConfirmPrompt, SessionContext, SessionSettings};
use pillbox_companion::time_sync::{Clock, TimeSyncPolicy};

/// 07:30:00
pub const HALF_PAST_SEVEN: u32 = 7 * 3600 + 30 * 60;

/// Simulated pillbox. Clock writes update its clock.
pub struct MockPeripheral {
    pub id: String,
    pub device_seconds: AtomicU32,
    pub fail_connect: AtomicBool,
    pub fail_write: Mutex<Option<PillboxCharacteristic>>,
    pub hold_connect: AtomicBool,
    pub connect_started: Notify,
    connect_gate: Notify,
    pub hold_reads: AtomicBool,
    pub read_started: Notify,
    read_gate: Notify,
    pub reads: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    writes: Mutex<Vec<(PillboxCharacteristic, Vec<u8>)>>,
    status_tx: Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    disconnect_tx: Mutex<Vec<mpsc::UnboundedSender<()>>>,
}

impl MockPeripheral {
    pub fn new(id: &str, device_seconds: u32) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            device_seconds: AtomicU32::new(device_seconds),
            fail_connect: AtomicBool::new(false),
            fail_write: Mutex::new(None),
            hold_connect: AtomicBool::new(false),
            connect_started: Notify::new(),
            connect_gate: Notify::new(),
            hold_reads: AtomicBool::new(false),
            read_started: Notify::new(),
            read_gate: Notify::new(),
            reads: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            status_tx: Mutex::new(Vec::new()),
            disconnect_tx: Mutex::new(Vec::new()),
        })
    }

    pub fn writes(&self) -> Vec<(PillboxCharacteristic, Vec<u8>)> {
        self.writes.lock().clone()
    }

    /// Written roles, clock syncs left out.
    pub fn alarm_writes(&self) -> Vec<(PillboxCharacteristic, Vec<u8>)> {
        self.writes()
            .into_iter()
            .filter(|(role, _)| *role != PillboxCharacteristic::CurrentTime)
            .collect()
    }

    pub fn clock_writes(&self) -> usize {
        self.writes()
            .iter()
            .filter(|(role, _)| *role == PillboxCharacteristic::CurrentTime)
            .count()
    }

    pub fn release_connect(&self) {
        self.connect_gate.notify_one();
    }

    pub fn release_read(&self) {
        self.read_gate.notify_one();
    }

    /// Send a status notification to subscribers.
    pub fn push_status(&self, status: &str) {
        for tx in self.status_tx.lock().iter() {
            let _ = tx.unbounded_send(status.as_bytes().to_vec());
        }
    }

    /// Drop the link from the peripheral side.
    pub fn drop_connection(&self) {
        for tx in self.disconnect_tx.lock().iter() {
            let _ = tx.unbounded_send(());
        }
    }

    /// End the disconnect event streams without dropping the link.
    pub fn close_disconnect_stream(&self) {
        self.disconnect_tx.lock().clear();
    }
}

pub struct MockLink(pub Arc<MockPeripheral>);

#[async_trait]
impl PeripheralLink for MockLink {
    fn id(&self) -> String {
        self.0.id.clone()
    }

    fn name(&self) -> String {
        format!("Mock {}", self.0.id)
    }

    async fn connect(&self) -> Result<(), TransportError> {
        if self.0.hold_connect.load(Ordering::SeqCst) {
            self.0.connect_started.notify_one();
            self.0.connect_gate.notified().await;
        }
        if self.0.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Bluetooth("connect refused".to_string()));
        }
        Ok(())
    }

    async fn resolve_characteristics(
        &self,
        _service: Uuid,
        _roles: &[PillboxCharacteristic],
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn read(&self, role: PillboxCharacteristic) -> Result<Vec<u8>, TransportError> {
        self.0.reads.fetch_add(1, Ordering::SeqCst);
        if self.0.hold_reads.load(Ordering::SeqCst) {
            self.0.read_started.notify_one();
            self.0.read_gate.notified().await;
        }
        match role {
            PillboxCharacteristic::CurrentTime => {
                Ok(self.0.device_seconds.load(Ordering::SeqCst).to_le_bytes().to_vec())
            }
            PillboxCharacteristic::Status => Ok(b"no_alarm".to_vec()),
            other => Err(TransportError::Bluetooth(format!("{} is write-only", other))),
        }
    }

    async fn write(&self, role: PillboxCharacteristic, value: &[u8]) -> Result<(), TransportError> {
        if *self.0.fail_write.lock() == Some(role) {
            return Err(TransportError::Disconnected);
        }
        if role == PillboxCharacteristic::CurrentTime && value.len() == 4 {
            let seconds = u32::from_le_bytes([value[0], value[1], value[2], value[3]]);
            self.0.device_seconds.store(seconds, Ordering::SeqCst);
        }
        self.0.writes.lock().push((role, value.to_vec()));
        Ok(())
    }

    async fn notifications(
        &self,
        _role: PillboxCharacteristic,
    ) -> Result<BoxStream<'static, Vec<u8>>, TransportError> {
        let (tx, rx) = mpsc::unbounded();
        self.0.status_tx.lock().push(tx);
        Ok(rx.boxed())
    }

    async fn disconnections(&self) -> Result<BoxStream<'static, ()>, TransportError> {
        let (tx, rx) = mpsc::unbounded();
        self.0.disconnect_tx.lock().push(tx);
        Ok(rx.boxed())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.0.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Offers its peripherals in order, skipping excluded ids.
pub struct MockPicker {
    pub peripherals: Vec<Arc<MockPeripheral>>,
    pub requests: AtomicUsize,
}

impl MockPicker {
    pub fn new(peripherals: Vec<Arc<MockPeripheral>>) -> Self {
        Self {
            peripherals,
            requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DevicePicker for MockPicker {
    type Link = MockLink;

    async fn request_device(
        &self,
        _service: Uuid,
        exclude: &[String],
    ) -> Result<MockLink, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.peripherals
            .iter()
            .find(|p| !exclude.contains(&p.id))
            .map(|p| MockLink(p.clone()))
            .ok_or(TransportError::NoDeviceSelected)
    }
}

pub struct FixedClock(pub AtomicU32);

impl FixedClock {
    pub fn at(seconds: u32) -> Arc<Self> {
        Arc::new(Self(AtomicU32::new(seconds)))
    }

    pub fn set(&self, seconds: u32) {
        self.0.store(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn seconds_since_midnight(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Answers every question the same way and remembers them.
pub struct ScriptedPrompt {
    pub answer: bool,
    pub questions: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            questions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConfirmPrompt for ScriptedPrompt {
    async fn confirm(&self, question: &str) -> bool {
        self.questions.lock().push(question.to_string());
        self.answer
    }
}

pub fn settings(poll_interval: Duration) -> SessionSettings {
    SessionSettings {
        poll_interval,
        scan_timeout: Duration::from_secs(1),
        operation_timeout: Duration::from_secs(1),
        message_duration: Duration::from_secs(3),
        policy: TimeSyncPolicy::default(),
    }
}

pub struct Harness {
    pub picker: Arc<MockPicker>,
    pub clock: Arc<FixedClock>,
    pub claims: PeripheralClaims,
    pub context: SessionContext<MockPicker>,
    pub events: EventReceiver,
}

impl Harness {
    pub fn new(peripherals: Vec<Arc<MockPeripheral>>, poll_interval: Duration) -> Self {
        let picker = Arc::new(MockPicker::new(peripherals));
        let clock = FixedClock::at(HALF_PAST_SEVEN);
        let claims = PeripheralClaims::new();
        let (tx, events) = events::channel();
        let context = SessionContext {
            picker: picker.clone(),
            clock: clock.clone(),
            settings: settings(poll_interval),
            claims: claims.clone(),
            events: tx,
        };
        Self {
            picker,
            clock,
            claims,
            context,
            events,
        }
    }

    /// Events received so far.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Notice messages received so far.
    pub fn notices(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Notice { notice, .. } => Some(notice.message),
                _ => None,
            })
            .collect()
    }
}

/// Poll `condition` until it holds, failing after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
