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

//! Device list storage using SQLite.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::state::DeviceId;

/// A persisted device entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub device_name: String,
}

impl DeviceRecord {
    pub fn new(device_id: DeviceId, device_name: impl Into<String>) -> Self {
        Self {
            device_id,
            device_name: device_name.into(),
        }
    }
}

/// Device database manager.
#[derive(Clone)]
pub struct DeviceStore {
    conn: Arc<Mutex<Connection>>,
}

impl DeviceStore {
    /// Create or open the device database in `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("pillbox.db");
        info!("Opening device database: {:?}", db_path);

        Self::init(Connection::open(&db_path)?)
    }

    /// Database that lives only as long as the store.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS devices (
                device_id INTEGER PRIMARY KEY,
                device_name TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_device_name ON devices(device_name)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a new device; fails when the id already exists.
    pub fn add(&self, record: &DeviceRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO devices (device_id, device_name) VALUES (?1, ?2)",
            params![record.device_id as i64, record.device_name],
        )?;
        Ok(())
    }

    /// Insert or replace a device.
    pub fn put(&self, record: &DeviceRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO devices (device_id, device_name) VALUES (?1, ?2)",
            params![record.device_id as i64, record.device_name],
        )?;
        Ok(())
    }

    pub fn get(&self, device_id: DeviceId) -> Result<Option<DeviceRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT device_id, device_name FROM devices WHERE device_id = ?1",
                [device_id as i64],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// All devices ordered by id.
    pub fn get_all(&self) -> Result<Vec<DeviceRecord>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT device_id, device_name FROM devices ORDER BY device_id")?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get_by_name(&self, device_name: &str) -> Result<Vec<DeviceRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT device_id, device_name FROM devices WHERE device_name = ?1 ORDER BY device_id",
        )?;
        let records = stmt
            .query_map([device_name], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, device_id: DeviceId) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM devices WHERE device_id = ?1", [device_id as i64])?;
        Ok(removed > 0)
    }

    /// Remove all devices. The id counter is kept.
    pub fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM devices", [])?;
        info!("Device list cleared");
        Ok(())
    }

    pub fn count(&self) -> Result<u32> {
        let conn = self.conn.lock();
        let count: u32 = conn.query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Highest id ever handed out, 0 when none.
    pub fn last_device_id(&self) -> Result<DeviceId> {
        let conn = self.conn.lock();
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'last_device_id'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0) as DeviceId)
    }

    pub fn set_last_device_id(&self, device_id: DeviceId) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('last_device_id', ?1)",
            [device_id as i64],
        )?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceRecord> {
    let device_id: i64 = row.get(0)?;
    Ok(DeviceRecord {
        device_id: device_id as DeviceId,
        device_name: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_devices_basic() {
        let dir = tempdir().unwrap();
        let store = DeviceStore::new(dir.path()).unwrap();

        store.add(&DeviceRecord::new(1, "Pillbox 1")).unwrap();
        store.add(&DeviceRecord::new(2, "Kitchen")).unwrap();
        assert!(store.add(&DeviceRecord::new(2, "Duplicate")).is_err());

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], DeviceRecord::new(1, "Pillbox 1"));
        assert_eq!(store.get(2).unwrap().unwrap().device_name, "Kitchen");
        assert!(store.get(3).unwrap().is_none());
    }

    #[test]
    fn test_put_rename_and_delete() {
        let store = DeviceStore::open_in_memory().unwrap();
        store.put(&DeviceRecord::new(1, "Pillbox 1")).unwrap();
        store.put(&DeviceRecord::new(1, "Bedroom")).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get_by_name("Bedroom").unwrap().len(), 1);
        assert!(store.get_by_name("Pillbox 1").unwrap().is_empty());

        assert!(store.delete(1).unwrap());
        assert!(!store.delete(1).unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_id_counter_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = DeviceStore::new(dir.path()).unwrap();
            assert_eq!(store.last_device_id().unwrap(), 0);
            store.add(&DeviceRecord::new(7, "Pillbox 7")).unwrap();
            store.set_last_device_id(7).unwrap();
            store.clear().unwrap();
        }

        let store = DeviceStore::new(dir.path()).unwrap();
        assert_eq!(store.last_device_id().unwrap(), 7);
        assert_eq!(store.count().unwrap(), 0);
    }
}
