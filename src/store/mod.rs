//! Durable JSON stores
//!
//! Both stores write atomically: serialize to a sibling temp file, fsync,
//! then rename over the target. A crash mid-write leaves the previous
//! file intact, never a truncated one.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::StoreError;
use crate::models::{LastCheckRecord, Schedule};

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let rendered = serde_json::to_vec_pretty(value)?;
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&rendered)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json_or<T: DeserializeOwned>(path: &Path, default: T) -> Result<T, StoreError> {
    if !path.exists() {
        return Ok(default);
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Source of truth for schedule definitions, persisted as a JSON array
///
/// Reads are stateless; every mutation is a load, modify, atomic write.
/// A parse failure on load is surfaced, leaving the caller's view at the
/// last committed state.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// All persisted schedules
    pub fn load(&self) -> Result<Vec<Schedule>, StoreError> {
        read_json_or(&self.path, Vec::new())
    }

    /// Look up one schedule by id
    pub fn get(&self, id: &str) -> Result<Option<Schedule>, StoreError> {
        Ok(self.load()?.into_iter().find(|s| s.id == id))
    }

    /// Insert or replace a schedule by id
    ///
    /// Replacement is whole-record; upserting the same schedule twice
    /// leaves exactly one entry. Relative order of other schedules is
    /// preserved.
    pub fn upsert(&self, schedule: Schedule) -> Result<(), StoreError> {
        let mut schedules = self.load()?;
        match schedules.iter_mut().find(|s| s.id == schedule.id) {
            Some(existing) => *existing = schedule,
            None => schedules.push(schedule),
        }
        write_atomic(&self.path, &schedules)?;
        debug!("Persisted {} schedule(s) to {}", schedules.len(), self.path.display());
        Ok(())
    }

    /// Remove a schedule by id; removing an absent id is a no-op
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut schedules = self.load()?;
        let before = schedules.len();
        schedules.retain(|s| s.id != id);
        if schedules.len() != before {
            write_atomic(&self.path, &schedules)?;
        }
        Ok(())
    }

    /// Stamp a schedule's `last_run`; unknown ids are ignored
    pub fn update_last_run(
        &self,
        id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), StoreError> {
        let mut schedules = self.load()?;
        if let Some(existing) = schedules.iter_mut().find(|s| s.id == id) {
            existing.last_run = Some(at);
            write_atomic(&self.path, &schedules)?;
        }
        Ok(())
    }
}

/// Durable record of the most recent completed run
#[derive(Debug, Clone)]
pub struct LastCheckStore {
    path: PathBuf,
}

impl LastCheckStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<LastCheckRecord>, StoreError> {
        read_json_or(&self.path, None)
    }

    /// Overwrite the record; only the latest run is retained
    pub fn save(&self, record: &LastCheckRecord) -> Result<(), StoreError> {
        write_atomic(&self.path, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn store_in(dir: &tempfile::TempDir) -> ScheduleStore {
        ScheduleStore::new(dir.path().join("schedules.json"))
    }

    #[test]
    fn load_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load().unwrap().is_empty());
    }

    #[test]
    fn upsert_is_idempotent_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let schedule = Schedule::new_interval("hourly", 60);
        store.upsert(schedule.clone()).unwrap();
        store.upsert(schedule.clone()).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, schedule.id);
    }

    #[test]
    fn upsert_replaces_whole_record_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let first = Schedule::new_interval("first", 30);
        let second = Schedule::new_interval("second", 45);
        store.upsert(first.clone()).unwrap();
        store.upsert(second.clone()).unwrap();

        let mut updated = first.clone();
        updated.name = "first-renamed".to_string();
        updated.interval_minutes = Some(15);
        store.upsert(updated).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "first-renamed");
        assert_eq!(loaded[0].interval_minutes, Some(15));
        assert_eq!(loaded[1].id, second.id);
    }

    #[test]
    fn delete_absent_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.upsert(Schedule::new_interval("keep", 60)).unwrap();
        store.delete("no-such-id").unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn update_last_run_stamps_only_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let a = Schedule::new_interval("a", 60);
        let b = Schedule::new_interval("b", 60);
        store.upsert(a.clone()).unwrap();
        store.upsert(b.clone()).unwrap();

        let at = Utc::now();
        store.update_last_run(&a.id, at).unwrap();

        let loaded = store.load().unwrap();
        let got_a = loaded.iter().find(|s| s.id == a.id).unwrap();
        let got_b = loaded.iter().find(|s| s.id == b.id).unwrap();
        assert_eq!(got_a.last_run, Some(at));
        assert!(got_b.last_run.is_none());
    }

    #[test]
    fn corrupt_schedule_file_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = ScheduleStore::new(path);
        assert!(matches!(
            store.load(),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn last_check_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastCheckStore::new(dir.path().join("last_check.json"));
        assert!(store.load().unwrap().is_none());

        store
            .save(&LastCheckRecord {
                timestamp: Utc::now(),
                new_proposals_count: 2,
                protocols_with_new: vec!["ethereum".to_string()],
            })
            .unwrap();
        store
            .save(&LastCheckRecord {
                timestamp: Utc::now(),
                new_proposals_count: 0,
                protocols_with_new: vec![],
            })
            .unwrap();

        let record = store.load().unwrap().unwrap();
        assert_eq!(record.new_proposals_count, 0);
    }
}
