//! Snapshot types for persisting and restoring local state.
//!
//! The host platform offers an opaque key-value blob store. The school is
//! saved under [`SCHOOL_KEY`] as a [`SchoolSnapshot`] and the replication
//! state under [`SYNC_KEY`] as [`SyncMetadata`], both as deterministic JSON.

use crate::{
    error::Result, AttendanceLedger, AttendanceRecord, EntityProfile, Error, School,
    SchoolMetadata, ScheduleStore, Student, SyncMetadata, TimeSlot, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Blob key of the school snapshot.
pub const SCHOOL_KEY: &str = "timetable.school";

/// Blob key of the replication metadata.
pub const SYNC_KEY: &str = "timetable.sync";

/// Opaque string storage provided by the host.
pub trait BlobStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
}

/// In-memory blob store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryBlobStore {
    blobs: BTreeMap<String, String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Option<String> {
        self.blobs.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.blobs.insert(key.to_string(), value);
    }
}

/// A point-in-time snapshot of the school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// When the snapshot was taken
    pub saved_at: Timestamp,
    pub metadata: SchoolMetadata,
    /// Entities in store order
    pub entities: Vec<EntityProfile>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
}

impl SchoolSnapshot {
    /// Capture `school`. Schedule days are shared with the live store, not
    /// copied.
    pub fn capture(school: &School, saved_at: Timestamp) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved_at,
            metadata: school.metadata.clone(),
            entities: school.store.entities().to_vec(),
            students: school.students.clone(),
            time_slots: school.time_slots.clone(),
            attendance: school.attendance.records().to_vec(),
        }
    }

    /// Rebuild the school.
    pub fn restore(self) -> School {
        School {
            metadata: self.metadata,
            store: ScheduleStore::from_entities(self.entities),
            students: self.students,
            time_slots: self.time_slots,
            attendance: AttendanceLedger::from_records(self.attendance),
        }
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}

/// Save the school under [`SCHOOL_KEY`].
pub fn save_school(blobs: &mut dyn BlobStore, school: &School, now: Timestamp) -> Result<()> {
    let json = SchoolSnapshot::capture(school, now).to_json()?;
    blobs.set(SCHOOL_KEY, json);
    Ok(())
}

/// Load the school, if one was saved.
pub fn load_school(blobs: &dyn BlobStore) -> Result<Option<School>> {
    blobs
        .get(SCHOOL_KEY)
        .map(|json| SchoolSnapshot::from_json(&json).map(SchoolSnapshot::restore))
        .transpose()
}

/// Save the replication metadata under [`SYNC_KEY`].
pub fn save_sync(blobs: &mut dyn BlobStore, metadata: &SyncMetadata) -> Result<()> {
    let json =
        serde_json::to_string(metadata).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
    blobs.set(SYNC_KEY, json);
    Ok(())
}

/// Load the replication metadata, if any was saved.
pub fn load_sync(blobs: &dyn BlobStore) -> Result<Option<SyncMetadata>> {
    blobs
        .get(SYNC_KEY)
        .map(|json| {
            serde_json::from_str(&json).map_err(|e| Error::InvalidSnapshot(e.to_string()))
        })
        .transpose()
}
