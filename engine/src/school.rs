//! Local school state.
//!
//! A [`School`] groups everything that replicates, in four top-level groups:
//!
//! | Group        | Fields                              |
//! |--------------|-------------------------------------|
//! | `metadata`   | `schoolName`, `academicYear`, `primaryColor` |
//! | `registry`   | `entities`, `students`              |
//! | `timing`     | `timeSlots`                         |
//! | `attendance` | `records`                           |

use crate::replication::RemotePath;
use crate::{
    error::Result, AttendanceLedger, EntityId, EntityProfile, Error, Period, ScheduleStore,
    StudentId, SyncGroup,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// School-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolMetadata {
    #[serde(default)]
    pub school_name: String,
    #[serde(default)]
    pub academic_year: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    /// Device that created the school
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_id: Option<String>,
}

/// A student enrolled in a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub class_entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<u32>,
}

/// Start and end of a period, as `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub period: Period,
    pub start: String,
    pub end: String,
}

/// All replicated state of one school.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct School {
    pub metadata: SchoolMetadata,
    pub store: ScheduleStore,
    pub students: Vec<Student>,
    pub time_slots: Vec<TimeSlot>,
    pub attendance: AttendanceLedger,
}

impl School {
    pub fn new(school_name: impl Into<String>, academic_year: impl Into<String>) -> Self {
        Self {
            metadata: SchoolMetadata {
                school_name: school_name.into(),
                academic_year: academic_year.into(),
                ..SchoolMetadata::default()
            },
            ..Self::default()
        }
    }

    /// Get a student by ID.
    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    /// Students of one class, in stable order.
    pub fn students_of(&self, class_entity_id: &str) -> impl Iterator<Item = &Student> + '_ {
        let class_entity_id = class_entity_id.to_string();
        self.students
            .iter()
            .filter(move |s| s.class_entity_id == class_entity_id)
    }

    /// Insert a student, replacing one with the same ID in place.
    pub fn upsert_student(&mut self, student: Student) {
        match self.students.iter_mut().find(|s| s.id == student.id) {
            Some(existing) => *existing = student,
            None => self.students.push(student),
        }
    }

    /// Remove a student.
    pub fn remove_student(&mut self, id: &str) -> Result<Student> {
        let position = self
            .students
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(self.students.remove(position))
    }

    /// Replace the time slot table, ordered by period.
    pub fn set_time_slots(&mut self, mut time_slots: Vec<TimeSlot>) {
        time_slots.sort_by_key(|slot| slot.period);
        self.time_slots = time_slots;
    }

    /// Current JSON value at a remote path.
    pub fn path_value(&self, path: RemotePath) -> Value {
        use RemotePath::*;

        let value = match path {
            SchoolName => serde_json::to_value(&self.metadata.school_name),
            AcademicYear => serde_json::to_value(&self.metadata.academic_year),
            PrimaryColor => serde_json::to_value(&self.metadata.primary_color),
            Entities => serde_json::to_value(&self.store),
            Students => serde_json::to_value(&self.students),
            TimeSlots => serde_json::to_value(&self.time_slots),
            Records => serde_json::to_value(&self.attendance),
        };
        // These types only hold strings, numbers and string-keyed maps.
        value.unwrap_or(Value::Null)
    }

    /// Current JSON value of a whole group.
    pub fn group_value(&self, group: SyncGroup) -> Value {
        let mut object = serde_json::Map::new();
        for path in RemotePath::ALL.into_iter().filter(|p| p.group() == group) {
            object.insert(path.field().to_string(), self.path_value(path));
        }
        Value::Object(object)
    }

    /// Replace the metadata group. `masterId` is local and kept.
    pub fn apply_metadata(&mut self, metadata: SchoolMetadata) {
        let master_id = self.metadata.master_id.take();
        self.metadata = SchoolMetadata {
            master_id: metadata.master_id.or(master_id),
            ..metadata
        };
    }

    /// Replace the registry group.
    pub fn apply_registry(&mut self, entities: Vec<EntityProfile>, students: Vec<Student>) {
        self.store.replace_all(entities);
        self.students = students;
    }
}
