//! Structured commands.
//!
//! Every local change is expressed as a [`Command`]: forms, quick actions and
//! the natural-language interpreter all produce one. A command touches exactly
//! one replicated field, named by [`Command::path`], so the bridge can push
//! the minimal update.

use crate::replication::RemotePath;
use crate::{
    error::Result, AttendanceRecord, Code, Day, EntityId, EntityKind, EntityProfile, Period,
    RenameReport, School, SlotEntry, SlotWrite, Student, StudentId, TimeSlot,
};
use serde::{Deserialize, Serialize};

/// A change to one metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum MetadataChange {
    SchoolName(String),
    AcademicYear(String),
    PrimaryColor(Option<String>),
}

/// A local action on the school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Command {
    AddEntity {
        name: String,
        #[serde(default)]
        short_code: Option<Code>,
        kind: EntityKind,
    },
    RemoveEntity {
        id: EntityId,
    },
    RenameEntity {
        id: EntityId,
        name: String,
        #[serde(default)]
        short_code: Option<Code>,
    },
    SetSlot {
        owner_id: EntityId,
        day: Day,
        period: Period,
        /// `None` clears the slot
        #[serde(default)]
        entry: Option<SlotEntry>,
    },
    UpsertAttendance {
        records: Vec<AttendanceRecord>,
    },
    UpsertStudent {
        student: Student,
    },
    RemoveStudent {
        id: StudentId,
    },
    SetTimeSlots {
        time_slots: Vec<TimeSlot>,
    },
    SetMetadata {
        change: MetadataChange,
    },
}

/// What a command did.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    EntityAdded(EntityId),
    EntityRemoved(EntityProfile),
    EntityRenamed(RenameReport),
    SlotWritten(SlotWrite),
    StudentRemoved(Student),
    /// Attendance, students, time slots and metadata report nothing further
    Updated,
}

impl Command {
    /// The single remote field this command changes.
    pub fn path(&self) -> RemotePath {
        match self {
            Command::AddEntity { .. }
            | Command::RemoveEntity { .. }
            | Command::RenameEntity { .. }
            | Command::SetSlot { .. } => RemotePath::Entities,
            Command::UpsertAttendance { .. } => RemotePath::Records,
            Command::UpsertStudent { .. } | Command::RemoveStudent { .. } => RemotePath::Students,
            Command::SetTimeSlots { .. } => RemotePath::TimeSlots,
            Command::SetMetadata { change } => match change {
                MetadataChange::SchoolName(_) => RemotePath::SchoolName,
                MetadataChange::AcademicYear(_) => RemotePath::AcademicYear,
                MetadataChange::PrimaryColor(_) => RemotePath::PrimaryColor,
            },
        }
    }

    /// Apply the command to local state. Runs to completion or leaves the
    /// state untouched.
    pub fn apply(self, school: &mut School) -> Result<Applied> {
        let applied = match self {
            Command::AddEntity {
                name,
                short_code,
                kind,
            } => Applied::EntityAdded(school.store.add_entity(name, short_code, kind)),
            Command::RemoveEntity { id } => Applied::EntityRemoved(school.store.remove_entity(&id)?),
            Command::RenameEntity {
                id,
                name,
                short_code,
            } => Applied::EntityRenamed(school.store.rename_entity(&id, name, short_code)?),
            Command::SetSlot {
                owner_id,
                day,
                period,
                entry,
            } => Applied::SlotWritten(school.store.set_slot(&owner_id, day, period, entry)?),
            Command::UpsertAttendance { records } => {
                school.attendance.upsert_batch(records);
                Applied::Updated
            }
            Command::UpsertStudent { student } => {
                school.upsert_student(student);
                Applied::Updated
            }
            Command::RemoveStudent { id } => Applied::StudentRemoved(school.remove_student(&id)?),
            Command::SetTimeSlots { time_slots } => {
                school.set_time_slots(time_slots);
                Applied::Updated
            }
            Command::SetMetadata { change } => {
                match change {
                    MetadataChange::SchoolName(name) => school.metadata.school_name = name,
                    MetadataChange::AcademicYear(year) => school.metadata.academic_year = year,
                    MetadataChange::PrimaryColor(color) => school.metadata.primary_color = color,
                }
                Applied::Updated
            }
        };
        Ok(applied)
    }
}
