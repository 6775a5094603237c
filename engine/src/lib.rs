//! # Timetable Engine
//!
//! A consistency and replication engine for a school's weekly timetable.
//!
//! A timetable is held twice: once per teacher and once per class. The two
//! views reference each other through human-readable codes and must stay
//! mirrored under edits, renames and bulk imports. Every local change is then
//! replicated to a shared remote document so that several devices operating
//! on the same school converge.
//!
//! ## Design Principles
//!
//! - **No IO**: the network and the local blob store sit behind traits
//! - **Synchronous mutations**: every local operation runs to completion
//! - **Deterministic**: IDs, serialization and resolution order are stable
//!
//! ## Core Concepts
//!
//! ### Schedules
//!
//! An [`EntityProfile`] is a teacher or a class with a [`WeeklySchedule`].
//! Schedules reference counterparts by canonical code (short code, or name
//! when no short code is set), never by ID.
//!
//! ### Mirror invariant
//!
//! [`ScheduleStore::set_slot`] writes the owner's slot and the reciprocal slot
//! on the counterpart; [`ScheduleStore::rename_entity`] rewrites every
//! reference to the old code.
//!
//! ### Imports
//!
//! The [`ImportReconciler`] merges independently extracted teacher-oriented and
//! class-oriented fragments into one consistent entity set, creating missing
//! counterparts. Results are staged and can be discarded before finalizing.
//!
//! ### Replication
//!
//! The [`ReplicationBridge`] pushes changed field groups to a
//! [`RemoteBackend`], suppresses the echo of its own writes and applies remote
//! notifications group by group, last writer wins.
//!
//! ## Quick Start
//!
//! ```rust
//! use timetable_engine::{Day, EntityKind, ScheduleStore, SlotEntry};
//!
//! let mut store = ScheduleStore::new();
//! let teacher = store.add_entity("John Doe", Some("JD".to_string()), EntityKind::Teacher);
//! let class = store.add_entity("10B", None, EntityKind::Class);
//!
//! store
//!     .set_slot(&teacher, Day::Monday, 2, Some(SlotEntry::linked("ENG", "10B")))
//!     .unwrap();
//!
//! let mirror = store.slot(&class, Day::Monday, 2).unwrap();
//! assert_eq!(mirror.subject, "ENG");
//! assert_eq!(mirror.linked_code.as_deref(), Some("JD"));
//! ```
//!
//! ## Persistence
//!
//! [`SchoolSnapshot`] and [`SyncMetadata`] are stored through a [`BlobStore`]
//! as deterministic JSON.

pub mod attendance;
pub mod command;
pub mod day;
pub mod entity;
pub mod error;
pub mod import;
pub mod index;
pub mod pairing;
pub mod replication;
pub mod school;
pub mod session;
pub mod slot;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use attendance::{AttendanceLedger, AttendanceRecord, AttendanceStatus, AttendanceSummary};
pub use command::{Applied, Command, MetadataChange};
pub use day::Day;
pub use entity::{EntityKind, EntityProfile, WeeklySchedule};
pub use error::Error;
pub use import::{
    ExtractionResult, FragmentSlot, ImportPayload, ImportReconciler, ImportSummary,
    ScheduleFragment, StagedImport,
};
pub use index::CodeIndex;
pub use pairing::{PairingPayload, RemoteConfig, PAIRING_VERSION};
pub use replication::{
    BackendError, ConnectionState, EchoSuppression, PushOutcome, ReceiveOutcome, RemoteBackend,
    RemoteDocument, RemotePath, ReplicationBridge, Subscription, SyncGroup, SyncMetadata,
};
pub use school::{School, SchoolMetadata, Student, TimeSlot};
pub use session::SyncedSchool;
pub use slot::{SlotEntry, SlotKind};
pub use snapshot::{BlobStore, MemoryBlobStore, SchoolSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use store::{RenameReport, ScheduleStore, SlotWrite};

/// Type aliases for clarity
pub type EntityId = String;
pub type Code = String;
pub type StudentId = String;
pub type Period = u32;
pub type Timestamp = u64;
