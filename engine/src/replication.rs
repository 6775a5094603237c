//! Replication to the shared school document.
//!
//! Every school lives at `schools/{schoolId}` on the remote store as one JSON
//! document with four top-level groups (`metadata`, `registry`, `timing`,
//! `attendance`) plus a `lastSyncTimestamp`. Local changes are pushed as
//! partial updates keyed by `"{group}.{field}"`; the remote store notifies
//! every subscriber with the full document after each write, including the
//! writer itself. The bridge suppresses that echo and applies everything else
//! group by group, last writer wins.
//!
//! ## Connection states
//!
//! ```text
//! Offline ──pair──▶ Connecting ──online──▶ Connected ◀──▶ Syncing
//!                        ▲                    │
//!                        └──────offline───────┘
//! ```
//!
//! `Error` is entered from any state when a push fails or a notification
//! cannot be read. Failed pushes are never retried.

use crate::{
    error::Result, AttendanceRecord, EntityProfile, Error, School, SchoolMetadata, Student,
    TimeSlot, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Field stamped on every write, in milliseconds since the epoch.
pub const LAST_SYNC_FIELD: &str = "lastSyncTimestamp";

/// Field carrying the writer token in correlated echo suppression.
pub const LAST_WRITER_FIELD: &str = "lastWriter";

/// Remote location of a school document.
pub fn school_path(school_id: &str) -> String {
    format!("schools/{school_id}")
}

/// State of the link to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Offline,
    Connecting,
    Connected,
    Syncing,
    Error,
}

/// Top-level group of the school document. Replication is last-writer-wins
/// per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncGroup {
    Metadata,
    Registry,
    Timing,
    Attendance,
}

impl SyncGroup {
    pub const ALL: [SyncGroup; 4] = [
        SyncGroup::Metadata,
        SyncGroup::Registry,
        SyncGroup::Timing,
        SyncGroup::Attendance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncGroup::Metadata => "metadata",
            SyncGroup::Registry => "registry",
            SyncGroup::Timing => "timing",
            SyncGroup::Attendance => "attendance",
        }
    }
}

impl fmt::Display for SyncGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SyncGroup::ALL
            .into_iter()
            .find(|group| group.as_str() == s)
            .ok_or_else(|| Error::InvalidNotification(format!("unknown group: {s}")))
    }
}

/// A replicated field. Each local command changes exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemotePath {
    SchoolName,
    AcademicYear,
    PrimaryColor,
    Entities,
    Students,
    TimeSlots,
    Records,
}

impl RemotePath {
    pub const ALL: [RemotePath; 7] = [
        RemotePath::SchoolName,
        RemotePath::AcademicYear,
        RemotePath::PrimaryColor,
        RemotePath::Entities,
        RemotePath::Students,
        RemotePath::TimeSlots,
        RemotePath::Records,
    ];

    pub fn group(self) -> SyncGroup {
        match self {
            RemotePath::SchoolName | RemotePath::AcademicYear | RemotePath::PrimaryColor => {
                SyncGroup::Metadata
            }
            RemotePath::Entities | RemotePath::Students => SyncGroup::Registry,
            RemotePath::TimeSlots => SyncGroup::Timing,
            RemotePath::Records => SyncGroup::Attendance,
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            RemotePath::SchoolName => "schoolName",
            RemotePath::AcademicYear => "academicYear",
            RemotePath::PrimaryColor => "primaryColor",
            RemotePath::Entities => "entities",
            RemotePath::Students => "students",
            RemotePath::TimeSlots => "timeSlots",
            RemotePath::Records => "records",
        }
    }

    /// Update key relative to the school document: `"{group}.{field}"`.
    pub fn key(self) -> String {
        format!("{}.{}", self.group(), self.field())
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group(), self.field())
    }
}

/// How the bridge recognizes its own writes coming back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EchoSuppression {
    /// One boolean armed before every push and consumed by the next
    /// notification, whatever its origin. Two pushes before the first echo
    /// leave the second echo unsuppressed.
    #[default]
    SharedFlag,
    /// Every push carries a `lastWriter` token; only notifications echoing a
    /// pending token are suppressed.
    Correlated,
}

/// Persisted replication state of this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub paired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
    pub device_id: String,
    /// When a remote notification was last applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<Timestamp>,
    #[serde(default)]
    pub connection_state: ConnectionState,
    #[serde(default)]
    pub echo_suppression: EchoSuppression,
}

impl SyncMetadata {
    /// A device that has never paired.
    pub fn unpaired(device_id: impl Into<String>) -> Self {
        Self {
            paired: false,
            school_id: None,
            device_id: device_id.into(),
            last_sync: None,
            connection_state: ConnectionState::Offline,
            echo_suppression: EchoSuppression::default(),
        }
    }

    /// A device paired with `school_id`.
    pub fn paired(school_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            paired: true,
            school_id: Some(school_id.into()),
            connection_state: ConnectionState::Connecting,
            ..Self::unpaired(device_id)
        }
    }

    pub fn with_echo_suppression(mut self, mode: EchoSuppression) -> Self {
        self.echo_suppression = mode;
        self
    }
}

/// Errors reported by a [`RemoteBackend`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("not connected")]
    Disconnected,
}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        Error::ReplicationFailure(err.to_string())
    }
}

/// Callback receiving the full document at a subscribed path.
pub type ValueCallback = Box<dyn Fn(Value) + Send + Sync>;

/// Callback receiving connectivity changes.
pub type ConnectivityCallback = Box<dyn Fn(bool) + Send + Sync>;

/// A path-addressable realtime document store.
///
/// Implementations deliver notifications from their own tasks. Callbacks must
/// not be invoked from inside `set` or `update`: the caller may hold the lock
/// the callback needs.
pub trait RemoteBackend: Send + Sync {
    /// Replace the value at `path`.
    fn set(&self, path: &str, value: Value) -> std::result::Result<(), BackendError>;

    /// Write several keys below `path` at once. Keys may be dotted to address
    /// nested fields.
    fn update(&self, path: &str, partial: Map<String, Value>)
        -> std::result::Result<(), BackendError>;

    /// Receive the value at `path` now and after every change.
    fn subscribe(
        &self,
        path: &str,
        callback: ValueCallback,
    ) -> std::result::Result<Subscription, BackendError>;

    /// Receive connectivity changes.
    fn watch_connectivity(
        &self,
        callback: ConnectivityCallback,
    ) -> std::result::Result<Subscription, BackendError>;
}

/// Handle to an active subscription. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// The school document as it arrives in a notification. Absent groups stay
/// `None` and are left untouched locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SchoolMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RemoteRegistry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<RemoteTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendance: Option<RemoteAttendance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_writer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRegistry {
    #[serde(default)]
    pub entities: Vec<EntityProfile>,
    #[serde(default)]
    pub students: Vec<Student>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTiming {
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAttendance {
    #[serde(default)]
    pub records: Vec<AttendanceRecord>,
}

impl RemoteDocument {
    /// The full document for `school`.
    pub fn from_school(school: &School, now: Timestamp) -> Self {
        Self {
            metadata: Some(school.metadata.clone()),
            registry: Some(RemoteRegistry {
                entities: school.store.entities().to_vec(),
                students: school.students.clone(),
            }),
            timing: Some(RemoteTiming {
                time_slots: school.time_slots.clone(),
            }),
            attendance: Some(RemoteAttendance {
                records: school.attendance.records().to_vec(),
            }),
            last_sync_timestamp: Some(now),
            last_writer: None,
        }
    }

    /// Groups present in this document.
    pub fn groups(&self) -> Vec<SyncGroup> {
        let mut groups = Vec::new();
        if self.metadata.is_some() {
            groups.push(SyncGroup::Metadata);
        }
        if self.registry.is_some() {
            groups.push(SyncGroup::Registry);
        }
        if self.timing.is_some() {
            groups.push(SyncGroup::Timing);
        }
        if self.attendance.is_some() {
            groups.push(SyncGroup::Attendance);
        }
        groups
    }

    /// Apply every present group to `school`, wholesale.
    pub fn apply_to(self, school: &mut School) {
        if let Some(metadata) = self.metadata {
            school.apply_metadata(metadata);
        }
        if let Some(registry) = self.registry {
            school.apply_registry(registry.entities, registry.students);
        }
        if let Some(timing) = self.timing {
            school.set_time_slots(timing.time_slots);
        }
        if let Some(attendance) = self.attendance {
            school.attendance.replace_all(attendance.records);
        }
    }
}

/// Outcome of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The bridge is not paired; nothing was sent
    Skipped,
    Delivered,
    /// The backend rejected the write; the bridge is in `Error`
    Failed(BackendError),
}

/// Outcome of an inbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Recognized as the echo of a local push and ignored
    Suppressed,
    /// These groups replaced their local counterparts
    Applied(Vec<SyncGroup>),
}

/// Moves changes between local state and the remote school document.
#[derive(Debug)]
pub struct ReplicationBridge {
    metadata: SyncMetadata,
    echo_armed: bool,
    pending_writers: VecDeque<String>,
    sequence: u64,
    last_error: Option<String>,
}

impl ReplicationBridge {
    /// Create a bridge from persisted metadata. A paired device starts in
    /// `Connecting`, any other in `Offline`.
    pub fn new(mut metadata: SyncMetadata) -> Self {
        metadata.connection_state = if metadata.paired {
            ConnectionState::Connecting
        } else {
            ConnectionState::Offline
        };
        Self {
            metadata,
            echo_armed: false,
            pending_writers: VecDeque::new(),
            sequence: 0,
            last_error: None,
        }
    }

    pub fn metadata(&self) -> &SyncMetadata {
        &self.metadata
    }

    pub fn state(&self) -> ConnectionState {
        self.metadata.connection_state
    }

    pub fn is_paired(&self) -> bool {
        self.metadata.paired && self.metadata.school_id.is_some()
    }

    /// Last push or receive failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether an echo is currently expected.
    pub fn echo_pending(&self) -> bool {
        match self.metadata.echo_suppression {
            EchoSuppression::SharedFlag => self.echo_armed,
            EchoSuppression::Correlated => !self.pending_writers.is_empty(),
        }
    }

    /// Remote path of the school document, when paired.
    pub fn document_path(&self) -> Option<String> {
        if !self.metadata.paired {
            return None;
        }
        self.metadata.school_id.as_deref().map(school_path)
    }

    /// Pair with a school. The bridge moves to `Connecting`.
    pub fn pair(&mut self, school_id: impl Into<String>) {
        self.metadata.paired = true;
        self.metadata.school_id = Some(school_id.into());
        self.transition(ConnectionState::Connecting);
    }

    /// Forget the pairing. The bridge moves to `Offline`.
    pub fn unpair(&mut self) {
        self.metadata.paired = false;
        self.metadata.school_id = None;
        self.echo_armed = false;
        self.pending_writers.clear();
        self.transition(ConnectionState::Offline);
    }

    fn transition(&mut self, next: ConnectionState) {
        let previous = self.metadata.connection_state;
        if previous != next {
            tracing::debug!(from = ?previous, to = ?next, "Connection state changed");
            self.metadata.connection_state = next;
        }
    }

    fn next_writer_token(&mut self) -> String {
        self.sequence += 1;
        format!("{}:{}", self.metadata.device_id, self.sequence)
    }

    /// Push one changed field.
    ///
    /// Sends `{"{group}.{field}": value, "lastSyncTimestamp": now}` as a
    /// partial update of the school document. Failures are logged, move the
    /// bridge to `Error` and are otherwise swallowed.
    pub fn push(
        &mut self,
        backend: &dyn RemoteBackend,
        path: RemotePath,
        value: Value,
        now: Timestamp,
    ) -> PushOutcome {
        let Some(document) = self.document_path() else {
            return PushOutcome::Skipped;
        };

        let mut partial = Map::new();
        partial.insert(path.key(), value);
        partial.insert(LAST_SYNC_FIELD.to_string(), Value::from(now));

        let token = match self.metadata.echo_suppression {
            EchoSuppression::SharedFlag => {
                self.echo_armed = true;
                None
            }
            EchoSuppression::Correlated => {
                let token = self.next_writer_token();
                partial.insert(LAST_WRITER_FIELD.to_string(), Value::from(token.clone()));
                self.pending_writers.push_back(token.clone());
                Some(token)
            }
        };

        if self.state() == ConnectionState::Connected {
            self.transition(ConnectionState::Syncing);
        }

        match backend.update(&document, partial) {
            Ok(()) => {
                tracing::debug!(path = %path, document = %document, "Pushed local change");
                self.last_error = None;
                self.transition(ConnectionState::Connected);
                PushOutcome::Delivered
            }
            Err(err) => {
                tracing::warn!(path = %path, document = %document, error = %err, "Push failed");
                // No echo will come for a rejected correlated write.
                if let Some(token) = token {
                    self.pending_writers.retain(|pending| *pending != token);
                }
                self.last_error = Some(err.to_string());
                self.transition(ConnectionState::Error);
                PushOutcome::Failed(err)
            }
        }
    }

    /// Publish the whole school, replacing the remote document. Used when a
    /// device creates the shared school.
    pub fn publish(&mut self, backend: &dyn RemoteBackend, school: &School, now: Timestamp) -> PushOutcome {
        let Some(document) = self.document_path() else {
            return PushOutcome::Skipped;
        };

        let mut snapshot = RemoteDocument::from_school(school, now);
        match self.metadata.echo_suppression {
            EchoSuppression::SharedFlag => self.echo_armed = true,
            EchoSuppression::Correlated => {
                let token = self.next_writer_token();
                self.pending_writers.push_back(token.clone());
                snapshot.last_writer = Some(token);
            }
        }

        let value = match serde_json::to_value(&snapshot) {
            Ok(value) => value,
            Err(err) => {
                self.last_error = Some(err.to_string());
                self.transition(ConnectionState::Error);
                return PushOutcome::Failed(BackendError::Rejected(err.to_string()));
            }
        };

        match backend.set(&document, value) {
            Ok(()) => {
                tracing::info!(document = %document, "Published school document");
                self.transition(ConnectionState::Connected);
                PushOutcome::Delivered
            }
            Err(err) => {
                tracing::warn!(document = %document, error = %err, "Publish failed");
                if let Some(token) = snapshot.last_writer {
                    self.pending_writers.retain(|pending| *pending != token);
                }
                self.last_error = Some(err.to_string());
                self.transition(ConnectionState::Error);
                PushOutcome::Failed(err)
            }
        }
    }

    /// Handle a notification carrying the full school document.
    pub fn receive(
        &mut self,
        notification: Value,
        school: &mut School,
        now: Timestamp,
    ) -> Result<ReceiveOutcome> {
        if self.metadata.echo_suppression == EchoSuppression::SharedFlag && self.echo_armed {
            self.echo_armed = false;
            tracing::debug!("Suppressed echo of local push");
            return Ok(ReceiveOutcome::Suppressed);
        }

        let document = match notification {
            // Nothing written yet.
            Value::Null => RemoteDocument::default(),
            Value::Object(_) => match serde_json::from_value::<RemoteDocument>(notification) {
                Ok(document) => document,
                Err(err) => return Err(self.reject(err.to_string())),
            },
            other => {
                return Err(self.reject(format!("expected an object, got {other}")));
            }
        };

        if self.metadata.echo_suppression == EchoSuppression::Correlated {
            if let Some(writer) = document.last_writer.as_deref() {
                if let Some(position) = self.pending_writers.iter().position(|p| p == writer) {
                    // Older tokens were superseded by this write.
                    self.pending_writers.drain(..=position);
                    tracing::debug!(writer = %writer, "Suppressed echo of local push");
                    return Ok(ReceiveOutcome::Suppressed);
                }
            }
        }

        let groups = document.groups();
        document.apply_to(school);
        self.metadata.last_sync = Some(now);
        if self.metadata.paired && self.state() != ConnectionState::Syncing {
            self.transition(ConnectionState::Connected);
        }

        tracing::debug!(groups = ?groups, "Applied remote notification");
        Ok(ReceiveOutcome::Applied(groups))
    }

    fn reject(&mut self, reason: String) -> Error {
        tracing::warn!(reason = %reason, "Malformed remote notification");
        self.last_error = Some(reason.clone());
        self.transition(ConnectionState::Error);
        Error::InvalidNotification(reason)
    }

    /// Connectivity changed. Flips a paired bridge between `Connected` and
    /// `Connecting`.
    pub fn on_connectivity(&mut self, online: bool) {
        if !self.metadata.paired {
            return;
        }
        match (online, self.state()) {
            (true, ConnectionState::Syncing) => {}
            (true, _) => self.transition(ConnectionState::Connected),
            (false, _) => self.transition(ConnectionState::Connecting),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A backend recording writes. Notifications are delivered by the test.
    #[derive(Default)]
    pub struct RecordingBackend {
        pub writes: Mutex<Vec<(String, Value)>>,
        pub fail: Mutex<bool>,
        pub subscribers: Arc<Mutex<Vec<ValueCallback>>>,
        pub watchers: Arc<Mutex<Vec<ConnectivityCallback>>>,
    }

    impl RecordingBackend {
        pub fn failing() -> Self {
            let backend = Self::default();
            *backend.fail.lock().unwrap() = true;
            backend
        }

        pub fn writes(&self) -> Vec<(String, Value)> {
            self.writes.lock().unwrap().clone()
        }

        pub fn notify(&self, value: Value) {
            for callback in self.subscribers.lock().unwrap().iter() {
                callback(value.clone());
            }
        }

        pub fn set_online(&self, online: bool) {
            for callback in self.watchers.lock().unwrap().iter() {
                callback(online);
            }
        }

        fn record(&self, path: &str, value: Value) -> std::result::Result<(), BackendError> {
            if *self.fail.lock().unwrap() {
                return Err(BackendError::Disconnected);
            }
            self.writes.lock().unwrap().push((path.to_string(), value));
            Ok(())
        }
    }

    impl RemoteBackend for RecordingBackend {
        fn set(&self, path: &str, value: Value) -> std::result::Result<(), BackendError> {
            self.record(path, value)
        }

        fn update(
            &self,
            path: &str,
            partial: Map<String, Value>,
        ) -> std::result::Result<(), BackendError> {
            self.record(path, Value::Object(partial))
        }

        fn subscribe(
            &self,
            _path: &str,
            callback: ValueCallback,
        ) -> std::result::Result<Subscription, BackendError> {
            self.subscribers.lock().unwrap().push(callback);
            let subscribers = Arc::clone(&self.subscribers);
            Ok(Subscription::new(move || subscribers.lock().unwrap().clear()))
        }

        fn watch_connectivity(
            &self,
            callback: ConnectivityCallback,
        ) -> std::result::Result<Subscription, BackendError> {
            self.watchers.lock().unwrap().push(callback);
            let watchers = Arc::clone(&self.watchers);
            Ok(Subscription::new(move || watchers.lock().unwrap().clear()))
        }
    }
}
