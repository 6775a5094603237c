//! A school wired to its replication bridge.
//!
//! [`SyncedSchool`] is what a host application holds: every command is applied
//! locally and then pushed, remote notifications are applied to the same
//! state, and pairing tokens are produced and consumed here.
//!
//! Hosts share it between the UI and backend callbacks as
//! `Arc<Mutex<SyncedSchool<B>>>`; each command or notification holds the lock
//! for exactly one mutation.

use crate::command::Applied;
use crate::import::{ImportSummary, StagedImport};
use crate::replication::{PushOutcome, ReceiveOutcome, RemotePath};
use crate::snapshot::{load_school, load_sync, save_school, save_sync};
use crate::{
    error::Result, BlobStore, Command, ConnectionState, EchoSuppression, Error, PairingPayload,
    RemoteBackend, RemoteConfig, ReplicationBridge, School, Subscription, SyncMetadata, Timestamp,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Wall-clock milliseconds since the epoch.
pub fn now_millis() -> Timestamp {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Local school state plus its replication link.
pub struct SyncedSchool<B: RemoteBackend> {
    school: School,
    bridge: ReplicationBridge,
    backend: Option<Arc<B>>,
    remote_config: Option<RemoteConfig>,
    subscriptions: Vec<Subscription>,
}

impl<B: RemoteBackend + 'static> SyncedSchool<B> {
    /// A school that lives on this device only.
    pub fn local(school: School, device_id: impl Into<String>) -> Self {
        Self {
            school,
            bridge: ReplicationBridge::new(SyncMetadata::unpaired(device_id)),
            backend: None,
            remote_config: None,
            subscriptions: Vec::new(),
        }
    }

    /// A school paired through `remote_config`.
    pub fn paired(
        school: School,
        metadata: SyncMetadata,
        remote_config: RemoteConfig,
        backend: Arc<B>,
    ) -> Self {
        Self {
            school,
            bridge: ReplicationBridge::new(metadata),
            backend: Some(backend),
            remote_config: Some(remote_config),
            subscriptions: Vec::new(),
        }
    }

    /// Create the shared school from this device and publish it.
    ///
    /// This device becomes the master.
    pub fn host(
        mut school: School,
        device_id: impl Into<String>,
        remote_config: RemoteConfig,
        backend: Arc<B>,
        echo: EchoSuppression,
        now: Timestamp,
    ) -> Self {
        let device_id = device_id.into();
        school.metadata.master_id = Some(device_id.clone());
        let metadata = SyncMetadata::paired(remote_config.school_id.clone(), device_id)
            .with_echo_suppression(echo);

        let mut synced = Self::paired(school, metadata, remote_config, backend);
        if let Some(backend) = synced.backend.clone() {
            synced.bridge.publish(backend.as_ref(), &synced.school, now);
        }
        synced
    }

    /// Join a school from a pairing token.
    pub fn join(
        token: &str,
        device_id: impl Into<String>,
        backend: Arc<B>,
        echo: EchoSuppression,
    ) -> Result<Self> {
        let payload = PairingPayload::decode(token)?;
        let remote_config = payload
            .remote_config
            .clone()
            .ok_or_else(|| Error::InvalidToken("missing remoteConfig".to_string()))?;
        let metadata = SyncMetadata::paired(remote_config.school_id.clone(), device_id)
            .with_echo_suppression(echo);

        tracing::info!(
            school_id = %remote_config.school_id,
            school = %payload.school_name,
            entities = payload.entities.len(),
            "Joined school"
        );

        Ok(Self::paired(payload.into_school(), metadata, remote_config, backend))
    }

    pub fn school(&self) -> &School {
        &self.school
    }

    pub fn bridge(&self) -> &ReplicationBridge {
        &self.bridge
    }

    pub fn state(&self) -> ConnectionState {
        self.bridge.state()
    }

    /// Apply a command locally, then push the field it changed.
    ///
    /// A failed push leaves the local change in place and the bridge in
    /// `Error`; it is not reported here.
    pub fn execute(&mut self, command: Command, now: Timestamp) -> Result<Applied> {
        let path = command.path();
        let applied = command.apply(&mut self.school)?;
        self.push(path, now);
        Ok(applied)
    }

    /// Finalize a staged import into the store and push the registry.
    pub fn finalize_import(&mut self, staged: StagedImport, now: Timestamp) -> ImportSummary {
        let summary = staged.finalize(&mut self.school.store);
        self.push(RemotePath::Entities, now);
        summary
    }

    fn push(&mut self, path: RemotePath, now: Timestamp) -> PushOutcome {
        let Some(backend) = self.backend.as_deref() else {
            return PushOutcome::Skipped;
        };
        let value = self.school.path_value(path);
        self.bridge.push(backend, path, value, now)
    }

    /// Apply a notification carrying the full school document.
    pub fn apply_remote(&mut self, notification: Value, now: Timestamp) -> Result<ReceiveOutcome> {
        self.bridge.receive(notification, &mut self.school, now)
    }

    pub fn on_connectivity(&mut self, online: bool) {
        self.bridge.on_connectivity(online);
    }

    /// A pairing token for another device to join this school.
    pub fn pairing_token(&self) -> Result<String> {
        let remote_config = self
            .remote_config
            .clone()
            .ok_or_else(|| Error::InvalidToken("school is not paired".to_string()))?;
        PairingPayload::from_school(&self.school, Some(remote_config)).encode()
    }

    /// Subscribe `shared` to its school document and to connectivity
    /// changes. Callbacks hold a weak reference and stop once the school is
    /// dropped.
    pub fn attach(shared: &Arc<Mutex<Self>>) -> Result<()> {
        let (backend, path) = {
            let this = shared.lock().unwrap_or_else(PoisonError::into_inner);
            match (this.backend.clone(), this.bridge.document_path()) {
                (Some(backend), Some(path)) => (backend, path),
                _ => return Err(Error::ReplicationFailure("school is not paired".to_string())),
            }
        };

        // The lock is released here: a backend may deliver the current value
        // from inside `subscribe`.

        let weak: Weak<Mutex<Self>> = Arc::downgrade(shared);
        let values = backend.subscribe(
            &path,
            Box::new(move |value| {
                let Some(shared) = weak.upgrade() else { return };
                let mut this = shared.lock().unwrap_or_else(PoisonError::into_inner);
                // Malformed notifications are logged by the bridge.
                let _ = this.apply_remote(value, now_millis());
            }),
        )?;

        let weak: Weak<Mutex<Self>> = Arc::downgrade(shared);
        let connectivity = backend.watch_connectivity(Box::new(move |online| {
            let Some(shared) = weak.upgrade() else { return };
            shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_connectivity(online);
        }))?;

        tracing::debug!(path = %path, "Attached to remote school document");
        let mut this = shared.lock().unwrap_or_else(PoisonError::into_inner);
        this.subscriptions.push(values);
        this.subscriptions.push(connectivity);
        Ok(())
    }

    /// Drop every backend subscription.
    pub fn detach(&mut self) {
        self.subscriptions.clear();
    }

    /// Persist school and replication state.
    pub fn save(&self, blobs: &mut dyn BlobStore, now: Timestamp) -> Result<()> {
        save_school(blobs, &self.school, now)?;
        save_sync(blobs, self.bridge.metadata())
    }
}

/// Restore a school and its replication metadata from the blob store.
pub fn load(blobs: &dyn BlobStore) -> Result<Option<(School, Option<SyncMetadata>)>> {
    let Some(school) = load_school(blobs)? else {
        return Ok(None);
    };
    Ok(Some((school, load_sync(blobs)?)))
}
