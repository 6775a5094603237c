//! Bulk import reconciliation.
//!
//! Imports arrive as schedule fragments extracted independently from a
//! teacher-oriented and a class-oriented document. The two sides rarely agree:
//! one may only know "Class" where the other knows "MATH", and either may
//! reference counterparts the store has never seen. The reconciler merges all
//! fragments into one mutually consistent entity set in two passes:
//!
//! 1. **Materialize**: find or create each fragment's entity and write its
//!    slots, keeping an existing real subject when the incoming one is only a
//!    placeholder.
//! 2. **Cross-pollinate**: for every linked slot, find or create the
//!    counterpart and write the reciprocal slot.
//!
//! The result is staged. Nothing reaches the live store until
//! [`StagedImport::finalize`] is called.

use crate::entity::derive_short_code;
use crate::slot::is_blank_or_generic;
use crate::{
    error::Result, Code, Day, EntityId, EntityKind, EntityProfile, Error, Period, ScheduleStore,
    SlotEntry,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One slot of an imported profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSlot {
    /// Free-form day token ("Mon", "tuesday")
    pub day: String,
    pub period: Period,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_code: Option<Code>,
}

impl FragmentSlot {
    pub fn new(day: impl Into<String>, period: Period, subject: impl Into<String>) -> Self {
        Self {
            day: day.into(),
            period,
            subject: subject.into(),
            linked_code: None,
        }
    }

    pub fn linked(mut self, code: impl Into<Code>) -> Self {
        self.linked_code = Some(code.into());
        self
    }

    fn link(&self) -> Option<&str> {
        self.linked_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

/// One imported profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFragment {
    #[serde(rename = "name", alias = "profileName")]
    pub profile_name: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_code: Option<Code>,
    #[serde(rename = "schedule", alias = "slots", default)]
    pub slots: Vec<FragmentSlot>,
}

impl ScheduleFragment {
    pub fn new(profile_name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            profile_name: profile_name.into(),
            kind,
            short_code: None,
            slots: Vec::new(),
        }
    }

    pub fn with_short_code(mut self, code: impl Into<Code>) -> Self {
        self.short_code = Some(code.into());
        self
    }

    pub fn with_slot(mut self, slot: FragmentSlot) -> Self {
        self.slots.push(slot);
        self
    }
}

/// Bulk import payload: `{profiles: [{name, kind, schedule: [...]}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPayload {
    #[serde(default)]
    pub profiles: Vec<ScheduleFragment>,
}

impl ImportPayload {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidImport(e.to_string()))
    }
}

/// A profile as returned by the document extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedProfile {
    #[serde(default)]
    pub name: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_code: Option<Code>,
    /// Day token → period → slot
    #[serde(default)]
    pub schedule: BTreeMap<String, BTreeMap<Period, Option<SlotEntry>>>,
}

/// Extraction result: `{profiles: [{name, kind, shortCode?, schedule}]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub profiles: Vec<ExtractedProfile>,
}

impl ExtractionResult {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidImport(e.to_string()))
    }

    /// Convert into fragments.
    ///
    /// Profiles with a blank name and days that do not normalize are skipped
    /// with a warning. Empty cells are dropped.
    pub fn into_fragments(self) -> Vec<ScheduleFragment> {
        let mut fragments = Vec::with_capacity(self.profiles.len());

        for profile in self.profiles {
            if profile.name.trim().is_empty() {
                tracing::warn!(kind = %profile.kind, "Skipping extracted profile without a name");
                continue;
            }

            let mut fragment = ScheduleFragment {
                profile_name: profile.name.trim().to_string(),
                kind: profile.kind,
                short_code: profile.short_code,
                slots: Vec::new(),
            };

            for (token, periods) in profile.schedule {
                let Some(day) = Day::normalize(&token) else {
                    tracing::warn!(profile = %fragment.profile_name, day = %token, "Skipping unknown day");
                    continue;
                };
                for (period, entry) in periods {
                    let Some(entry) = entry else { continue };
                    fragment.slots.push(FragmentSlot {
                        day: day.name().to_string(),
                        period,
                        subject: entry.subject,
                        linked_code: entry.linked_code,
                    });
                }
            }

            fragments.push(fragment);
        }

        fragments
    }
}

/// Counts and created entities of one import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Entities that did not exist before, in creation order
    pub created: Vec<EntityId>,
    /// Fragment slots written to their own entity
    pub applied_slots: usize,
    /// Reciprocal slots written to counterparts
    pub mirrored_slots: usize,
    /// Fragment slots dropped (unknown day, empty cell)
    pub skipped_slots: usize,
}

/// Merges fragments into a copy of an existing entity set.
#[derive(Debug)]
pub struct ImportReconciler {
    store: ScheduleStore,
    summary: ImportSummary,
}

impl ImportReconciler {
    /// Start from the entities of `existing`. The live store is not touched;
    /// unchanged schedule days stay shared with it.
    pub fn new(existing: &ScheduleStore) -> Self {
        Self {
            store: existing.clone(),
            summary: ImportSummary::default(),
        }
    }

    /// Shorthand for `ImportReconciler::new(existing).merge(fragments)`.
    pub fn stage(existing: &ScheduleStore, fragments: Vec<ScheduleFragment>) -> Result<StagedImport> {
        Self::new(existing).merge(fragments)
    }

    /// Run both passes over `fragments`.
    pub fn merge(mut self, fragments: Vec<ScheduleFragment>) -> Result<StagedImport> {
        let mut sources: Vec<(EntityId, &ScheduleFragment)> = Vec::with_capacity(fragments.len());

        for fragment in &fragments {
            if fragment.profile_name.trim().is_empty() {
                tracing::warn!(kind = %fragment.kind, "Skipping fragment without a profile name");
                continue;
            }
            let id = self.materialize(fragment);
            sources.push((id, fragment));
        }

        if sources.is_empty() {
            return Err(Error::ImportEmpty);
        }

        let subjects = self.settled_subjects(&sources);
        for (source_id, fragment) in &sources {
            self.cross_pollinate(source_id, fragment, &subjects);
        }

        tracing::debug!(
            fragments = sources.len(),
            created = self.summary.created.len(),
            applied = self.summary.applied_slots,
            mirrored = self.summary.mirrored_slots,
            skipped = self.summary.skipped_slots,
            "Staged import"
        );

        Ok(StagedImport {
            store: self.store,
            summary: self.summary,
        })
    }

    fn find_or_create(&mut self, kind: EntityKind, name: &str, short_code: Option<&str>) -> EntityId {
        if let Some(existing) = self.store.find_by_name_or_code(kind, name) {
            return existing.id.clone();
        }

        let short_code = match short_code.map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => derive_short_code(name),
        };
        let id = self.store.add_entity(name, Some(short_code), kind);
        self.summary.created.push(id.clone());
        id
    }

    /// Pass 1 for one fragment.
    fn materialize(&mut self, fragment: &ScheduleFragment) -> EntityId {
        let name = fragment.profile_name.trim();
        let id = self.find_or_create(fragment.kind, name, fragment.short_code.as_deref());

        for slot in &fragment.slots {
            let Some(day) = Day::normalize(&slot.day) else {
                tracing::warn!(profile = %name, day = %slot.day, "Skipping slot with unknown day");
                self.summary.skipped_slots += 1;
                continue;
            };
            let link = slot.link();
            if slot.subject.trim().is_empty() && link.is_none() {
                self.summary.skipped_slots += 1;
                continue;
            }

            let entry = match self.store.slot(&id, day, slot.period).cloned() {
                Some(mut current)
                    if !is_blank_or_generic(&current.subject)
                        && is_blank_or_generic(&slot.subject) =>
                {
                    if let Some(code) = link {
                        current.linked_code = Some(code.to_string());
                    }
                    current
                }
                current => SlotEntry {
                    subject: slot.subject.trim().to_string(),
                    room: current.and_then(|c| c.room),
                    linked_code: link.map(str::to_string),
                    ..SlotEntry::default()
                },
            };

            // The entity was just found or created, so the write cannot fail.
            if self.store.put_slot(&id, day, slot.period, Some(entry)).is_ok() {
                self.summary.applied_slots += 1;
            }
        }

        id
    }

    /// Subject of every fragment slot as it stands after pass 1. Pass 2 reads
    /// only these, never slots rewritten by other reciprocal writes.
    fn settled_subjects(&self, sources: &[(EntityId, &ScheduleFragment)]) -> SettledSubjects {
        let mut subjects = SettledSubjects::new();
        for (source_id, fragment) in sources {
            for slot in &fragment.slots {
                let Some(day) = Day::normalize(&slot.day) else { continue };
                if let Some(settled) = self.store.slot(source_id, day, slot.period) {
                    subjects.insert(
                        (source_id.clone(), day, slot.period),
                        settled.subject.clone(),
                    );
                }
            }
        }
        subjects
    }

    /// Pass 2 for one fragment.
    fn cross_pollinate(
        &mut self,
        source_id: &str,
        fragment: &ScheduleFragment,
        subjects: &SettledSubjects,
    ) {
        let Some(source) = self.store.get(source_id) else {
            return;
        };
        let source_kind = source.kind;
        let source_code = source.canonical_code().to_string();
        let counterpart_kind = source_kind.opposite();

        for slot in &fragment.slots {
            let Some(code) = slot.link() else { continue };
            let Some(day) = Day::normalize(&slot.day) else { continue };

            let counterpart_id = match self
                .store
                .resolve(counterpart_kind, code)
                .or_else(|| self.store.find_by_name_or_code(counterpart_kind, code))
            {
                Some(counterpart) => counterpart.id.clone(),
                None => self.find_or_create(counterpart_kind, code, None),
            };

            let subject = subjects
                .get(&(source_id.to_string(), day, slot.period))
                .cloned()
                .unwrap_or_else(|| slot.subject.trim().to_string());

            // A teacher source only fills placeholders. A class source
            // overrides the teacher's subject unless it only has a
            // placeholder to offer.
            let existing = self.store.slot(&counterpart_id, day, slot.period).cloned();
            let subject = match &existing {
                Some(current)
                    if !is_blank_or_generic(&current.subject)
                        && (source_kind == EntityKind::Teacher
                            || is_blank_or_generic(&subject)) =>
                {
                    current.subject.clone()
                }
                _ => subject,
            };

            let reciprocal = SlotEntry {
                subject,
                room: existing.and_then(|c| c.room),
                linked_code: Some(source_code.clone()),
                ..SlotEntry::default()
            };

            if self
                .store
                .put_slot(&counterpart_id, day, slot.period, Some(reciprocal))
                .is_ok()
            {
                self.summary.mirrored_slots += 1;
            }
        }
    }
}

type SettledSubjects = BTreeMap<(EntityId, Day, Period), String>;

/// A reconciled entity set waiting to be finalized or discarded.
#[derive(Debug, Clone)]
#[must_use = "a staged import does nothing until finalized"]
pub struct StagedImport {
    store: ScheduleStore,
    summary: ImportSummary,
}

impl StagedImport {
    /// The reconciled entities, in stable order.
    pub fn entities(&self) -> &[EntityProfile] {
        self.store.entities()
    }

    /// Resolve a code inside the staged set.
    pub fn resolve(&self, kind: EntityKind, code: &str) -> Option<&EntityProfile> {
        self.store.resolve(kind, code)
    }

    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    /// Drop the staged result. The live store is unaffected.
    pub fn discard(self) {
        tracing::debug!(entities = self.store.len(), "Discarded staged import");
    }

    /// Replace the live store's entity set with the staged one.
    pub fn finalize(self, store: &mut ScheduleStore) -> ImportSummary {
        tracing::info!(
            entities = self.store.len(),
            created = self.summary.created.len(),
            "Finalized import"
        );
        store.replace_all(self.store.into_entities());
        self.summary
    }
}
