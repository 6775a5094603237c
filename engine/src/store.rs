//! ScheduleStore - the in-memory timetable.
//!
//! The store holds every teacher and class profile in a stable order and
//! keeps the two views mirrored: writing a linked slot on one side writes the
//! reciprocal slot on the counterpart, and renames propagate to every slot that
//! references the old code.

use crate::entity::{canonical_code, entity_id_base};
use crate::index::{CodeIndex, Position};
use crate::{
    error::Result, Code, Day, EntityId, EntityKind, EntityProfile, Error, Period, SlotEntry,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of a slot write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotWrite {
    /// The entity whose slot was written
    pub owner_id: EntityId,
    /// The value the slot held before the write
    pub previous: Option<SlotEntry>,
    /// Counterparts whose mirror slot was overwritten
    pub mirrored: Vec<EntityId>,
    /// Counterparts whose mirror slot was cleared
    pub cleared: Vec<EntityId>,
    /// Linked codes no counterpart could be resolved for
    pub unresolved: Vec<Code>,
}

impl SlotWrite {
    fn new(owner_id: &str, previous: Option<SlotEntry>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            previous,
            mirrored: Vec::new(),
            cleared: Vec::new(),
            unresolved: Vec::new(),
        }
    }
}

/// Result of a rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameReport {
    pub id: EntityId,
    pub old_code: Code,
    pub new_code: Code,
    /// Number of code fields rewritten in other entities
    pub rewritten_fields: usize,
    /// Entities that had at least one field rewritten
    pub touched: Vec<EntityId>,
}

/// All entity profiles, in stable insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<EntityProfile>", into = "Vec<EntityProfile>")]
pub struct ScheduleStore {
    entities: Vec<EntityProfile>,
    positions: HashMap<EntityId, Position>,
    index: CodeIndex,
}

impl From<Vec<EntityProfile>> for ScheduleStore {
    fn from(entities: Vec<EntityProfile>) -> Self {
        Self::from_entities(entities)
    }
}

impl From<ScheduleStore> for Vec<EntityProfile> {
    fn from(store: ScheduleStore) -> Self {
        store.entities
    }
}

impl PartialEq for ScheduleStore {
    fn eq(&self, other: &Self) -> bool {
        self.entities == other.entities
    }
}

impl ScheduleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `entities` in the given order.
    pub fn from_entities(entities: Vec<EntityProfile>) -> Self {
        let mut store = Self {
            entities,
            positions: HashMap::new(),
            index: CodeIndex::default(),
        };
        store.reindex();
        store
    }

    fn reindex(&mut self) {
        self.positions = self
            .entities
            .iter()
            .enumerate()
            .map(|(position, entity)| (entity.id.clone(), position))
            .collect();
        self.index = CodeIndex::build(&self.entities);
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the store holds no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All entities in stable order.
    pub fn entities(&self) -> &[EntityProfile] {
        &self.entities
    }

    /// Entities of one kind, in stable order.
    pub fn by_kind(&self, kind: EntityKind) -> impl Iterator<Item = &EntityProfile> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }

    /// Get an entity by ID.
    pub fn get(&self, id: &str) -> Option<&EntityProfile> {
        self.positions.get(id).map(|&p| &self.entities[p])
    }

    /// Get the slot of an entity at (day, period).
    pub fn slot(&self, id: &str, day: Day, period: Period) -> Option<&SlotEntry> {
        self.get(id)?.schedule.get(day, period)
    }

    /// Resolve a canonical code to an entity of `kind`.
    ///
    /// Matches short codes first, then names; the first entity in store
    /// order wins when several match.
    pub fn resolve(&self, kind: EntityKind, code: &str) -> Option<&EntityProfile> {
        self.index.resolve(kind, code).map(|p| &self.entities[p])
    }

    /// First entity of `kind` whose name or short code equals `text`,
    /// ignoring case.
    pub fn find_by_name_or_code(&self, kind: EntityKind, text: &str) -> Option<&EntityProfile> {
        self.by_kind(kind).find(|e| e.matches_name_or_code(text))
    }

    /// A fresh deterministic ID for an entity named `name`.
    pub fn next_id(&self, kind: EntityKind, name: &str) -> EntityId {
        let base = entity_id_base(kind, name);
        if !self.positions.contains_key(&base) {
            return base;
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base}-{suffix}");
            if !self.positions.contains_key(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Add a new entity with an empty schedule and return its ID.
    pub fn add_entity(
        &mut self,
        name: impl Into<String>,
        short_code: Option<Code>,
        kind: EntityKind,
    ) -> EntityId {
        let name = name.into();
        let id = self.next_id(kind, &name);
        self.insert_entity(EntityProfile::new(id.clone(), name, short_code, kind));
        id
    }

    /// Insert a complete profile. A profile with an existing ID replaces the
    /// stored one in place.
    pub fn insert_entity(&mut self, profile: EntityProfile) {
        match self.positions.get(&profile.id) {
            Some(&position) => {
                self.entities[position] = profile;
                self.index = CodeIndex::build(&self.entities);
            }
            None => {
                let position = self.entities.len();
                self.positions.insert(profile.id.clone(), position);
                self.index.insert(position, &profile);
                self.entities.push(profile);
            }
        }
    }

    /// Remove an entity.
    ///
    /// Slots in other entities that reference the removed entity's code are
    /// left as they are.
    pub fn remove_entity(&mut self, id: &str) -> Result<EntityProfile> {
        let position = *self
            .positions
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let removed = self.entities.remove(position);
        self.reindex();
        Ok(removed)
    }

    /// Replace the whole entity set.
    pub fn replace_all(&mut self, entities: Vec<EntityProfile>) {
        self.entities = entities;
        self.reindex();
    }

    /// Write or clear a slot and keep the counterpart's mirror in step.
    ///
    /// The primary write always happens. For a written entry, every linked
    /// code is resolved against entities of the opposite kind and the
    /// counterpart's slot at the same (day, period) is overwritten with a
    /// mirror pointing back at the owner. When clearing, the counterparts of
    /// the previous entry are cleared only if their mirror still points back
    /// at the owner. Unresolvable codes are skipped.
    pub fn set_slot(
        &mut self,
        owner_id: &str,
        day: Day,
        period: Period,
        entry: Option<SlotEntry>,
    ) -> Result<SlotWrite> {
        let owner_position = *self
            .positions
            .get(owner_id)
            .ok_or_else(|| Error::NotFound(owner_id.to_string()))?;

        let owner = &mut self.entities[owner_position];
        let counterpart_kind = owner.kind.opposite();
        let owner_code = owner.canonical_code().to_string();
        let previous = owner.schedule.set(day, period, entry.clone());

        let mut write = SlotWrite::new(owner_id, previous);

        match (&entry, &write.previous) {
            (Some(entry), _) => {
                for link in entry.links() {
                    let Some(position) = self.index.resolve(counterpart_kind, link.code) else {
                        tracing::debug!(
                            owner = %owner_id,
                            code = %link.code,
                            "No counterpart for linked code, mirror skipped"
                        );
                        write.unresolved.push(link.code.to_string());
                        continue;
                    };

                    let counterpart = &mut self.entities[position];
                    let mirror = SlotEntry::mirror(link.subject, entry.room.as_deref(), &owner_code);
                    counterpart.schedule.set(day, period, Some(mirror));
                    write.mirrored.push(counterpart.id.clone());
                }
            }
            (None, Some(previous)) => {
                for link in previous.links() {
                    let Some(position) = self.index.resolve(counterpart_kind, link.code) else {
                        write.unresolved.push(link.code.to_string());
                        continue;
                    };

                    let counterpart = &mut self.entities[position];
                    let points_back = counterpart
                        .schedule
                        .get(day, period)
                        .and_then(|slot| slot.linked_code.as_deref())
                        == Some(owner_code.as_str());

                    if points_back {
                        counterpart.schedule.set(day, period, None);
                        write.cleared.push(counterpart.id.clone());
                    }
                }
            }
            (None, None) => {}
        }

        Ok(write)
    }

    /// Rename an entity and propagate its new code.
    ///
    /// When neither the canonical code nor the name changes only the entity
    /// itself is updated. Otherwise every other entity's `linkedCode`,
    /// `splitLinkedCode` and `targetCodes` entries equal to the old code or
    /// the old name are rewritten to the new code.
    pub fn rename_entity(
        &mut self,
        id: &str,
        new_name: impl Into<String>,
        new_short_code: Option<Code>,
    ) -> Result<RenameReport> {
        let position = *self
            .positions
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let new_name = new_name.into();
        let new_code = canonical_code(new_short_code.as_deref(), &new_name).to_string();

        let entity = &mut self.entities[position];
        let old_name = std::mem::replace(&mut entity.name, new_name);
        let old_code = canonical_code(entity.short_code.as_deref(), &old_name).to_string();
        entity.short_code = new_short_code;

        let mut report = RenameReport {
            id: id.to_string(),
            old_code: old_code.clone(),
            new_code: new_code.clone(),
            rewritten_fields: 0,
            touched: Vec::new(),
        };

        if old_code != new_code || old_name != entity.name {
            let old = [old_code.as_str(), old_name.as_str()];
            for (other_position, other) in self.entities.iter_mut().enumerate() {
                if other_position == position {
                    continue;
                }
                let rewritten = other.schedule.rewrite_codes(&old, &new_code);
                if rewritten > 0 {
                    report.rewritten_fields += rewritten;
                    report.touched.push(other.id.clone());
                }
            }

            tracing::debug!(
                id = %id,
                old_code = %old_code,
                new_code = %new_code,
                rewritten = report.rewritten_fields,
                "Propagated entity rename"
            );
        }

        self.reindex();
        Ok(report)
    }

    /// Write a slot without touching any counterpart.
    pub(crate) fn put_slot(
        &mut self,
        id: &str,
        day: Day,
        period: Period,
        entry: Option<SlotEntry>,
    ) -> Result<Option<SlotEntry>> {
        let position = *self
            .positions
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(self.entities[position].schedule.set(day, period, entry))
    }

    /// Consume the store and return its entities.
    pub fn into_entities(self) -> Vec<EntityProfile> {
        self.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SlotKind;

    fn test_store() -> (ScheduleStore, EntityId, EntityId) {
        let mut store = ScheduleStore::new();
        let teacher = store.add_entity("John Doe", Some("JD".into()), EntityKind::Teacher);
        let class = store.add_entity("10B", None, EntityKind::Class);
        (store, teacher, class)
    }

    #[test]
    fn add_and_get() {
        let (store, teacher, class) = test_store();
        assert_eq!(store.len(), 2);
        assert_eq!(teacher, "teacher-john-doe");
        assert_eq!(class, "class-10b");
        assert_eq!(store.get(&teacher).unwrap().canonical_code(), "JD");
    }

    #[test]
    fn ids_are_unique() {
        let mut store = ScheduleStore::new();
        let first = store.add_entity("10A", None, EntityKind::Class);
        let second = store.add_entity("10A", None, EntityKind::Class);
        assert_eq!(first, "class-10a");
        assert_eq!(second, "class-10a-2");
    }

    #[test]
    fn set_slot_unknown_owner() {
        let (mut store, _, _) = test_store();
        let result = store.set_slot("nobody", Day::Monday, 1, Some(SlotEntry::new("ART")));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn set_slot_mirrors_counterpart() {
        let (mut store, teacher, class) = test_store();

        let write = store
            .set_slot(
                &teacher,
                Day::Monday,
                2,
                Some(SlotEntry::linked("ENG", "10B").with_room("R7")),
            )
            .unwrap();

        assert_eq!(write.mirrored, vec![class.clone()]);
        let mirror = store.slot(&class, Day::Monday, 2).unwrap();
        assert_eq!(mirror.subject, "ENG");
        assert_eq!(mirror.room.as_deref(), Some("R7"));
        assert_eq!(mirror.linked_code.as_deref(), Some("JD"));
    }

    #[test]
    fn set_slot_unresolved_link_is_primary_only() {
        let (mut store, teacher, _) = test_store();

        let write = store
            .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("ENG", "12Z")))
            .unwrap();

        assert_eq!(write.unresolved, vec!["12Z".to_string()]);
        assert!(write.mirrored.is_empty());
        assert_eq!(store.len(), 2);
        assert!(store.slot(&teacher, Day::Monday, 1).is_some());
    }

    #[test]
    fn clear_removes_mirror_pointing_back() {
        let (mut store, teacher, class) = test_store();
        store
            .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("ENG", "10B")))
            .unwrap();

        let write = store.set_slot(&teacher, Day::Monday, 1, None).unwrap();

        assert_eq!(write.cleared, vec![class.clone()]);
        assert!(store.slot(&teacher, Day::Monday, 1).is_none());
        assert!(store.slot(&class, Day::Monday, 1).is_none());
    }

    #[test]
    fn clear_keeps_repointed_mirror() {
        let (mut store, teacher, class) = test_store();
        let other = store.add_entity("Ann Smith", Some("AS".into()), EntityKind::Teacher);

        store
            .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("ENG", "10B")))
            .unwrap();
        // The class has since been given to another teacher.
        store
            .set_slot(&class, Day::Monday, 1, Some(SlotEntry::linked("ART", "AS")))
            .unwrap();

        let write = store.set_slot(&teacher, Day::Monday, 1, None).unwrap();

        assert!(write.cleared.is_empty());
        let kept = store.slot(&class, Day::Monday, 1).unwrap();
        assert_eq!(kept.linked_code.as_deref(), Some("AS"));
        assert!(store.slot(&other, Day::Monday, 1).is_some());
    }

    #[test]
    fn combined_slot_mirrors_every_target() {
        let (mut store, teacher, class_b) = test_store();
        let class_a = store.add_entity("10A", None, EntityKind::Class);

        let write = store
            .set_slot(
                &teacher,
                Day::Friday,
                4,
                Some(SlotEntry::combined("PE", vec!["10A".into(), "10B".into()])),
            )
            .unwrap();

        assert_eq!(write.mirrored, vec![class_a.clone(), class_b.clone()]);
        for class in [&class_a, &class_b] {
            let mirror = store.slot(class, Day::Friday, 4).unwrap();
            assert_eq!(mirror.subject, "PE");
            assert_eq!(mirror.linked_code.as_deref(), Some("JD"));
            assert_eq!(mirror.kind, SlotKind::Normal);
        }
    }

    #[test]
    fn mirror_resolution_prefers_short_code_then_first() {
        let mut store = ScheduleStore::new();
        let named = store.add_entity("AB", None, EntityKind::Teacher);
        let coded = store.add_entity("Alice Brown", Some("AB".into()), EntityKind::Teacher);
        let class = store.add_entity("9C", None, EntityKind::Class);

        let write = store
            .set_slot(&class, Day::Tuesday, 3, Some(SlotEntry::linked("BIO", "AB")))
            .unwrap();

        assert_eq!(write.mirrored, vec![coded.clone()]);
        assert!(store.slot(&named, Day::Tuesday, 3).is_none());
    }

    #[test]
    fn rename_propagates_code() {
        let (mut store, teacher, class) = test_store();
        store
            .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("ENG", "10B")))
            .unwrap();

        let report = store
            .rename_entity(&class, "10B-NEW", None)
            .unwrap();

        assert_eq!(report.old_code, "10B");
        assert_eq!(report.new_code, "10B-NEW");
        assert_eq!(report.touched, vec![teacher.clone()]);
        let slot = store.slot(&teacher, Day::Monday, 1).unwrap();
        assert_eq!(slot.linked_code.as_deref(), Some("10B-NEW"));
        assert_eq!(store.resolve(EntityKind::Class, "10B-NEW").unwrap().id, class);
        assert!(store.resolve(EntityKind::Class, "10B").is_none());
    }

    #[test]
    fn rename_rewrites_old_name_references() {
        let (mut store, teacher, class) = test_store();
        // A slot that references the teacher by name rather than code.
        store
            .put_slot(&class, Day::Monday, 5, Some(SlotEntry::linked("ENG", "John Doe")))
            .unwrap();

        store
            .rename_entity(&teacher, "John Doe", Some("JDO".into()))
            .unwrap();

        let slot = store.slot(&class, Day::Monday, 5).unwrap();
        assert_eq!(slot.linked_code.as_deref(), Some("JDO"));
    }

    #[test]
    fn rename_without_code_change_touches_nothing_else() {
        let (mut store, teacher, class) = test_store();
        store
            .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("ENG", "10B")))
            .unwrap();

        let report = store
            .rename_entity(&teacher, "John Doe", Some("JD".into()))
            .unwrap();

        assert_eq!(report.rewritten_fields, 0);
        assert_eq!(
            store.slot(&class, Day::Monday, 1).unwrap().linked_code.as_deref(),
            Some("JD")
        );
    }

    #[test]
    fn rename_unknown_entity() {
        let (mut store, _, _) = test_store();
        let result = store.rename_entity("ghost", "X", None);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn remove_leaves_dangling_references() {
        let (mut store, teacher, class) = test_store();
        store
            .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("ENG", "10B")))
            .unwrap();

        store.remove_entity(&class).unwrap();

        assert_eq!(store.len(), 1);
        let slot = store.slot(&teacher, Day::Monday, 1).unwrap();
        assert_eq!(slot.linked_code.as_deref(), Some("10B"));
        assert!(store.resolve(EntityKind::Class, "10B").is_none());
    }

    #[test]
    fn store_serialization() {
        let (mut store, teacher, _) = test_store();
        store
            .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("ENG", "10B")))
            .unwrap();

        let json = serde_json::to_string(&store).unwrap();
        let restored: ScheduleStore = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, store);
        assert!(restored.resolve(EntityKind::Teacher, "JD").is_some());
    }
}
