//! Edge case tests for timetable-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use timetable_engine::{
    Day, EntityKind, Error, ExtractionResult, ImportReconciler, PairingPayload, ScheduleFragment,
    ScheduleStore, SlotEntry, FragmentSlot,
};

// ============================================================================
// Codes and names
// ============================================================================

#[test]
fn unicode_names_and_codes() {
    let mut store = ScheduleStore::new();
    let teacher = store.add_entity("Zoë Ångström", Some("ZÅ".into()), EntityKind::Teacher);
    let class = store.add_entity("クラス1", None, EntityKind::Class);

    assert_eq!(teacher, "teacher-zoë-ångström");
    store
        .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("Música", "クラス1")))
        .unwrap();

    let mirror = store.slot(&class, Day::Monday, 1).unwrap();
    assert_eq!(mirror.linked_code.as_deref(), Some("ZÅ"));
}

#[test]
fn blank_short_code_falls_back_to_name() {
    let mut store = ScheduleStore::new();
    let teacher = store.add_entity("Ann", Some("   ".into()), EntityKind::Teacher);
    let class = store.add_entity("7A", None, EntityKind::Class);

    store
        .set_slot(&class, Day::Monday, 1, Some(SlotEntry::linked("ART", "Ann")))
        .unwrap();

    assert_eq!(
        store.slot(&teacher, Day::Monday, 1).unwrap().linked_code.as_deref(),
        Some("7A")
    );
}

#[test]
fn duplicate_codes_take_first_entity() {
    let mut store = ScheduleStore::new();
    let first = store.add_entity("Alpha", Some("AA".into()), EntityKind::Teacher);
    let second = store.add_entity("Another", Some("AA".into()), EntityKind::Teacher);
    let class = store.add_entity("8B", None, EntityKind::Class);

    store
        .set_slot(&class, Day::Friday, 6, Some(SlotEntry::linked("ENG", "AA")))
        .unwrap();

    assert!(store.slot(&first, Day::Friday, 6).is_some());
    assert!(store.slot(&second, Day::Friday, 6).is_none());

    // Removing the first makes the second the resolution target.
    store.remove_entity(&first).unwrap();
    assert_eq!(store.resolve(EntityKind::Teacher, "AA").unwrap().id, second);
}

#[test]
fn self_kind_links_are_not_mirrored() {
    let mut store = ScheduleStore::new();
    let teacher = store.add_entity("Ann", None, EntityKind::Teacher);
    store.add_entity("Bob", None, EntityKind::Teacher);

    let write = store
        .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("MATH", "Bob")))
        .unwrap();

    assert!(write.mirrored.is_empty());
    assert_eq!(write.unresolved, vec!["Bob"]);
}

// ============================================================================
// Slots
// ============================================================================

#[test]
fn high_period_numbers() {
    let mut store = ScheduleStore::new();
    let class = store.add_entity("10A", None, EntityKind::Class);

    store
        .set_slot(&class, Day::Sunday, u32::MAX, Some(SlotEntry::new("Study")))
        .unwrap();

    assert_eq!(
        store.slot(&class, Day::Sunday, u32::MAX).unwrap().subject,
        "Study"
    );
}

#[test]
fn clearing_empty_slot_is_a_no_op() {
    let mut store = ScheduleStore::new();
    let class = store.add_entity("10A", None, EntityKind::Class);

    let write = store.set_slot(&class, Day::Monday, 1, None).unwrap();

    assert!(write.previous.is_none());
    assert!(write.cleared.is_empty());
    assert!(store.get(&class).unwrap().schedule.is_empty());
}

#[test]
fn overwriting_link_leaves_old_mirror() {
    let mut store = ScheduleStore::new();
    let teacher = store.add_entity("John Doe", Some("JD".into()), EntityKind::Teacher);
    let old_class = store.add_entity("10A", None, EntityKind::Class);
    let new_class = store.add_entity("10B", None, EntityKind::Class);

    store
        .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("ENG", "10A")))
        .unwrap();
    store
        .set_slot(&teacher, Day::Monday, 1, Some(SlotEntry::linked("ENG", "10B")))
        .unwrap();

    // Only a clear removes mirrors; a repointing write does not.
    assert!(store.slot(&old_class, Day::Monday, 1).is_some());
    assert!(store.slot(&new_class, Day::Monday, 1).is_some());
}

#[test]
fn split_slot_mirrors_both_halves() {
    let mut store = ScheduleStore::new();
    let class = store.add_entity("11C", None, EntityKind::Class);
    let physics = store.add_entity("Pat", None, EntityKind::Teacher);
    let chemistry = store.add_entity("Cal", None, EntityKind::Teacher);

    store
        .set_slot(
            &class,
            Day::Wednesday,
            2,
            Some(SlotEntry::linked("PHY", "Pat").with_split("CHE", "Cal")),
        )
        .unwrap();

    assert_eq!(store.slot(&physics, Day::Wednesday, 2).unwrap().subject, "PHY");
    assert_eq!(store.slot(&chemistry, Day::Wednesday, 2).unwrap().subject, "CHE");

    store.set_slot(&class, Day::Wednesday, 2, None).unwrap();
    assert!(store.slot(&physics, Day::Wednesday, 2).is_none());
    assert!(store.slot(&chemistry, Day::Wednesday, 2).is_none());
}

// ============================================================================
// Import
// ============================================================================

#[test]
fn fragment_with_only_unknown_days() {
    let store = ScheduleStore::new();
    let fragment = ScheduleFragment::new("10A", EntityKind::Class)
        .with_slot(FragmentSlot::new("Holiday", 1, "MATH").linked("JD"));

    let staged = ImportReconciler::stage(&store, vec![fragment]).unwrap();

    assert_eq!(staged.entities().len(), 1);
    assert_eq!(staged.summary().skipped_slots, 1);
}

#[test]
fn extraction_without_profiles_is_empty_import() {
    let fragments = ExtractionResult::from_json(r#"{"profiles":[]}"#)
        .unwrap()
        .into_fragments();

    let result = ImportReconciler::stage(&ScheduleStore::new(), fragments);
    assert!(matches!(result, Err(Error::ImportEmpty)));
}

#[test]
fn import_into_large_existing_store() {
    let mut store = ScheduleStore::new();
    for i in 0..200 {
        store.add_entity(format!("Teacher {i}"), Some(format!("T{i}")), EntityKind::Teacher);
        store.add_entity(format!("Class {i}"), Some(format!("C{i}")), EntityKind::Class);
    }

    let fragment = ScheduleFragment::new("Class 150", EntityKind::Class)
        .with_slot(FragmentSlot::new("Thu", 4, "BIO").linked("T150"));

    let staged = ImportReconciler::stage(&store, vec![fragment]).unwrap();

    assert!(staged.summary().created.is_empty());
    assert_eq!(staged.entities().len(), 400);
    let teacher = staged.resolve(EntityKind::Teacher, "T150").unwrap();
    assert_eq!(
        teacher.schedule.get(Day::Thursday, 4).unwrap().linked_code.as_deref(),
        Some("C150")
    );
}

// ============================================================================
// Pairing
// ============================================================================

#[test]
fn empty_token() {
    assert!(matches!(PairingPayload::decode(""), Err(Error::InvalidToken(_))));
    assert!(matches!(PairingPayload::decode("   \n"), Err(Error::InvalidToken(_))));
}
