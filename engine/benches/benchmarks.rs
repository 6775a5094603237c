//! Performance benchmarks for timetable-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use timetable_engine::{
    Command, Day, EntityKind, FragmentSlot, ImportReconciler, School, ScheduleFragment,
    ScheduleStore, SchoolSnapshot, SlotEntry,
};

/// A school with `size` teachers and `size` classes, each teacher teaching
/// its class every morning.
fn populated_store(size: usize) -> ScheduleStore {
    let mut store = ScheduleStore::new();
    let mut teachers = Vec::with_capacity(size);
    for i in 0..size {
        teachers.push(store.add_entity(format!("Teacher {}", i), Some(format!("T{}", i)), EntityKind::Teacher));
        store.add_entity(format!("Class {}", i), Some(format!("C{}", i)), EntityKind::Class);
    }
    for (i, teacher) in teachers.iter().enumerate() {
        for day in [Day::Monday, Day::Tuesday, Day::Wednesday, Day::Thursday, Day::Friday] {
            let _ = store.set_slot(
                teacher,
                day,
                1,
                Some(SlotEntry::linked("MATH", format!("C{}", i))),
            );
        }
    }
    store
}

fn bench_store_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_operations");

    // Benchmark mirrored slot write
    group.bench_function("set_slot_mirrored", |b| {
        let mut store = populated_store(100);
        let teacher = store.resolve(EntityKind::Teacher, "T50").unwrap().id.clone();
        let mut period = 1u32;

        b.iter(|| {
            period = period % 8 + 1;
            store.set_slot(
                black_box(&teacher),
                Day::Monday,
                period,
                Some(SlotEntry::linked("ENG", "C50")),
            )
        })
    });

    // Benchmark code resolution
    group.bench_function("resolve_code", |b| {
        let store = populated_store(500);

        b.iter(|| store.resolve(EntityKind::Class, black_box("C250")))
    });

    for size in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("rename_entity", size), size, |b, &size| {
            let mut store = populated_store(size);
            let class = store.resolve(EntityKind::Class, "C0").unwrap().id.clone();
            let mut flip = false;

            b.iter(|| {
                flip = !flip;
                let code = if flip { "C0-NEW" } else { "C0" };
                store.rename_entity(black_box(&class), "Class 0", Some(code.to_string()))
            })
        });
    }

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");

    for size in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("stage_import", size), size, |b, &size| {
            // Half the fragments come from the teacher document, half from
            // the class document, referencing each other.
            let fragments: Vec<ScheduleFragment> = (0..size)
                .map(|i| {
                    let (name, kind, link) = if i % 2 == 0 {
                        (format!("Teacher {}", i), EntityKind::Teacher, format!("C{}", i / 2))
                    } else {
                        (format!("C{}", i / 2), EntityKind::Class, format!("T{}", i / 2))
                    };
                    ScheduleFragment::new(name, kind)
                        .with_slot(FragmentSlot::new("Mon", 1, "MATH").linked(link.clone()))
                        .with_slot(FragmentSlot::new("Tue", 2, "Lesson").linked(link))
                })
                .collect();
            let store = ScheduleStore::new();

            b.iter(|| ImportReconciler::stage(black_box(&store), black_box(fragments.clone())))
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [100, 500, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("capture", size), size, |b, &size| {
            let school = School {
                store: populated_store(size),
                ..School::default()
            };

            b.iter(|| SchoolSnapshot::capture(black_box(&school), 1000))
        });

        group.bench_with_input(BenchmarkId::new("restore", size), size, |b, &size| {
            let school = School {
                store: populated_store(size),
                ..School::default()
            };
            let json = SchoolSnapshot::capture(&school, 1000).to_json().unwrap();

            b.iter(|| SchoolSnapshot::from_json(black_box(&json)).map(SchoolSnapshot::restore))
        });
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    // Command serialization
    group.bench_function("command_to_json", |b| {
        let command = Command::SetSlot {
            owner_id: "teacher-john-doe".into(),
            day: Day::Monday,
            period: 2,
            entry: Some(SlotEntry::linked("ENG", "10B").with_room("R7")),
        };

        b.iter(|| serde_json::to_string(black_box(&command)))
    });

    group.bench_function("command_from_json", |b| {
        let json = r#"{"type":"set_slot","ownerId":"teacher-john-doe","day":"Monday","period":2,"entry":{"subject":"ENG","linkedCode":"10B"}}"#;

        b.iter(|| serde_json::from_str::<Command>(black_box(json)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_store_operations,
    bench_reconciliation,
    bench_snapshot,
    bench_serialization,
);
criterion_main!(benches);
