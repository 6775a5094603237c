//! Teacher and class profiles with their weekly schedules.

use crate::{Code, Day, EntityId, Period, SlotEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The two mirrored views of a timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[serde(alias = "Teacher", alias = "TEACHER")]
    Teacher,
    #[serde(alias = "Class", alias = "CLASS")]
    Class,
}

impl EntityKind {
    /// The kind a slot of this kind links to.
    pub fn opposite(self) -> Self {
        match self {
            EntityKind::Teacher => EntityKind::Class,
            EntityKind::Class => EntityKind::Teacher,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            EntityKind::Teacher => "teacher",
            EntityKind::Class => "class",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slots of a single day, keyed by period number.
pub type DaySlots = BTreeMap<Period, SlotEntry>;

/// A weekly schedule.
///
/// Each day's slots sit behind an `Arc` and are copied on write, so cloning a
/// profile (snapshots, pushes, staged imports) shares every day that is not
/// subsequently modified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklySchedule {
    days: BTreeMap<Day, Arc<DaySlots>>,
}

impl WeeklySchedule {
    /// Create an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the slot at (day, period).
    pub fn get(&self, day: Day, period: Period) -> Option<&SlotEntry> {
        self.days.get(&day)?.get(&period)
    }

    /// Write or clear the slot at (day, period), returning the previous value.
    pub fn set(&mut self, day: Day, period: Period, entry: Option<SlotEntry>) -> Option<SlotEntry> {
        match entry {
            Some(entry) => Arc::make_mut(self.days.entry(day).or_default()).insert(period, entry),
            None => {
                let slots = self.days.get_mut(&day)?;
                if !slots.contains_key(&period) {
                    return None;
                }
                let previous = Arc::make_mut(slots).remove(&period);
                if slots.is_empty() {
                    self.days.remove(&day);
                }
                previous
            }
        }
    }

    /// Slots of one day.
    pub fn day(&self, day: Day) -> Option<&DaySlots> {
        self.days.get(&day).map(|slots| &**slots)
    }

    /// Iterate over all occupied slots in (day, period) order.
    pub fn iter(&self) -> impl Iterator<Item = (Day, Period, &SlotEntry)> {
        self.days
            .iter()
            .flat_map(|(day, slots)| slots.iter().map(move |(period, slot)| (*day, *period, slot)))
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.days.values().map(|slots| slots.len()).sum()
    }

    /// Check if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Rewrite code references across the week. Only days holding a match are
    /// copied. Returns the number of fields rewritten.
    pub fn rewrite_codes(&mut self, old: &[&str], new: &str) -> usize {
        let mut rewritten = 0;
        for slots in self.days.values_mut() {
            if !slots.values().any(|slot| slot.references_any(old)) {
                continue;
            }
            for slot in Arc::make_mut(slots).values_mut() {
                rewritten += slot.rewrite_codes(old, new);
            }
        }
        rewritten
    }

    /// Whether two schedules share the storage of `day`.
    pub fn shares_day_with(&self, other: &WeeklySchedule, day: Day) -> bool {
        match (self.days.get(&day), other.days.get(&day)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A teacher or class with its weekly schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProfile {
    pub id: EntityId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_code: Option<Code>,
    pub kind: EntityKind,
    #[serde(default)]
    pub schedule: WeeklySchedule,
}

impl EntityProfile {
    /// Create a profile with an empty schedule.
    pub fn new(
        id: impl Into<EntityId>,
        name: impl Into<String>,
        short_code: Option<Code>,
        kind: EntityKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            short_code,
            kind,
            schedule: WeeklySchedule::new(),
        }
    }

    /// The code other schedules use to reference this entity: the short code
    /// when present and non-blank, the name otherwise.
    pub fn canonical_code(&self) -> &str {
        canonical_code(self.short_code.as_deref(), &self.name)
    }

    /// Case-insensitive match against name or short code.
    pub fn matches_name_or_code(&self, text: &str) -> bool {
        let text = text.trim();
        self.name.trim().eq_ignore_ascii_case(text)
            || self
                .short_code
                .as_deref()
                .is_some_and(|code| code.trim().eq_ignore_ascii_case(text))
    }
}

/// Canonical code for a (short code, name) pair.
pub fn canonical_code<'a>(short_code: Option<&'a str>, name: &'a str) -> &'a str {
    match short_code {
        Some(code) if !code.trim().is_empty() => code,
        _ => name,
    }
}

/// Short code given to entities created implicitly: the name itself when at
/// most three characters long, otherwise its first three characters
/// uppercased.
pub fn derive_short_code(name: &str) -> Code {
    let name = name.trim();
    if name.chars().count() <= 3 {
        name.to_string()
    } else {
        name.chars().take(3).collect::<String>().to_uppercase()
    }
}

/// Deterministic entity ID base: `{kind}-{slug}`.
pub fn entity_id_base(kind: EntityKind, name: &str) -> EntityId {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        format!("{kind}-unnamed")
    } else {
        format!("{kind}-{slug}")
    }
}
