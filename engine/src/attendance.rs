//! Attendance records.
//!
//! The ledger keeps at most one record per (date, period, student). Writes go
//! through [`AttendanceLedger::upsert_batch`], which replaces existing records
//! for the same key and is idempotent.

use crate::{EntityId, Period, StudentId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Attendance status of one student in one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    #[serde(alias = "Present")]
    Present,
    #[serde(alias = "Absent")]
    Absent,
    #[serde(alias = "Late")]
    Late,
    #[serde(alias = "Excused")]
    Excused,
}

/// One attendance mark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    /// Calendar date (ISO `YYYY-MM-DD`)
    pub date: NaiveDate,
    pub period: Period,
    /// The class the student was marked in
    pub class_entity_id: EntityId,
    pub student_id: StudentId,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    pub fn new(
        date: NaiveDate,
        period: Period,
        class_entity_id: impl Into<EntityId>,
        student_id: impl Into<StudentId>,
        status: AttendanceStatus,
    ) -> Self {
        Self {
            date,
            period,
            class_entity_id: class_entity_id.into(),
            student_id: student_id.into(),
            status,
        }
    }

    /// The uniqueness key.
    pub fn key(&self) -> (NaiveDate, Period, &str) {
        (self.date, self.period, &self.student_id)
    }
}

/// Per-status counts for one date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub date: Option<NaiveDate>,
    pub total: usize,
    pub counts: BTreeMap<AttendanceStatus, usize>,
}

impl AttendanceSummary {
    /// Count for a single status.
    pub fn count(&self, status: AttendanceStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }
}

/// All attendance records, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendanceLedger {
    records: Vec<AttendanceRecord>,
}

impl AttendanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger from records, applying them as one batch.
    pub fn from_records(records: Vec<AttendanceRecord>) -> Self {
        let mut ledger = Self::new();
        ledger.upsert_batch(records);
        ledger
    }

    /// Insert or replace records.
    ///
    /// Every stored record whose key matches an incoming record is removed,
    /// then the incoming records are appended. When the batch itself repeats a
    /// key, the later record wins.
    pub fn upsert_batch(&mut self, records: impl IntoIterator<Item = AttendanceRecord>) {
        let mut incoming: Vec<AttendanceRecord> = Vec::new();
        let mut seen: HashMap<(NaiveDate, Period, StudentId), usize> = HashMap::new();

        for record in records {
            let key = (record.date, record.period, record.student_id.clone());
            match seen.get(&key) {
                Some(&slot) => incoming[slot] = record,
                None => {
                    seen.insert(key, incoming.len());
                    incoming.push(record);
                }
            }
        }

        if incoming.is_empty() {
            return;
        }

        let before = self.records.len();
        self.records.retain(|existing| {
            !seen.contains_key(&(existing.date, existing.period, existing.student_id.clone()))
        });
        let replaced = before - self.records.len();

        tracing::debug!(
            incoming = incoming.len(),
            replaced = replaced,
            "Upserted attendance batch"
        );

        self.records.extend(incoming);
    }

    /// All records in write order.
    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record for one (date, period, student), if any.
    pub fn get(&self, date: NaiveDate, period: Period, student_id: &str) -> Option<&AttendanceRecord> {
        self.records
            .iter()
            .find(|r| r.key() == (date, period, student_id))
    }

    /// Records on one date.
    pub fn for_date(&self, date: NaiveDate) -> impl Iterator<Item = &AttendanceRecord> {
        self.records.iter().filter(move |r| r.date == date)
    }

    /// Records of one class on one date.
    pub fn for_class<'a>(
        &'a self,
        date: NaiveDate,
        class_entity_id: &'a str,
    ) -> impl Iterator<Item = &'a AttendanceRecord> {
        self.for_date(date)
            .filter(move |r| r.class_entity_id == class_entity_id)
    }

    /// Per-status counts for one date.
    pub fn summary(&self, date: NaiveDate) -> AttendanceSummary {
        let mut summary = AttendanceSummary {
            date: Some(date),
            ..AttendanceSummary::default()
        };
        for record in self.for_date(date) {
            summary.total += 1;
            *summary.counts.entry(record.status).or_default() += 1;
        }
        summary
    }

    /// Replace every record. Used when a remote attendance group is applied.
    pub fn replace_all(&mut self, records: Vec<AttendanceRecord>) {
        self.records = records;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
    }

    fn mark(day: u32, period: Period, student: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord::new(date(day), period, "class-10a", student, status)
    }

    #[test]
    fn upsert_replaces_same_key() {
        let mut ledger = AttendanceLedger::new();
        ledger.upsert_batch(vec![mark(2, 1, "s1", AttendanceStatus::Present)]);
        ledger.upsert_batch(vec![mark(2, 1, "s1", AttendanceStatus::Absent)]);

        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.get(date(2), 1, "s1").unwrap().status,
            AttendanceStatus::Absent
        );
    }

    #[test]
    fn upsert_keeps_other_keys() {
        let mut ledger = AttendanceLedger::new();
        ledger.upsert_batch(vec![
            mark(2, 1, "s1", AttendanceStatus::Present),
            mark(2, 2, "s1", AttendanceStatus::Present),
            mark(2, 1, "s2", AttendanceStatus::Late),
        ]);
        ledger.upsert_batch(vec![mark(2, 1, "s1", AttendanceStatus::Excused)]);

        assert_eq!(ledger.len(), 3);
        assert_eq!(
            ledger.get(date(2), 2, "s1").unwrap().status,
            AttendanceStatus::Present
        );
        assert_eq!(
            ledger.get(date(2), 1, "s2").unwrap().status,
            AttendanceStatus::Late
        );
    }

    #[test]
    fn later_duplicate_in_batch_wins() {
        let mut ledger = AttendanceLedger::new();
        ledger.upsert_batch(vec![
            mark(2, 1, "s1", AttendanceStatus::Present),
            mark(2, 1, "s1", AttendanceStatus::Late),
        ]);

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.records()[0].status, AttendanceStatus::Late);
    }

    #[test]
    fn summary_counts() {
        let mut ledger = AttendanceLedger::new();
        ledger.upsert_batch(vec![
            mark(2, 1, "s1", AttendanceStatus::Present),
            mark(2, 1, "s2", AttendanceStatus::Absent),
            mark(2, 1, "s3", AttendanceStatus::Present),
            mark(3, 1, "s1", AttendanceStatus::Late),
        ]);

        let summary = ledger.summary(date(2));
        assert_eq!(summary.total, 3);
        assert_eq!(summary.count(AttendanceStatus::Present), 2);
        assert_eq!(summary.count(AttendanceStatus::Absent), 1);
        assert_eq!(summary.count(AttendanceStatus::Late), 0);
    }

    #[test]
    fn for_class_filters() {
        let mut ledger = AttendanceLedger::new();
        ledger.upsert_batch(vec![
            mark(2, 1, "s1", AttendanceStatus::Present),
            AttendanceRecord::new(date(2), 1, "class-10b", "s9", AttendanceStatus::Absent),
        ]);

        let ids: Vec<_> = ledger
            .for_class(date(2), "class-10b")
            .map(|r| r.student_id.as_str())
            .collect();
        assert_eq!(ids, vec!["s9"]);
    }

    #[test]
    fn record_json_shape() {
        let record = mark(2, 3, "s1", AttendanceStatus::Absent);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "date": "2024-09-02",
                "period": 3,
                "classEntityId": "class-10a",
                "studentId": "s1",
                "status": "absent"
            })
        );

        let parsed: AttendanceRecord = serde_json::from_str(
            r#"{"date":"2024-09-02","period":3,"classEntityId":"class-10a","studentId":"s1","status":"Late"}"#,
        )
        .unwrap();
        assert_eq!(parsed.status, AttendanceStatus::Late);
    }

    fn arb_status() -> impl Strategy<Value = AttendanceStatus> {
        prop_oneof![
            Just(AttendanceStatus::Present),
            Just(AttendanceStatus::Absent),
            Just(AttendanceStatus::Late),
            Just(AttendanceStatus::Excused),
        ]
    }

    fn arb_record() -> impl Strategy<Value = AttendanceRecord> {
        (1u32..4, 1u32..4, 0usize..4, arb_status()).prop_map(|(day, period, student, status)| {
            mark(day, period, &format!("s{student}"), status)
        })
    }

    proptest! {
        #[test]
        fn upsert_is_idempotent(
            seed in prop::collection::vec(arb_record(), 0..20),
            batch in prop::collection::vec(arb_record(), 0..20),
        ) {
            let mut once = AttendanceLedger::from_records(seed);
            once.upsert_batch(batch.clone());

            let mut twice = once.clone();
            twice.upsert_batch(batch);

            prop_assert_eq!(once, twice);
        }

        #[test]
        fn keys_stay_unique(batches in prop::collection::vec(prop::collection::vec(arb_record(), 0..10), 0..5)) {
            let mut ledger = AttendanceLedger::new();
            for batch in batches {
                ledger.upsert_batch(batch);
            }

            let mut keys: Vec<_> = ledger.records().iter().map(|r| r.key()).collect();
            let total = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), total);
        }
    }
}
