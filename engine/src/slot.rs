//! Timetable cells.

use crate::Code;
use serde::{Deserialize, Serialize};

/// Subjects that stand in for "unknown" when a document only names the
/// counterpart. Compared case-insensitively after trimming.
pub const GENERIC_SUBJECTS: [&str; 6] = ["class", "lesson", "period", "subject", "tbd", "-"];

/// Whether a subject is empty or one of the generic placeholders.
pub fn is_blank_or_generic(subject: &str) -> bool {
    let subject = subject.trim();
    subject.is_empty()
        || GENERIC_SUBJECTS
            .iter()
            .any(|generic| subject.eq_ignore_ascii_case(generic))
}

/// How a slot relates to its counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    /// One subject, at most one counterpart.
    #[default]
    Normal,
    /// The period is shared by two groups with separate subjects and links.
    Split,
    /// One teacher period fanning out to several classes.
    Combined,
}

/// One timetable cell for a given day and period.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotEntry {
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_code: Option<Code>,
    #[serde(default)]
    pub kind: SlotKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_codes: Vec<Code>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_linked_code: Option<Code>,
}

/// A counterpart reference carried by a slot, with the subject the mirror
/// should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLink<'a> {
    pub code: &'a str,
    pub subject: &'a str,
}

impl SlotEntry {
    /// A normal slot with no counterpart.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// A normal slot linked to a counterpart code.
    pub fn linked(subject: impl Into<String>, code: impl Into<Code>) -> Self {
        Self {
            subject: subject.into(),
            linked_code: Some(code.into()),
            ..Self::default()
        }
    }

    /// A combined session fanning out to several classes.
    pub fn combined(subject: impl Into<String>, targets: Vec<Code>) -> Self {
        Self {
            subject: subject.into(),
            kind: SlotKind::Combined,
            target_codes: targets,
            ..Self::default()
        }
    }

    /// Set the room.
    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    /// Turn this slot into a split slot with a second subject and link.
    pub fn with_split(mut self, subject: impl Into<String>, code: impl Into<Code>) -> Self {
        self.kind = SlotKind::Split;
        self.split_subject = Some(subject.into());
        self.split_linked_code = Some(code.into());
        self
    }

    /// The mirror written on a counterpart: same subject and room, linked
    /// back to `owner_code`.
    pub fn mirror(subject: &str, room: Option<&str>, owner_code: &str) -> Self {
        Self {
            subject: subject.to_string(),
            room: room.map(str::to_string),
            linked_code: Some(owner_code.to_string()),
            ..Self::default()
        }
    }

    /// Every counterpart this slot points at.
    ///
    /// `linkedCode` always counts. A split slot adds its second link; a
    /// combined slot adds each target code.
    pub fn links(&self) -> Vec<SlotLink<'_>> {
        let mut links = Vec::new();

        if let Some(code) = self.linked_code.as_deref() {
            links.push(SlotLink {
                code,
                subject: &self.subject,
            });
        }

        match self.kind {
            SlotKind::Split => {
                if let Some(code) = self.split_linked_code.as_deref() {
                    links.push(SlotLink {
                        code,
                        subject: self
                            .split_subject
                            .as_deref()
                            .unwrap_or(self.subject.as_str()),
                    });
                }
            }
            SlotKind::Combined => {
                for code in &self.target_codes {
                    links.push(SlotLink {
                        code: code.as_str(),
                        subject: &self.subject,
                    });
                }
            }
            SlotKind::Normal => {}
        }

        links
    }

    /// Whether any code field on this slot equals one of `codes`.
    pub fn references_any(&self, codes: &[&str]) -> bool {
        let hit = |c: &str| codes.contains(&c);
        self.linked_code.as_deref().is_some_and(hit)
            || self.split_linked_code.as_deref().is_some_and(hit)
            || self.target_codes.iter().any(|c| hit(c.as_str()))
    }

    /// Rewrite every code field matching one of `old` to `new`.
    ///
    /// Returns the number of fields rewritten.
    pub fn rewrite_codes(&mut self, old: &[&str], new: &str) -> usize {
        let mut rewritten = 0;

        for field in [&mut self.linked_code, &mut self.split_linked_code] {
            if let Some(code) = field {
                if old.contains(&code.as_str()) {
                    *code = new.to_string();
                    rewritten += 1;
                }
            }
        }

        for code in &mut self.target_codes {
            if old.contains(&code.as_str()) {
                *code = new.to_string();
                rewritten += 1;
            }
        }

        rewritten
    }
}
