//! Path addressing and surgery on school documents.
//!
//! Clients address `schools/{schoolId}` optionally followed by
//! `/{group}.{field}` (slashes and dots both separate segments). The first
//! segment below the school must be a sync group or one of the stamp fields.

use std::str::FromStr;

use serde_json::{Map, Value};
use timetable_engine::replication::{LAST_SYNC_FIELD, LAST_WRITER_FIELD};
use timetable_engine::SyncGroup;

use crate::error::AppError;

const ROOT: &str = "schools";

/// Document surgery errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("school document must be an object")]
    NotAnObject,
}

impl From<DocumentError> for AppError {
    fn from(err: DocumentError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// A parsed document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocPath {
    pub school_id: String,
    pub segments: Vec<String>,
}

impl DocPath {
    /// Path of a whole school document.
    pub fn school(school_id: impl Into<String>) -> Self {
        Self {
            school_id: school_id.into(),
            segments: Vec::new(),
        }
    }

    /// Parse `schools/{id}[/{group}.{field}...]`.
    pub fn parse(path: &str) -> Result<Self, DocumentError> {
        let mut parts = path.trim_matches('/').splitn(3, '/');

        if parts.next() != Some(ROOT) {
            return Err(DocumentError::InvalidPath(path.to_string()));
        }
        let school_id = match parts.next() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(DocumentError::InvalidPath(path.to_string())),
        };

        let base = Self::school(school_id);
        match parts.next() {
            Some(rest) => base.join(rest),
            None => Ok(base),
        }
    }

    /// Append a relative, slash- or dot-separated key.
    pub fn join(&self, key: &str) -> Result<Self, DocumentError> {
        let mut segments = self.segments.clone();
        for segment in key.split(['/', '.']) {
            if segment.is_empty() {
                return Err(DocumentError::InvalidPath(key.to_string()));
            }
            segments.push(segment.to_string());
        }

        let joined = Self {
            school_id: self.school_id.clone(),
            segments,
        };
        joined.validate()?;
        Ok(joined)
    }

    /// Whether this addresses the whole document.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    fn validate(&self) -> Result<(), DocumentError> {
        let Some(first) = self.segments.first() else {
            return Ok(());
        };
        let stamp = first == LAST_SYNC_FIELD || first == LAST_WRITER_FIELD;
        if stamp && self.segments.len() > 1 {
            return Err(DocumentError::InvalidPath(self.to_string()));
        }
        if !stamp && SyncGroup::from_str(first).is_err() {
            return Err(DocumentError::UnknownField(first.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", ROOT, self.school_id)?;
        if !self.is_root() {
            write!(f, "/{}", self.segments.join("."))?;
        }
        Ok(())
    }
}

/// Value at `segments`, if present.
pub fn get_at<'a>(document: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(document, |value, segment| value.as_object()?.get(segment))
}

/// Replace the value at `segments`, creating intermediate objects. `null`
/// removes the field.
pub fn set_at(document: &mut Value, segments: &[String], value: Value) -> Result<(), DocumentError> {
    let Some((last, parents)) = segments.split_last() else {
        *document = match value {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map),
            _ => return Err(DocumentError::NotAnObject),
        };
        return Ok(());
    };

    let mut current = document;
    for segment in parents {
        current = object_mut(current)?
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let parent = object_mut(current)?;
    if value.is_null() {
        parent.remove(last);
    } else {
        parent.insert(last.clone(), value);
    }
    Ok(())
}

fn object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, DocumentError> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut().ok_or(DocumentError::NotAnObject)
}

/// A write against one school document.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Replace the value at a path.
    Set { path: DocPath, value: Value },
    /// Replace several keys below a path at once.
    Update {
        path: DocPath,
        partial: Map<String, Value>,
    },
}

impl Write {
    pub fn path(&self) -> &DocPath {
        match self {
            Write::Set { path, .. } | Write::Update { path, .. } => path,
        }
    }

    pub fn school_id(&self) -> &str {
        &self.path().school_id
    }

    /// Apply to `document`, stamping `lastSyncTimestamp` with `now` unless the
    /// writer supplied one. Nothing is changed when any key is invalid.
    pub fn apply(self, document: &mut Value, now: i64) -> Result<(), DocumentError> {
        let stamp_path = [LAST_SYNC_FIELD.to_string()];

        match self {
            Write::Set { path, value } => {
                if path.is_root() && !value.is_object() && !value.is_null() {
                    return Err(DocumentError::NotAnObject);
                }
                let stamped = if path.is_root() {
                    value.get(LAST_SYNC_FIELD).is_some()
                } else {
                    path.segments == stamp_path
                };
                set_at(document, &path.segments, value)?;
                if !stamped {
                    set_at(document, &stamp_path, Value::from(now))?;
                }
            }
            Write::Update { path, partial } => {
                let targets = partial
                    .into_iter()
                    .map(|(key, value)| Ok((path.join(&key)?, value)))
                    .collect::<Result<Vec<_>, DocumentError>>()?;

                let stamped = targets
                    .iter()
                    .any(|(target, _)| target.segments == stamp_path);
                for (target, value) in targets {
                    set_at(document, &target.segments, value)?;
                }
                if !stamped {
                    set_at(document, &stamp_path, Value::from(now))?;
                }
            }
        }
        Ok(())
    }
}
