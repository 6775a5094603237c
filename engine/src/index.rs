//! Code → entity index.
//!
//! Schedules reference counterparts by canonical code, never by ID. The index
//! maps codes to entity positions and reproduces the resolution order exactly:
//! short-code matches are consulted before name matches, and among several
//! matches the entity that comes first in store order wins.

use crate::{Code, EntityKind, EntityProfile};
use std::collections::HashMap;

/// Position of an entity within the store's ordered entity list.
pub type Position = usize;

/// Index of short codes and names per entity kind.
#[derive(Debug, Clone, Default)]
pub struct CodeIndex {
    by_short_code: HashMap<(EntityKind, Code), Vec<Position>>,
    by_name: HashMap<(EntityKind, String), Vec<Position>>,
}

impl CodeIndex {
    /// Build an index over entities in store order.
    pub fn build(entities: &[EntityProfile]) -> Self {
        let mut index = Self::default();
        for (position, entity) in entities.iter().enumerate() {
            index.insert(position, entity);
        }
        index
    }

    /// Register an entity at `position`. Positions must be inserted in
    /// ascending order to keep the first-match tie-break.
    pub fn insert(&mut self, position: Position, entity: &EntityProfile) {
        if let Some(code) = entity.short_code.as_deref() {
            if !code.trim().is_empty() {
                self.by_short_code
                    .entry((entity.kind, code.to_string()))
                    .or_default()
                    .push(position);
            }
        }
        self.by_name
            .entry((entity.kind, entity.name.clone()))
            .or_default()
            .push(position);
    }

    /// Resolve a code to the first matching entity of `kind`.
    ///
    /// Short codes are matched before names.
    pub fn resolve(&self, kind: EntityKind, code: &str) -> Option<Position> {
        let key = (kind, code.to_string());
        let candidates = self
            .by_short_code
            .get(&key)
            .or_else(|| self.by_name.get(&key))?;

        if candidates.len() > 1 {
            tracing::debug!(
                code = %code,
                kind = %kind,
                matches = candidates.len(),
                "Ambiguous code reference, taking first entity"
            );
        }

        candidates.first().copied()
    }
}
