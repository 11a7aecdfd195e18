//! Ordered list of local entities with optimistic insert and reconciliation
//!
//! Every entry is mutated at most once after its optimistic insert: either
//! replaced in place by its canonical version, or removed.

use crate::types::{EntityId, EntityStatus, LocalEntity};

/// Outcome of [`OptimisticList::confirm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The placeholder was replaced by its canonical version
    Replaced,
    /// The canonical id was already listed; the placeholder was dropped
    Deduplicated,
    /// No entry carries the temporary id
    Unknown,
}

/// Ordered list of entities as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticList<P> {
    entries: Vec<LocalEntity<P>>,
}

impl<P> OptimisticList<P> {
    /// Empty list
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// List seeded from already-stored entities, order kept
    #[must_use]
    pub fn from_entries(entries: Vec<LocalEntity<P>>) -> Self {
        Self { entries }
    }

    /// Append an optimistic entity
    pub fn push_pending(&mut self, entity: LocalEntity<P>) {
        debug_assert!(entity.id.is_temporary());
        self.entries.push(entity);
    }

    /// Replace the entity carrying `temp_id` with its canonical version
    ///
    /// The replacement keeps the position of the placeholder. If an entry
    /// with the canonical id is already present, the placeholder is dropped
    /// instead so the action is never shown twice.
    pub fn confirm(&mut self, temp_id: &EntityId, mut canonical: LocalEntity<P>) -> Confirmation {
        let Some(index) = self.position(temp_id) else {
            return Confirmation::Unknown;
        };
        if self.position(&canonical.id).is_some() {
            self.entries.remove(index);
            return Confirmation::Deduplicated;
        }
        canonical.status = EntityStatus::Confirmed;
        self.entries[index] = canonical;
        Confirmation::Replaced
    }

    /// Remove the entity carrying `temp_id`, returning it marked failed
    pub fn rollback(&mut self, temp_id: &EntityId) -> Option<LocalEntity<P>> {
        let index = self.position(temp_id)?;
        let mut removed = self.entries.remove(index);
        removed.status = EntityStatus::Failed;
        Some(removed)
    }

    /// Entity with `id`
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&LocalEntity<P>> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Ids in display order
    #[must_use]
    pub fn ids(&self) -> Vec<EntityId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Entities in display order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[LocalEntity<P>] {
        &self.entries
    }

    /// Iterate in display order
    pub fn iter(&self) -> impl Iterator<Item = &LocalEntity<P>> {
        self.entries.iter()
    }

    /// Number of entities still waiting on the store
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_pending()).count()
    }

    /// Number of entities
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &EntityId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }
}

impl<P> Default for OptimisticList<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn confirmed(id: &str, body: &str) -> LocalEntity<String> {
        LocalEntity::confirmed(id, body.to_string())
    }

    #[test]
    fn confirm_replaces_in_place() {
        let mut list = OptimisticList::from_entries(vec![confirmed("c-1", "a")]);
        let first = LocalEntity::pending("b".to_string());
        let second = LocalEntity::pending("c".to_string());
        let first_id = first.id.clone();
        let second_id = second.id.clone();
        list.push_pending(first);
        list.push_pending(second);

        // Resolves out of order; positions are kept
        assert_eq!(
            list.confirm(&second_id, confirmed("c-3", "c")),
            Confirmation::Replaced
        );
        assert_eq!(
            list.confirm(&first_id, confirmed("c-2", "b")),
            Confirmation::Replaced
        );

        assert_eq!(
            list.ids(),
            vec![
                EntityId::canonical("c-1"),
                EntityId::canonical("c-2"),
                EntityId::canonical("c-3"),
            ]
        );
        assert_eq!(list.pending_count(), 0);
    }

    #[test]
    fn confirm_does_not_duplicate_known_canonical_id() {
        let mut list = OptimisticList::from_entries(vec![confirmed("c-9", "x")]);
        let pending = LocalEntity::pending("x".to_string());
        let temp = pending.id.clone();
        list.push_pending(pending);

        assert_eq!(
            list.confirm(&temp, confirmed("c-9", "x")),
            Confirmation::Deduplicated
        );
        assert_eq!(list.ids(), vec![EntityId::canonical("c-9")]);
    }

    #[test]
    fn rollback_restores_previous_list() {
        let mut list = OptimisticList::from_entries(vec![confirmed("c-1", "a")]);
        let before = list.clone();
        let pending = LocalEntity::pending("b".to_string());
        let temp = pending.id.clone();
        list.push_pending(pending);

        let removed = list.rollback(&temp).unwrap();
        assert_eq!(removed.status, EntityStatus::Failed);
        assert_eq!(list, before);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut list: OptimisticList<String> = OptimisticList::new();
        let stray = EntityId::temporary();
        assert_eq!(
            list.confirm(&stray, confirmed("c-1", "a")),
            Confirmation::Unknown
        );
        assert!(list.rollback(&stray).is_none());
        assert!(list.is_empty());
    }
}
