//! The master fact store: `id -> fact` plus a `type -> id-set` index.
//!
//! This is deliberately thin — propagation into alpha/beta memories is the
//! engine's job (it needs the compiled network to know which nodes to
//! notify), so `WorkingMemory` only owns the ground truth of "what facts
//! currently exist" and the bookkeeping eviction needs to pick victims.

use std::collections::{HashMap, HashSet};

use rete_fact::{FactId, Record};

/// Master working-memory store. Facts are immutable once inserted; a
/// "modify" is always expressed upstream as retract-then-insert, never as
/// in-place mutation here.
#[derive(Debug, Default)]
pub struct WorkingMemory {
    facts: HashMap<FactId, Record>,
    by_type: HashMap<String, HashSet<FactId>>,
    /// Insertion order, oldest first. Used by the `lru` eviction policy as
    /// an approximation of least-recently-used (there is no read-tracking
    /// in this engine, only insert order).
    insertion_order: Vec<FactId>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fact. Callers must check `contains` first — per the
    /// boundary behavior in the spec, a duplicate id is rejected with
    /// `invalid_fact` rather than silently overwritten.
    pub fn insert(&mut self, record: Record) {
        let id = record.id().clone();
        self.by_type
            .entry(record.fact_type().to_string())
            .or_default()
            .insert(id.clone());
        self.insertion_order.push(id.clone());
        self.facts.insert(id, record);
    }

    pub fn remove(&mut self, id: &FactId) -> Option<Record> {
        let record = self.facts.remove(id)?;
        if let Some(set) = self.by_type.get_mut(record.fact_type()) {
            set.remove(id);
            if set.is_empty() {
                self.by_type.remove(record.fact_type());
            }
        }
        self.insertion_order.retain(|existing| existing != id);
        Some(record)
    }

    pub fn contains(&self, id: &FactId) -> bool {
        self.facts.contains_key(id)
    }

    pub fn get(&self, id: &FactId) -> Option<&Record> {
        self.facts.get(id)
    }

    pub fn ids_of_type(&self, fact_type: &str) -> impl Iterator<Item = &FactId> {
        self.by_type.get(fact_type).into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn facts(&self) -> impl Iterator<Item = &Record> {
        self.facts.values()
    }

    /// Ids in insertion order, oldest first — the candidate order for the
    /// `lru` eviction policy.
    pub fn ids_by_insertion_order(&self) -> &[FactId] {
        &self.insertion_order
    }

    /// Ids sorted ascending — the candidate order for the `oldest`
    /// eviction policy.
    pub fn ids_sorted(&self) -> Vec<FactId> {
        let mut ids: Vec<FactId> = self.facts.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// A rough per-fact byte estimate for the memory manager: the record's
    /// canonical JSON encoding length. Not exact, but proportionate, which
    /// is all the eviction sizing math needs.
    pub fn estimated_bytes(&self) -> usize {
        self.facts
            .values()
            .map(|r| serde_json::to_vec(r).map(|v| v.len()).unwrap_or(0))
            .sum()
    }

    pub fn clear(&mut self) {
        self.facts.clear();
        self.by_type.clear();
        self.insertion_order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_maintain_type_index() {
        let mut wm = WorkingMemory::new();
        wm.insert(Record::new("e1", "Employee"));
        wm.insert(Record::new("e2", "Employee"));
        wm.insert(Record::new("m1", "Manager"));

        assert_eq!(wm.ids_of_type("Employee").count(), 2);
        wm.remove(&FactId::new("e1"));
        assert_eq!(wm.ids_of_type("Employee").count(), 1);
        assert_eq!(wm.len(), 2);
    }

    #[test]
    fn remove_unknown_id_is_a_no_op() {
        let mut wm = WorkingMemory::new();
        assert!(wm.remove(&FactId::new("ghost")).is_none());
    }

    #[test]
    fn insertion_order_tracks_assert_sequence() {
        let mut wm = WorkingMemory::new();
        wm.insert(Record::new("a", "T"));
        wm.insert(Record::new("b", "T"));
        wm.insert(Record::new("c", "T"));
        assert_eq!(
            wm.ids_by_insertion_order(),
            &[FactId::new("a"), FactId::new("b"), FactId::new("c")]
        );
        wm.remove(&FactId::new("b"));
        assert_eq!(wm.ids_by_insertion_order(), &[FactId::new("a"), FactId::new("c")]);
    }

    #[test]
    fn clear_empties_everything() {
        let mut wm = WorkingMemory::new();
        wm.insert(Record::new("a", "T"));
        wm.clear();
        assert!(wm.is_empty());
        assert_eq!(wm.ids_of_type("T").count(), 0);
    }
}
