//! Alpha memories: per-node fact-id sets passing a single-pattern test
//! chain, indexed by type and by observed `(field, value)` pairs.

use std::collections::{BTreeMap, HashMap, HashSet};

use rete_fact::{FactId, FactValue, Record};

use crate::network::{AlphaNode, AlphaTest};
use crate::predicate::PredicateRegistry;

/// Evaluate a node's test chain against a candidate record. All tests
/// must pass (conjunction); a field absent from the record fails the
/// test it's used in.
pub fn passes(node: &AlphaNode, record: &Record, predicates: &PredicateRegistry) -> bool {
    if record.fact_type() != node.fact_type {
        return false;
    }
    node.tests.iter().all(|test| evaluate_test(test, record, predicates))
}

fn evaluate_test(test: &AlphaTest, record: &Record, predicates: &PredicateRegistry) -> bool {
    match record.field(&test.field) {
        Some(value) => predicates
            .evaluate(test.op.symbol(), value, &test.literal)
            .unwrap_or(false),
        None => false,
    }
}

/// Extract the token bindings a matching record contributes, per the
/// node's declared `(field, binding)` pairs.
pub fn extract_bindings(node: &AlphaNode, record: &Record) -> BTreeMap<String, FactValue> {
    node.field_bindings
        .iter()
        .filter_map(|(field, binding)| record.field(field).map(|v| (binding.clone(), v.clone())))
        .collect()
}

/// The set of fact ids currently passing a node's test chain, plus the
/// indexes used for equality joins and retraction.
#[derive(Debug, Default)]
pub struct AlphaMemory {
    ids: HashSet<FactId>,
    field_index: HashMap<(String, FactValue), HashSet<FactId>>,
}

impl AlphaMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: &Record) {
        self.ids.insert(record.id().clone());
        for (field, value) in record.fields() {
            self.field_index
                .entry((field.clone(), value.clone()))
                .or_default()
                .insert(record.id().clone());
        }
    }

    /// Remove a fact, given the record it was inserted with (needed to
    /// clean the field index, since the index has no reverse mapping).
    pub fn remove(&mut self, record: &Record) {
        self.ids.remove(record.id());
        for (field, value) in record.fields() {
            if let Some(set) = self.field_index.get_mut(&(field.clone(), value.clone())) {
                set.remove(record.id());
                if set.is_empty() {
                    self.field_index.remove(&(field.clone(), value.clone()));
                }
            }
        }
    }

    pub fn contains(&self, id: &FactId) -> bool {
        self.ids.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &FactId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// O(1) lookup of facts with a given field equal to a literal value,
    /// used by equality joins against an indexed field.
    pub fn ids_with_field_value(&self, field: &str, value: &FactValue) -> Option<&HashSet<FactId>> {
        self.field_index.get(&(field.to_string(), value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkBuilder;
    use crate::predicate::Operator;

    #[test]
    fn passes_checks_type_and_test_chain() {
        let mut builder = NetworkBuilder::new();
        let alpha_id = builder.add_alpha(
            "Employee",
            vec![AlphaTest {
                field: "hours".into(),
                op: Operator::Gt,
                literal: FactValue::Int(40),
            }],
            vec![],
        );
        let network = builder.build();
        let node = network.get_alpha_node(alpha_id).unwrap();
        let predicates = PredicateRegistry::new();

        let over = Record::new("e1", "Employee").with_field("hours", 45i64);
        let under = Record::new("e2", "Employee").with_field("hours", 30i64);
        let wrong_type = Record::new("x1", "Manager").with_field("hours", 50i64);

        assert!(passes(node, &over, &predicates));
        assert!(!passes(node, &under, &predicates));
        assert!(!passes(node, &wrong_type, &predicates));
    }

    #[test]
    fn insert_and_remove_maintain_field_index() {
        let mut mem = AlphaMemory::new();
        let rec = Record::new("e1", "Employee").with_field("hours", 45i64);
        mem.insert(&rec);

        assert!(mem.contains(&FactId::new("e1")));
        assert!(mem
            .ids_with_field_value("hours", &FactValue::Int(45))
            .unwrap()
            .contains(&FactId::new("e1")));

        mem.remove(&rec);
        assert!(!mem.contains(&FactId::new("e1")));
        assert!(mem.ids_with_field_value("hours", &FactValue::Int(45)).is_none());
    }
}
