//! Beta memories: token tables produced by join nodes, indexed by the
//! binding names used for downstream equality joins and by participating
//! fact id for retraction traversal.

use std::collections::{BTreeMap, HashMap};

use rete_fact::FactValue;

use crate::token::{Token, TokenSignature};
use rete_fact::FactId;

fn composite_key(join_keys: &[String], bindings: &BTreeMap<String, FactValue>) -> Option<String> {
    let mut parts = Vec::with_capacity(join_keys.len());
    for key in join_keys {
        let value = bindings.get(key)?;
        parts.push(format!("{key}={value:?}"));
    }
    parts.sort_unstable();
    Some(parts.join("|"))
}

/// Tokens produced by one beta (join) node, with hash indexes keyed by
/// the binding-name combinations that downstream joins query by, and a
/// reverse index from fact id to signature for retraction traversal.
#[derive(Debug, Default)]
pub struct BetaMemory {
    tokens: BTreeMap<TokenSignature, Token>,
    by_fact_id: HashMap<FactId, Vec<TokenSignature>>,
    combo_indexes: HashMap<Vec<String>, HashMap<String, Vec<TokenSignature>>>,
}

impl BetaMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a join-key combination that a downstream node will query
    /// this memory by. Must be called before tokens are inserted so the
    /// index stays consistent incrementally; calling it more than once
    /// with the same keys is a no-op.
    pub fn register_combo(&mut self, join_keys: Vec<String>) {
        self.combo_indexes.entry(join_keys).or_default();
    }

    pub fn insert(&mut self, token: Token) {
        let sig = token.signature().clone();
        for id in token.fact_ids() {
            self.by_fact_id.entry(id.clone()).or_default().push(sig.clone());
        }
        for (keys, index) in self.combo_indexes.iter_mut() {
            if let Some(composite) = composite_key(keys, token.bindings()) {
                index.entry(composite).or_default().push(sig.clone());
            }
        }
        self.tokens.insert(sig, token);
    }

    fn remove_signature(&mut self, sig: &TokenSignature) -> Option<Token> {
        let token = self.tokens.remove(sig)?;
        for id in token.fact_ids() {
            if let Some(list) = self.by_fact_id.get_mut(id) {
                list.retain(|s| s != sig);
            }
        }
        for index in self.combo_indexes.values_mut() {
            for list in index.values_mut() {
                list.retain(|s| s != sig);
            }
        }
        Some(token)
    }

    /// Remove and return every token whose fact-id list contains `id`,
    /// as performed when propagating a retraction.
    pub fn remove_containing(&mut self, id: &FactId) -> Vec<Token> {
        let sigs = self.by_fact_id.remove(id).unwrap_or_default();
        sigs.iter().filter_map(|s| self.remove_signature(s)).collect()
    }

    /// Tokens whose bindings match `values` on every name in `join_keys`.
    /// Uses the registered index when available, otherwise scans.
    pub fn matching(&self, join_keys: &[String], values: &BTreeMap<String, FactValue>) -> Vec<&Token> {
        if let Some(index) = self.combo_indexes.get(join_keys) {
            return match composite_key(join_keys, values) {
                Some(key) => index
                    .get(&key)
                    .map(|sigs| sigs.iter().filter_map(|s| self.tokens.get(s)).collect())
                    .unwrap_or_default(),
                None => Vec::new(),
            };
        }
        self.tokens
            .values()
            .filter(|t| {
                join_keys
                    .iter()
                    .all(|k| t.bindings().get(k) == values.get(k) && values.get(k).is_some())
            })
            .collect()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.tokens.values()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, i64)]) -> BTreeMap<String, FactValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FactValue::Int(*v)))
            .collect()
    }

    #[test]
    fn matching_finds_tokens_by_join_key_via_index() {
        let mut mem = BetaMemory::new();
        mem.register_combo(vec!["M".to_string()]);

        let t1 = Token::root(FactId::new("e1"), bindings(&[("M", 1)]));
        let t2 = Token::root(FactId::new("e2"), bindings(&[("M", 2)]));
        mem.insert(t1.clone());
        mem.insert(t2);

        let found = mem.matching(&["M".to_string()], &bindings(&[("M", 1)]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].signature(), t1.signature());
    }

    #[test]
    fn remove_containing_drops_token_and_index_entries() {
        let mut mem = BetaMemory::new();
        mem.register_combo(vec!["M".to_string()]);
        let t1 = Token::root(FactId::new("e1"), bindings(&[("M", 1)]));
        mem.insert(t1);

        let removed = mem.remove_containing(&FactId::new("e1"));
        assert_eq!(removed.len(), 1);
        assert!(mem.is_empty());
        assert!(mem.matching(&["M".to_string()], &bindings(&[("M", 1)])).is_empty());
    }

    #[test]
    fn matching_falls_back_to_scan_without_registered_combo() {
        let mut mem = BetaMemory::new();
        let t1 = Token::root(FactId::new("e1"), bindings(&[("M", 1)]));
        mem.insert(t1.clone());

        let found = mem.matching(&["M".to_string()], &bindings(&[("M", 1)]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].signature(), t1.signature());
    }
}
