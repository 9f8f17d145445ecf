//! Immutable partial matches threaded through the beta network.

use std::collections::BTreeMap;
use std::fmt;

use rete_fact::{FactId, FactValue};

/// A canonical signature over a token's participating fact ids and
/// binding names, insensitive to join order. Two tokens built from the
/// same facts and binding names via different join paths compare equal
/// under this signature even though their `bindings` insertion order may
/// differ — sorting happens once, at construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenSignature(String);

impl TokenSignature {
    fn compute(fact_ids: &[FactId], binding_names: &[String]) -> Self {
        let mut ids: Vec<&str> = fact_ids.iter().map(FactId::as_str).collect();
        ids.sort_unstable();
        let mut names: Vec<&str> = binding_names.iter().map(String::as_str).collect();
        names.sort_unstable();
        TokenSignature(format!("ids:[{}]|names:[{}]", ids.join(","), names.join(",")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable partial match. `bindings` maps a pattern variable name to
/// the bound value; `fact_ids` is the ordered list of working-memory
/// elements (WMEs) that contributed to the match, in join order.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    bindings: BTreeMap<String, FactValue>,
    fact_ids: Vec<FactId>,
    signature: TokenSignature,
}

impl Token {
    /// The root token for a single-pattern alpha match: one fact, its
    /// bindings taken verbatim.
    pub fn root(fact_id: FactId, bindings: BTreeMap<String, FactValue>) -> Self {
        let fact_ids = vec![fact_id];
        let names: Vec<String> = bindings.keys().cloned().collect();
        let signature = TokenSignature::compute(&fact_ids, &names);
        Token {
            bindings,
            fact_ids,
            signature,
        }
    }

    /// Produce a new token extending this one with another pattern's
    /// bindings and fact id, as performed by a beta join node.
    pub fn extend(&self, new_bindings: BTreeMap<String, FactValue>, wme: FactId) -> Token {
        let mut bindings = self.bindings.clone();
        bindings.extend(new_bindings);
        let mut fact_ids = self.fact_ids.clone();
        fact_ids.push(wme);
        let names: Vec<String> = bindings.keys().cloned().collect();
        let signature = TokenSignature::compute(&fact_ids, &names);
        Token {
            bindings,
            fact_ids,
            signature,
        }
    }

    pub fn bindings(&self) -> &BTreeMap<String, FactValue> {
        &self.bindings
    }

    pub fn binding(&self, name: &str) -> Option<&FactValue> {
        self.bindings.get(name)
    }

    pub fn fact_ids(&self) -> &[FactId] {
        &self.fact_ids
    }

    pub fn contains(&self, id: &FactId) -> bool {
        self.fact_ids.iter().any(|existing| existing == id)
    }

    pub fn signature(&self) -> &TokenSignature {
        &self.signature
    }

    /// Number of facts participating in this token's match, used by
    /// `Activation::specificity` as a tie-breaker.
    pub fn specificity(&self) -> usize {
        self.fact_ids.len()
    }
}
