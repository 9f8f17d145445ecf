//! Operator symbols used by compiled alpha test chains and beta join
//! conditions, plus the process-wide registry that maps a symbol to its
//! evaluator.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rete_fact::FactValue;
use serde::Serialize;

/// Built-in comparison operators. Alpha test chains apply these against a
/// fact field and a literal; beta joins apply them across two bound
/// values. Custom operators register under their own symbol via
/// [`PredicateRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
        }
    }

    /// Equality-family operators can be served from an alpha/beta field
    /// index; ordering operators require a scan.
    pub fn indexable(self) -> bool {
        matches!(self, Operator::Eq | Operator::Ne)
    }

    /// Rough cardinality-reduction estimate used by a compiler's join
    /// ordering heuristics; the engine itself does not reorder, it only
    /// exposes the hint for upstream callers.
    pub fn selectivity_hint(self) -> f64 {
        match self {
            Operator::Eq => 0.1,
            Operator::Ne => 0.9,
            Operator::Lt | Operator::Gt => 0.3,
            Operator::Le | Operator::Ge => 0.3,
        }
    }

    pub fn evaluate(self, left: &FactValue, right: &FactValue) -> bool {
        match self {
            Operator::Eq => left == right,
            Operator::Ne => left != right,
            _ => match compare(left, right) {
                Some(ord) => match self {
                    Operator::Lt => ord == Ordering::Less,
                    Operator::Le => ord != Ordering::Greater,
                    Operator::Gt => ord == Ordering::Greater,
                    Operator::Ge => ord != Ordering::Less,
                    Operator::Eq | Operator::Ne => unreachable!(),
                },
                None => false,
            },
        }
    }
}

/// Order two values when both widen to a comparable numeric or string
/// form; returns `None` for incomparable pairs (e.g. a bool vs a list),
/// which makes ordering predicates against them evaluate to `false`
/// rather than panic.
fn compare(left: &FactValue, right: &FactValue) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (left.as_decimal(), right.as_decimal()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

/// Function signature for the predicate registry: takes the left and
/// right operand and returns a boolean.
pub type PredicateFn = fn(&FactValue, &FactValue) -> bool;

/// Process-wide, read-mostly mapping from operator symbol to evaluator.
/// Seeded with the six built-ins; custom operators can be registered
/// alongside them under their own symbol.
#[derive(Debug, Clone)]
pub struct PredicateRegistry {
    custom: BTreeMap<String, PredicateFn>,
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        PredicateRegistry {
            custom: BTreeMap::new(),
        }
    }
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, symbol: impl Into<String>, f: PredicateFn) {
        self.custom.insert(symbol.into(), f);
    }

    /// Evaluate `symbol(left, right)`. Built-in symbols are resolved
    /// without a table lookup; anything else falls through to the
    /// custom table.
    pub fn evaluate(&self, symbol: &str, left: &FactValue, right: &FactValue) -> Option<bool> {
        if let Some(op) = builtin(symbol) {
            return Some(op.evaluate(left, right));
        }
        self.custom.get(symbol).map(|f| f(left, right))
    }

    pub fn indexable(&self, symbol: &str) -> bool {
        builtin(symbol).map(Operator::indexable).unwrap_or(false)
    }

    pub fn selectivity_hint(&self, symbol: &str) -> f64 {
        builtin(symbol).map(Operator::selectivity_hint).unwrap_or(0.5)
    }
}

fn builtin(symbol: &str) -> Option<Operator> {
    match symbol {
        "eq" => Some(Operator::Eq),
        "ne" => Some(Operator::Ne),
        "lt" => Some(Operator::Lt),
        "le" => Some(Operator::Le),
        "gt" => Some(Operator::Gt),
        "ge" => Some(Operator::Ge),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gt_compares_numeric_values() {
        assert!(Operator::Gt.evaluate(&FactValue::Int(45), &FactValue::Int(40)));
        assert!(!Operator::Gt.evaluate(&FactValue::Int(30), &FactValue::Int(40)));
    }

    #[test]
    fn eq_and_ne_are_indexable_ordering_is_not() {
        assert!(Operator::Eq.indexable());
        assert!(Operator::Ne.indexable());
        assert!(!Operator::Gt.indexable());
    }

    #[test]
    fn registry_resolves_builtins_and_custom_operators() {
        let mut reg = PredicateRegistry::new();
        reg.register("divisible_by", |l, r| match (l.as_int(), r.as_int()) {
            (Some(l), Some(r)) if r != 0 => l % r == 0,
            _ => false,
        });

        assert_eq!(
            reg.evaluate("gt", &FactValue::Int(45), &FactValue::Int(40)),
            Some(true)
        );
        assert_eq!(
            reg.evaluate("divisible_by", &FactValue::Int(10), &FactValue::Int(5)),
            Some(true)
        );
        assert_eq!(reg.evaluate("unknown_op", &FactValue::Int(1), &FactValue::Int(1)), None);
    }

    #[test]
    fn incomparable_types_yield_false_not_panic() {
        assert!(!Operator::Lt.evaluate(&FactValue::Bool(true), &FactValue::Int(1)));
    }
}
