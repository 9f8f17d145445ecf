//! Calculator registry: named functions invokable from right-hand-side
//! expressions (e.g. a `call` action's `args`, or a future compiler
//! emitting computed bindings). Process-wide and read-mostly, like the
//! [`crate::predicate::PredicateRegistry`] it sits alongside.

use std::collections::BTreeMap;

use rete_fact::FactValue;

/// The type a calculator function promises to return, for callers that
/// want to validate a compiled expression before it ever runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Int,
    Decimal,
    Str,
    Bool,
}

pub type CalculatorFn = fn(&[FactValue]) -> Option<FactValue>;

#[derive(Debug, Clone)]
struct CalculatorEntry {
    arity: usize,
    return_type: ReturnType,
    f: CalculatorFn,
}

/// Process-wide mapping from function name to evaluator, arity, and
/// declared return type. Seeded with basic arithmetic on numeric
/// `FactValue`s; custom registrations layer on top.
#[derive(Debug, Clone, Default)]
pub struct CalculatorRegistry {
    functions: BTreeMap<String, CalculatorEntry>,
}

impl CalculatorRegistry {
    pub fn new() -> Self {
        let mut registry = CalculatorRegistry::default();
        registry.register_builtins();
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, arity: usize, return_type: ReturnType, f: CalculatorFn) {
        self.functions.insert(name.into(), CalculatorEntry { arity, return_type, f });
    }

    pub fn evaluate(&self, name: &str, args: &[FactValue]) -> Option<FactValue> {
        let entry = self.functions.get(name)?;
        if args.len() != entry.arity {
            return None;
        }
        (entry.f)(args)
    }

    pub fn arity(&self, name: &str) -> Option<usize> {
        self.functions.get(name).map(|e| e.arity)
    }

    pub fn return_type(&self, name: &str) -> Option<ReturnType> {
        self.functions.get(name).map(|e| e.return_type)
    }

    fn register_builtins(&mut self) {
        self.register("add", 2, ReturnType::Decimal, |args| {
            Some(FactValue::Decimal(args[0].as_decimal()? + args[1].as_decimal()?))
        });
        self.register("subtract", 2, ReturnType::Decimal, |args| {
            Some(FactValue::Decimal(args[0].as_decimal()? - args[1].as_decimal()?))
        });
        self.register("multiply", 2, ReturnType::Decimal, |args| {
            Some(FactValue::Decimal(args[0].as_decimal()? * args[1].as_decimal()?))
        });
        self.register("divide", 2, ReturnType::Decimal, |args| {
            let divisor = args[1].as_decimal()?;
            if divisor == 0.0 {
                return None;
            }
            Some(FactValue::Decimal(args[0].as_decimal()? / divisor))
        });
        self.register("min", 2, ReturnType::Decimal, |args| {
            let (a, b) = (args[0].as_decimal()?, args[1].as_decimal()?);
            Some(FactValue::Decimal(a.min(b)))
        });
        self.register("max", 2, ReturnType::Decimal, |args| {
            let (a, b) = (args[0].as_decimal()?, args[1].as_decimal()?);
            Some(FactValue::Decimal(a.max(b)))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_add_sums_two_values() {
        let reg = CalculatorRegistry::new();
        let result = reg.evaluate("add", &[FactValue::Int(2), FactValue::Int(3)]);
        assert_eq!(result, Some(FactValue::Decimal(5.0)));
    }

    #[test]
    fn divide_by_zero_returns_none() {
        let reg = CalculatorRegistry::new();
        assert_eq!(reg.evaluate("divide", &[FactValue::Int(1), FactValue::Int(0)]), None);
    }

    #[test]
    fn wrong_arity_returns_none() {
        let reg = CalculatorRegistry::new();
        assert_eq!(reg.evaluate("add", &[FactValue::Int(1)]), None);
    }

    #[test]
    fn unknown_function_returns_none() {
        let reg = CalculatorRegistry::new();
        assert_eq!(reg.evaluate("frobnicate", &[]), None);
    }

    #[test]
    fn custom_registration_is_queryable() {
        let mut reg = CalculatorRegistry::new();
        reg.register("square", 1, ReturnType::Decimal, |args| {
            let v = args[0].as_decimal()?;
            Some(FactValue::Decimal(v * v))
        });
        assert_eq!(reg.arity("square"), Some(1));
        assert_eq!(reg.evaluate("square", &[FactValue::Int(4)]), Some(FactValue::Decimal(16.0)));
    }
}
