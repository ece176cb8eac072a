//! Tuple adaptation rules.
//!
//! Decides whether a single case value is handed to a formal parameter
//! whole, or flattened into its components across consecutive parameters.
//! The registry is built once, is read-only afterwards, and is shared
//! between invocations behind an `Arc`.

use std::fmt;

use crate::value::{TypeTag, Value};

/// A runtime-shape predicate paired with the expansion it licenses.
#[derive(Clone, Copy)]
pub struct AdaptationRule {
    label: &'static str,
    predicate: fn(&Value) -> bool,
    expansion: fn(&Value) -> Vec<Value>,
}

impl AdaptationRule {
    pub const fn new(
        label: &'static str,
        predicate: fn(&Value) -> bool,
        expansion: fn(&Value) -> Vec<Value>,
    ) -> Self {
        Self {
            label,
            predicate,
            expansion,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn matches(&self, value: &Value) -> bool {
        (self.predicate)(value)
    }

    pub fn expand(&self, value: &Value) -> Vec<Value> {
        (self.expansion)(value)
    }
}

impl fmt::Debug for AdaptationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptationRule").field("label", &self.label).finish()
    }
}

fn components(value: &Value) -> Vec<Value> {
    match value {
        Value::Tuple(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn singleton(value: &Value) -> Vec<Value> {
    vec![value.clone()]
}

fn any_value(_: &Value) -> bool {
    true
}

fn is_tuple2(value: &Value) -> bool {
    value.tuple_arity() == Some(2)
}

fn is_tuple3(value: &Value) -> bool {
    value.tuple_arity() == Some(3)
}

fn is_tuple4(value: &Value) -> bool {
    value.tuple_arity() == Some(4)
}

pub const TUPLE2: AdaptationRule = AdaptationRule::new("tuple2", is_tuple2, components);
pub const TUPLE3: AdaptationRule = AdaptationRule::new("tuple3", is_tuple3, components);
pub const TUPLE4: AdaptationRule = AdaptationRule::new("tuple4", is_tuple4, components);

/// Passes the value through unchanged.
pub const FALLBACK: AdaptationRule = AdaptationRule::new("fallback", any_value, singleton);

/// Which rule of a registry was selected for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleChoice {
    Fallback,
    Registered(usize),
}

/// Ordered list of tuple rules plus the implicit fallback.
#[derive(Debug, Clone)]
pub struct AdaptationRegistry {
    rules: Vec<AdaptationRule>,
}

impl AdaptationRegistry {
    pub fn new(rules: Vec<AdaptationRule>) -> Self {
        Self { rules }
    }

    /// Registry with the tuple rules for arities 2, 3 and 4, in that order.
    pub fn standard() -> Self {
        Self::new(vec![TUPLE2, TUPLE3, TUPLE4])
    }

    pub fn rules(&self) -> &[AdaptationRule] {
        &self.rules
    }

    pub fn rule(&self, choice: RuleChoice) -> &AdaptationRule {
        match choice {
            RuleChoice::Fallback => &FALLBACK,
            RuleChoice::Registered(index) => &self.rules[index],
        }
    }

    /// Picks the rule for `value` bound against a slot of type `formal`.
    ///
    /// A slot that can hold the value directly always gets the fallback;
    /// otherwise the first registered rule matching the value's shape wins.
    pub fn resolve(&self, formal: &TypeTag, value: &Value) -> RuleChoice {
        if formal.accepts(value) {
            return RuleChoice::Fallback;
        }
        self.rules
            .iter()
            .position(|rule| rule.matches(value))
            .map_or(RuleChoice::Fallback, RuleChoice::Registered)
    }

    /// Whether some registered rule expands tuples of this arity.
    pub fn expands_arity(&self, arity: usize) -> bool {
        let probe = Value::Tuple(vec![Value::Null; arity]);
        self.rules.iter().any(|rule| rule.matches(&probe))
    }
}

impl Default for AdaptationRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignable_value_uses_fallback() {
        let registry = AdaptationRegistry::standard();
        let pair = Value::from((5, "hello"));
        let slot = TypeTag::tuple([TypeTag::Integer, TypeTag::String]);

        assert_eq!(registry.resolve(&slot, &pair), RuleChoice::Fallback);
        assert_eq!(registry.resolve(&TypeTag::Any, &pair), RuleChoice::Fallback);
    }

    #[test]
    fn test_tuple_rules_are_scanned_in_order() {
        let registry = AdaptationRegistry::standard();
        let triple = Value::from((1, 2, 3));
        let quadruple = Value::from((1, 2, 3, 4));

        assert_eq!(registry.resolve(&TypeTag::Integer, &Value::from((1, 2))), RuleChoice::Registered(0));
        assert_eq!(registry.resolve(&TypeTag::Integer, &triple), RuleChoice::Registered(1));
        assert_eq!(registry.resolve(&TypeTag::Integer, &quadruple), RuleChoice::Registered(2));
        assert_eq!(registry.rule(RuleChoice::Registered(1)).label(), "tuple3");
    }

    #[test]
    fn test_unmatched_shapes_fall_back() {
        let registry = AdaptationRegistry::standard();
        let quintuple = Value::tuple((1..=5).map(Value::Integer));

        assert_eq!(registry.resolve(&TypeTag::Integer, &quintuple), RuleChoice::Fallback);
        assert_eq!(registry.resolve(&TypeTag::String, &Value::Integer(3)), RuleChoice::Fallback);
    }

    #[test]
    fn test_expansions() {
        let pair = Value::from((5, "hello"));
        assert_eq!(TUPLE2.expand(&pair), vec![Value::Integer(5), Value::from("hello")]);
        assert_eq!(FALLBACK.expand(&pair), vec![pair.clone()]);
    }

    #[test]
    fn test_expanded_arities() {
        let registry = AdaptationRegistry::standard();
        assert!(!registry.expands_arity(1));
        assert!(registry.expands_arity(2));
        assert!(registry.expands_arity(4));
        assert!(!registry.expands_arity(5));
        assert!(!AdaptationRegistry::new(Vec::new()).expands_arity(2));
    }
}
