//! Flattening of one case into positional arguments.
//!
//! The binder walks the case's top-level values and the formal parameter
//! list in lockstep. At each step the adaptation registry decides whether
//! the next value fills one slot or is spread over several; the decision is
//! cached per slot for the lifetime of the binder, which is one invocation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::adaptation::{AdaptationRegistry, AdaptationRule, RuleChoice};
use crate::context::Case;
use crate::error::{BindError, BindResult, ResolutionError, ResolutionResult};
use crate::extension::{ParameterContext, ParameterResolver};
use crate::value::{TypeTag, Value};

/// Positional arguments produced from one case. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgumentList(Vec<Value>);

impl ArgumentList {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Runtime type of the adapted value at `index`, if there is one.
    pub fn runtime_type(&self, index: usize) -> Option<TypeTag> {
        self.get(index).map(Value::runtime_type)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }
}

impl fmt::Display for ArgumentList {
    /// A single argument renders as itself, anything else as a bracketed
    /// sequence.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{}", single),
            values => write!(f, "{}", Value::List(values.to_vec())),
        }
    }
}

/// Slot index to the rule chosen for that slot, owned by one binder.
#[derive(Debug, Clone, Default)]
pub struct SlotAdaptationCache {
    choices: HashMap<usize, RuleChoice>,
}

impl SlotAdaptationCache {
    pub fn get(&self, slot: usize) -> Option<RuleChoice> {
        self.choices.get(&slot).copied()
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}

/// Binds one case to a formal parameter list.
#[derive(Debug)]
pub struct ArgumentBinder {
    registry: Arc<AdaptationRegistry>,
    formal_types: Vec<TypeTag>,
    cache: SlotAdaptationCache,
}

impl ArgumentBinder {
    pub fn new(registry: Arc<AdaptationRegistry>, formal_types: Vec<TypeTag>) -> Self {
        Self {
            registry,
            formal_types,
            cache: SlotAdaptationCache::default(),
        }
    }

    pub fn formal_types(&self) -> &[TypeTag] {
        &self.formal_types
    }

    pub fn cache(&self) -> &SlotAdaptationCache {
        &self.cache
    }

    /// The rule for `value` at `slot`, decided on first query and replayed
    /// verbatim afterwards.
    pub fn adaptation_for(&mut self, slot: usize, value: &Value) -> &AdaptationRule {
        let choice = self.choice_for(slot, value);
        self.registry.rule(choice)
    }

    fn choice_for(&mut self, slot: usize, value: &Value) -> RuleChoice {
        if let Some(choice) = self.cache.get(slot) {
            return choice;
        }
        let choice = match self.formal_types.get(slot) {
            Some(formal) => self.registry.resolve(formal, value),
            None => RuleChoice::Fallback,
        };
        self.cache.choices.insert(slot, choice);
        choice
    }

    /// Flattens `case` into positional arguments.
    ///
    /// Stops as soon as either the formal parameters or the case values run
    /// out. Surplus case values are dropped; missing ones leave trailing
    /// slots for other resolvers.
    pub fn bind(&mut self, case: &Case) -> BindResult<ArgumentList> {
        let mut arguments = Vec::with_capacity(self.formal_types.len());
        let mut slot = 0;
        let mut values = case.values().iter();

        while slot < self.formal_types.len() {
            let value = match values.next() {
                Some(value) => value,
                None => break,
            };

            let choice = self.choice_for(slot, value);
            if choice == RuleChoice::Fallback {
                self.check_composite(slot, value)?;
            }

            let rule = self.registry.rule(choice);
            let expansion = rule.expand(value);
            debug!(
                "Slot {} adapted with {} into {} argument(s)",
                slot,
                rule.label(),
                expansion.len()
            );
            slot += expansion.len();
            arguments.extend(expansion);
        }

        if arguments.len() > self.formal_types.len() {
            warn!(
                "Expansion produced {} argument(s) for {} formal parameter(s); truncating",
                arguments.len(),
                self.formal_types.len()
            );
            arguments.truncate(self.formal_types.len());
        }

        let dropped = values.count();
        if dropped > 0 {
            warn!(
                "Dropping {} case value(s) beyond the {} formal parameter(s)",
                dropped,
                self.formal_types.len()
            );
        }

        Ok(ArgumentList::new(arguments))
    }

    /// A tuple that neither fits its slot nor matches any registered rule
    /// would otherwise be passed whole into a slot that cannot hold it.
    fn check_composite(&self, slot: usize, value: &Value) -> BindResult<()> {
        let declared = &self.formal_types[slot];
        match value.tuple_arity() {
            Some(arity) if !declared.accepts(value) => Err(BindError::UnsupportedTupleArity {
                slot,
                arity,
                declared: declared.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Offers the adapted arguments of one invocation to the host.
#[derive(Debug, Clone)]
pub struct AdaptedArguments {
    arguments: ArgumentList,
}

impl AdaptedArguments {
    pub fn new(arguments: ArgumentList) -> Self {
        Self { arguments }
    }

    pub fn arguments(&self) -> &ArgumentList {
        &self.arguments
    }
}

impl ParameterResolver for AdaptedArguments {
    fn supports_parameter(&self, parameter: &ParameterContext<'_>) -> bool {
        match self.arguments.get(parameter.index) {
            None => false,
            Some(value) => {
                let supported = parameter.declared.accepts(value);
                if !supported {
                    debug!(
                        "Declining parameter {}: {} does not fit {}",
                        parameter.index,
                        value.runtime_type(),
                        parameter.declared
                    );
                }
                supported
            }
        }
    }

    fn resolve_parameter(&self, parameter: &ParameterContext<'_>) -> ResolutionResult<Value> {
        let value = self
            .arguments
            .get(parameter.index)
            .ok_or(ResolutionError::MissingArgument {
                index: parameter.index,
            })?;
        if parameter.declared.accepts(value) {
            Ok(value.clone())
        } else {
            Err(ResolutionError::TypeMismatch {
                index: parameter.index,
                declared: parameter.declared.clone(),
                actual: value.runtime_type(),
            })
        }
    }
}
