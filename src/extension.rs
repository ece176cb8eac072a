//! Hooks through which a host test executor talks to the invocation layer.
//!
//! A host supplies parameters slot by slot through a chain of
//! [`ParameterResolver`]s, wraps the body call with [`InvocationInterceptor`]s,
//! and notifies [`TestWatcher`]s once it has decided an invocation's outcome.

use crate::context::Failure;
use crate::error::{ResolutionError, ResolutionResult};
use crate::value::{TypeTag, Value};

/// The formal parameter a host is trying to supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterContext<'a> {
    pub index: usize,
    pub declared: &'a TypeTag,
}

impl<'a> ParameterContext<'a> {
    pub fn new(index: usize, declared: &'a TypeTag) -> Self {
        Self { index, declared }
    }
}

/// Supplies values for formal parameters.
///
/// `supports_parameter` must decline, not fail, when the resolver has
/// nothing suitable, so that the next resolver in the host's chain gets a
/// chance at the slot.
pub trait ParameterResolver {
    fn supports_parameter(&self, parameter: &ParameterContext<'_>) -> bool;

    fn resolve_parameter(&self, parameter: &ParameterContext<'_>) -> ResolutionResult<Value>;
}

/// Wraps the call of a test body.
pub trait InvocationInterceptor {
    fn intercept(&self, proceed: &mut dyn FnMut() -> Result<(), Failure>) -> Result<(), Failure>;
}

/// Observes resolved invocations.
pub trait TestWatcher {
    fn test_succeeded(&self, _display_name: &str) {}

    fn test_skipped(&self, _display_name: &str) {}

    fn test_failed(&self, display_name: &str, cause: &Failure);
}

/// Supplies host-owned fixtures by exact declared type.
#[derive(Debug, Clone, Default)]
pub struct FixtureResolver {
    fixtures: Vec<(TypeTag, Value)>,
}

impl FixtureResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, declared: TypeTag, value: impl Into<Value>) -> Self {
        self.fixtures.push((declared, value.into()));
        self
    }

    fn lookup(&self, declared: &TypeTag) -> Option<&Value> {
        self.fixtures
            .iter()
            .find(|(tag, _)| tag == declared)
            .map(|(_, value)| value)
    }
}

impl ParameterResolver for FixtureResolver {
    fn supports_parameter(&self, parameter: &ParameterContext<'_>) -> bool {
        self.lookup(parameter.declared).is_some()
    }

    fn resolve_parameter(&self, parameter: &ParameterContext<'_>) -> ResolutionResult<Value> {
        self.lookup(parameter.declared)
            .cloned()
            .ok_or_else(|| ResolutionError::NoResolver {
                index: parameter.index,
                declared: parameter.declared.clone(),
            })
    }
}

/// Resolves `parameter` through the first resolver in `chain` that supports it.
pub fn resolve_through<'r, I>(chain: I, parameter: &ParameterContext<'_>) -> ResolutionResult<Value>
where
    I: IntoIterator<Item = &'r dyn ParameterResolver>,
{
    chain
        .into_iter()
        .find(|resolver| resolver.supports_parameter(parameter))
        .map(|resolver| resolver.resolve_parameter(parameter))
        .unwrap_or_else(|| {
            Err(ResolutionError::NoResolver {
                index: parameter.index,
                declared: parameter.declared.clone(),
            })
        })
}

/// Runs `proceed` inside every interceptor of `chain`, outermost first.
pub fn intercept_through(
    chain: &[Box<dyn InvocationInterceptor>],
    proceed: &mut dyn FnMut() -> Result<(), Failure>,
) -> Result<(), Failure> {
    match chain.split_first() {
        None => proceed(),
        Some((outer, rest)) => outer.intercept(&mut || intercept_through(rest, &mut *proceed)),
    }
}
