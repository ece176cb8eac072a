//! Statically typed test bodies.
//!
//! A [`Signature`] is a tuple of Rust types standing in for a parameter list:
//! its formal types drive the binder, and the adapted arguments are
//! converted back into the tuple before the body runs. [`dynamic_tests`]
//! turns a supply of generators into one lazily built test per case.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use log::{error, info};

use crate::adaptation::AdaptationRegistry;
use crate::binder::ArgumentList;
use crate::config::validate_layout;
use crate::context::{Failure, FailureKind, FiltrationKinds};
use crate::coordinator::{BodyOutcome, InvocationCoordinator};
use crate::error::{ConfigurationResult, ResolutionError, ResolutionResult};
use crate::host::{settle, InvocationOutcome};
use crate::trials::{CaseSequence, SupplyToSyntax};
use crate::value::{TypeTag, Value};

/// A Rust type that can be read back out of a [`Value`].
pub trait FromValue: Sized {
    /// The slot type this Rust type declares.
    fn type_tag() -> TypeTag;

    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn type_tag() -> TypeTag {
        TypeTag::Any
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    fn type_tag() -> TypeTag {
        TypeTag::Boolean
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn type_tag() -> TypeTag {
        TypeTag::Integer
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    fn type_tag() -> TypeTag {
        TypeTag::Integer
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => i32::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn type_tag() -> TypeTag {
        TypeTag::Float
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn type_tag() -> TypeTag {
        TypeTag::String
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Raw bytes; `Vec<u8>` already reads as a list of integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl FromValue for Bytes {
    fn type_tag() -> TypeTag {
        TypeTag::Bytes
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(bytes) => Some(Bytes(bytes.clone())),
            _ => None,
        }
    }
}

/// The boxed form of `T`: null reads as `None`.
impl<T: FromValue> FromValue for Option<T> {
    fn type_tag() -> TypeTag {
        TypeTag::optional(T::type_tag())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn type_tag() -> TypeTag {
        TypeTag::list(T::type_tag())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::List(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

macro_rules! tuple_from_value {
    ($arity:expr; $($name:ident $index:tt),+) => {
        impl<$($name: FromValue),+> FromValue for ($($name,)+) {
            fn type_tag() -> TypeTag {
                TypeTag::tuple(vec![$($name::type_tag()),+])
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::Tuple(items) if items.len() == $arity => {
                        Some(($($name::from_value(&items[$index])?,)+))
                    }
                    _ => None,
                }
            }
        }
    };
}

tuple_from_value!(2; A 0, B 1);
tuple_from_value!(3; A 0, B 1, C 2);
tuple_from_value!(4; A 0, B 1, C 2, D 3);

/// A parameter list expressed as a tuple of [`FromValue`] types.
pub trait Signature: Sized {
    fn formal_types() -> Vec<TypeTag>;

    fn from_arguments(arguments: &ArgumentList) -> ResolutionResult<Self>;
}

fn argument<T: FromValue>(arguments: &ArgumentList, index: usize) -> ResolutionResult<T> {
    let value = arguments
        .get(index)
        .ok_or(ResolutionError::MissingArgument { index })?;
    T::from_value(value).ok_or_else(|| ResolutionError::TypeMismatch {
        index,
        declared: T::type_tag(),
        actual: value.runtime_type(),
    })
}

macro_rules! signature {
    ($($name:ident $index:tt),+) => {
        impl<$($name: FromValue),+> Signature for ($($name,)+) {
            fn formal_types() -> Vec<TypeTag> {
                vec![$($name::type_tag()),+]
            }

            fn from_arguments(arguments: &ArgumentList) -> ResolutionResult<Self> {
                Ok(($(argument::<$name>(arguments, $index)?,)+))
            }
        }
    };
}

signature!(A 0);
signature!(A 0, B 1);
signature!(A 0, B 1, C 2);
signature!(A 0, B 1, C 2, D 3);

type Consumer<S> = Arc<dyn Fn(S) -> Result<(), Failure> + Send + Sync>;

/// One case, ready to run.
pub struct DynamicTest {
    display_name: String,
    is_part_of_shrinkage: bool,
    executable: Box<dyn FnOnce() -> InvocationOutcome>,
}

impl DynamicTest {
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_part_of_shrinkage(&self) -> bool {
        self.is_part_of_shrinkage
    }

    /// Runs the body and reports a genuine failure back to the sequence
    /// that produced this test.
    pub fn execute(self) -> InvocationOutcome {
        (self.executable)()
    }
}

impl fmt::Debug for DynamicTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicTest")
            .field("display_name", &self.display_name)
            .field("is_part_of_shrinkage", &self.is_part_of_shrinkage)
            .finish_non_exhaustive()
    }
}

/// Lazily yields one [`DynamicTest`] per integration context.
///
/// Minimization cases only appear once an earlier test has been executed
/// and failed, so each test should be executed before pulling the next.
pub struct DynamicTests<S> {
    sequence: CaseSequence,
    registry: Arc<AdaptationRegistry>,
    filtration_kinds: Arc<FiltrationKinds>,
    consumer: Consumer<S>,
    invocation_index: usize,
    _signature: PhantomData<fn() -> S>,
}

impl<S> DynamicTests<S> {
    pub fn sequence(&self) -> &CaseSequence {
        &self.sequence
    }
}

impl<S: Signature + 'static> Iterator for DynamicTests<S> {
    type Item = DynamicTest;

    fn next(&mut self) -> Option<DynamicTest> {
        let context = self.sequence.next()?;
        self.invocation_index += 1;
        let is_part_of_shrinkage = context.is_part_of_shrinkage();

        let coordinator = match InvocationCoordinator::new(
            context,
            self.registry.clone(),
            S::formal_types(),
            self.filtration_kinds.clone(),
            self.invocation_index,
        ) {
            Ok(coordinator) => coordinator,
            Err(bind_error) => {
                error!("Invocation {} could not be bound: {}", self.invocation_index, bind_error);
                let cause = Failure::new(FailureKind::Other, bind_error.to_string());
                return Some(DynamicTest {
                    display_name: format!("[{}] unbound", self.invocation_index),
                    is_part_of_shrinkage,
                    executable: Box::new(move || InvocationOutcome::Failed(cause)),
                });
            }
        };

        let display_name = coordinator.display_name();
        let consumer = self.consumer.clone();
        let mut coordinator = coordinator;
        let executable = move || {
            let outcome = match S::from_arguments(coordinator.arguments()) {
                Err(error) => BodyOutcome::Failed(Failure::new(FailureKind::ParameterResolution, error.to_string())),
                Ok(arguments) => coordinator
                    .invoke(|| consumer(arguments))
                    .unwrap_or_else(|misuse| BodyOutcome::Failed(Failure::new(FailureKind::Other, misuse.to_string()))),
            };
            settle(&mut coordinator, outcome)
        };

        Some(DynamicTest {
            display_name,
            is_part_of_shrinkage,
            executable: Box::new(executable),
        })
    }
}

/// Typed tests for `supply` under the standard adaptation rules.
///
/// The layout is checked against `S` before anything is generated; the seed
/// comes from the supply's config, or from `name` when none is fixed.
pub fn dynamic_tests<S, F>(name: &str, supply: &SupplyToSyntax, consumer: F) -> ConfigurationResult<DynamicTests<S>>
where
    S: Signature + 'static,
    F: Fn(S) -> Result<(), Failure> + Send + Sync + 'static,
{
    dynamic_tests_with(Arc::new(AdaptationRegistry::standard()), name, supply, consumer)
}

pub fn dynamic_tests_with<S, F>(
    registry: Arc<AdaptationRegistry>,
    name: &str,
    supply: &SupplyToSyntax,
    consumer: F,
) -> ConfigurationResult<DynamicTests<S>>
where
    S: Signature + 'static,
    F: Fn(S) -> Result<(), Failure> + Send + Sync + 'static,
{
    let config = supply.config();
    let bindings: Vec<_> = supply
        .trials()
        .iter()
        .enumerate()
        .map(|(position, trials)| (format!("#{}", position), trials.clone()))
        .collect();
    validate_layout(name, &bindings, &S::formal_types(), &registry, config.strict_arity)?;

    let seed = config.seed_for(name);
    info!("Building dynamic tests for `{}` with seed {}", name, seed);
    Ok(DynamicTests {
        sequence: supply.test_integration_contexts(seed),
        registry,
        filtration_kinds: Arc::new(config.filtration_kinds.clone()),
        consumer: Arc::new(consumer),
        invocation_index: 0,
        _signature: PhantomData,
    })
}
