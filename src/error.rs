//! Error types for configuration, binding and parameter resolution.
//!
//! Test-body failures are not errors of this crate; they are carried as
//! [`crate::context::Failure`] values.

use thiserror::Error;

use crate::value::TypeTag;

/// Fatal problems with a test template, raised before any case is generated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Failed to find field of name: `{field}` in test class `{class}`.")]
    MissingField { field: String, class: String },

    #[error("Field of name `{field}` in test class `{class}` has the wrong type of `{actual}` - should be typed as a `Trials`.")]
    WrongFieldType {
        field: String,
        class: String,
        actual: String,
    },

    #[error("Template `{template}` declares no generator bindings.")]
    NoBindings { template: String },

    #[error("Binding `{binding}` yields a tuple of arity {arity} which cannot be adapted to parameter {slot} of type `{declared}`; only arities 2 to 4 are expanded.")]
    UnsupportedTupleArity {
        binding: String,
        arity: usize,
        slot: usize,
        declared: TypeTag,
    },

    #[error("Template `{template}` binds {values} case values but only {slots} formal parameters can receive them.")]
    ExcessCaseValues {
        template: String,
        values: usize,
        slots: usize,
    },

    #[error(transparent)]
    Bind(#[from] BindError),
}

/// Raised while flattening a case into positional arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("Tuple of arity {arity} cannot be adapted to parameter {slot} of type `{declared}`; only arities 2 to 4 are expanded.")]
    UnsupportedTupleArity {
        slot: usize,
        arity: usize,
        declared: TypeTag,
    },
}

/// Raised when a formal parameter cannot be supplied with a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("No adapted argument at parameter index {index}.")]
    MissingArgument { index: usize },

    #[error("Argument of type `{actual}` at parameter index {index} is not compatible with declared type `{declared}`.")]
    TypeMismatch {
        index: usize,
        declared: TypeTag,
        actual: TypeTag,
    },

    #[error("No parameter resolver supports parameter index {index} of type `{declared}`.")]
    NoResolver { index: usize, declared: TypeTag },
}

/// Misuse of an invocation coordinator's state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("Invocation can only start from the pending state, but it is {0}.")]
    NotPending(String),
}

pub type ConfigurationResult<T> = Result<T, ConfigurationError>;
pub type BindResult<T> = Result<T, BindError>;
pub type ResolutionResult<T> = Result<T, ResolutionError>;
