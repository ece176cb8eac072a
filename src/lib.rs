//! # Trials Bridge
//!
//! Plumbing between a property-based case generator and a host test runner.
//!
//! Generated cases are laid out over a test template's formal parameters,
//! expanding tuples into consecutive slots where the slot can't take the
//! tuple whole. Each case runs inside a filtration scope so that violated
//! assumptions skip the case instead of failing it, and genuine failures
//! are reported back so the generator can minimize them.

pub mod value;
pub mod error;
pub mod adaptation;
pub mod context;
pub mod extension;
pub mod binder;
pub mod config;
pub mod trials;
pub mod coordinator;
pub mod host;
pub mod typed;

pub use value::{TypeTag, Value};
pub use error::{BindError, ConfigurationError, InvocationError, ResolutionError};
pub use adaptation::{AdaptationRegistry, AdaptationRule, RuleChoice};
pub use context::{
    assume, Case, CaseFeedback, NoFeedback, Failure, FailureKind, FailureReporter, FiltrationContext, FiltrationKinds,
    FiltrationOutcome, IntegrationContext,
};
pub use extension::{FixtureResolver, InvocationInterceptor, ParameterContext, ParameterResolver, TestWatcher};
pub use binder::{AdaptedArguments, ArgumentBinder, ArgumentList, SlotAdaptationCache};
pub use config::{derive_seed, validate_layout, TestFixture, TrialsConfig};
pub use trials::{CaseSequence, Draw, MinimalFailure, SupplyToSyntax, Trials};
pub use coordinator::{BodyOutcome, InvocationCoordinator, InvocationState, SHRINKING_PREFIX};
pub use host::{InvocationOutcome, InvocationReport, TemplateExecutor, TemplateReport, TestTemplate};
pub use typed::{dynamic_tests, dynamic_tests_with, Bytes, DynamicTest, DynamicTests, FromValue, Signature};
