//! Per-case integration contexts and the capabilities they carry.
//!
//! An [`IntegrationContext`] is produced by the case sequence for every
//! generated case, consumed once by an invocation coordinator, and dropped
//! once the outcome is known. Its [`FiltrationContext`] runs the test body
//! and turns precondition failures into a `Filtered` outcome; its
//! [`FailureReporter`] forwards genuine failures to the search engine.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::value::Value;

/// Classifies a failure raised by a test body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A precondition on the generated case did not hold.
    AssumptionViolated,
    /// The body asked for the case to be abandoned.
    Aborted,
    AssertionFailed,
    /// The body panicked with a payload that was not a `Failure`.
    Panicked,
    /// A formal parameter could not be supplied.
    ParameterResolution,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::AssumptionViolated => write!(f, "assumption violated"),
            FailureKind::Aborted => write!(f, "aborted"),
            FailureKind::AssertionFailed => write!(f, "assertion failed"),
            FailureKind::Panicked => write!(f, "panicked"),
            FailureKind::ParameterResolution => write!(f, "parameter resolution"),
            FailureKind::Other => write!(f, "failure"),
        }
    }
}

/// Why a test body did not complete normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn assumption(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AssumptionViolated, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Aborted, message)
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AssertionFailed, message)
    }

    /// Recovers a failure from a caught panic payload. A payload that is
    /// itself a `Failure` keeps its kind, so `std::panic::panic_any` can be
    /// used to filter from code that cannot return a `Result`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<Failure>() {
            Ok(failure) => return *failure,
            Err(payload) => payload,
        };
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self::new(FailureKind::Panicked, message)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

/// Rejects the current case unless `condition` holds.
pub fn assume(condition: bool) -> Result<(), Failure> {
    if condition {
        Ok(())
    } else {
        Err(Failure::assumption("case rejected by assumption"))
    }
}

/// The failure kinds treated as "this case was invalid" rather than as a bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiltrationKinds(HashSet<FailureKind>);

impl FiltrationKinds {
    pub fn new<I: IntoIterator<Item = FailureKind>>(kinds: I) -> Self {
        Self(kinds.into_iter().collect())
    }

    pub fn contains(&self, kind: FailureKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn with(mut self, kind: FailureKind) -> Self {
        self.0.insert(kind);
        self
    }
}

impl Default for FiltrationKinds {
    fn default() -> Self {
        Self::new([FailureKind::AssumptionViolated, FailureKind::Aborted])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiltrationOutcome {
    Completed,
    Filtered,
}

/// One generated case: the top-level values, one per generator binding.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Case(Vec<Value>);

impl Case {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for Case {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl fmt::Display for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{}", single),
            values => write!(f, "{}", Value::List(values.to_vec())),
        }
    }
}

/// Receives what happened to a case; implemented by the search engine.
pub trait CaseFeedback: Send + Sync {
    fn case_filtered(&self) {}

    fn case_failed(&self, cause: &Failure);
}

/// Feedback sink for contexts that are not driven by a search engine.
#[derive(Debug, Default)]
pub struct NoFeedback;

impl CaseFeedback for NoFeedback {
    fn case_failed(&self, _cause: &Failure) {}
}

/// Runs a test body, separating filtration from genuine failure.
#[derive(Clone)]
pub struct FiltrationContext {
    feedback: Arc<dyn CaseFeedback>,
}

impl FiltrationContext {
    pub fn new(feedback: Arc<dyn CaseFeedback>) -> Self {
        Self { feedback }
    }

    /// Executes `body`. A failure whose kind is in `kinds`, returned or
    /// raised as a panic, yields `Filtered`; any other failure is returned
    /// unmodified as the error.
    pub fn run<F>(&self, body: F, kinds: &FiltrationKinds) -> Result<FiltrationOutcome, Failure>
    where
        F: FnOnce() -> Result<(), Failure>,
    {
        let result = match catch_unwind(AssertUnwindSafe(body)) {
            Ok(result) => result,
            Err(payload) => Err(Failure::from_panic(payload)),
        };

        match result {
            Ok(()) => Ok(FiltrationOutcome::Completed),
            Err(failure) if kinds.contains(failure.kind) => {
                debug!("Case filtered: {}", failure);
                self.feedback.case_filtered();
                Ok(FiltrationOutcome::Filtered)
            }
            Err(failure) => Err(failure),
        }
    }
}

impl fmt::Debug for FiltrationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiltrationContext").finish_non_exhaustive()
    }
}

/// Forwards a genuine failure to the search engine, at most once.
pub struct FailureReporter {
    feedback: Arc<dyn CaseFeedback>,
    reported: AtomicBool,
}

impl FailureReporter {
    pub fn new(feedback: Arc<dyn CaseFeedback>) -> Self {
        Self {
            feedback,
            reported: AtomicBool::new(false),
        }
    }

    /// Returns whether the failure was forwarded; repeat reports are dropped.
    pub fn report(&self, cause: &Failure) -> bool {
        if self.reported.swap(true, Ordering::SeqCst) {
            warn!("Ignoring repeated failure report: {}", cause);
            return false;
        }
        self.feedback.case_failed(cause);
        true
    }

    pub fn has_reported(&self) -> bool {
        self.reported.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for FailureReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureReporter")
            .field("reported", &self.has_reported())
            .finish_non_exhaustive()
    }
}

/// One case plus the capabilities needed to resolve its outcome.
#[derive(Debug)]
pub struct IntegrationContext {
    case: Case,
    is_part_of_shrinkage: bool,
    filtration: FiltrationContext,
    reporter: FailureReporter,
}

impl IntegrationContext {
    pub fn new(case: Case, is_part_of_shrinkage: bool, feedback: Arc<dyn CaseFeedback>) -> Self {
        Self {
            case,
            is_part_of_shrinkage,
            filtration: FiltrationContext::new(feedback.clone()),
            reporter: FailureReporter::new(feedback),
        }
    }

    /// A context whose filtrations and failures go nowhere.
    pub fn detached(case: Case, is_part_of_shrinkage: bool) -> Self {
        Self::new(case, is_part_of_shrinkage, Arc::new(NoFeedback))
    }

    pub fn case(&self) -> &Case {
        &self.case
    }

    pub fn is_part_of_shrinkage(&self) -> bool {
        self.is_part_of_shrinkage
    }

    pub fn filtration(&self) -> &FiltrationContext {
        &self.filtration
    }

    pub fn reporter(&self) -> &FailureReporter {
        &self.reporter
    }
}
