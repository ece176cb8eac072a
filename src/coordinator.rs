//! One invocation of a test body for one integration context.
//!
//! The coordinator binds the context's case to the formal parameters on
//! construction, runs the body inside the context's filtration scope, and
//! forwards genuine failures to the context's reporter when the host says
//! the invocation failed.
//!
//! ```text
//! Pending ──invoke──▶ Invoking ──▶ Completed
//!                              ├─▶ Filtered   (skip, never reported)
//!                              └─▶ Failed     (reported once via notify_failure)
//! ```

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};

use crate::adaptation::AdaptationRegistry;
use crate::binder::{AdaptedArguments, ArgumentBinder, ArgumentList};
use crate::context::{Failure, FiltrationKinds, FiltrationOutcome, IntegrationContext};
use crate::error::{BindResult, InvocationError};
use crate::value::TypeTag;

/// Marker prefixed to the display name of minimization invocations.
pub const SHRINKING_PREFIX: &str = "Shrinking ... ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Pending,
    Invoking,
    Completed,
    Filtered,
    Failed,
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationState::Pending => write!(f, "pending"),
            InvocationState::Invoking => write!(f, "invoking"),
            InvocationState::Completed => write!(f, "completed"),
            InvocationState::Filtered => write!(f, "filtered"),
            InvocationState::Failed => write!(f, "failed"),
        }
    }
}

/// What running the body amounted to.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyOutcome {
    Accepted,
    Filtered,
    Failed(Failure),
}

/// Display name for the `invocation_index`th invocation (1-based).
pub fn display_name(invocation_index: usize, is_part_of_shrinkage: bool, arguments: &ArgumentList) -> String {
    let prefix = if is_part_of_shrinkage { SHRINKING_PREFIX } else { "" };
    format!("{}[{}] {}", prefix, invocation_index, arguments)
}

pub struct InvocationCoordinator {
    context: IntegrationContext,
    binder: ArgumentBinder,
    adapted: AdaptedArguments,
    filtration_kinds: Arc<FiltrationKinds>,
    invocation_index: usize,
    state: InvocationState,
}

impl InvocationCoordinator {
    /// Binds `context`'s case against `formal_types`. Fails only for
    /// composite values no rule can adapt.
    pub fn new(
        context: IntegrationContext,
        registry: Arc<AdaptationRegistry>,
        formal_types: Vec<TypeTag>,
        filtration_kinds: Arc<FiltrationKinds>,
        invocation_index: usize,
    ) -> BindResult<Self> {
        let mut binder = ArgumentBinder::new(registry, formal_types);
        let arguments = binder.bind(context.case())?;
        debug!(
            "Invocation {} bound {} case value(s) to {} argument(s)",
            invocation_index,
            context.case().len(),
            arguments.len()
        );
        Ok(Self {
            context,
            binder,
            adapted: AdaptedArguments::new(arguments),
            filtration_kinds,
            invocation_index,
            state: InvocationState::Pending,
        })
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    pub fn context(&self) -> &IntegrationContext {
        &self.context
    }

    pub fn binder(&self) -> &ArgumentBinder {
        &self.binder
    }

    pub fn arguments(&self) -> &ArgumentList {
        self.adapted.arguments()
    }

    /// The resolver the host should consult first for every slot.
    pub fn parameter_resolver(&self) -> &AdaptedArguments {
        &self.adapted
    }

    pub fn display_name(&self) -> String {
        display_name(
            self.invocation_index,
            self.context.is_part_of_shrinkage(),
            self.arguments(),
        )
    }

    /// Whether the host should record this invocation as skipped.
    pub fn should_skip(&self) -> bool {
        self.state == InvocationState::Filtered
    }

    /// Runs `body` in the context's filtration scope. Genuine failures are
    /// returned to the host, not reported; see [`Self::notify_failure`].
    pub fn invoke<F>(&mut self, body: F) -> Result<BodyOutcome, InvocationError>
    where
        F: FnOnce() -> Result<(), Failure>,
    {
        if self.state != InvocationState::Pending {
            return Err(InvocationError::NotPending(self.state.to_string()));
        }
        self.transition(InvocationState::Invoking);

        let outcome = match self.context.filtration().run(body, &self.filtration_kinds) {
            Ok(FiltrationOutcome::Completed) => {
                self.transition(InvocationState::Completed);
                BodyOutcome::Accepted
            }
            Ok(FiltrationOutcome::Filtered) => {
                self.transition(InvocationState::Filtered);
                BodyOutcome::Filtered
            }
            Err(cause) => {
                self.transition(InvocationState::Failed);
                BodyOutcome::Failed(cause)
            }
        };
        Ok(outcome)
    }

    /// Host-driven notification that the invocation failed with `cause`.
    /// Forwards `cause` to the search engine unless this invocation was
    /// filtered or has already reported; returns whether it was forwarded.
    pub fn notify_failure(&mut self, cause: &Failure) -> bool {
        if self.state == InvocationState::Filtered {
            warn!(
                "Invocation {} was filtered; not reporting failure: {}",
                self.invocation_index, cause
            );
            return false;
        }
        if self.state != InvocationState::Failed {
            self.transition(InvocationState::Failed);
        }
        self.context.reporter().report(cause)
    }

    fn transition(&mut self, next: InvocationState) {
        debug!("Invocation {}: {} -> {}", self.invocation_index, self.state, next);
        self.state = next;
    }
}

impl fmt::Debug for InvocationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationCoordinator")
            .field("invocation_index", &self.invocation_index)
            .field("state", &self.state)
            .field("arguments", self.arguments())
            .finish_non_exhaustive()
    }
}
