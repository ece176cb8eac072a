//! A minimal host executor for test templates.
//!
//! The executor owns everything the invocation layer treats as the host's
//! business: validating the template before generation, pulling one
//! integration context at a time, resolving each formal parameter through
//! a resolver chain, wrapping the body in interceptors, deciding
//! pass/skip/fail, and telling watchers. Each context is fully resolved
//! before the next one is pulled.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};

use crate::adaptation::AdaptationRegistry;
use crate::config::{validate_layout, TestFixture, TrialsConfig};
use crate::context::{Failure, FailureKind};
use crate::coordinator::{BodyOutcome, InvocationCoordinator};
use crate::error::ConfigurationResult;
use crate::extension::{
    intercept_through, resolve_through, InvocationInterceptor, ParameterContext, ParameterResolver,
    TestWatcher,
};
use crate::trials::{MinimalFailure, SupplyToSyntax, Trials};
use crate::value::{TypeTag, Value};

/// The body of a test template: receives one resolved value per formal parameter.
pub type TemplateBody = Arc<dyn Fn(&[Value]) -> Result<(), Failure> + Send + Sync>;

/// A parameterised test: formal parameters, generator bindings and a body.
#[derive(Clone)]
pub struct TestTemplate {
    name: String,
    formal_types: Vec<TypeTag>,
    bindings: Vec<String>,
    body: TemplateBody,
}

impl TestTemplate {
    pub fn new<F>(name: impl Into<String>, formal_types: Vec<TypeTag>, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<(), Failure> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            formal_types,
            bindings: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// Adds a generator binding by field name; bindings supply case values
    /// in the order they are added.
    pub fn binding(mut self, field: impl Into<String>) -> Self {
        self.bindings.push(field.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formal_types(&self) -> &[TypeTag] {
        &self.formal_types
    }

    pub fn bindings(&self) -> &[String] {
        &self.bindings
    }
}

impl fmt::Debug for TestTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestTemplate")
            .field("name", &self.name)
            .field("formal_types", &self.formal_types)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    Passed,
    Skipped,
    Failed(Failure),
}

/// What happened to one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationReport {
    pub display_name: String,
    pub is_part_of_shrinkage: bool,
    pub arguments: Vec<Value>,
    pub outcome: InvocationOutcome,
}

/// Everything that happened to one template.
#[derive(Debug, Clone, Default)]
pub struct TemplateReport {
    pub invocations: Vec<InvocationReport>,
    pub minimal_failure: Option<MinimalFailure>,
}

impl TemplateReport {
    pub fn passed(&self) -> usize {
        self.count(|outcome| matches!(outcome, InvocationOutcome::Passed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, InvocationOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, InvocationOutcome::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, predicate: impl Fn(&InvocationOutcome) -> bool) -> usize {
        self.invocations
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }
}

/// Runs test templates against a shared, read-only adaptation registry.
pub struct TemplateExecutor {
    registry: Arc<AdaptationRegistry>,
    config: TrialsConfig,
    resolvers: Vec<Box<dyn ParameterResolver>>,
    interceptors: Vec<Box<dyn InvocationInterceptor>>,
    watchers: Vec<Box<dyn TestWatcher>>,
}

impl TemplateExecutor {
    pub fn new(config: TrialsConfig) -> Self {
        Self::with_registry(Arc::new(AdaptationRegistry::standard()), config)
    }

    pub fn with_registry(registry: Arc<AdaptationRegistry>, config: TrialsConfig) -> Self {
        Self {
            registry,
            config,
            resolvers: Vec::new(),
            interceptors: Vec::new(),
            watchers: Vec::new(),
        }
    }

    /// Adds a host resolver, consulted after the adapted arguments.
    pub fn resolver(mut self, resolver: impl ParameterResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Adds an interceptor; the first one added is the outermost.
    pub fn interceptor(mut self, interceptor: impl InvocationInterceptor + 'static) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    pub fn watcher(mut self, watcher: impl TestWatcher + 'static) -> Self {
        self.watchers.push(Box::new(watcher));
        self
    }

    pub fn config(&self) -> &TrialsConfig {
        &self.config
    }

    /// Resolves the template's bindings against `fixture` and checks their
    /// layout, without generating anything.
    pub fn prepare(&self, template: &TestTemplate, fixture: &TestFixture) -> ConfigurationResult<SupplyToSyntax> {
        let bindings = fixture.resolve_bindings(template.bindings())?;
        validate_layout(
            template.name(),
            &bindings,
            template.formal_types(),
            &self.registry,
            self.config.strict_arity,
        )?;
        let trials: Vec<Trials> = bindings.into_iter().map(|(_, trials)| trials).collect();
        Ok(SupplyToSyntax::new(trials, self.config.clone()))
    }

    /// Runs every case of `template`. Configuration problems abort before
    /// the first case; per-case failures only ever affect their own report.
    ///
    /// A generator declared as [`TypeTag::Any`] can only be checked case by
    /// case. When it yields a tuple no rule can adapt, the template aborts
    /// at that case with [`crate::error::ConfigurationError::Bind`], and the
    /// reports of invocations that already ran are discarded.
    pub fn execute(&self, template: &TestTemplate, fixture: &TestFixture) -> ConfigurationResult<TemplateReport> {
        let supply = self.prepare(template, fixture)?;
        let seed = self.config.seed_for(template.name());
        let filtration_kinds = Arc::new(self.config.filtration_kinds.clone());
        let mut sequence = supply.test_integration_contexts(seed);
        let mut report = TemplateReport::default();

        info!("Executing template `{}` with seed {}", template.name(), seed);

        let mut invocation_index = 0;
        for context in sequence.by_ref() {
            invocation_index += 1;
            let coordinator = InvocationCoordinator::new(
                context,
                self.registry.clone(),
                template.formal_types().to_vec(),
                filtration_kinds.clone(),
                invocation_index,
            )?;
            report.invocations.push(self.run_invocation(template, coordinator));
        }

        report.minimal_failure = sequence.minimal_failure();
        info!(
            "Template `{}`: {} passed, {} skipped, {} failed",
            template.name(),
            report.passed(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    fn run_invocation(&self, template: &TestTemplate, mut coordinator: InvocationCoordinator) -> InvocationReport {
        let display_name = coordinator.display_name();
        let is_part_of_shrinkage = coordinator.context().is_part_of_shrinkage();

        let outcome = match self.resolve_arguments(template, &coordinator) {
            Err(cause) => BodyOutcome::Failed(cause),
            Ok(arguments) => {
                let body = template.body.clone();
                let mut call = || body(arguments.as_slice());
                coordinator
                    .invoke(|| intercept_through(&self.interceptors, &mut call))
                    .unwrap_or_else(|misuse| BodyOutcome::Failed(Failure::new(FailureKind::Other, misuse.to_string())))
            }
        };

        let outcome = settle(&mut coordinator, outcome);
        match &outcome {
            InvocationOutcome::Passed => self.watchers.iter().for_each(|w| w.test_succeeded(&display_name)),
            InvocationOutcome::Skipped => self.watchers.iter().for_each(|w| w.test_skipped(&display_name)),
            InvocationOutcome::Failed(cause) => {
                self.watchers.iter().for_each(|w| w.test_failed(&display_name, cause))
            }
        }
        debug!("{} -> {:?}", display_name, outcome);

        InvocationReport {
            display_name,
            is_part_of_shrinkage,
            arguments: coordinator.arguments().as_slice().to_vec(),
            outcome,
        }
    }

    /// One value per formal parameter: adapted arguments first, then the
    /// host's own resolvers.
    fn resolve_arguments(&self, template: &TestTemplate, coordinator: &InvocationCoordinator) -> Result<Vec<Value>, Failure> {
        let mut chain: Vec<&dyn ParameterResolver> = Vec::with_capacity(self.resolvers.len() + 1);
        chain.push(coordinator.parameter_resolver());
        chain.extend(self.resolvers.iter().map(|resolver| resolver.as_ref() as &dyn ParameterResolver));

        template
            .formal_types()
            .iter()
            .enumerate()
            .map(|(index, declared)| {
                let parameter = ParameterContext::new(index, declared);
                resolve_through(chain.iter().copied(), &parameter)
                    .map_err(|error| Failure::new(FailureKind::ParameterResolution, error.to_string()))
            })
            .collect()
    }
}

/// Turns a body outcome into the host's verdict, reporting a genuine
/// failure to the search engine before the verdict is returned.
pub(crate) fn settle(coordinator: &mut InvocationCoordinator, outcome: BodyOutcome) -> InvocationOutcome {
    match outcome {
        BodyOutcome::Accepted => InvocationOutcome::Passed,
        BodyOutcome::Filtered => InvocationOutcome::Skipped,
        BodyOutcome::Failed(cause) => {
            coordinator.notify_failure(&cause);
            InvocationOutcome::Failed(cause)
        }
    }
}

impl fmt::Debug for TemplateExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateExecutor")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("resolvers", &self.resolvers.len())
            .field("interceptors", &self.interceptors.len())
            .field("watchers", &self.watchers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::assume;
    use crate::error::{BindError, ConfigurationError};
    use crate::extension::FixtureResolver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl TestWatcher for Recorder {
        fn test_succeeded(&self, display_name: &str) {
            self.0.lock().unwrap().push(format!("passed {}", display_name));
        }

        fn test_skipped(&self, display_name: &str) {
            self.0.lock().unwrap().push(format!("skipped {}", display_name));
        }

        fn test_failed(&self, display_name: &str, _cause: &Failure) {
            self.0.lock().unwrap().push(format!("failed {}", display_name));
        }
    }

    fn config() -> TrialsConfig {
        TrialsConfig::default().with_seed(3).with_cases_limit(10)
    }

    fn fixture() -> TestFixture {
        TestFixture::new("HostTests")
            .with_trials("ints", Trials::integers(0, 100))
            .with_trials("pairs", Trials::integers(0, 9).and(Trials::strings(5)))
            .with_field("answer", 42i64)
    }

    #[test]
    fn test_pairs_fill_two_slots() {
        let recorder = Recorder::default();
        let executor = TemplateExecutor::new(config()).watcher(recorder.clone());
        let template = TestTemplate::new("pairs", vec![TypeTag::Integer, TypeTag::String], |arguments| {
            assert_eq!(arguments.len(), 2);
            assert!(matches!(arguments[0], Value::Integer(0..=9)));
            assert!(matches!(arguments[1], Value::String(_)));
            Ok(())
        })
        .binding("pairs");

        let report = executor.execute(&template, &fixture()).unwrap();

        assert_eq!(report.passed(), 10);
        assert!(report.is_success());
        assert!(report.minimal_failure.is_none());
        assert!(report.invocations[0].display_name.starts_with("[1] ["));
        assert_eq!(recorder.0.lock().unwrap().len(), 10);
    }

    #[test]
    fn test_configuration_errors_precede_any_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let executor = TemplateExecutor::new(config());
        let body = move |_: &[Value]| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        let missing = TestTemplate::new("missing", vec![TypeTag::Integer], body.clone()).binding("absent");
        let wrong = TestTemplate::new("wrong", vec![TypeTag::Integer], body).binding("answer");

        assert!(matches!(
            executor.execute(&missing, &fixture()),
            Err(ConfigurationError::MissingField { .. })
        ));
        assert!(matches!(
            executor.execute(&wrong, &fixture()),
            Err(ConfigurationError::WrongFieldType { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_strict_arity_rejects_overlong_expansion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let executor = TemplateExecutor::new(config().with_strict_arity(true));
        let template = TestTemplate::new("overlong", vec![TypeTag::Integer], move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .binding("pairs");

        assert!(matches!(
            executor.execute(&template, &fixture()),
            Err(ConfigurationError::ExcessCaseValues { values: 2, slots: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unadaptable_case_from_untyped_generator_aborts_template() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let quintuple = Trials::new(TypeTag::Any, |_| Value::tuple((1..=5).map(Value::Integer)));
        let fixture = fixture().with_trials("quintuple", quintuple);
        let template = TestTemplate::new("untyped", vec![TypeTag::Integer; 5], move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .binding("quintuple");

        let result = TemplateExecutor::new(config()).execute(&template, &fixture);

        assert!(matches!(
            result,
            Err(ConfigurationError::Bind(BindError::UnsupportedTupleArity { arity: 5, .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_filtered_cases_are_skipped_and_never_minimized() {
        let recorder = Recorder::default();
        let executor = TemplateExecutor::new(config()).watcher(recorder.clone());
        let template = TestTemplate::new("filtered", vec![TypeTag::Integer], |_| assume(false)).binding("ints");

        let report = executor.execute(&template, &fixture()).unwrap();

        assert_eq!(report.skipped(), 10);
        assert!(report.minimal_failure.is_none());
        assert!(report.invocations.iter().all(|invocation| !invocation.is_part_of_shrinkage));
        assert!(recorder.0.lock().unwrap().iter().all(|event| event.starts_with("skipped")));
    }

    #[test]
    fn test_failures_are_minimized() {
        let executor = TemplateExecutor::new(config());
        let template = TestTemplate::new("fails", vec![TypeTag::Integer], |arguments| match arguments[0] {
            Value::Integer(n) if n > 5 => Err(Failure::assertion(format!("{} > 5", n))),
            _ => Ok(()),
        })
        .binding("ints");

        let report = executor.execute(&template, &fixture()).unwrap();

        assert!(report.failed() > 0);
        let minimal = report.minimal_failure.clone().unwrap();
        assert_eq!(minimal.cause.kind, FailureKind::AssertionFailed);
        let shrinking: Vec<_> = report
            .invocations
            .iter()
            .filter(|invocation| invocation.is_part_of_shrinkage)
            .collect();
        assert!(!shrinking.is_empty());
        assert!(shrinking
            .iter()
            .all(|invocation| invocation.display_name.starts_with(crate::coordinator::SHRINKING_PREFIX)));
    }

    #[test]
    fn test_host_resolvers_fill_remaining_slots() {
        let executor = TemplateExecutor::new(config()).resolver(FixtureResolver::new().with(TypeTag::Boolean, true));
        let template = TestTemplate::new("mixed", vec![TypeTag::Integer, TypeTag::Boolean], |arguments| {
            assert_eq!(arguments[1], Value::Boolean(true));
            Ok(())
        })
        .binding("ints");

        let report = executor.execute(&template, &fixture()).unwrap();

        assert_eq!(report.passed(), 10);
        assert_eq!(report.invocations[0].arguments.len(), 1);
    }

    #[test]
    fn test_unresolvable_slot_is_a_reported_failure() {
        let executor = TemplateExecutor::new(config());
        let template = TestTemplate::new("unresolved", vec![TypeTag::Integer, TypeTag::Bytes], |_| Ok(())).binding("ints");

        let report = executor.execute(&template, &fixture()).unwrap();

        match &report.invocations[0].outcome {
            InvocationOutcome::Failed(cause) => assert_eq!(cause.kind, FailureKind::ParameterResolution),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(report.minimal_failure.is_some());
    }

    #[test]
    fn test_interceptors_wrap_the_body() {
        struct Veto;

        impl InvocationInterceptor for Veto {
            fn intercept(&self, _proceed: &mut dyn FnMut() -> Result<(), Failure>) -> Result<(), Failure> {
                Err(Failure::aborted("vetoed"))
            }
        }

        let executor = TemplateExecutor::new(config()).interceptor(Veto);
        let template = TestTemplate::new("vetoed", vec![TypeTag::Integer], |_| Ok(())).binding("ints");

        let report = executor.execute(&template, &fixture()).unwrap();

        assert_eq!(report.skipped(), 10);
    }
}
