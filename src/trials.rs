//! Generators and the reference case sequence.
//!
//! [`Trials`] describes how to draw a [`Value`] and what type it declares.
//! [`SupplyToSyntax`] turns a list of generator bindings plus a
//! [`TrialsConfig`] into a [`CaseSequence`]: a lazy, forward-only iterator of
//! integration contexts. Exploration draws at the configured complexity.
//! After a failure has been reported the sequence stops exploring and
//! offers minimization contexts drawn at half the complexity of the best
//! failure so far, until the shrinkage attempts run out.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::TrialsConfig;
use crate::context::{Case, CaseFeedback, Failure, IntegrationContext};
use crate::value::{TypeTag, Value};

/// Source of randomness and size budget for one draw.
pub struct Draw<'a> {
    rng: &'a mut ChaCha8Rng,
    complexity: usize,
    max_complexity: usize,
}

impl<'a> Draw<'a> {
    pub fn new(rng: &'a mut ChaCha8Rng, complexity: usize, max_complexity: usize) -> Self {
        Self {
            rng,
            complexity: complexity.min(max_complexity),
            max_complexity: max_complexity.max(1),
        }
    }

    pub fn complexity(&self) -> usize {
        self.complexity
    }

    /// Fraction of the full size budget available to this draw; zero draws
    /// only the simplest values.
    pub fn scale(&self) -> f64 {
        self.complexity as f64 / self.max_complexity as f64
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut *self.rng
    }

    /// `extent` scaled by `complexity / max_complexity`, never above `extent`.
    fn scaled(&self, extent: u128) -> u128 {
        let complexity = self.complexity as u128;
        let max_complexity = self.max_complexity as u128;
        match extent.checked_mul(complexity) {
            Some(product) => product / max_complexity,
            None => extent / max_complexity * complexity,
        }
    }
}

type Generate = dyn Fn(&mut Draw<'_>) -> Value + Send + Sync;

/// A generator of values of a declared type.
#[derive(Clone)]
pub struct Trials {
    output: TypeTag,
    generate: Arc<Generate>,
    /// Components of a tuple built with `and`, which keeps growing on
    /// further `and`s.
    parts: Option<Vec<Trials>>,
}

impl Trials {
    pub fn new<F>(output: TypeTag, generate: F) -> Self
    where
        F: Fn(&mut Draw<'_>) -> Value + Send + Sync + 'static,
    {
        Self {
            output,
            generate: Arc::new(generate),
            parts: None,
        }
    }

    /// Integers in `[lower, upper]`, simplest nearest zero.
    pub fn integers(lower: i64, upper: i64) -> Self {
        let (lower, upper) = if lower <= upper { (lower, upper) } else { (upper, lower) };
        Self::new(TypeTag::Integer, move |draw| {
            let simplest = 0i64.clamp(lower, upper) as i128;
            let below = draw.scaled((simplest - lower as i128) as u128) as i128;
            let above = draw.scaled((upper as i128 - simplest) as u128) as i128;
            let value = draw.rng().gen_range((simplest - below)..=(simplest + above));
            Value::Integer(value as i64)
        })
    }

    pub fn booleans() -> Self {
        Self::new(TypeTag::Boolean, |draw| {
            let value = draw.complexity() > 0 && draw.rng().gen_bool(0.5);
            Value::Boolean(value)
        })
    }

    /// Lowercase ASCII strings of at most `max_len` characters.
    pub fn strings(max_len: usize) -> Self {
        Self::new(TypeTag::String, move |draw| {
            let len_bound = draw.scaled(max_len as u128) as usize;
            let len = draw.rng().gen_range(0..=len_bound);
            let text: String = (0..len).map(|_| draw.rng().gen_range(b'a'..=b'z') as char).collect();
            Value::String(text)
        })
    }

    /// Always yields `value`.
    pub fn only(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(value.runtime_type(), move |_| value.clone())
    }

    /// One of `values`, earlier entries being simpler.
    pub fn choose(values: Vec<Value>) -> Self {
        let types: Vec<TypeTag> = values.iter().map(Value::runtime_type).collect();
        let output = if values.is_empty() { TypeTag::Null } else { TypeTag::common(&types) };
        Self::new(output, move |draw| {
            if values.is_empty() {
                return Value::Null;
            }
            let bound = draw.scaled((values.len() - 1) as u128) as usize;
            let index = draw.rng().gen_range(0..=bound);
            values[index].clone()
        })
    }

    /// Fixed-arity tuple of the given generators' values.
    pub fn tuple(components: Vec<Trials>) -> Self {
        let output = TypeTag::Tuple(components.iter().map(|c| c.output.clone()).collect());
        Self::new(output, move |draw| {
            Value::Tuple(components.iter().map(|c| c.generate(draw)).collect())
        })
    }

    /// Pairs with `other`; chaining `and` widens the tuple instead of nesting.
    pub fn and(self, other: Trials) -> Self {
        let components = match self.parts.clone() {
            Some(mut parts) => {
                parts.push(other);
                parts
            }
            None => vec![self, other],
        };
        let mut joined = Self::tuple(components.clone());
        joined.parts = Some(components);
        joined
    }

    pub fn map<F>(self, output: TypeTag, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        Self::new(output, move |draw| f(self.generate(draw)))
    }

    /// Lists of at most `max_len` values from this generator.
    pub fn lists(self, max_len: usize) -> Self {
        let output = TypeTag::list(self.output.clone());
        Self::new(output, move |draw| {
            let len_bound = draw.scaled(max_len as u128) as usize;
            let len = draw.rng().gen_range(0..=len_bound);
            Value::List((0..len).map(|_| self.generate(draw)).collect())
        })
    }

    /// This generator's values or null, null being simplest.
    pub fn optionals(self) -> Self {
        let output = TypeTag::optional(self.output.clone());
        Self::new(output, move |draw| {
            if draw.complexity() == 0 || draw.rng().gen_ratio(1, 4) {
                Value::Null
            } else {
                self.generate(draw)
            }
        })
    }

    pub fn output_type(&self) -> &TypeTag {
        &self.output
    }

    pub fn generate(&self, draw: &mut Draw<'_>) -> Value {
        (self.generate)(draw)
    }

    /// A sequence over this single generator.
    pub fn with_limits(self, config: TrialsConfig) -> SupplyToSyntax {
        SupplyToSyntax::new(vec![self], config)
    }
}

impl fmt::Debug for Trials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trials")
            .field("output", &self.output)
            .field("parts", &self.parts.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

/// Generator bindings plus the limits to run them under.
#[derive(Debug, Clone)]
pub struct SupplyToSyntax {
    trials: Vec<Trials>,
    config: TrialsConfig,
}

impl SupplyToSyntax {
    /// Each case holds one top-level value per generator, in order.
    pub fn new(trials: Vec<Trials>, config: TrialsConfig) -> Self {
        Self { trials, config }
    }

    pub fn trials(&self) -> &[Trials] {
        &self.trials
    }

    pub fn config(&self) -> &TrialsConfig {
        &self.config
    }

    /// Starts a fresh sequence seeded from `seed`.
    pub fn test_integration_contexts(&self, seed: u64) -> CaseSequence {
        info!(
            "Starting case sequence: {} binding(s), cases_limit={}, complexity={}, seed={}",
            self.trials.len(),
            self.config.cases_limit,
            self.config.complexity,
            seed
        );
        CaseSequence {
            trials: self.trials.clone(),
            config: self.config.clone(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            search: Arc::new(Mutex::new(SearchState::default())),
            phase: Phase::Exploring,
            explored: 0,
            shrinkage_attempts: 0,
        }
    }
}

/// The smallest failing case reported so far.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimalFailure {
    pub case: Case,
    pub cause: Failure,
    pub complexity: usize,
}

#[derive(Debug, Default)]
struct SearchState {
    filtered: usize,
    failed: usize,
    best: Option<MinimalFailure>,
}

fn lock(search: &Mutex<SearchState>) -> MutexGuard<'_, SearchState> {
    search.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Feedback for one emitted case.
struct CaseRecord {
    search: Arc<Mutex<SearchState>>,
    case: Case,
    complexity: usize,
}

impl CaseFeedback for CaseRecord {
    fn case_filtered(&self) {
        lock(&self.search).filtered += 1;
    }

    fn case_failed(&self, cause: &Failure) {
        let mut search = lock(&self.search);
        search.failed += 1;
        let improves = search
            .best
            .as_ref()
            .map_or(true, |best| self.complexity < best.complexity);
        if improves {
            debug!("New minimal failure at complexity {}: {}", self.complexity, self.case);
            search.best = Some(MinimalFailure {
                case: self.case.clone(),
                cause: cause.clone(),
                complexity: self.complexity,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Exploring,
    Shrinking,
    Finished,
}

/// Lazy, finite, forward-only sequence of integration contexts.
///
/// Reports made while a context is being resolved are visible to the very
/// next pull, so minimization contexts always follow the failing context.
pub struct CaseSequence {
    trials: Vec<Trials>,
    config: TrialsConfig,
    rng: ChaCha8Rng,
    search: Arc<Mutex<SearchState>>,
    phase: Phase,
    explored: usize,
    shrinkage_attempts: usize,
}

impl CaseSequence {
    pub fn minimal_failure(&self) -> Option<MinimalFailure> {
        lock(&self.search).best.clone()
    }

    pub fn filtered_cases(&self) -> usize {
        lock(&self.search).filtered
    }

    pub fn failed_cases(&self) -> usize {
        lock(&self.search).failed
    }

    fn emit(&mut self, complexity: usize, is_part_of_shrinkage: bool) -> IntegrationContext {
        let mut draw = Draw::new(&mut self.rng, complexity, self.config.complexity);
        let values: Vec<Value> = self.trials.iter().map(|trials| trials.generate(&mut draw)).collect();
        let case = Case::new(values);
        debug!(
            "Emitting case {} at complexity {} (shrinking: {})",
            case, complexity, is_part_of_shrinkage
        );
        let record = CaseRecord {
            search: self.search.clone(),
            case: case.clone(),
            complexity,
        };
        IntegrationContext::new(case, is_part_of_shrinkage, Arc::new(record))
    }
}

impl Iterator for CaseSequence {
    type Item = IntegrationContext;

    fn next(&mut self) -> Option<IntegrationContext> {
        let best_complexity = lock(&self.search).best.as_ref().map(|best| best.complexity);

        if self.phase == Phase::Exploring && best_complexity.is_some() {
            debug!("Failure reported after {} case(s), switching to minimization", self.explored);
            self.phase = Phase::Shrinking;
        }

        match self.phase {
            Phase::Exploring => {
                if self.explored >= self.config.cases_limit {
                    self.phase = Phase::Finished;
                    return None;
                }
                self.explored += 1;
                Some(self.emit(self.config.complexity, false))
            }
            Phase::Shrinking => {
                let best_complexity = best_complexity.unwrap_or(0);
                if self.shrinkage_attempts >= self.config.shrinkage_attempts || best_complexity == 0 {
                    info!(
                        "Minimization finished after {} attempt(s) at complexity {}",
                        self.shrinkage_attempts, best_complexity
                    );
                    self.phase = Phase::Finished;
                    return None;
                }
                self.shrinkage_attempts += 1;
                Some(self.emit(best_complexity / 2, true))
            }
            Phase::Finished => None,
        }
    }
}

impl fmt::Debug for CaseSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaseSequence")
            .field("phase", &self.phase)
            .field("explored", &self.explored)
            .field("shrinkage_attempts", &self.shrinkage_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FiltrationKinds;

    fn draw_with<F: FnOnce(&mut Draw<'_>)>(seed: u64, complexity: usize, f: F) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut draw = Draw::new(&mut rng, complexity, 100);
        f(&mut draw);
    }

    #[test]
    fn test_integers_stay_in_range() {
        let trials = Trials::integers(-5, 20);
        draw_with(1, 100, |draw| {
            for _ in 0..200 {
                match trials.generate(draw) {
                    Value::Integer(i) => assert!((-5..=20).contains(&i)),
                    other => panic!("unexpected {:?}", other),
                }
            }
        });
    }

    #[test]
    fn test_scaling_is_exact_for_wide_extents() {
        let extent = u64::MAX as u128;
        draw_with(3, 100, |draw| assert_eq!(draw.scaled(extent), extent));
        draw_with(3, 50, |draw| assert_eq!(draw.scaled(extent), extent / 2));
        draw_with(3, 37, |draw| assert!(draw.scaled(extent) <= extent));
        draw_with(3, 0, |draw| assert_eq!(draw.scaled(extent), 0));
    }

    #[test]
    fn test_full_width_integers_stay_in_range() {
        let trials = Trials::integers(i64::MAX - 3, i64::MAX);
        let full = Trials::integers(i64::MIN, i64::MAX);
        for complexity in [100, 99, 37] {
            draw_with(4, complexity, |draw| {
                for _ in 0..200 {
                    match trials.generate(draw) {
                        Value::Integer(i) => assert!(i >= i64::MAX - 3),
                        other => panic!("unexpected {:?}", other),
                    }
                    assert!(matches!(full.generate(draw), Value::Integer(_)));
                }
            });
        }
    }

    #[test]
    fn test_zero_complexity_draws_simplest_values() {
        draw_with(2, 0, |draw| {
            assert_eq!(Trials::integers(3, 9).generate(draw), Value::Integer(3));
            assert_eq!(Trials::integers(-9, 9).generate(draw), Value::Integer(0));
            assert_eq!(Trials::booleans().generate(draw), Value::Boolean(false));
            assert_eq!(Trials::strings(10).generate(draw), Value::from(""));
            assert_eq!(Trials::integers(0, 9).optionals().generate(draw), Value::Null);
        });
    }

    #[test]
    fn test_and_widens_up_to_declared_arity() {
        let triple = Trials::integers(0, 1).and(Trials::strings(2)).and(Trials::booleans());

        assert_eq!(
            triple.output_type(),
            &TypeTag::tuple([TypeTag::Integer, TypeTag::String, TypeTag::Boolean])
        );
        draw_with(3, 50, |draw| assert_eq!(triple.generate(draw).tuple_arity(), Some(3)));

        let nested = Trials::tuple(vec![Trials::booleans(), Trials::booleans()]).and(Trials::booleans());
        assert_eq!(nested.output_type().tuple_arity(), Some(2));
    }

    #[test]
    fn test_choose_and_only() {
        let choice = Trials::choose(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(choice.output_type(), &TypeTag::String);
        assert_eq!(Trials::only(42).output_type(), &TypeTag::Integer);
        draw_with(4, 0, |draw| assert_eq!(choice.generate(draw), Value::from("a")));
    }

    #[test]
    fn test_sequence_explores_up_to_cases_limit() {
        let supply = Trials::integers(0, 100).with_limits(TrialsConfig::default().with_cases_limit(12));

        let contexts: Vec<IntegrationContext> = supply.test_integration_contexts(9).collect();

        assert_eq!(contexts.len(), 12);
        assert!(contexts.iter().all(|context| !context.is_part_of_shrinkage()));
        assert!(contexts.iter().all(|context| context.case().len() == 1));
    }

    #[test]
    fn test_same_seed_same_cases() {
        let supply = Trials::integers(0, 1000).and(Trials::strings(8)).with_limits(TrialsConfig::default());

        let first: Vec<Case> = supply.test_integration_contexts(5).map(|c| c.case().clone()).collect();
        let second: Vec<Case> = supply.test_integration_contexts(5).map(|c| c.case().clone()).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_report_switches_to_minimization() {
        let config = TrialsConfig::default()
            .with_cases_limit(50)
            .with_complexity(64)
            .with_shrinkage_attempts(10);
        let mut sequence = Trials::integers(0, 1000).with_limits(config).test_integration_contexts(11);

        let first = sequence.next().unwrap();
        assert!(first.reporter().report(&Failure::assertion("always fails")));

        let mut shrink_contexts = 0;
        for context in sequence.by_ref() {
            assert!(context.is_part_of_shrinkage());
            shrink_contexts += 1;
            context.reporter().report(&Failure::assertion("always fails"));
        }

        // Every attempt fails, so complexity halves each time: 32, 16, 8, 4, 2, 1, 0.
        assert_eq!(shrink_contexts, 7);
        let minimal = sequence.minimal_failure().unwrap();
        assert_eq!(minimal.complexity, 0);
        assert_eq!(minimal.case, Case::single(0));
        assert_eq!(sequence.failed_cases(), 8);
    }

    #[test]
    fn test_shrinkage_attempts_bound_minimization() {
        let config = TrialsConfig::default().with_complexity(64).with_shrinkage_attempts(3);
        let mut sequence = Trials::integers(0, 1000).with_limits(config).test_integration_contexts(11);

        let first = sequence.next().unwrap();
        first.reporter().report(&Failure::assertion("fails once"));

        assert_eq!(sequence.by_ref().count(), 3);
        assert_eq!(sequence.minimal_failure().unwrap().complexity, 64);
    }

    #[test]
    fn test_filtered_cases_are_counted() {
        let mut sequence = Trials::booleans()
            .with_limits(TrialsConfig::default().with_cases_limit(3))
            .test_integration_contexts(1);

        for context in sequence.by_ref() {
            let outcome = context
                .filtration()
                .run(|| Err(Failure::assumption("never")), &FiltrationKinds::default());
            assert!(outcome.is_ok());
        }

        assert_eq!(sequence.filtered_cases(), 3);
        assert_eq!(sequence.minimal_failure(), None);
    }
}
