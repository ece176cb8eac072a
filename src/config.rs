//! Template configuration and fail-fast validation.
//!
//! Everything here runs before the first case is generated. A test
//! registers its generators explicitly on a [`TestFixture`]; a template then
//! names the bindings it wants, and each name must resolve to exactly one
//! registered `Trials` field.

use std::any::{type_name, Any};
use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use crypto_hash::{digest, Algorithm};
use log::{debug, warn};

use crate::adaptation::AdaptationRegistry;
use crate::context::FiltrationKinds;
use crate::error::{ConfigurationError, ConfigurationResult};
use crate::trials::Trials;
use crate::value::TypeTag;

/// Number of cases explored before the sequence ends
const DEFAULT_CASES_LIMIT: usize = 100;

/// Complexity budget for exploration
const DEFAULT_COMPLEXITY: usize = 100;

/// Minimization contexts offered after a failure
const DEFAULT_SHRINKAGE_ATTEMPTS: usize = 100;

/// Limits and policy for one test template
#[derive(Debug, Clone)]
pub struct TrialsConfig {
    /// Maximum number of cases explored before any failure
    pub cases_limit: usize,

    /// Complexity used while exploring; minimization only ever goes lower
    pub complexity: usize,

    /// Maximum number of minimization contexts after a failure
    pub shrinkage_attempts: usize,

    /// Fixed seed; derived from the template name when absent
    pub seed: Option<u64>,

    /// Treat case values that no formal parameter can receive as a
    /// configuration error instead of dropping them
    pub strict_arity: bool,

    /// Failure kinds that mark a case as filtered rather than failed
    pub filtration_kinds: FiltrationKinds,
}

impl Default for TrialsConfig {
    fn default() -> Self {
        Self {
            cases_limit: DEFAULT_CASES_LIMIT,
            complexity: DEFAULT_COMPLEXITY,
            shrinkage_attempts: DEFAULT_SHRINKAGE_ATTEMPTS,
            seed: None,
            strict_arity: false,
            filtration_kinds: FiltrationKinds::default(),
        }
    }
}

impl TrialsConfig {
    pub fn with_cases_limit(mut self, cases_limit: usize) -> Self {
        self.cases_limit = cases_limit;
        self
    }

    pub fn with_complexity(mut self, complexity: usize) -> Self {
        self.complexity = complexity;
        self
    }

    pub fn with_shrinkage_attempts(mut self, shrinkage_attempts: usize) -> Self {
        self.shrinkage_attempts = shrinkage_attempts;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_strict_arity(mut self, strict_arity: bool) -> Self {
        self.strict_arity = strict_arity;
        self
    }

    pub fn with_filtration_kinds(mut self, filtration_kinds: FiltrationKinds) -> Self {
        self.filtration_kinds = filtration_kinds;
        self
    }

    /// The seed to generate with for the named template.
    pub fn seed_for(&self, template_name: &str) -> u64 {
        self.seed.unwrap_or_else(|| derive_seed(template_name))
    }
}

/// Stable per-name seed: the leading eight bytes of the name's SHA-256.
pub fn derive_seed(name: &str) -> u64 {
    let hash = digest(Algorithm::SHA256, name.as_bytes());
    BigEndian::read_u64(&hash[..8])
}

struct FixtureField {
    name: String,
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

/// Explicitly registered fields of a test, generators and otherwise.
///
/// Fields registered later shadow earlier fields of the same name.
pub struct TestFixture {
    class_name: String,
    fields: Vec<FixtureField>,
}

impl TestFixture {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn with_field<T: Any + Send + Sync>(mut self, name: impl Into<String>, value: T) -> Self {
        self.fields.push(FixtureField {
            name: name.into(),
            type_name: type_name::<T>(),
            value: Box::new(value),
        });
        self
    }

    pub fn with_trials(self, name: impl Into<String>, trials: Trials) -> Self {
        self.with_field(name, trials)
    }

    /// Looks up the generator registered under `name`.
    pub fn trials(&self, name: &str) -> ConfigurationResult<&Trials> {
        let field = self
            .fields
            .iter()
            .rev()
            .find(|field| field.name == name)
            .ok_or_else(|| ConfigurationError::MissingField {
                field: name.to_string(),
                class: self.class_name.clone(),
            })?;

        field
            .value
            .downcast_ref::<Trials>()
            .ok_or_else(|| ConfigurationError::WrongFieldType {
                field: name.to_string(),
                class: self.class_name.clone(),
                actual: field.type_name.to_string(),
            })
    }

    /// Resolves every binding name, in order, stopping at the first bad one.
    pub fn resolve_bindings(&self, names: &[String]) -> ConfigurationResult<Vec<(String, Trials)>> {
        names
            .iter()
            .map(|name| {
                let trials = self.trials(name)?;
                debug!("Resolved binding `{}` yielding {}", name, trials.output_type());
                Ok((name.clone(), trials.clone()))
            })
            .collect()
    }
}

impl fmt::Debug for TestFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestFixture")
            .field("class_name", &self.class_name)
            .field(
                "fields",
                &self
                    .fields
                    .iter()
                    .map(|field| (field.name.as_str(), field.type_name))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Checks, from declared generator output types alone, that every binding
/// can be laid out over the formal parameters.
///
/// Generators whose output type is `Any` end the check, since their
/// expansion is only known per case.
pub fn validate_layout(
    template: &str,
    bindings: &[(String, Trials)],
    formal_types: &[TypeTag],
    registry: &AdaptationRegistry,
    strict_arity: bool,
) -> ConfigurationResult<()> {
    if bindings.is_empty() {
        return Err(ConfigurationError::NoBindings {
            template: template.to_string(),
        });
    }

    let mut slot = 0;
    for (position, (name, trials)) in bindings.iter().enumerate() {
        if slot >= formal_types.len() {
            let dropped = bindings.len() - position;
            if strict_arity {
                return Err(ConfigurationError::ExcessCaseValues {
                    template: template.to_string(),
                    values: bindings.len(),
                    slots: formal_types.len(),
                });
            }
            warn!(
                "Template `{}`: {} binding(s) starting at `{}` have no formal parameter left and will be dropped",
                template, dropped, name
            );
            return Ok(());
        }

        let declared = &formal_types[slot];
        let output = trials.output_type();
        if *output == TypeTag::Any {
            return Ok(());
        }
        if declared.is_assignable_from(output) {
            slot += 1;
            continue;
        }
        match output.tuple_arity() {
            Some(arity) if registry.expands_arity(arity) => {
                if slot + arity > formal_types.len() {
                    if strict_arity {
                        return Err(ConfigurationError::ExcessCaseValues {
                            template: template.to_string(),
                            values: slot + arity,
                            slots: formal_types.len(),
                        });
                    }
                    warn!(
                        "Template `{}`: binding `{}` expands into {} value(s) but only {} formal parameter(s) remain; the rest will be dropped",
                        template,
                        name,
                        arity,
                        formal_types.len() - slot
                    );
                }
                slot += arity;
            }
            Some(arity) => {
                return Err(ConfigurationError::UnsupportedTupleArity {
                    binding: name.clone(),
                    arity,
                    slot,
                    declared: declared.clone(),
                })
            }
            None => slot += 1,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> TestFixture {
        TestFixture::new("PropertyTests")
            .with_trials("ints", Trials::integers(0, 10))
            .with_trials("pairs", Trials::integers(0, 10).and(Trials::strings(4)))
            .with_field("label", String::from("not a generator"))
    }

    #[test]
    fn test_derived_seed_is_stable_per_name() {
        assert_eq!(derive_seed("a_property"), derive_seed("a_property"));
        assert_ne!(derive_seed("a_property"), derive_seed("another_property"));
        assert_eq!(TrialsConfig::default().with_seed(7).seed_for("a_property"), 7);
        assert_eq!(TrialsConfig::default().seed_for("a_property"), derive_seed("a_property"));
    }

    #[test]
    fn test_missing_field_names_field_and_class() {
        let error = fixture().trials("absent").unwrap_err();

        assert_eq!(
            error,
            ConfigurationError::MissingField {
                field: "absent".to_string(),
                class: "PropertyTests".to_string(),
            }
        );
        assert_eq!(
            error.to_string(),
            "Failed to find field of name: `absent` in test class `PropertyTests`."
        );
    }

    #[test]
    fn test_wrongly_typed_field_names_offending_type() {
        let error = fixture().trials("label").unwrap_err();

        match &error {
            ConfigurationError::WrongFieldType { field, actual, .. } => {
                assert_eq!(field, "label");
                assert_eq!(actual, type_name::<String>());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(error.to_string().contains("has the wrong type of `alloc::string::String`"));
    }

    #[test]
    fn test_later_fields_shadow_earlier_ones() {
        let fixture = fixture().with_trials("label", Trials::booleans());

        assert_eq!(fixture.trials("label").unwrap().output_type(), &TypeTag::Boolean);
    }

    #[test]
    fn test_bindings_resolve_in_declared_order() {
        let names = vec!["pairs".to_string(), "ints".to_string()];

        let bindings = fixture().resolve_bindings(&names).unwrap();

        assert_eq!(bindings[0].0, "pairs");
        assert_eq!(bindings[1].1.output_type(), &TypeTag::Integer);
    }

    #[test]
    fn test_layout_accepts_expanded_pairs() {
        let bindings = fixture()
            .resolve_bindings(&["pairs".to_string(), "ints".to_string()])
            .unwrap();
        let formal = [TypeTag::Integer, TypeTag::String, TypeTag::Integer];

        assert_eq!(
            validate_layout("t", &bindings, &formal, &AdaptationRegistry::standard(), true),
            Ok(())
        );
    }

    #[test]
    fn test_layout_rejects_unsupported_arity() {
        let wide = Trials::tuple(vec![Trials::integers(0, 1); 5]);
        let bindings = vec![("wide".to_string(), wide)];
        let formal = vec![TypeTag::Integer; 5];

        let error = validate_layout("t", &bindings, &formal, &AdaptationRegistry::standard(), false).unwrap_err();

        assert_eq!(
            error,
            ConfigurationError::UnsupportedTupleArity {
                binding: "wide".to_string(),
                arity: 5,
                slot: 0,
                declared: TypeTag::Integer,
            }
        );
    }

    #[test]
    fn test_layout_excess_values_only_fatal_when_strict() {
        let bindings = fixture()
            .resolve_bindings(&["ints".to_string(), "ints".to_string()])
            .unwrap();
        let formal = [TypeTag::Integer];
        let registry = AdaptationRegistry::standard();

        assert_eq!(validate_layout("t", &bindings, &formal, &registry, false), Ok(()));
        assert_eq!(
            validate_layout("t", &bindings, &formal, &registry, true),
            Err(ConfigurationError::ExcessCaseValues {
                template: "t".to_string(),
                values: 2,
                slots: 1,
            })
        );
    }

    #[test]
    fn test_layout_overlong_expansion_only_fatal_when_strict() {
        let bindings = fixture().resolve_bindings(&["pairs".to_string()]).unwrap();
        let formal = [TypeTag::Integer];
        let registry = AdaptationRegistry::standard();

        assert_eq!(validate_layout("t", &bindings, &formal, &registry, false), Ok(()));
        assert_eq!(
            validate_layout("t", &bindings, &formal, &registry, true),
            Err(ConfigurationError::ExcessCaseValues {
                template: "t".to_string(),
                values: 2,
                slots: 1,
            })
        );
    }

    #[test]
    fn test_layout_overlong_expansion_before_last_binding() {
        let bindings = fixture()
            .resolve_bindings(&["ints".to_string(), "pairs".to_string(), "ints".to_string()])
            .unwrap();
        let formal = [TypeTag::Integer, TypeTag::Integer];

        assert_eq!(
            validate_layout("t", &bindings, &formal, &AdaptationRegistry::standard(), true),
            Err(ConfigurationError::ExcessCaseValues {
                template: "t".to_string(),
                values: 3,
                slots: 2,
            })
        );
    }

    #[test]
    fn test_layout_requires_bindings() {
        let error = validate_layout("t", &[], &[TypeTag::Integer], &AdaptationRegistry::standard(), false);

        assert_eq!(error, Err(ConfigurationError::NoBindings { template: "t".to_string() }));
    }
}
