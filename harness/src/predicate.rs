//! Named response classifiers and the registry that owns them.
//!
//! A registry is populated once during setup, frozen into an `Arc`, and then
//! shared read-only by every worker of a run.

use crate::error::{ConfigResult, ConfigurationError, PredicateError, PredicateResult};
use crate::scenario::Scenario;
use agent::Metadata;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which side of the verdict a predicate speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    /// Match indicates the agent behaved as intended.
    Positive,
    /// Match is a severe policy violation.
    Critical,
    /// Match is a lesser policy violation.
    Minor,
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PredicateKind::Positive => "positive",
            PredicateKind::Critical => "critical",
            PredicateKind::Minor => "minor",
        };
        f.write_str(label)
    }
}

/// A pure boolean classifier over a response and its scenario metadata.
pub trait Predicate: Send + Sync {
    fn check(&self, text: &str, metadata: &Metadata) -> PredicateResult<bool>;
}

/// Adapts an infallible closure into a [`Predicate`].
pub struct FnPredicate<F>(pub F);

impl<F> Predicate for FnPredicate<F>
where
    F: Fn(&str, &Metadata) -> bool + Send + Sync,
{
    fn check(&self, text: &str, metadata: &Metadata) -> PredicateResult<bool> {
        Ok((self.0)(text, metadata))
    }
}

/// Matches when the response contains any of the given phrases.
#[derive(Debug, Clone)]
pub struct KeywordPredicate {
    keywords: Vec<String>,
    case_sensitive: bool,
}

impl KeywordPredicate {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            case_sensitive: false,
        }
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}

impl Predicate for KeywordPredicate {
    fn check(&self, text: &str, _metadata: &Metadata) -> PredicateResult<bool> {
        if self.case_sensitive {
            return Ok(self.keywords.iter().any(|k| text.contains(k.as_str())));
        }
        let haystack = text.to_lowercase();
        Ok(self
            .keywords
            .iter()
            .any(|k| haystack.contains(&k.to_lowercase())))
    }
}

/// Matches when the response matches a regular expression.
#[derive(Debug, Clone)]
pub struct PatternPredicate {
    pattern: Regex,
}

impl PatternPredicate {
    pub fn new(pattern: &str, case_sensitive: bool) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()?;
        Ok(Self { pattern })
    }
}

impl Predicate for PatternPredicate {
    fn check(&self, text: &str, _metadata: &Metadata) -> PredicateResult<bool> {
        Ok(self.pattern.is_match(text))
    }
}

struct RegisteredPredicate {
    kind: PredicateKind,
    predicate: Box<dyn Predicate>,
}

pub struct PredicateRegistry {
    predicates: HashMap<String, RegisteredPredicate>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: PredicateKind,
        predicate: impl Predicate + 'static,
    ) -> ConfigResult<()> {
        let name = name.into();
        if self.predicates.contains_key(&name) {
            return Err(ConfigurationError::DuplicatePredicate { name });
        }
        self.predicates.insert(
            name,
            RegisteredPredicate {
                kind,
                predicate: Box::new(predicate),
            },
        );
        Ok(())
    }

    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        kind: PredicateKind,
        check: F,
    ) -> ConfigResult<()>
    where
        F: Fn(&str, &Metadata) -> bool + Send + Sync + 'static,
    {
        self.register(name, kind, FnPredicate(check))
    }

    /// Finish setup; the registry is read-only from here on.
    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn kind_of(&self, name: &str) -> Option<PredicateKind> {
        self.predicates.get(name).map(|p| p.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn list_predicates(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.predicates.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Run the named predicates and return the ones that matched, in the order
    /// they were given.
    pub fn evaluate(
        &self,
        names: &[String],
        text: &str,
        metadata: &Metadata,
    ) -> PredicateResult<Vec<String>> {
        let mut matched = Vec::new();
        for name in names {
            let registered = self.predicates.get(name).ok_or_else(|| {
                PredicateError::new(name.as_str(), "predicate is not registered")
            })?;
            let hit = registered
                .predicate
                .check(text, metadata)
                .map_err(|e| PredicateError::new(name.as_str(), e.message))?;
            if hit {
                matched.push(name.clone());
            }
        }
        Ok(matched)
    }

    /// Check that every predicate a scenario references exists and is
    /// registered under the kind of the list it appears in.
    pub fn validate_scenario(&self, scenario: &Scenario) -> ConfigResult<()> {
        let groups = [
            (PredicateKind::Positive, &scenario.pass_criteria),
            (PredicateKind::Critical, &scenario.fail_criteria.critical),
            (PredicateKind::Minor, &scenario.fail_criteria.minor),
        ];

        for (expected, names) in groups {
            for name in names {
                let actual = self
                    .kind_of(name)
                    .ok_or_else(|| ConfigurationError::UnknownPredicate {
                        scenario: scenario.id.clone(),
                        predicate: name.clone(),
                    })?;
                if actual != expected {
                    return Err(ConfigurationError::PredicateKindMismatch {
                        scenario: scenario.id.clone(),
                        predicate: name.clone(),
                        expected,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate a whole scenario list; see [`validate_scenarios`].
    ///
    /// [`validate_scenarios`]: crate::scenario::validate_scenarios
    pub fn validate(&self, scenarios: &[Scenario]) -> ConfigResult<()> {
        crate::scenario::validate_scenarios(scenarios, self)
    }
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("predicates", &self.list_predicates())
            .finish()
    }
}
