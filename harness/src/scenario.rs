use crate::error::{ConfigResult, ConfigurationError};
use crate::predicate::PredicateRegistry;
use agent::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Negative predicates, split by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailCriteria {
    #[serde(default)]
    pub critical: Vec<String>,
    #[serde(default)]
    pub minor: Vec<String>,
}

/// A declarative adversarial or reliability test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Stable unique identifier
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Text sent to the agent verbatim
    pub prompt_template: String,
    /// Positive predicates; any match passes the scenario
    #[serde(default)]
    pub pass_criteria: Vec<String>,
    #[serde(default)]
    pub fail_criteria: FailCriteria,
    /// Total attempt budget, including the first attempt
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_max_attempts() -> u32 {
    1
}

impl Scenario {
    pub fn new(id: impl Into<String>, prompt_template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            prompt_template: prompt_template.into(),
            pass_criteria: Vec::new(),
            fail_criteria: FailCriteria::default(),
            max_attempts: default_max_attempts(),
            tags: BTreeSet::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_pass(mut self, name: impl Into<String>) -> Self {
        self.pass_criteria.push(name.into());
        self
    }

    pub fn with_critical(mut self, name: impl Into<String>) -> Self {
        self.fail_criteria.critical.push(name.into());
        self
    }

    pub fn with_minor(mut self, name: impl Into<String>) -> Self {
        self.fail_criteria.minor.push(name.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Every predicate name this scenario references.
    pub fn predicate_names(&self) -> impl Iterator<Item = &String> {
        self.pass_criteria
            .iter()
            .chain(self.fail_criteria.critical.iter())
            .chain(self.fail_criteria.minor.iter())
    }
}

/// Validate a scenario list against a registry.
///
/// Fails on the first problem found: duplicate ids, a zero attempt budget, or
/// a predicate reference that is unknown or registered under another kind.
pub fn validate_scenarios(
    scenarios: &[Scenario],
    registry: &PredicateRegistry,
) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for scenario in scenarios {
        if !seen.insert(scenario.id.as_str()) {
            return Err(ConfigurationError::DuplicateScenario {
                id: scenario.id.clone(),
            });
        }
        if scenario.max_attempts < 1 {
            return Err(ConfigurationError::InvalidMaxAttempts {
                scenario: scenario.id.clone(),
                value: scenario.max_attempts,
            });
        }
        registry.validate_scenario(scenario)?;
    }
    Ok(())
}
