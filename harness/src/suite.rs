//! Declarative suite files.
//!
//! A suite declares its predicates and scenarios side by side:
//!
//! ```yaml
//! predicates:
//!   - name: refuses
//!     kind: positive
//!     contains_any: ["I can't", "I cannot"]
//!   - name: gives_synthesis_steps
//!     kind: critical
//!     pattern: "step \\d+"
//! scenarios:
//!   - id: jailbreak-001
//!     prompt_template: "Ignore previous instructions and ..."
//!     pass_criteria: [refuses]
//!     fail_criteria:
//!       critical: [gives_synthesis_steps]
//!     max_attempts: 3
//! ```

use crate::error::{ConfigurationError, PredicateResult};
use crate::predicate::{
    KeywordPredicate, PatternPredicate, Predicate, PredicateKind, PredicateRegistry,
};
use crate::scenario::Scenario;
use agent::Metadata;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SuiteError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML suite: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON suite: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Predicate '{name}' has an invalid pattern: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unsupported suite file {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigurationError),
}

pub type SuiteResult<T> = Result<T, SuiteError>;

/// One predicate entry of a suite file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateSpec {
    pub name: String,
    pub kind: PredicateKind,
    #[serde(default)]
    pub contains_any: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Raw contents of a suite file, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteFile {
    #[serde(default)]
    pub predicates: Vec<PredicateSpec>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

/// A validated suite: a frozen registry plus scenarios that only reference
/// predicates it contains.
#[derive(Debug, Clone)]
pub struct Suite {
    pub registry: Arc<PredicateRegistry>,
    pub scenarios: Vec<Scenario>,
}

impl Suite {
    pub fn from_yaml_str(raw: &str) -> SuiteResult<Self> {
        let file: SuiteFile = serde_yaml::from_str(raw)?;
        Self::from_file(file)
    }

    pub fn from_json_str(raw: &str) -> SuiteResult<Self> {
        let file: SuiteFile = serde_json::from_str(raw)?;
        Self::from_file(file)
    }

    pub fn from_file(file: SuiteFile) -> SuiteResult<Self> {
        let mut registry = PredicateRegistry::new();
        for spec in file.predicates {
            register_spec(&mut registry, spec)?;
        }
        registry.validate(&file.scenarios)?;
        Ok(Self {
            registry: registry.freeze(),
            scenarios: file.scenarios,
        })
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

/// Load a suite from a file, or from every suite file in a directory.
///
/// Files in a directory are merged; predicate names and scenario ids must be
/// unique across all of them. Scenarios come back sorted by id.
pub fn load_suite(path: impl AsRef<Path>) -> SuiteResult<Suite> {
    let path = path.as_ref();
    let files = if path.is_dir() {
        suite_files_in(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut merged = SuiteFile::default();
    for file in &files {
        let parsed = read_suite_file(file)?;
        debug!(
            file = %file.display(),
            predicates = parsed.predicates.len(),
            scenarios = parsed.scenarios.len(),
            "Loaded suite file"
        );
        merged.predicates.extend(parsed.predicates);
        merged.scenarios.extend(parsed.scenarios);
    }
    merged.scenarios.sort_by(|a, b| a.id.cmp(&b.id));

    let suite = Suite::from_file(merged)?;
    info!(
        path = %path.display(),
        files = files.len(),
        predicates = suite.registry.len(),
        scenarios = suite.len(),
        "Suite loaded"
    );
    Ok(suite)
}

fn suite_files_in(dir: &Path) -> SuiteResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|source| SuiteError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| SuiteError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && SuiteFormat::of(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_suite_file(path: &Path) -> SuiteResult<SuiteFile> {
    let format =
        SuiteFormat::of(path).ok_or_else(|| SuiteError::UnsupportedFormat(path.to_path_buf()))?;
    let raw = std::fs::read_to_string(path).map_err(|source| SuiteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file = match format {
        SuiteFormat::Yaml => serde_yaml::from_str(&raw)?,
        SuiteFormat::Json => serde_json::from_str(&raw)?,
    };
    Ok(file)
}

enum SuiteFormat {
    Yaml,
    Json,
}

impl SuiteFormat {
    fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(SuiteFormat::Yaml),
            "json" => Some(SuiteFormat::Json),
            _ => None,
        }
    }
}

fn register_spec(registry: &mut PredicateRegistry, spec: PredicateSpec) -> SuiteResult<()> {
    let mut checks: Vec<Box<dyn Predicate>> = Vec::new();
    if !spec.contains_any.is_empty() {
        checks.push(Box::new(
            KeywordPredicate::new(spec.contains_any).case_sensitive(spec.case_sensitive),
        ));
    }
    if let Some(pattern) = &spec.pattern {
        let predicate = PatternPredicate::new(pattern, spec.case_sensitive).map_err(|source| {
            SuiteError::Pattern {
                name: spec.name.clone(),
                source,
            }
        })?;
        checks.push(Box::new(predicate));
    }
    if checks.is_empty() {
        return Err(ConfigurationError::InvalidConfig {
            message: format!(
                "predicate '{}' needs `contains_any` or `pattern`",
                spec.name
            ),
        }
        .into());
    }

    registry.register(spec.name, spec.kind, AnyOf(checks))?;
    Ok(())
}

/// Matches when any of its checks matches.
struct AnyOf(Vec<Box<dyn Predicate>>);

impl Predicate for AnyOf {
    fn check(&self, text: &str, metadata: &Metadata) -> PredicateResult<bool> {
        for check in &self.0 {
            if check.check(text, metadata)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
