//! Which distribution entries make up each logical artifact.
//!
//! Rules are versioned: for a given artifact, the rule with the newest `since`
//! that is not above the Gradle base version applies. Patterns are relative to
//! the distribution root (`gradle-<version>/`) and use `globset` syntax with
//! `*` confined to a single path segment; `{version}` expands to the literal
//! version string.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use gapi_domain::{ArtifactSelection, BaseVersion, EngineError, GradleVersion, LogicalArtifact};
use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

const VERSION_PLACEHOLDER: &str = "{version}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPattern {
    /// Tried in order; the first alternative with any match is used.
    pub alternatives: Vec<String>,
    #[serde(default = "required_by_default")]
    pub required: bool,
}

fn required_by_default() -> bool {
    true
}

impl EntryPattern {
    fn required(alternatives: &[&str]) -> Self {
        Self {
            alternatives: alternatives.iter().map(|s| (*s).to_string()).collect(),
            required: true,
        }
    }

    fn optional(pattern: &str) -> Self {
        Self {
            alternatives: vec![pattern.to_string()],
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutRule {
    pub artifact: LogicalArtifact,
    pub since: BaseVersion,
    pub entries: Vec<EntryPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutRules {
    rules: Vec<LayoutRule>,
}

impl LayoutRules {
    /// # Errors
    /// Rejects rules without patterns and duplicated `(artifact, since)` pairs.
    pub fn new(mut rules: Vec<LayoutRule>) -> Result<Self, EngineError> {
        rules.sort_by(|a, b| a.artifact.cmp(&b.artifact).then(a.since.cmp(&b.since)));
        for pair in rules.windows(2) {
            if pair[0].artifact == pair[1].artifact && pair[0].since == pair[1].since {
                return Err(EngineError::invalid_config(format!(
                    "duplicate layout rule for {} since {}",
                    pair[0].artifact, pair[0].since
                )));
            }
        }
        for rule in &rules {
            if rule.entries.is_empty()
                || rule.entries.iter().any(|entry| entry.alternatives.is_empty())
            {
                return Err(EngineError::invalid_config(format!(
                    "layout rule for {} since {} has an empty pattern list",
                    rule.artifact, rule.since
                )));
            }
            for alternative in rule.entries.iter().flat_map(|entry| &entry.alternatives) {
                compile_pattern(alternative, "0.0")?;
            }
        }
        Ok(Self { rules })
    }

    #[must_use]
    pub fn builtin() -> Self {
        let rule = |artifact, since: (u32, u32), entries| LayoutRule {
            artifact,
            since: BaseVersion::new(since.0, since.1, 0),
            entries,
        };
        Self {
            rules: vec![
                rule(
                    LogicalArtifact::Api,
                    (1, 0),
                    vec![
                        EntryPattern::required(&["lib/gradle-*-{version}.jar"]),
                        EntryPattern::optional("lib/plugins/gradle-*-{version}.jar"),
                    ],
                ),
                rule(
                    LogicalArtifact::TestKit,
                    (2, 6),
                    vec![EntryPattern::required(&[
                        "lib/plugins/gradle-test-kit-{version}.jar",
                    ])],
                ),
                rule(
                    LogicalArtifact::Wrapper,
                    (1, 0),
                    vec![EntryPattern::required(&[
                        "lib/plugins/gradle-wrapper-{version}.jar",
                        "lib/plugins/gradle-wrapper-main-{version}.jar",
                        "lib/gradle-wrapper-main-{version}.jar",
                    ])],
                ),
                rule(
                    LogicalArtifact::KotlinDsl,
                    (5, 0),
                    vec![
                        EntryPattern::required(&["lib/gradle-kotlin-dsl-{version}.jar"]),
                        EntryPattern::optional("lib/kotlin-stdlib-*.jar"),
                    ],
                ),
                rule(
                    LogicalArtifact::LocalGroovy,
                    (1, 0),
                    vec![EntryPattern::required(&["lib/groovy-*.jar"])],
                ),
            ],
        }
    }

    /// Loads a replacement table from JSON (`{"rules": [...]}`).
    ///
    /// # Errors
    /// Read and parse failures surface as [`EngineError::InvalidConfiguration`].
    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path).map_err(|err| {
            EngineError::invalid_config(format!(
                "failed to read layout rules {}: {err}",
                path.display()
            ))
        })?;
        let parsed: Self = serde_json::from_str(&text).map_err(|err| {
            EngineError::invalid_config(format!(
                "failed to parse layout rules {}: {err}",
                path.display()
            ))
        })?;
        Self::new(parsed.rules)
    }

    #[must_use]
    pub fn rules(&self) -> &[LayoutRule] {
        &self.rules
    }

    #[must_use]
    pub fn rule_for(&self, artifact: LogicalArtifact, base: BaseVersion) -> Option<&LayoutRule> {
        self.rules
            .iter()
            .filter(|rule| rule.artifact == artifact && rule.since <= base)
            .max_by_key(|rule| rule.since)
    }

    /// The artifacts some rule covers at `version`, which is what a request
    /// without an explicit selection extracts.
    ///
    /// # Errors
    /// [`EngineError::LayoutMismatch`] when no artifact is covered at all.
    pub fn covered(&self, version: &GradleVersion) -> Result<ArtifactSelection, EngineError> {
        let base = version.base();
        let covered: Vec<LogicalArtifact> = LogicalArtifact::all()
            .into_iter()
            .filter(|artifact| self.rule_for(*artifact, base).is_some())
            .collect();
        if covered.is_empty() {
            return Err(EngineError::LayoutMismatch {
                version: version.to_string(),
                artifact: "*".into(),
                detail: format!("no layout rule covers base version {base}"),
            });
        }
        ArtifactSelection::new(covered)
    }

    /// Matches `entries` (paths relative to the distribution root) against the
    /// rule for `artifact`, returning the matched paths in sorted order.
    ///
    /// # Errors
    /// [`EngineError::LayoutMismatch`] when no rule covers the version or a
    /// required pattern has no match.
    pub fn select<'a>(
        &self,
        artifact: LogicalArtifact,
        version: &GradleVersion,
        entries: impl IntoIterator<Item = &'a str> + Clone,
    ) -> Result<Vec<String>, EngineError> {
        let mismatch = |detail: String| EngineError::LayoutMismatch {
            version: version.to_string(),
            artifact: artifact.to_string(),
            detail,
        };
        let rule = self.rule_for(artifact, version.base()).ok_or_else(|| {
            mismatch(format!(
                "no layout rule covers base version {}",
                version.base()
            ))
        })?;

        let mut matched = BTreeSet::new();
        for pattern in &rule.entries {
            let mut found = false;
            for alternative in &pattern.alternatives {
                let matcher = compile_pattern(alternative, version.as_str())?;
                let hits: Vec<&str> = entries
                    .clone()
                    .into_iter()
                    .filter(|entry| matcher.is_match(entry))
                    .collect();
                if !hits.is_empty() {
                    matched.extend(hits.into_iter().map(ToOwned::to_owned));
                    found = true;
                    break;
                }
            }
            if !found && pattern.required {
                return Err(mismatch(format!(
                    "nothing matches {}",
                    pattern.alternatives.join(" | ")
                )));
            }
        }
        Ok(matched.into_iter().collect())
    }
}

impl Default for LayoutRules {
    fn default() -> Self {
        Self::builtin()
    }
}

fn compile_pattern(pattern: &str, version: &str) -> Result<GlobMatcher, EngineError> {
    let expanded = pattern.replace(VERSION_PLACEHOLDER, &globset::escape(version));
    GlobBuilder::new(&expanded)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|err| {
            EngineError::invalid_config(format!("invalid layout pattern '{pattern}': {err}"))
        })
}
