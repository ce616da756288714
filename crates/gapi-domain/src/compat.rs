//! Gradle version → JVM compatibility facts.
//!
//! Resolution runs in two stages: the Gradle base version selects the JVM
//! feature level through an ordered threshold table, and the runtime flags are
//! then chosen by comparing each flag's own threshold against the JVM that will
//! actually execute the code.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::version::{BaseVersion, GradleVersion};

/// Lowest JVM feature level any supported Gradle version runs on.
pub const FALLBACK_JVM_LEVEL: u32 = 8;

/// "Gradle base version ≥ `since` requires at least JVM `level`."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JvmThreshold {
    pub since: BaseVersion,
    pub level: u32,
}

/// A JVM argument that is only valid once the executing JVM reaches `since_jvm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFlag {
    pub since_jvm: u32,
    pub argument: String,
}

impl RuntimeFlag {
    pub fn new(since_jvm: u32, argument: impl Into<String>) -> Self {
        Self {
            since_jvm,
            argument: argument.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityTable {
    fallback: u32,
    thresholds: Vec<JvmThreshold>,
    flags: Vec<RuntimeFlag>,
}

impl CompatibilityTable {
    /// Builds a table, sorting rows by threshold.
    ///
    /// # Errors
    /// Rejects tables where a higher Gradle threshold maps to a lower JVM level
    /// (or below the fallback), and duplicated thresholds.
    pub fn new(
        fallback: u32,
        mut thresholds: Vec<JvmThreshold>,
        flags: Vec<RuntimeFlag>,
    ) -> Result<Self, EngineError> {
        thresholds.sort_by_key(|row| row.since);
        let mut floor = fallback;
        let mut previous: Option<BaseVersion> = None;
        for row in &thresholds {
            if previous == Some(row.since) {
                return Err(EngineError::invalid_config(format!(
                    "duplicate JVM threshold for Gradle {}",
                    row.since
                )));
            }
            if row.level < floor {
                return Err(EngineError::invalid_config(format!(
                    "JVM threshold for Gradle {} lowers the level to {} (previous {})",
                    row.since, row.level, floor
                )));
            }
            floor = row.level;
            previous = Some(row.since);
        }
        Ok(Self {
            fallback,
            thresholds,
            flags,
        })
    }

    /// The table shipped with the engine.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            fallback: FALLBACK_JVM_LEVEL,
            thresholds: vec![JvmThreshold {
                since: BaseVersion::new(9, 0, 0),
                level: 18,
            }],
            flags: vec![
                // gradle/gradle#18647
                RuntimeFlag::new(9, "--add-opens=java.base/java.lang=ALL-UNNAMED"),
                // gradle/gradle#31625
                RuntimeFlag::new(24, "--enable-native-access=ALL-UNNAMED"),
            ],
        }
    }

    /// Returns a copy with one more threshold row.
    ///
    /// # Errors
    /// Same validation as [`CompatibilityTable::new`].
    pub fn with_threshold(&self, since: BaseVersion, level: u32) -> Result<Self, EngineError> {
        let mut thresholds = self.thresholds.clone();
        thresholds.push(JvmThreshold { since, level });
        Self::new(self.fallback, thresholds, self.flags.clone())
    }

    #[must_use]
    pub fn thresholds(&self) -> &[JvmThreshold] {
        &self.thresholds
    }

    #[must_use]
    pub fn fallback(&self) -> u32 {
        self.fallback
    }

    /// Highest matching threshold wins; no match falls back to the lowest level.
    #[must_use]
    pub fn jvm_level_for(&self, base: BaseVersion) -> u32 {
        self.thresholds
            .iter()
            .rev()
            .find(|row| base >= row.since)
            .map_or(self.fallback, |row| row.level)
    }

    /// Flags valid on a JVM of `jvm_level`, in table order.
    #[must_use]
    pub fn flags_for(&self, jvm_level: u32) -> Vec<String> {
        self.flags
            .iter()
            .filter(|flag| jvm_level >= flag.since_jvm)
            .map(|flag| flag.argument.clone())
            .collect()
    }

    #[must_use]
    pub fn profile(&self, version: &GradleVersion) -> CompatibilityProfile {
        let base = version.base();
        let jvm_level = self.jvm_level_for(base);
        CompatibilityProfile {
            base_version: base,
            jvm_level,
            runtime_flags: self.flags_for(jvm_level),
            flag_rules: self.flags.clone(),
        }
    }
}

impl Default for CompatibilityTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Derived, immutable compatibility facts for one base version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompatibilityProfile {
    pub base_version: BaseVersion,
    pub jvm_level: u32,
    /// Flags evaluated against `jvm_level` itself.
    pub runtime_flags: Vec<String>,
    #[serde(skip)]
    flag_rules: Vec<RuntimeFlag>,
}

impl CompatibilityProfile {
    /// Re-evaluates the flag rules against the JVM that will actually run.
    #[must_use]
    pub fn flags_for_execution(&self, execution_jvm: u32) -> Vec<String> {
        self.flag_rules
            .iter()
            .filter(|flag| execution_jvm >= flag.since_jvm)
            .map(|flag| flag.argument.clone())
            .collect()
    }
}

/// Resolves a version string against the built-in table.
///
/// # Errors
/// Returns [`EngineError::InvalidVersionFormat`] for unparsable input.
pub fn resolve(version: &str) -> Result<CompatibilityProfile, EngineError> {
    let version = GradleVersion::parse(version)?;
    Ok(CompatibilityTable::builtin().profile(&version))
}

/// Memoizing resolver shared by the components of one run.
#[derive(Debug, Default)]
pub struct CompatibilityResolver {
    table: CompatibilityTable,
    memo: Mutex<HashMap<String, Arc<CompatibilityProfile>>>,
}

impl CompatibilityResolver {
    #[must_use]
    pub fn new(table: CompatibilityTable) -> Self {
        Self {
            table,
            memo: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn table(&self) -> &CompatibilityTable {
        &self.table
    }

    /// # Errors
    /// Returns [`EngineError::InvalidVersionFormat`] for unparsable input.
    pub fn resolve(&self, version: &str) -> Result<Arc<CompatibilityProfile>, EngineError> {
        if let Some(hit) = self.lock_memo().get(version) {
            return Ok(Arc::clone(hit));
        }
        let parsed = GradleVersion::parse(version)?;
        Ok(self.resolve_version(&parsed))
    }

    #[must_use]
    pub fn resolve_version(&self, version: &GradleVersion) -> Arc<CompatibilityProfile> {
        let mut memo = self.lock_memo();
        if let Some(hit) = memo.get(version.as_str()) {
            return Arc::clone(hit);
        }
        let profile = Arc::new(self.table.profile(version));
        debug!(
            version = %version,
            jvm = profile.jvm_level,
            flags = profile.runtime_flags.len(),
            "resolved compatibility profile"
        );
        memo.insert(version.as_str().to_string(), Arc::clone(&profile));
        profile
    }

    fn lock_memo(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<CompatibilityProfile>>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
