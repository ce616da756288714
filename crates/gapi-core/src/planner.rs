use std::path::PathBuf;

use gapi_domain::{CompatibilityResolver, EngineError, GradleVersion};
use gapi_jvm::JvmInstallation;
use serde::Serialize;
use tracing::debug;

use crate::config::EnvSnapshot;

pub const EXPECTED_GRADLE_VERSION_ENV: &str = "EXPECTED_GRADLE_VERSION";

pub trait JvmProvisioner: Send + Sync {
    /// Returns a JVM whose feature level is exactly `level`.
    ///
    /// # Errors
    /// [`EngineError::ToolchainUnavailable`] when no such JVM can be provided.
    fn provision(&self, level: u32) -> Result<JvmInstallation, EngineError>;
}

/// Looks for installed JDKs through `GAPI_JAVA_HOME_<N>`, CI-style
/// `JAVA_HOME_<N>_X64` variables, `JAVA_HOME` and `java` on `PATH`.
pub struct SystemJvmProvisioner {
    env: EnvSnapshot,
}

impl SystemJvmProvisioner {
    #[must_use]
    pub fn new(env: EnvSnapshot) -> Self {
        Self { env }
    }

    #[must_use]
    pub fn from_process_env() -> Self {
        Self::new(EnvSnapshot::capture())
    }
}

impl JvmProvisioner for SystemJvmProvisioner {
    fn provision(&self, level: u32) -> Result<JvmInstallation, EngineError> {
        gapi_jvm::find_installation(level, self.env.lookup()).map_err(|err| {
            EngineError::ToolchainUnavailable {
                level,
                reason: format!("{err:#}"),
            }
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionConfig {
    pub gradle_version: GradleVersion,
    pub required_jvm_level: u32,
    pub jvm_level: u32,
    pub java_home: PathBuf,
    pub java_executable: PathBuf,
    pub runtime_flags: Vec<String>,
    pub environment: Vec<(String, String)>,
}

impl ExecutionConfig {
    /// The `java` invocation with runtime flags ahead of `args`.
    #[must_use]
    pub fn command_line(&self, args: &[String]) -> Vec<String> {
        let mut line = Vec::with_capacity(1 + self.runtime_flags.len() + args.len());
        line.push(self.java_executable.display().to_string());
        line.extend(self.runtime_flags.iter().cloned());
        line.extend(args.iter().cloned());
        line
    }
}

pub struct ExecutionPlanner<'a> {
    resolver: &'a CompatibilityResolver,
    provisioner: &'a dyn JvmProvisioner,
}

impl<'a> ExecutionPlanner<'a> {
    pub fn new(resolver: &'a CompatibilityResolver, provisioner: &'a dyn JvmProvisioner) -> Self {
        Self {
            resolver,
            provisioner,
        }
    }

    /// Plans a run on exactly the JVM level the version requires.
    ///
    /// # Errors
    /// Propagates version parse failures and toolchain unavailability.
    pub fn plan(&self, version: &str) -> Result<ExecutionConfig, EngineError> {
        self.plan_with(version, None)
    }

    /// Like [`plan`](Self::plan) but may run on a newer JVM; flags are
    /// computed for the JVM actually used.
    ///
    /// # Errors
    /// [`EngineError::InvalidConfiguration`] when `jvm_level` is below the
    /// required level.
    pub fn plan_with(
        &self,
        version: &str,
        jvm_level: Option<u32>,
    ) -> Result<ExecutionConfig, EngineError> {
        let gradle_version = GradleVersion::parse(version)?;
        let profile = self.resolver.resolve_version(&gradle_version);
        let level = match jvm_level {
            Some(level) if level < profile.jvm_level => {
                return Err(EngineError::invalid_config(format!(
                    "Gradle {gradle_version} needs JVM {} or newer, refusing JVM {level}",
                    profile.jvm_level
                )));
            }
            Some(level) => level,
            None => profile.jvm_level,
        };
        let installation = self.provisioner.provision(level)?;
        debug!(
            version = %gradle_version,
            jvm = level,
            home = %installation.java_home.display(),
            "planned execution"
        );
        let environment = vec![
            (
                EXPECTED_GRADLE_VERSION_ENV.to_string(),
                gradle_version.as_str().to_string(),
            ),
            (
                "JAVA_HOME".to_string(),
                installation.java_home.display().to_string(),
            ),
        ];
        Ok(ExecutionConfig {
            runtime_flags: profile.flags_for_execution(level),
            required_jvm_level: profile.jvm_level,
            jvm_level: level,
            java_home: installation.java_home,
            java_executable: installation.java_executable,
            environment,
            gradle_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Hands out a fake home for every level it was configured with.
    #[derive(Default)]
    struct FakeProvisioner {
        levels: Vec<u32>,
        requests: Mutex<Vec<u32>>,
    }

    impl FakeProvisioner {
        fn with_levels(levels: &[u32]) -> Self {
            Self {
                levels: levels.to_vec(),
                requests: Mutex::default(),
            }
        }
    }

    impl JvmProvisioner for FakeProvisioner {
        fn provision(&self, level: u32) -> Result<JvmInstallation, EngineError> {
            self.requests.lock().unwrap().push(level);
            if !self.levels.contains(&level) {
                return Err(EngineError::ToolchainUnavailable {
                    level,
                    reason: "not installed".into(),
                });
            }
            let home = PathBuf::from(format!("/opt/jdk-{level}"));
            Ok(JvmInstallation {
                java_executable: gapi_jvm::java_executable(&home),
                java_home: home,
                feature_level: level,
                version: format!("{level}.0.1"),
                origin: "fake".into(),
            })
        }
    }

    #[test]
    fn modern_gradle_runs_on_jvm_18_with_flags() {
        let resolver = CompatibilityResolver::default();
        let jvms = FakeProvisioner::with_levels(&[8, 18]);
        let config = ExecutionPlanner::new(&resolver, &jvms).plan("9.1").unwrap();
        assert_eq!(config.jvm_level, 18);
        assert_eq!(config.java_home, PathBuf::from("/opt/jdk-18"));
        assert_eq!(
            config.runtime_flags,
            vec!["--add-opens=java.base/java.lang=ALL-UNNAMED".to_string()]
        );
        assert!(config
            .environment
            .contains(&("EXPECTED_GRADLE_VERSION".to_string(), "9.1".to_string())));
        assert_eq!(*jvms.requests.lock().unwrap(), vec![18]);
    }

    #[test]
    fn older_gradle_uses_fallback_without_flags() {
        let resolver = CompatibilityResolver::default();
        let jvms = FakeProvisioner::with_levels(&[8]);
        let config = ExecutionPlanner::new(&resolver, &jvms).plan("7.6.1").unwrap();
        assert_eq!(config.jvm_level, 8);
        assert!(config.runtime_flags.is_empty());
        let line = config.command_line(&["-version".to_string()]);
        assert_eq!(line.last().map(String::as_str), Some("-version"));
        assert_eq!(line.len(), 2);
    }

    #[test]
    fn newer_jvm_gets_its_own_flags() {
        let resolver = CompatibilityResolver::default();
        let jvms = FakeProvisioner::with_levels(&[25]);
        let config = ExecutionPlanner::new(&resolver, &jvms)
            .plan_with("9.0", Some(25))
            .unwrap();
        assert_eq!(config.required_jvm_level, 18);
        assert_eq!(config.runtime_flags.len(), 2);
    }

    #[test]
    fn downgrade_and_missing_toolchain_are_errors() {
        let resolver = CompatibilityResolver::default();
        let jvms = FakeProvisioner::with_levels(&[]);
        let planner = ExecutionPlanner::new(&resolver, &jvms);
        let err = planner.plan_with("9.0", Some(11)).unwrap_err();
        assert_eq!(err.code(), "GA101");
        let err = planner.plan("9.0").unwrap_err();
        assert!(matches!(err, EngineError::ToolchainUnavailable { level: 18, .. }));
    }
}
