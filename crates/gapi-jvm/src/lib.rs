//! JDK discovery.
//!
//! Installations are found through `GAPI_JAVA_HOME_<N>`, the `JAVA_HOME_<N>_X64`
//! / `JAVA_HOME_<N>_AARCH64` variables CI images export, `JAVA_HOME`, and
//! finally `java` on `PATH`. Each candidate's `release` file decides its
//! feature level.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmInstallation {
    pub java_home: PathBuf,
    pub java_executable: PathBuf,
    pub feature_level: u32,
    /// Full `JAVA_VERSION` from the `release` file.
    pub version: String,
    /// Which lookup produced this installation, e.g. `GAPI_JAVA_HOME_17`.
    pub origin: String,
}

/// Extracts the feature level from a Java version string.
///
/// `1.8.0_292` is 8, `17.0.2` is 17, `24-ea` is 24.
#[must_use]
pub fn parse_feature_level(version: &str) -> Option<u32> {
    let trimmed = version.trim().trim_matches('"');
    let mut parts = trimmed.split(['.', '-', '_', '+']);
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        return parts.next()?.parse().ok();
    }
    (first > 0).then_some(first)
}

#[must_use]
pub fn java_executable(java_home: &Path) -> PathBuf {
    let name = if cfg!(windows) { "java.exe" } else { "java" };
    java_home.join("bin").join(name)
}

/// Reads `<home>/release` and checks that `bin/java` exists.
pub fn inspect_java_home(java_home: &Path, origin: &str) -> Result<JvmInstallation> {
    let release = java_home.join("release");
    let text = fs::read_to_string(&release)
        .with_context(|| format!("failed to read {}", release.display()))?;
    let version = text
        .lines()
        .find_map(|line| line.strip_prefix("JAVA_VERSION="))
        .map(|value| value.trim().trim_matches('"').to_string())
        .ok_or_else(|| anyhow!("{} has no JAVA_VERSION", release.display()))?;
    let feature_level = parse_feature_level(&version)
        .ok_or_else(|| anyhow!("unrecognised JAVA_VERSION '{version}' in {}", release.display()))?;
    let executable = java_executable(java_home);
    if !executable.is_file() {
        bail!("{} is missing", executable.display());
    }
    Ok(JvmInstallation {
        java_home: java_home.to_path_buf(),
        java_executable: executable,
        feature_level,
        version,
        origin: origin.to_string(),
    })
}

/// Candidate homes for `level`, most specific first.
pub fn candidate_homes<F>(level: u32, lookup: F) -> Vec<(String, PathBuf)>
where
    F: Fn(&str) -> Option<String>,
{
    let keys = [
        format!("GAPI_JAVA_HOME_{level}"),
        format!("JAVA_HOME_{level}_X64"),
        format!("JAVA_HOME_{level}_AARCH64"),
        format!("JAVA_HOME_{level}"),
        "JAVA_HOME".to_string(),
    ];
    let mut candidates: Vec<(String, PathBuf)> = Vec::new();
    for key in keys {
        let Some(value) = lookup(&key).filter(|value| !value.trim().is_empty()) else {
            continue;
        };
        let path = PathBuf::from(value.trim());
        if candidates.iter().all(|(_, existing)| existing != &path) {
            candidates.push((key, path));
        }
    }
    if let Some(home) = path_java_home() {
        if candidates.iter().all(|(_, existing)| existing != &home) {
            candidates.push(("PATH".to_string(), home));
        }
    }
    candidates
}

fn path_java_home() -> Option<PathBuf> {
    let java = which::which("java").ok()?;
    let resolved = fs::canonicalize(&java).unwrap_or(java);
    resolved.parent()?.parent().map(Path::to_path_buf)
}

/// Finds an installation whose feature level is exactly `level`.
pub fn find_installation<F>(level: u32, lookup: F) -> Result<JvmInstallation>
where
    F: Fn(&str) -> Option<String>,
{
    let mut rejected = Vec::new();
    for (origin, home) in candidate_homes(level, lookup) {
        match inspect_java_home(&home, &origin) {
            Ok(installation) if installation.feature_level == level => {
                debug!(
                    level,
                    origin = %origin,
                    home = %home.display(),
                    "selected JVM installation"
                );
                return Ok(installation);
            }
            Ok(installation) => {
                trace!(
                    origin = %origin,
                    found = installation.feature_level,
                    wanted = level,
                    "skipping JVM"
                );
                rejected.push(format!("{origin} is Java {}", installation.feature_level));
            }
            Err(err) => {
                trace!(origin = %origin, error = %err, "ignoring JVM candidate");
                rejected.push(format!("{origin}: {err}"));
            }
        }
    }
    if rejected.is_empty() {
        bail!("no JDK candidates found; export GAPI_JAVA_HOME_{level}");
    }
    bail!("no Java {level} installation found ({})", rejected.join("; "))
}
