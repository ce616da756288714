use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gapi_store::fs::{compute_sha256, compute_sha512};
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::publish::sidecar;

const SIDECARS: &[&str] = &["sha256", "sha512", "md5", "sha1", "asc"];

#[derive(Debug, Clone, Serialize)]
pub struct VerifyProblem {
    pub path: PathBuf,
    pub problem: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub root: PathBuf,
    pub checked: usize,
    pub problems: Vec<VerifyProblem>,
}

impl VerifyReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Walks a local repository checking digest sidecars and that every main
/// jar has a POM next to it.
pub fn check_repository(root: &Path) -> Result<VerifyReport> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    let mut checked = 0;
    let mut problems = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != crate::publish::LOCK_DIR);
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() || is_sidecar(entry.path()) {
            continue;
        }
        checked += 1;
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        for problem in check_payload(path)? {
            warn!(path = %relative.display(), %problem, "repository problem");
            problems.push(VerifyProblem {
                path: relative.clone(),
                problem,
            });
        }
    }
    debug!(root = %root.display(), checked, problems = problems.len(), "verified repository");
    Ok(VerifyReport {
        root: root.to_path_buf(),
        checked,
        problems,
    })
}

fn is_sidecar(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SIDECARS.contains(&ext))
}

fn check_payload(path: &Path) -> Result<Vec<String>> {
    let mut problems = Vec::new();
    let sha256 = sidecar(path, "sha256");
    if sha256.is_file() {
        let expected = read_digest(&sha256)?;
        let actual = compute_sha256(path)?;
        if expected != actual {
            problems.push(format!("sha256 mismatch (sidecar {expected}, payload {actual})"));
        }
    } else {
        problems.push("missing .sha256 sidecar".to_string());
    }
    let sha512 = sidecar(path, "sha512");
    if sha512.is_file() {
        let expected = read_digest(&sha512)?;
        if expected != compute_sha512(path)? {
            problems.push("sha512 mismatch".to_string());
        }
    }
    if let Some(pom) = expected_pom(path) {
        if !pom.is_file() {
            problems.push(format!(
                "missing {}",
                pom.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned())
            ));
        }
    }
    Ok(problems)
}

fn read_digest(path: &Path) -> Result<String> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(text
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase())
}

/// `<name>-<version>.jar` inside `<name>/<version>/` needs `<name>-<version>.pom`.
fn expected_pom(path: &Path) -> Option<PathBuf> {
    let file_name = path.file_name()?.to_str()?;
    let version_dir = path.parent()?;
    let version = version_dir.file_name()?.to_str()?;
    let name = version_dir.parent()?.file_name()?.to_str()?;
    (file_name == format!("{name}-{version}.jar"))
        .then(|| version_dir.join(format!("{name}-{version}.pom")))
}
