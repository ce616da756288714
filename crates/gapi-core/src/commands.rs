use std::path::PathBuf;

use anyhow::Result;
use gapi_domain::{ArtifactSelection, EngineError, Fingerprint, GradleVersion};
use gapi_store::{DistributionExtractor, ExtractedSet};
use rayon::prelude::*;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::context::CommandContext;
use crate::outcome::{error_details, ExecutionOutcome};
use crate::planner::ExecutionPlanner;
use crate::publish::{PublishOptions, PublishResult, RepositoryPublisher, RepositoryTarget};
use crate::verify::check_repository;

#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    pub version: Option<String>,
    pub jvm: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractRequest {
    pub version: Option<String>,
    pub artifacts: Option<String>,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub version: Option<String>,
    pub repository: String,
    pub artifacts: Option<String>,
    pub sha256: Option<String>,
    pub overwrite: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RepublishRequest {
    pub versions: Vec<String>,
    pub repository: String,
    pub artifacts: Option<String>,
    pub overwrite: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub root: PathBuf,
}

/// Prints the compatibility profile of a Gradle version.
///
/// # Errors
/// Only unexpected internal failures; engine errors become outcomes.
pub fn resolve_profile(ctx: &CommandContext, request: ResolveRequest) -> Result<ExecutionOutcome> {
    engine_outcome(|| {
        let version = requested_version(ctx, request.version)?;
        let profile = ctx.resolver().resolve_version(&version);
        Ok(ExecutionOutcome::success(
            format!("Gradle {version} runs on JVM {}", profile.jvm_level),
            json!({
                "version": version.as_str(),
                "base_version": profile.base_version.to_string(),
                "prerelease": version.is_prerelease(),
                "jvm_level": profile.jvm_level,
                "runtime_flags": profile.runtime_flags,
            }),
        ))
    })
}

/// Plans the JVM invocation for a Gradle version.
///
/// # Errors
/// Only unexpected internal failures; engine errors become outcomes.
pub fn plan_execution(ctx: &CommandContext, request: PlanRequest) -> Result<ExecutionOutcome> {
    engine_outcome(|| {
        let version = requested_version(ctx, request.version)?;
        let planner = ExecutionPlanner::new(ctx.resolver(), ctx.effects().jvms());
        let config = planner.plan_with(version.as_str(), request.jvm)?;
        Ok(ExecutionOutcome::success(
            format!(
                "Gradle {} on JVM {} ({})",
                config.gradle_version,
                config.jvm_level,
                config.java_home.display()
            ),
            serde_json::to_value(&config)?,
        ))
    })
}

/// Extracts (or reuses) the artifacts of one distribution.
///
/// # Errors
/// Only unexpected internal failures; engine errors become outcomes.
pub fn extract_distribution(
    ctx: &CommandContext,
    request: ExtractRequest,
) -> Result<ExecutionOutcome> {
    engine_outcome(|| {
        let version = requested_version(ctx, request.version)?;
        let expected = request.sha256.as_deref().map(Fingerprint::parse).transpose()?;
        let extractor = ctx.extractor()?;
        let selection = selection(request.artifacts.as_deref(), &extractor, &version)?;
        let set = extractor.extract(&version, &selection, expected.as_ref())?;
        let verb = if set.cache_hit { "reused" } else { "extracted" };
        Ok(ExecutionOutcome::success(
            format!("{verb} {} artifacts for Gradle {version}", set.artifacts.len()),
            extraction_json(&set),
        ))
    })
}

/// Extracts one version and publishes its artifacts.
///
/// # Errors
/// Only unexpected internal failures; engine errors become outcomes.
pub fn publish_version(ctx: &CommandContext, request: PublishRequest) -> Result<ExecutionOutcome> {
    engine_outcome(|| {
        let version = requested_version(ctx, request.version)?;
        let expected = request.sha256.as_deref().map(Fingerprint::parse).transpose()?;
        let target =
            repository_target(ctx, &request.repository, request.username, request.password)?;
        let options = publish_options(ctx, request.overwrite);
        let extractor = ctx.extractor()?;
        let selection = selection(request.artifacts.as_deref(), &extractor, &version)?;
        let publisher = RepositoryPublisher::new(ctx.http_options());

        let set = extractor.extract(&version, &selection, expected.as_ref())?;
        let result = publisher.publish(&set.artifacts, &target, options)?;
        let details = json!({
            "extraction": extraction_json(&set),
            "publish": result.to_json(),
        });
        let message = format!(
            "Gradle {version}: {} published, {} unchanged, {} failed ({target})",
            result.published(),
            result.skipped(),
            result.failed()
        );
        Ok(publish_outcome(&result, message, details))
    })
}

/// Extracts and publishes several versions in parallel. One version failing
/// does not stop the others.
///
/// # Errors
/// Only unexpected internal failures; engine errors become outcomes.
pub fn republish_versions(
    ctx: &CommandContext,
    request: RepublishRequest,
) -> Result<ExecutionOutcome> {
    engine_outcome(|| {
        if request.versions.is_empty() {
            return Err(EngineError::invalid_config("no Gradle versions given").into());
        }
        let versions = request
            .versions
            .iter()
            .map(|raw| GradleVersion::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;
        let explicit = request
            .artifacts
            .as_deref()
            .map(ArtifactSelection::parse_list)
            .transpose()?;
        let target =
            repository_target(ctx, &request.repository, request.username, request.password)?;
        let options = publish_options(ctx, request.overwrite);
        let extractor = ctx.extractor()?;
        let publisher = RepositoryPublisher::new(ctx.http_options());

        let runs: Vec<VersionRun> = versions
            .par_iter()
            .map(|version| {
                republish_one(&extractor, &publisher, &target, version, explicit.as_ref(), options)
            })
            .collect();

        let failed = runs.iter().filter(|run| !run.ok).count();
        let user_only = runs.iter().all(|run| run.ok || run.user_error);
        let reports: Vec<Value> = runs.into_iter().map(|run| run.report).collect();
        let details = json!({ "target": target.to_string(), "versions": reports });
        let message = format!(
            "republished {} of {} Gradle versions to {target}",
            versions.len() - failed,
            versions.len()
        );
        Ok(if failed == 0 {
            ExecutionOutcome::success(message, details)
        } else if user_only {
            ExecutionOutcome::user_error(message, details)
        } else {
            ExecutionOutcome::failure(message, details)
        })
    })
}

/// Checks digests and POMs of a local repository.
///
/// # Errors
/// Returns an error when the repository cannot be walked.
pub fn verify_repository(
    _ctx: &CommandContext,
    request: VerifyRequest,
) -> Result<ExecutionOutcome> {
    let report = check_repository(&request.root)?;
    let details = serde_json::to_value(&report)?;
    if report.is_clean() {
        Ok(ExecutionOutcome::success(
            format!("{} files verified in {}", report.checked, request.root.display()),
            details,
        ))
    } else {
        Ok(ExecutionOutcome::failure(
            format!(
                "{} problems in {}",
                report.problems.len(),
                request.root.display()
            ),
            details,
        ))
    }
}

struct VersionRun {
    ok: bool,
    user_error: bool,
    report: Value,
}

fn republish_one(
    extractor: &DistributionExtractor,
    publisher: &RepositoryPublisher,
    target: &RepositoryTarget,
    version: &GradleVersion,
    explicit: Option<&ArtifactSelection>,
    options: PublishOptions,
) -> VersionRun {
    let selection = match explicit {
        Some(selection) => Ok(selection.clone()),
        None => extractor.layout().covered(version),
    };
    let outcome = selection
        .and_then(|selection| extractor.extract(version, &selection, None))
        .and_then(|set| {
            publisher
                .publish(&set.artifacts, target, options)
                .map(|result| (set, result))
        });
    match outcome {
        Ok((set, result)) => {
            let status = if result.is_success() { "ok" } else { "failed" };
            VersionRun {
                ok: result.is_success(),
                user_error: result.failures().all(|(_, err)| err.kind().is_user_error()),
                report: json!({
                    "version": version.as_str(),
                    "status": status,
                    "cache_hit": set.cache_hit,
                    "publish": result.to_json(),
                }),
            }
        }
        Err(err) => {
            info!(%version, error = %err, "skipping version");
            VersionRun {
                ok: false,
                user_error: err.kind().is_user_error(),
                report: json!({
                    "version": version.as_str(),
                    "status": "failed",
                    "message": err.to_string(),
                    "error": error_details(&err),
                }),
            }
        }
    }
}

fn engine_outcome(run: impl FnOnce() -> Result<ExecutionOutcome>) -> Result<ExecutionOutcome> {
    match run() {
        Ok(outcome) => Ok(outcome),
        Err(err) if err.chain().any(|cause| cause.is::<EngineError>()) => {
            Ok(ExecutionOutcome::from_error(&err))
        }
        Err(err) => Err(err),
    }
}

fn requested_version(
    ctx: &CommandContext,
    version: Option<String>,
) -> Result<GradleVersion, EngineError> {
    let raw = version
        .as_deref()
        .or_else(|| ctx.config().default_version())
        .ok_or_else(|| {
            EngineError::invalid_config(
                "no Gradle version given (pass one or set GAPI_GRADLE_VERSION)",
            )
        })?;
    GradleVersion::parse(raw)
}

/// An explicit `--artifacts` list, or everything the layout rules cover at
/// `version`.
fn selection(
    artifacts: Option<&str>,
    extractor: &DistributionExtractor,
    version: &GradleVersion,
) -> Result<ArtifactSelection, EngineError> {
    match artifacts {
        Some(list) => ArtifactSelection::parse_list(list),
        None => extractor.layout().covered(version),
    }
}

fn publish_options(ctx: &CommandContext, overwrite: bool) -> PublishOptions {
    PublishOptions {
        overwrite,
        write_sha512: ctx.config().publish().hashes,
    }
}

/// Parses the target and, for remote ones, resolves credentials.
fn repository_target(
    ctx: &CommandContext,
    location: &str,
    username: Option<String>,
    password: Option<String>,
) -> Result<RepositoryTarget, EngineError> {
    match RepositoryTarget::parse(location, None)? {
        RepositoryTarget::Remote { url, .. } => {
            let resolved = ctx.credentials(username, password);
            match &resolved {
                Some(found) => debug!(source = %found.source, "using repository credentials"),
                None => debug!(repository = %url, "no repository credentials configured"),
            }
            Ok(RepositoryTarget::Remote {
                url,
                credentials: resolved.map(|found| found.credentials),
            })
        }
        local => Ok(local),
    }
}

fn publish_outcome(result: &PublishResult, message: String, details: Value) -> ExecutionOutcome {
    if result.is_success() {
        ExecutionOutcome::success(message, details)
    } else if result.failures().all(|(_, err)| err.kind().is_user_error()) {
        ExecutionOutcome::user_error(message, details)
    } else {
        ExecutionOutcome::failure(message, details)
    }
}

fn extraction_json(set: &ExtractedSet) -> Value {
    let artifacts: Vec<Value> = set
        .artifacts
        .iter()
        .map(|artifact| {
            json!({
                "coordinates": artifact.coordinates.to_string(),
                "logical": artifact.logical.as_str(),
                "fingerprint": artifact.fingerprint.as_str(),
                "size": artifact.size,
                "payload": artifact.payload.display().to_string(),
            })
        })
        .collect();
    json!({
        "version": set.version.as_str(),
        "selection": set.selection.cache_key(),
        "cache_hit": set.cache_hit,
        "location": set.location.display().to_string(),
        "artifacts": artifacts,
    })
}
