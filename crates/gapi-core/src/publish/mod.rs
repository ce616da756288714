//! Publishing extracted artifacts into Maven-layout repositories.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::PoisonError;

use gapi_domain::{ArtifactCoordinates, ArtifactDescriptor, EngineError};
use gapi_store::fs::KeyedLocks;
use gapi_store::HttpOptions;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::credentials::Credentials;

mod local;
mod remote;

pub(crate) use local::LOCK_DIR;
pub use local::LocalRepository;
pub use remote::{HttpTransport, RemoteRepository, RepositoryTransport};

#[derive(Debug, Clone)]
pub enum RepositoryTarget {
    Local {
        root: PathBuf,
    },
    Remote {
        url: Url,
        credentials: Option<Credentials>,
    },
}

impl RepositoryTarget {
    /// `http(s)://` locations are remote; `file://` URLs and plain paths are
    /// local directories.
    ///
    /// # Errors
    /// [`EngineError::InvalidConfiguration`] for empty locations, unsupported
    /// URL schemes and URLs that cannot be turned into a path.
    pub fn parse(location: &str, credentials: Option<Credentials>) -> Result<Self, EngineError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(EngineError::invalid_config("repository location is empty"));
        }
        if location.contains("://") {
            let url = Url::parse(location).map_err(|err| {
                EngineError::invalid_config(format!("invalid repository URL '{location}': {err}"))
            })?;
            return match url.scheme() {
                "http" | "https" => Ok(Self::Remote { url, credentials }),
                "file" => {
                    let root = url.to_file_path().map_err(|()| {
                        EngineError::invalid_config(format!("'{location}' is not a local path"))
                    })?;
                    Ok(Self::Local { root })
                }
                other => Err(EngineError::invalid_config(format!(
                    "unsupported repository scheme '{other}'"
                ))),
            };
        }
        Ok(Self::Local {
            root: PathBuf::from(location),
        })
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

impl fmt::Display for RepositoryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { root } => write!(f, "{}", root.display()),
            Self::Remote { url, .. } => write!(f, "{url}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    pub overwrite: bool,
    pub write_sha512: bool,
}

#[derive(Debug)]
pub enum PublishOutcome {
    Published,
    SkippedIdentical,
    Failed(EngineError),
}

impl PublishOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::SkippedIdentical => "skipped-identical",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
pub struct PublishRecord {
    pub coordinates: ArtifactCoordinates,
    pub outcome: PublishOutcome,
}

#[derive(Debug)]
pub struct PublishResult {
    pub target: String,
    pub records: Vec<PublishRecord>,
}

impl PublishResult {
    fn count(&self, status: &str) -> usize {
        self.records
            .iter()
            .filter(|record| record.outcome.as_str() == status)
            .count()
    }

    #[must_use]
    pub fn published(&self) -> usize {
        self.count("published")
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count("skipped-identical")
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ArtifactCoordinates, &EngineError)> {
        self.records.iter().filter_map(|record| match &record.outcome {
            PublishOutcome::Failed(err) => Some((&record.coordinates, err)),
            _ => None,
        })
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        let records: Vec<Value> = self
            .records
            .iter()
            .map(|record| {
                let mut entry = json!({
                    "coordinates": record.coordinates.to_string(),
                    "path": record.coordinates.repository_path(),
                    "status": record.outcome.as_str(),
                });
                if let PublishOutcome::Failed(err) = &record.outcome {
                    entry["error"] = crate::outcome::error_details(err);
                    entry["message"] = Value::String(err.to_string());
                }
                entry
            })
            .collect();
        json!({
            "target": self.target,
            "published": self.published(),
            "skipped": self.skipped(),
            "failed": self.failed(),
            "artifacts": records,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreAction {
    Published,
    SkippedIdentical,
}

/// One repository flavour: decides what to do with a single artifact.
pub(crate) trait ArtifactStore {
    fn store(
        &self,
        artifact: &ArtifactDescriptor,
        options: PublishOptions,
    ) -> Result<StoreAction, EngineError>;
}

/// Publishes artifact batches; writes to the same coordinates are serialized
/// within the process.
#[derive(Debug, Default)]
pub struct RepositoryPublisher {
    locks: KeyedLocks,
    http: HttpOptions,
}

impl RepositoryPublisher {
    #[must_use]
    pub fn new(http: HttpOptions) -> Self {
        Self {
            locks: KeyedLocks::new(),
            http,
        }
    }

    /// Publishes every artifact, recording one outcome each. Per-artifact
    /// failures never abort the batch.
    ///
    /// # Errors
    /// Only when the target itself cannot be opened (e.g. the HTTP client
    /// fails to build).
    pub fn publish(
        &self,
        artifacts: &[ArtifactDescriptor],
        target: &RepositoryTarget,
        options: PublishOptions,
    ) -> Result<PublishResult, EngineError> {
        match target {
            RepositoryTarget::Local { root } => {
                let store = LocalRepository::new(root);
                Ok(self.publish_into(&store, &target.to_string(), artifacts, options))
            }
            RepositoryTarget::Remote { url, credentials } => {
                let transport = HttpTransport::new(url.clone(), self.http)
                    .map_err(plumbing("failed to prepare HTTP client"))?;
                Ok(self.publish_with_transport(
                    artifacts,
                    &transport,
                    credentials.as_ref(),
                    options,
                ))
            }
        }
    }

    /// Publishes through an arbitrary remote transport.
    pub fn publish_with_transport(
        &self,
        artifacts: &[ArtifactDescriptor],
        transport: &dyn RepositoryTransport,
        credentials: Option<&Credentials>,
        options: PublishOptions,
    ) -> PublishResult {
        let store = RemoteRepository::new(transport, credentials);
        self.publish_into(&store, &transport.label(), artifacts, options)
    }

    fn publish_into(
        &self,
        store: &dyn ArtifactStore,
        label: &str,
        artifacts: &[ArtifactDescriptor],
        options: PublishOptions,
    ) -> PublishResult {
        let records = artifacts
            .iter()
            .map(|artifact| {
                let key = format!("{label}|{}", artifact.coordinates);
                let slot = self.locks.slot(&key);
                let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                let outcome = match store.store(artifact, options) {
                    Ok(StoreAction::Published) => {
                        info!(artifact = %artifact.coordinates, repository = label, "published");
                        PublishOutcome::Published
                    }
                    Ok(StoreAction::SkippedIdentical) => {
                        debug!(
                            artifact = %artifact.coordinates,
                            repository = label,
                            "already published"
                        );
                        PublishOutcome::SkippedIdentical
                    }
                    Err(err) => {
                        warn!(
                            artifact = %artifact.coordinates,
                            repository = label,
                            error = %err,
                            "publish failed"
                        );
                        PublishOutcome::Failed(err)
                    }
                };
                PublishRecord {
                    coordinates: artifact.coordinates.clone(),
                    outcome,
                }
            })
            .collect();
        PublishResult {
            target: label.to_string(),
            records,
        }
    }
}

pub(crate) fn io_error(context: impl Into<String>) -> impl FnOnce(io::Error) -> EngineError {
    let context = context.into();
    move |err| EngineError::io(context, err)
}

pub(crate) fn plumbing(context: impl Into<String>) -> impl FnOnce(anyhow::Error) -> EngineError {
    let context = context.into();
    move |err| EngineError::io(context, io::Error::other(format!("{err:#}")))
}

pub(crate) fn sidecar(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    use gapi_domain::{
        ArtifactCoordinates, ArtifactDescriptor, EngineError, Fingerprint, LogicalArtifact,
    };

    use super::RepositoryTransport;
    use crate::credentials::Credentials;

    /// In-memory repository recording which user performed each upload.
    #[derive(Default)]
    pub(crate) struct MemoryTransport {
        pub(crate) files: Mutex<HashMap<String, Vec<u8>>>,
        pub(crate) uploads: Mutex<Vec<(String, String)>>,
    }

    impl RepositoryTransport for MemoryTransport {
        fn label(&self) -> String {
            "memory://repo/".into()
        }

        fn exists(&self, path: &str, _: Option<&Credentials>) -> Result<bool, EngineError> {
            Ok(self.files.lock().unwrap().contains_key(path))
        }

        fn fetch(
            &self,
            path: &str,
            _: Option<&Credentials>,
        ) -> Result<Option<Vec<u8>>, EngineError> {
            Ok(self.files.lock().unwrap().get(path).cloned())
        }

        fn put(
            &self,
            path: &str,
            body: Vec<u8>,
            credentials: &Credentials,
        ) -> Result<(), EngineError> {
            self.uploads
                .lock()
                .unwrap()
                .push((path.to_string(), credentials.username.clone()));
            self.files.lock().unwrap().insert(path.to_string(), body);
            Ok(())
        }
    }

    /// Writes `bytes` under `dir` and describes them as `name:version` jar.
    pub(crate) fn descriptor(
        dir: &Path,
        name: &str,
        version: &str,
        bytes: &[u8],
    ) -> ArtifactDescriptor {
        let coordinates =
            ArtifactCoordinates::new("org.example", name, version, None, "jar").unwrap();
        let payload = dir.join(format!("{name}-{version}-{}.jar", bytes.len()));
        fs::create_dir_all(dir).unwrap();
        fs::write(&payload, bytes).unwrap();
        ArtifactDescriptor {
            coordinates,
            logical: LogicalArtifact::Api,
            fingerprint: Fingerprint::of_bytes(bytes),
            size: bytes.len() as u64,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_targets() {
        let local = RepositoryTarget::parse("/srv/maven", None).unwrap();
        assert!(
            matches!(local, RepositoryTarget::Local { ref root } if root == Path::new("/srv/maven"))
        );
        let file = RepositoryTarget::parse("file:///srv/maven", None).unwrap();
        assert!(!file.is_remote());
        let remote = RepositoryTarget::parse("https://repo.example.com/releases", None).unwrap();
        assert!(remote.is_remote());
        let err = RepositoryTarget::parse("s3://bucket/path", None).unwrap_err();
        assert_eq!(err.code(), "GA101");
        assert!(RepositoryTarget::parse("  ", None).is_err());
    }

    #[test]
    fn sidecar_appends_extension() {
        assert_eq!(
            sidecar(Path::new("a/b/x-1.jar"), "sha256"),
            PathBuf::from("a/b/x-1.jar.sha256")
        );
    }

    #[test]
    fn result_json_counts_outcomes() {
        let coordinates = ArtifactCoordinates::new("g", "n", "1.0", None, "jar").unwrap();
        let result = PublishResult {
            target: "repo".into(),
            records: vec![
                PublishRecord {
                    coordinates: coordinates.clone(),
                    outcome: PublishOutcome::Published,
                },
                PublishRecord {
                    coordinates,
                    outcome: PublishOutcome::Failed(EngineError::CoordinateCollision {
                        coordinates: "g:n:1.0@jar".into(),
                        existing: "a".into(),
                        incoming: "b".into(),
                    }),
                },
            ],
        };
        assert!(!result.is_success());
        let json = result.to_json();
        assert_eq!(json["published"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["artifacts"][1]["error"]["code"], "GA300");
        assert_eq!(result.failures().count(), 1);
    }
}
