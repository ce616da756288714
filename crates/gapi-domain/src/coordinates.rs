use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EngineError;

pub const DEFAULT_PUBLISH_GROUP: &str = "name.remal.gradle-api";

/// A named slice of a Gradle distribution published as one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogicalArtifact {
    Api,
    TestKit,
    Wrapper,
    KotlinDsl,
    LocalGroovy,
}

impl LogicalArtifact {
    #[must_use]
    pub fn all() -> [Self; 5] {
        [
            Self::Api,
            Self::TestKit,
            Self::Wrapper,
            Self::KotlinDsl,
            Self::LocalGroovy,
        ]
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::TestKit => "test-kit",
            Self::Wrapper => "wrapper",
            Self::KotlinDsl => "kotlin-dsl",
            Self::LocalGroovy => "local-groovy",
        }
    }

    /// Maven artifact id.
    #[must_use]
    pub fn artifact_name(self) -> &'static str {
        match self {
            Self::Api => "gradle-api",
            Self::TestKit => "gradle-test-kit",
            Self::Wrapper => "gradle-wrapper",
            Self::KotlinDsl => "gradle-kotlin-dsl",
            Self::LocalGroovy => "local-groovy",
        }
    }

    /// Sibling artifacts referenced from the generated POM.
    #[must_use]
    pub fn depends_on(self) -> &'static [LogicalArtifact] {
        match self {
            Self::TestKit | Self::KotlinDsl => &[Self::Api],
            Self::Api | Self::Wrapper | Self::LocalGroovy => &[],
        }
    }
}

impl fmt::Display for LogicalArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalArtifact {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::all()
            .into_iter()
            .find(|artifact| artifact.as_str() == needle || artifact.artifact_name() == needle)
            .ok_or_else(|| {
                EngineError::invalid_config(format!(
                    "unknown artifact '{s}' (expected one of api, test-kit, wrapper, kotlin-dsl, local-groovy)"
                ))
            })
    }
}

/// Ordered, de-duplicated set of logical artifacts requested for one version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactSelection(BTreeSet<LogicalArtifact>);

impl ArtifactSelection {
    #[must_use]
    pub fn all() -> Self {
        Self(LogicalArtifact::all().into_iter().collect())
    }

    /// # Errors
    /// Rejects empty selections.
    pub fn new(artifacts: impl IntoIterator<Item = LogicalArtifact>) -> Result<Self, EngineError> {
        let set: BTreeSet<_> = artifacts.into_iter().collect();
        if set.is_empty() {
            return Err(EngineError::invalid_config("artifact selection is empty"));
        }
        Ok(Self(set))
    }

    /// Parses a comma-separated list such as `api,test-kit`.
    ///
    /// # Errors
    /// Fails on unknown names or an empty list.
    pub fn parse_list(input: &str) -> Result<Self, EngineError> {
        let parsed = input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(LogicalArtifact::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(parsed)
    }

    pub fn iter(&self) -> impl Iterator<Item = LogicalArtifact> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn contains(&self, artifact: LogicalArtifact) -> bool {
        self.0.contains(&artifact)
    }

    /// Stable directory name for this selection in the extraction cache.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.0
            .iter()
            .map(|artifact| artifact.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl Default for ArtifactSelection {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactCoordinates {
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    pub extension: String,
}

impl ArtifactCoordinates {
    /// # Errors
    /// Rejects empty parts and characters that cannot appear in a repository path.
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        classifier: Option<String>,
        extension: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let coordinates = Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            classifier,
            extension: extension.into(),
        };
        coordinates.validate()?;
        Ok(coordinates)
    }

    fn validate(&self) -> Result<(), EngineError> {
        let parts = [
            ("group", Some(self.group.as_str())),
            ("name", Some(self.name.as_str())),
            ("version", Some(self.version.as_str())),
            ("classifier", self.classifier.as_deref()),
            ("extension", Some(self.extension.as_str())),
        ];
        for (label, value) in parts {
            let Some(value) = value else { continue };
            if value.is_empty() {
                return Err(EngineError::invalid_config(format!(
                    "artifact {label} is empty"
                )));
            }
            if value.contains(['/', '\\', ':']) || value.contains("..") || value.trim() != value {
                return Err(EngineError::invalid_config(format!(
                    "artifact {label} '{value}' contains path characters"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!(
                "{}-{}-{}.{}",
                self.name, self.version, classifier, self.extension
            ),
            None => format!("{}-{}.{}", self.name, self.version, self.extension),
        }
    }

    /// `<group path>/<name>/<version>/<file>` with `/` separators.
    #[must_use]
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.name,
            self.version,
            self.file_name()
        )
    }
}

impl fmt::Display for ArtifactCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        write!(f, "@{}", self.extension)
    }
}

/// Lower-case hex sha256 of an artifact payload.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    #[must_use]
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// # Errors
    /// Propagates read failures as [`EngineError::Io`].
    pub fn of_file(path: &Path) -> Result<Self, EngineError> {
        let mut file = File::open(path)
            .map_err(|err| EngineError::io(format!("failed to open {}", path.display()), err))?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher)
            .map_err(|err| EngineError::io(format!("failed to read {}", path.display()), err))?;
        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Accepts a hex digest, ignoring case and any trailing file name.
    ///
    /// # Errors
    /// Rejects anything that is not 64 hex characters.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let digest = text.split_whitespace().next().unwrap_or_default();
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(EngineError::invalid_config(format!(
                "'{}' is not a sha256 digest",
                text.trim()
            )));
        }
        Ok(Self(digest.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One repackaged payload sitting in the extraction cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub coordinates: ArtifactCoordinates,
    pub logical: LogicalArtifact,
    pub fingerprint: Fingerprint,
    pub size: u64,
    pub payload: PathBuf,
}

impl ArtifactDescriptor {
    /// Re-hashes the payload and compares it with the recorded fingerprint.
    ///
    /// # Errors
    /// [`EngineError::ChecksumMismatch`] when the bytes changed on disk.
    pub fn verify_payload(&self) -> Result<(), EngineError> {
        let actual = Fingerprint::of_file(&self.payload)?;
        if actual != self.fingerprint {
            return Err(EngineError::ChecksumMismatch {
                subject: self.coordinates.to_string(),
                expected: self.fingerprint.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}
