//! Where distribution zips come from.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;

use gapi_domain::{EngineError, Fingerprint, GradleVersion};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_DISTRIBUTION_URL: &str = "https://services.gradle.org/distributions";
pub const DEFAULT_SNAPSHOT_DISTRIBUTION_URL: &str =
    "https://services.gradle.org/distributions-snapshots";
const DOWNLOAD_ATTEMPTS: usize = 3;

/// `bin` ships jars only; `all` also ships `src/` and docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionFlavor {
    Bin,
    #[default]
    All,
}

impl DistributionFlavor {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bin => "bin",
            Self::All => "all",
        }
    }

    #[must_use]
    pub fn file_name(self, version: &GradleVersion) -> String {
        format!("gradle-{}-{}.zip", version.as_str(), self.as_str())
    }
}

impl fmt::Display for DistributionFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionFlavor {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bin" => Ok(Self::Bin),
            "all" => Ok(Self::All),
            other => Err(EngineError::invalid_config(format!(
                "unknown distribution type '{other}' (expected bin or all)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFailure {
    NotFound(String),
    Unavailable(String),
}

impl SourceFailure {
    #[must_use]
    pub fn into_engine_error(self, version: &GradleVersion, source_label: &str) -> EngineError {
        let reason = match self {
            Self::NotFound(reason) => format!("not found: {reason}"),
            Self::Unavailable(reason) => reason,
        };
        EngineError::DistributionUnavailable {
            version: version.to_string(),
            source_label: source_label.to_string(),
            reason,
        }
    }
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(reason) => write!(f, "not found: {reason}"),
            Self::Unavailable(reason) => f.write_str(reason),
        }
    }
}

/// Supplies the bytes of a Gradle distribution zip.
pub trait DistributionSource: Send + Sync {
    fn label(&self) -> String;

    fn flavor(&self) -> DistributionFlavor;

    /// Streams the zip for `version` into `sink`, returning the byte count.
    fn fetch(&self, version: &GradleVersion, sink: &mut dyn Write) -> Result<u64, SourceFailure>;

    /// Digest the source publishes next to the zip, if any.
    fn published_checksum(&self, _version: &GradleVersion) -> Option<Fingerprint> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct HttpDistributionSource {
    client: Client,
    base_url: String,
    snapshot_url: String,
    flavor: DistributionFlavor,
    online: bool,
}

impl HttpDistributionSource {
    #[must_use]
    pub fn new(client: Client, flavor: DistributionFlavor) -> Self {
        Self {
            client,
            base_url: DEFAULT_DISTRIBUTION_URL.to_string(),
            snapshot_url: DEFAULT_SNAPSHOT_DISTRIBUTION_URL.to_string(),
            flavor,
            online: true,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_snapshot_url(mut self, url: impl Into<String>) -> Self {
        self.snapshot_url = url.into();
        self
    }

    #[must_use]
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    #[must_use]
    pub fn url_for(&self, version: &GradleVersion) -> String {
        let base = if version.is_nightly() {
            &self.snapshot_url
        } else {
            &self.base_url
        };
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            self.flavor.file_name(version)
        )
    }
}

impl DistributionSource for HttpDistributionSource {
    fn label(&self) -> String {
        self.base_url.clone()
    }

    fn flavor(&self) -> DistributionFlavor {
        self.flavor
    }

    fn fetch(&self, version: &GradleVersion, sink: &mut dyn Write) -> Result<u64, SourceFailure> {
        if !self.online {
            return Err(SourceFailure::Unavailable(
                "network access is disabled (GAPI_ONLINE=0 or --offline)".into(),
            ));
        }
        let url = self.url_for(version);
        let mut last = SourceFailure::Unavailable(format!("no attempts made for {url}"));
        // Only the request itself is retried; once bytes reach the sink a
        // failure is final.
        for attempt in 1..=DOWNLOAD_ATTEMPTS {
            let mut response = match self.client.get(&url).send() {
                Ok(response) => response,
                Err(err) => {
                    warn!(%url, attempt, error = %err, "distribution request failed");
                    last = SourceFailure::Unavailable(format!("request to {url} failed: {err}"));
                    continue;
                }
            };
            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(SourceFailure::NotFound(url));
            }
            if status.is_server_error() {
                warn!(%url, attempt, %status, "distribution server error");
                last = SourceFailure::Unavailable(format!("{url} returned {status}"));
                continue;
            }
            if !status.is_success() {
                return Err(SourceFailure::Unavailable(format!("{url} returned {status}")));
            }
            info!(%url, "downloading Gradle distribution");
            return response
                .copy_to(sink)
                .map_err(|err| {
                    SourceFailure::Unavailable(format!("stream error for {url}: {err}"))
                });
        }
        Err(last)
    }

    fn published_checksum(&self, version: &GradleVersion) -> Option<Fingerprint> {
        if !self.online {
            return None;
        }
        let url = format!("{}.sha256", self.url_for(version));
        let response = self.client.get(&url).send().ok()?;
        if !response.status().is_success() {
            debug!(%url, status = %response.status(), "no published checksum");
            return None;
        }
        let body = response.text().ok()?;
        Fingerprint::parse(&body).ok()
    }
}

/// A directory of pre-downloaded `gradle-<version>-<flavor>.zip` files.
#[derive(Debug, Clone)]
pub struct LocalDistributionSource {
    root: PathBuf,
    flavor: DistributionFlavor,
}

impl LocalDistributionSource {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, flavor: DistributionFlavor) -> Self {
        Self {
            root: root.into(),
            flavor,
        }
    }

    fn zip_path(&self, version: &GradleVersion) -> PathBuf {
        self.root.join(self.flavor.file_name(version))
    }
}

impl DistributionSource for LocalDistributionSource {
    fn label(&self) -> String {
        self.root.display().to_string()
    }

    fn flavor(&self) -> DistributionFlavor {
        self.flavor
    }

    fn fetch(&self, version: &GradleVersion, sink: &mut dyn Write) -> Result<u64, SourceFailure> {
        let path = self.zip_path(version);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(SourceFailure::NotFound(path.display().to_string()));
            }
            Err(err) => {
                return Err(SourceFailure::Unavailable(format!(
                    "failed to open {}: {err}",
                    path.display()
                )));
            }
        };
        io::copy(&mut file, sink).map_err(|err| {
            SourceFailure::Unavailable(format!("failed to read {}: {err}", path.display()))
        })
    }

    fn published_checksum(&self, version: &GradleVersion) -> Option<Fingerprint> {
        let mut sidecar = self.zip_path(version).into_os_string();
        sidecar.push(".sha256");
        let text = fs::read_to_string(PathBuf::from(sidecar)).ok()?;
        Fingerprint::parse(&text).ok()
    }
}
