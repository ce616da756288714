use std::io;

use serde::Serialize;

/// Failures surfaced by the republishing engine.
///
/// Every variant carries a stable code so callers and logs can match on it
/// without parsing the message.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("[GA100] invalid Gradle version '{input}': {reason}")]
    InvalidVersionFormat { input: String, reason: String },
    #[error("[GA101] invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
    #[error("[GA200] Gradle distribution {version} is unavailable from {source_label}: {reason}")]
    DistributionUnavailable {
        version: String,
        source_label: String,
        reason: String,
    },
    #[error("[GA201] Gradle {version} distribution has no match for {artifact} ({detail})")]
    LayoutMismatch {
        version: String,
        artifact: String,
        detail: String,
    },
    #[error("[GA202] checksum mismatch for {subject} (expected {expected}, found {actual})")]
    ChecksumMismatch {
        subject: String,
        expected: String,
        actual: String,
    },
    #[error("[GA300] {coordinates} is already published with fingerprint {existing} (refusing {incoming})")]
    CoordinateCollision {
        coordinates: String,
        existing: String,
        incoming: String,
    },
    #[error("[GA301] repository {target} requires credentials: {reason}")]
    AuthenticationRequired { target: String, reason: String },
    #[error("[GA302] repository {target} is unavailable: {reason}")]
    RepositoryUnavailable { target: String, reason: String },
    #[error("[GA400] no JVM {level} toolchain available: {reason}")]
    ToolchainUnavailable { level: u32, reason: String },
    #[error("[GA900] {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

/// Coarse classification of [`EngineError`] used for retry decisions and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidVersionFormat,
    InvalidConfiguration,
    DistributionUnavailable,
    LayoutMismatch,
    ChecksumMismatch,
    CoordinateCollision,
    AuthenticationRequired,
    RepositoryUnavailable,
    ToolchainUnavailable,
    Io,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidVersionFormat => "invalid_version_format",
            Self::InvalidConfiguration => "invalid_configuration",
            Self::DistributionUnavailable => "distribution_unavailable",
            Self::LayoutMismatch => "layout_mismatch",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::CoordinateCollision => "coordinate_collision",
            Self::AuthenticationRequired => "authentication_required",
            Self::RepositoryUnavailable => "repository_unavailable",
            Self::ToolchainUnavailable => "toolchain_unavailable",
            Self::Io => "io",
        }
    }

    /// Transient failures the caller may retry with its own backoff policy.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::DistributionUnavailable
                | Self::AuthenticationRequired
                | Self::RepositoryUnavailable
        )
    }

    /// Failures caused by the caller's input rather than the environment.
    #[must_use]
    pub fn is_user_error(self) -> bool {
        matches!(
            self,
            Self::InvalidVersionFormat
                | Self::InvalidConfiguration
                | Self::CoordinateCollision
                | Self::AuthenticationRequired
        )
    }
}

impl EngineError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidVersionFormat { .. } => ErrorKind::InvalidVersionFormat,
            Self::InvalidConfiguration { .. } => ErrorKind::InvalidConfiguration,
            Self::DistributionUnavailable { .. } => ErrorKind::DistributionUnavailable,
            Self::LayoutMismatch { .. } => ErrorKind::LayoutMismatch,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Self::CoordinateCollision { .. } => ErrorKind::CoordinateCollision,
            Self::AuthenticationRequired { .. } => ErrorKind::AuthenticationRequired,
            Self::RepositoryUnavailable { .. } => ErrorKind::RepositoryUnavailable,
            Self::ToolchainUnavailable { .. } => ErrorKind::ToolchainUnavailable,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidVersionFormat => "GA100",
            ErrorKind::InvalidConfiguration => "GA101",
            ErrorKind::DistributionUnavailable => "GA200",
            ErrorKind::LayoutMismatch => "GA201",
            ErrorKind::ChecksumMismatch => "GA202",
            ErrorKind::CoordinateCollision => "GA300",
            ErrorKind::AuthenticationRequired => "GA301",
            ErrorKind::RepositoryUnavailable => "GA302",
            ErrorKind::ToolchainUnavailable => "GA400",
            ErrorKind::Io => "GA900",
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::InvalidVersionFormat => {
                Some("Use a Gradle release string such as 8.2, 8.2.1 or 9.0-rc-1.")
            }
            ErrorKind::DistributionUnavailable => {
                Some("Check network access (GAPI_ONLINE) or point GAPI_DISTRIBUTION_DIR at local zips.")
            }
            ErrorKind::LayoutMismatch => {
                Some("Add a layout rule for this version range (see GAPI_LAYOUT_RULES).")
            }
            ErrorKind::CoordinateCollision => {
                Some("Pass --overwrite to replace the published artifact.")
            }
            ErrorKind::AuthenticationRequired => Some(
                "Pass --username/--password or export GAPI_PUBLISH_USERNAME and GAPI_PUBLISH_PASSWORD.",
            ),
            ErrorKind::ToolchainUnavailable => {
                Some("Install the JDK and export GAPI_JAVA_HOME_<LEVEL> pointing at it.")
            }
            ErrorKind::InvalidConfiguration
            | ErrorKind::ChecksumMismatch
            | ErrorKind::RepositoryUnavailable
            | ErrorKind::Io => None,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
