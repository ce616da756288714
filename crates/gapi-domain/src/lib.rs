//! Core value types for republishing Gradle distributions.

pub mod compat;
pub mod coordinates;
pub mod error;
pub mod version;

pub use compat::{
    resolve, CompatibilityProfile, CompatibilityResolver, CompatibilityTable, JvmThreshold,
    RuntimeFlag, FALLBACK_JVM_LEVEL,
};
pub use coordinates::{
    ArtifactCoordinates, ArtifactDescriptor, ArtifactSelection, Fingerprint, LogicalArtifact,
    DEFAULT_PUBLISH_GROUP,
};
pub use error::{EngineError, ErrorKind, Result};
pub use version::{BaseVersion, GradleVersion, Qualifier, QualifierKind};
