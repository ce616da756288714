//! Command layer of the Gradle API republisher: configuration, publishing,
//! execution planning and the entry points the CLI dispatches to.

mod commands;
pub mod config;
mod context;
pub mod credentials;
pub mod effects;
pub mod outcome;
pub mod planner;
pub mod publish;
pub mod verify;

pub use commands::{
    extract_distribution, plan_execution, publish_version, republish_versions, resolve_profile,
    verify_repository, ExtractRequest, PlanRequest, PublishRequest, RepublishRequest,
    ResolveRequest, VerifyRequest,
};
pub use config::{Config, EnvSnapshot, GlobalOptions};
pub use context::CommandContext;
pub use credentials::{CredentialChain, CredentialSource, Credentials};
pub use effects::{SharedEffects, SystemEffects};
pub use outcome::{to_json_response, CommandStatus, ExecutionOutcome};
pub use planner::{ExecutionConfig, ExecutionPlanner, JvmProvisioner, SystemJvmProvisioner};
pub use publish::{
    PublishOptions, PublishOutcome, PublishResult, RepositoryPublisher, RepositoryTarget,
};
