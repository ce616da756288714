use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

pub const GAPI_BEFORE_HELP: &str = concat!(
    "gapi ",
    env!("CARGO_PKG_VERSION"),
    " - Gradle API republisher\n\n",
    "  resolve          Show the JVM level and flags a Gradle version needs.\n",
    "  plan             Pick a JVM and build the execution configuration.\n",
    "  extract          Unpack and repackage distribution jars into the cache.\n",
    "  publish          Extract one version and publish it to a repository.\n",
    "  republish        Extract and publish several versions in parallel.\n",
    "  verify           Check digests and POMs of a local repository.\n",
);

#[derive(Parser, Debug)]
#[command(
    name = "gapi",
    author,
    version,
    disable_help_subcommand = true,
    before_help = GAPI_BEFORE_HELP
)]
#[allow(clippy::struct_excessive_bools)]
pub struct GapiCli {
    #[arg(short, long, help = "Suppress human output", global = true)]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(long, help = "Emit {status,message,details} JSON envelopes", global = true)]
    pub json: bool,
    #[arg(
        long,
        help = "Never download distributions for this invocation",
        global = true
    )]
    pub offline: bool,
    #[command(subcommand)]
    pub command: CommandKind,
}

#[derive(Subcommand, Debug)]
pub enum CommandKind {
    /// Show the compatibility profile of a Gradle version.
    Resolve(VersionArgs),
    /// Plan the JVM invocation for a Gradle version.
    Plan(PlanArgs),
    /// Extract the artifacts of one distribution into the cache.
    Extract(ExtractArgs),
    /// Extract one version and publish it.
    Publish(PublishArgs),
    /// Extract and publish several versions in parallel.
    Republish(RepublishArgs),
    /// Check a local repository's sidecars and POMs.
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    #[arg(value_name = "VERSION", help = "Gradle version (defaults to GAPI_GRADLE_VERSION)")]
    pub version: Option<String>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub version: VersionArgs,
    #[arg(long, value_name = "LEVEL", help = "Run on this JVM level instead of the required one")]
    pub jvm: Option<u32>,
}

#[derive(Args, Debug)]
pub struct SelectionArgs {
    #[arg(
        long,
        value_name = "LIST",
        help = "Comma separated artifacts: api, test-kit, wrapper, kotlin-dsl, local-groovy (default: all the version ships)"
    )]
    pub artifacts: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub version: VersionArgs,
    #[command(flatten)]
    pub selection: SelectionArgs,
    #[arg(long, value_name = "DIGEST", help = "Expected sha256 of the distribution zip")]
    pub sha256: Option<String>,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    #[arg(long, value_name = "DIR|URL", help = "Local directory or http(s) repository URL")]
    pub repository: String,
    #[arg(long, help = "Replace artifacts published with different content")]
    pub overwrite: bool,
    #[arg(long, requires = "password", help = "Repository user (overrides GAPI_PUBLISH_USERNAME)")]
    pub username: Option<String>,
    #[arg(long, requires = "username", help = "Repository password")]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    #[command(flatten)]
    pub version: VersionArgs,
    #[command(flatten)]
    pub selection: SelectionArgs,
    #[arg(long, value_name = "DIGEST", help = "Expected sha256 of the distribution zip")]
    pub sha256: Option<String>,
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug)]
pub struct RepublishArgs {
    #[arg(value_name = "VERSION", required = true, num_args = 1..)]
    pub versions: Vec<String>,
    #[command(flatten)]
    pub selection: SelectionArgs,
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[arg(value_name = "DIR")]
    pub root: PathBuf,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resolve(_) => "resolve",
            Self::Plan(_) => "plan",
            Self::Extract(_) => "extract",
            Self::Publish(_) => "publish",
            Self::Republish(_) => "republish",
            Self::Verify(_) => "verify",
        }
    }
}
