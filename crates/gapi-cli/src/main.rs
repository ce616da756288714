use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use gapi_core::{
    CommandContext, CommandStatus, ExecutionOutcome, ExtractRequest, GlobalOptions, PlanRequest,
    PublishRequest, RepublishRequest, ResolveRequest, SystemEffects, VerifyRequest,
};
use serde_json::Value;

mod cli;

use cli::{CommandKind, GapiCli};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = GapiCli::parse();
    init_tracing(cli.trace, cli.quiet, cli.verbose);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
        offline: cli.offline,
    };

    let name = cli.command.name();
    let outcome = match CommandContext::new(&global, Arc::new(SystemEffects::new())) {
        Ok(ctx) => dispatch(&ctx, cli.command),
        Err(err) => ExecutionOutcome::from_error(&err),
    };
    let code = emit_output(&global, name, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn dispatch(ctx: &CommandContext, command: CommandKind) -> ExecutionOutcome {
    let result = match command {
        CommandKind::Resolve(args) => gapi_core::resolve_profile(
            ctx,
            ResolveRequest {
                version: args.version,
            },
        ),
        CommandKind::Plan(args) => gapi_core::plan_execution(
            ctx,
            PlanRequest {
                version: args.version.version,
                jvm: args.jvm,
            },
        ),
        CommandKind::Extract(args) => gapi_core::extract_distribution(
            ctx,
            ExtractRequest {
                version: args.version.version,
                artifacts: args.selection.artifacts,
                sha256: args.sha256,
            },
        ),
        CommandKind::Publish(args) => gapi_core::publish_version(
            ctx,
            PublishRequest {
                version: args.version.version,
                repository: args.target.repository,
                artifacts: args.selection.artifacts,
                sha256: args.sha256,
                overwrite: args.target.overwrite,
                username: args.target.username,
                password: args.target.password,
            },
        ),
        CommandKind::Republish(args) => gapi_core::republish_versions(
            ctx,
            RepublishRequest {
                versions: args.versions,
                repository: args.target.repository,
                artifacts: args.selection.artifacts,
                overwrite: args.target.overwrite,
                username: args.target.username,
                password: args.target.password,
            },
        ),
        CommandKind::Verify(args) => {
            gapi_core::verify_repository(ctx, VerifyRequest { root: args.root })
        }
    };
    result.unwrap_or_else(|err| {
        tracing::debug!(error = ?err, "command failed");
        ExecutionOutcome::from_error(&err)
    })
}

fn init_tracing(trace: bool, quiet: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = format!(
        "gapi={level},gapi_cli={level},gapi_core={level},gapi_store={level},gapi_jvm={level},gapi_domain={level}"
    );
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(global: &GlobalOptions, command: &str, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.status.exit_code();

    if global.json {
        let payload = gapi_core::to_json_response(command, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    let line = format!("gapi {command}: {}", outcome.message);
    match outcome.status {
        CommandStatus::Ok => {
            if !global.quiet {
                println!("{line}");
            }
        }
        CommandStatus::UserError | CommandStatus::Failure => {
            eprintln!("{line}");
            if let Some(hint) = hint_from_details(&outcome.details) {
                eprintln!("Tip: {hint}");
            }
            for failure in failed_artifacts(&outcome.details) {
                eprintln!("  {failure}");
            }
        }
    }
    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

/// `coordinates: message` for each failed artifact in publish details.
fn failed_artifacts(details: &Value) -> Vec<String> {
    let publishes: Vec<&Value> = match details.get("versions").and_then(Value::as_array) {
        Some(versions) => versions.iter().filter_map(|v| v.get("publish")).collect(),
        None => details.get("publish").into_iter().collect(),
    };
    publishes
        .into_iter()
        .filter_map(|publish| publish.get("artifacts").and_then(Value::as_array))
        .flatten()
        .filter(|artifact| artifact.get("status").and_then(Value::as_str) == Some("failed"))
        .map(|artifact| {
            format!(
                "{}: {}",
                artifact.get("coordinates").and_then(Value::as_str).unwrap_or("?"),
                artifact.get("message").and_then(Value::as_str).unwrap_or("failed")
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn collects_failed_artifacts_across_versions() {
        let details = json!({
            "versions": [
                {"publish": {"artifacts": [
                    {"coordinates": "g:a:1@jar", "status": "published"},
                    {"coordinates": "g:b:1@jar", "status": "failed", "message": "[GA300] taken"}
                ]}},
                {"status": "failed", "message": "[GA200] missing"}
            ]
        });
        assert_eq!(failed_artifacts(&details), vec!["g:b:1@jar: [GA300] taken"]);
        assert!(hint_from_details(&json!({"hint": "retry"})).is_some());
    }
}
