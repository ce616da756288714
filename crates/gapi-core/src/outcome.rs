use gapi_domain::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    /// Classifies an engine error: input problems are user errors, the rest
    /// are failures.
    #[must_use]
    pub fn from_engine_error(err: &EngineError) -> Self {
        let details = error_details(err);
        if err.kind().is_user_error() {
            Self::user_error(err.to_string(), details)
        } else {
            Self::failure(err.to_string(), details)
        }
    }

    /// Converts a command error, preferring the typed engine error when the
    /// chain carries one.
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.chain().find_map(|cause| cause.downcast_ref::<EngineError>()) {
            Some(engine) => {
                let mut outcome = Self::from_engine_error(engine);
                outcome.message = format!("{err:#}");
                outcome
            }
            None => Self::failure(format!("{err:#}"), json!({ "reason": "internal_error" })),
        }
    }
}

/// Envelope printed by `--json`.
#[must_use]
pub fn to_json_response(command: &str, outcome: &ExecutionOutcome) -> Value {
    let status = match outcome.status {
        CommandStatus::Ok => "ok",
        CommandStatus::UserError => "user-error",
        CommandStatus::Failure => "error",
    };
    let details = match &outcome.details {
        Value::Object(_) => outcome.details.clone(),
        Value::Null => json!({}),
        other => json!({ "value": other }),
    };
    json!({
        "status": status,
        "command": command,
        "message": outcome.message,
        "details": details,
    })
}

#[must_use]
pub fn error_details(err: &EngineError) -> Value {
    json!({
        "code": err.code(),
        "reason": err.kind().as_str(),
        "retryable": err.is_retryable(),
        "hint": err.hint(),
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

impl CommandStatus {
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::UserError => 1,
            Self::Failure => 2,
        }
    }
}
