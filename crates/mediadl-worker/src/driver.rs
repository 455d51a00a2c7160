//! Line-oriented JSON command driver.
//!
//! Each input line is one command object tagged by `cmd`; each output line is
//! one [`Response`]. This is the process boundary for callers that embed the
//! engine as a subprocess.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mediadl_models::{JobFamily, JobId, JobOptions, JobSource};

use crate::engine::Engine;
use crate::error::WorkerError;

/// A driver command.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Submit a job. `source` is a URL for retrieval and a job id for
    /// transform.
    Submit {
        family: JobFamily,
        source: String,
        #[serde(default)]
        options: JobOptions,
    },
    Query {
        id: JobId,
    },
    List,
    Delete {
        id: JobId,
    },
    Stats,
    /// Metadata of a remote asset, without creating a job.
    Info {
        url: String,
    },
}

/// Error payload of a failed command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Result of one command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self::error("internal", e.to_string()),
        }
    }

    fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }

    fn from_error(err: &WorkerError) -> Self {
        Self::error(err.kind(), err.to_string())
    }
}

/// Parse and execute one input line.
pub async fn handle_line(engine: &Engine, line: &str) -> Response {
    match serde_json::from_str::<Command>(line) {
        Ok(command) => handle_command(engine, command).await,
        Err(e) => Response::error("bad_request", e.to_string()),
    }
}

/// Execute one command against the engine.
pub async fn handle_command(engine: &Engine, command: Command) -> Response {
    match command {
        Command::Submit {
            family,
            source,
            options,
        } => {
            let source = match family {
                JobFamily::Retrieval => JobSource::Url(source),
                JobFamily::Transform => JobSource::job(source),
            };
            match engine.submit(family, source, options) {
                Ok(id) => Response::ok(serde_json::json!({ "id": id })),
                Err(e) => Response::from_error(&e),
            }
        }
        Command::Query { id } => match engine.query(&id) {
            Ok(job) => Response::ok(job),
            Err(e) => Response::from_error(&e),
        },
        Command::List => Response::ok(engine.list()),
        Command::Delete { id } => {
            let deleted = engine.delete(&id).await;
            Response::ok(serde_json::json!({ "deleted": deleted }))
        }
        Command::Stats => Response::ok(engine.stats()),
        Command::Info { url } => match engine.info(&url).await {
            Ok(info) => Response::ok(info),
            Err(e) => Response::from_error(&e),
        },
    }
}
