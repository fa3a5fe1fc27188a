// botgate/src/error.rs
//
// Error taxonomy. Startup errors are fatal; everything that happens inside a
// request is recovered locally — `Engine::evaluate` never returns an error.

use thiserror::Error;

/// Fatal startup errors: bad manifests, bad overrides, insecure secrets.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("manifest `{document}`: {source}")]
    ManifestParse {
        document: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("manifest `{document}`: unknown detector name `{name}`")]
    UnknownDetector { document: String, name: String },

    #[error("duplicate detector name `{0}`")]
    DuplicateDetector(String),

    #[error("detector `{detector}`: missing required parameter `{parameter}`")]
    MissingParameter { detector: String, parameter: String },

    #[error("detectors `{first}` and `{second}` both declare emitted signal `{key}`")]
    ExclusiveOutput {
        first: String,
        second: String,
        key: String,
    },

    #[error("insecure default HMAC secret in production mode")]
    InsecureSecret,

    #[error("configuration source: {0}")]
    Source(#[from] config::ConfigError),
}

/// Per-request detector failure. Recovered at the orchestrator: the
/// contribution is discarded and confidence is penalised at aggregation.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector failed: {0}")]
    Failed(String),

    #[error("detector exceeded its time budget")]
    Timeout,

    #[error("detector panicked")]
    Panicked,
}

/// LLM escalation failure. Recovered locally: no LLM contribution.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider not ready")]
    NotReady,

    #[error("completion timed out")]
    Timeout,

    #[error("transport: {0}")]
    Transport(String),

    #[error("endpoint returned HTTP {0}")]
    Status(u16),

    #[error("empty completion")]
    Empty,

    #[error("malformed verdict: {0}")]
    Malformed(String),
}

/// Double-write on the blackboard. First write wins; the second producer
/// gets this back and the conflict is logged.
#[derive(Debug, Error)]
#[error("signal `{key}` already written by `{first_producer}`")]
pub struct SignalConflict {
    pub key: String,
    pub first_producer: String,
}
