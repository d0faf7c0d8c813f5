use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid '{action}' action: {reason}")]
    InvalidAction { action: String, reason: String },

    #[error("expected a single row in {table}, matched {matched}")]
    ExpectedSingleRow { table: String, matched: usize },

    #[error("store is not configured")]
    StoreUnavailable,

    #[error("store error ({status}): {body}")]
    Store { status: u16, body: String },

    #[error("repository API error ({status}): {body}")]
    Remote { status: u16, body: String },

    #[error("commit {0} has no parent")]
    NoParentCommit(String),

    #[error("commit {0} has no changed files")]
    NoChangedFiles(String),

    #[error("revert stopped at {failed_path} after {} file(s): {reason}", reverted.len())]
    PartialRevert {
        reverted: Vec<String>,
        commits: Vec<String>,
        failed_path: String,
        reason: String,
    },

    #[error("could not parse interpreter output: {0}")]
    InterpreterParse(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for SiteError {
    fn from(err: reqwest::Error) -> Self {
        SiteError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SiteError>;
