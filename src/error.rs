use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a batch run
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown provider key, unreadable config, or an invalid field in it
    #[error("configuration error: {0}")]
    Config(String),

    /// The provider answered with something other than 200
    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// A value needed from the response could not be located or used
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Summing a cost that is not known
    #[error("cannot aggregate cost: {0}")]
    Aggregation(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A failure attributed to one (provider, prompt file) call
    #[error("{provider} / {file}: {source}")]
    Call {
        provider: String,
        file: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedResponse(msg.into())
    }

    pub fn file(path: &Path, source: std::io::Error) -> Self {
        Error::File {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Attach the provider and prompt file the failure happened on.
    pub fn in_call(self, provider: &str, file: &str) -> Self {
        Error::Call {
            provider: provider.to_string(),
            file: file.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through any `Call` wrappers.
    pub fn kind(&self) -> &Error {
        match self {
            Error::Call { source, .. } => source.kind(),
            other => other,
        }
    }
}
