use std::sync::Arc;

use thiserror::Error;

/// Failures while processing an `easydict://` URL. They never escape the
/// parser; `SchemeResult` carries their message instead.
#[derive(Debug, Error)]
pub enum SchemeError {
    #[error("'{0}' is not an {1}:// URL")]
    UnrecognizedScheme(String, String),
    #[error("unknown action key '{0}'")]
    UnknownAction(String),
    #[error("no action key given")]
    MissingAction,
    #[error("action {0} requires a key")]
    MissingKey(&'static str),
    #[error("no value stored for key '{0}'")]
    KeyNotFound(String),
    #[error("key '{0}' may not be accessed through the URL scheme")]
    KeyNotAllowed(String),
    #[error("no downloads directory configured")]
    NoDownloadsDir,
    #[error("preference store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Failures of an intercepted web request, reported to the scheme task and
/// to URL monitors.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("fetching {url} failed: {message}")]
    Fetch { url: String, message: String },
    #[error("no resource at {0}")]
    NotFound(String),
    #[error("monitoring {0} timed out")]
    Timeout(String),
    #[error("{0:#}")]
    Other(Arc<anyhow::Error>),
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(Arc::new(err))
    }
}
