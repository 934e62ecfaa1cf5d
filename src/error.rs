use thiserror::Error;

use super::wire::problem::AcmeProblem;

pub type AcmeResult<T> = Result<T, AcmeError>;

#[derive(Error, Debug)]
pub enum AcmeError {
    /// Missing or invalid client options, including an unparseable account key.
    #[error("configuration: {0}")]
    Config(String),

    /// ACME problem document returned by the server.
    #[error("{0}")]
    Protocol(AcmeProblem),

    #[error(transparent)]
    Crypto(anyhow::Error),

    #[error("http: [{}] {0}", .0.status())]
    Http(http_client::Error),

    /// Non-HTTP network failure: DNS resolution, TLS probing.
    #[error("transport: {0}")]
    Transport(anyhow::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing expected field {0}")]
    MissingExpectedField(&'static str),

    #[error("missing expected header {0}")]
    MissingExpectedHeader(&'static str),

    /// An order, authorization or challenge state that blocks progress,
    /// with the server-reported reason when one exists.
    #[error("{entity}: {reason}")]
    State { entity: &'static str, reason: String },

    /// Retry attempts exhausted; carries the error of the final attempt.
    #[error("retry attempts exhausted after {attempts}: {source}")]
    Timeout {
        attempts: u32,
        #[source]
        source: Box<AcmeError>,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl AcmeError {
    pub fn problem(&self) -> Option<&AcmeProblem> {
        match self {
            AcmeError::Protocol(problem) => Some(problem),
            AcmeError::Timeout { source, .. } => source.problem(),
            _ => None,
        }
    }
}

impl From<http_client::Error> for AcmeError {
    fn from(err: http_client::Error) -> Self {
        AcmeError::Http(err)
    }
}
