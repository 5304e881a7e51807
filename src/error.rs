use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The request never produced a usable response, or its body could not be read.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected HTTP status {status} from {url}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    /// The remote answered, but not in the shape we rely on.
    #[error("invalid response: {0}")]
    Protocol(String),

    #[error("token exchange rejected with HTTP status {status}: {body}")]
    Auth { status: u16, body: String },

    #[error("failed to parse private key: {0}")]
    Crypto(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign assertion: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("data request rejected: {0}")]
    RequestRejected(String),

    #[error("received unexpected task status: {0}")]
    UnexpectedStatus(String),

    #[error("archive entry escapes staging directory: {entry}")]
    PathTraversal { entry: String },

    #[error("failed to read archive {}: {source}", .archive.display())]
    CorruptArchive {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn transport(url: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            source,
        }
    }
}
