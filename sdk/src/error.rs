use {
    bytes::Bytes,
    reqwest::StatusCode,
    shroud_protocol::{ErrorKind, ProtocolError},
    std::sync::Arc,
    thiserror::Error,
    url::Url,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("no shared secret is bound to this client")]
    MissingSharedSecret,
    #[error("invalid ciphertext length {0}: must be a positive multiple of 16")]
    InvalidCiphertextLength(usize),
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("resource not found: {url}")]
    ResourceUnavailable { url: Url },
    #[error("payload unavailable at {url}: {reason}")]
    PayloadUnavailable { url: Url, reason: String },
    #[error("invalid range {start}-{end:?}")]
    InvalidRange { start: u64, end: Option<u64> },
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid header value: {0}")]
    HeaderValue(#[from] reqwest::header::InvalidHeaderValue),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("server returned {status} for {url}")]
    Status {
        status: StatusCode,
        url: Url,
        body: Bytes,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Failure of a lookup shared by several callers.
    #[error(transparent)]
    Shared(Arc<Error>),
}

impl Error {
    #[must_use]
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(err) => err.kind(),
            Self::MissingSharedSecret => ErrorKind::MissingSharedSecret,
            Self::InvalidCiphertextLength(_) => ErrorKind::InvalidKeyMaterial,
            Self::DecryptionFailed => ErrorKind::DecryptionFailed,
            Self::ResourceUnavailable { .. } => ErrorKind::ResourceUnavailable,
            Self::PayloadUnavailable { .. } => ErrorKind::PayloadUnavailable,
            Self::InvalidRange { .. } => ErrorKind::InvalidRange,
            Self::Url(_) | Self::HeaderValue(_) => ErrorKind::InvalidUrl,
            Self::Json(_) => ErrorKind::Serialization,
            Self::Status { .. } => ErrorKind::Status,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Shared(err) => err.kind(),
        }
    }

    pub(crate) fn payload_unavailable(url: &Url, reason: impl ToString) -> Self {
        Self::PayloadUnavailable {
            url: url.clone(),
            reason: reason.to_string(),
        }
    }
}
