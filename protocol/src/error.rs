use {derive_more::Display, thiserror::Error};

/// Coarse classification of failures, stable across crates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorKind {
    /// An operation needed the session secret but no session is bound.
    MissingSharedSecret,
    /// A key, IV or ciphertext buffer has an unusable length.
    InvalidKeyMaterial,
    /// A key header on the wire has the wrong length.
    MalformedKeyHeader,
    /// A key header declares an encryption version other than 1.
    UnsupportedVersion,
    /// Padding or cipher rejection.
    DecryptionFailed,
    /// The remote resource does not exist (404).
    ResourceUnavailable,
    /// The remote payload could not be read or decrypted.
    PayloadUnavailable,
    /// The request range is not valid.
    InvalidRange,
    /// A URL could not be built or parsed.
    InvalidUrl,
    /// Malformed JSON or base64.
    Serialization,
    /// Connection-level failure.
    Transport,
    /// The server answered with an error status.
    Status,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid {what} length: got {actual}, expected {expected}")]
    InvalidKeyMaterial {
        what: &'static str,
        actual: usize,
        expected: usize,
    },
    #[error("malformed key header: got {actual} bytes, expected {expected}")]
    MalformedKeyHeader { actual: usize, expected: usize },
    #[error("unsupported key header encryption version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    #[must_use]
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKeyMaterial { .. } => ErrorKind::InvalidKeyMaterial,
            Self::MalformedKeyHeader { .. } => ErrorKind::MalformedKeyHeader,
            Self::UnsupportedVersion(_) => ErrorKind::UnsupportedVersion,
            Self::Base64(_) | Self::Json(_) => ErrorKind::Serialization,
        }
    }
}
