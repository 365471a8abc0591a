//! Wire formats shared by the shroud client and the remote service.

pub mod credentials;
pub mod encoding;
mod envelope;
mod error;
mod key_header;

pub use crate::{
    credentials::{AesKey, Iv, KEY_LENGTH, SharedSecret},
    envelope::Envelope,
    error::{ErrorKind, ProtocolError},
    key_header::{
        COMPACT_KEY_HEADER_LENGTH, ENCRYPTED_AES_KEY_LENGTH, ENCRYPTION_VERSION,
        EncryptedKeyHeader, KEY_HEADER_TYPE, KeyHeader,
    },
};

/// Query parameter carrying the encrypted query string of a GET request.
pub const ENCRYPTED_QUERY_PARAM: &str = "ss";

/// Query key whose value seeds the deterministic IV of an encrypted GET URL.
pub const DETERMINISTIC_IV_PARAM: &str = "fileId";

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Response headers describing a stored payload.
pub mod headers {
    /// `true` when the payload body is encrypted with its own key header.
    pub const PAYLOAD_ENCRYPTED: &str = "payloadencrypted";
    /// Compact (68 byte, base64) form of the payload's encrypted key header.
    pub const PAYLOAD_KEY_HEADER: &str = "payloadkeyheader";
    /// Content type of the payload before encryption.
    pub const DECRYPTED_CONTENT_TYPE: &str = "decryptedcontenttype";
}
