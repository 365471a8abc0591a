//! All encryption operations use AES-128-CBC with PKCS#7 padding.
//!
//! Transport traffic of a session is encrypted with the session's shared secret.
//! Each request or response body becomes an [`Envelope`](shroud_protocol::Envelope)
//! holding the IV and the ciphertext. A GET request has no body, so its query string is
//! encrypted instead and sent as a single `ss` parameter. When the query names a file,
//! the IV is derived from the file id, so the same request always yields the same URL
//! and can be served from an HTTP cache.
//!
//! Stored payloads are encrypted with their own [`KeyHeader`](shroud_protocol::KeyHeader)
//! (key and IV), generated for each file. The key header travels wrapped by the shared
//! secret: `iv || aes_key` (32 bytes) encrypted under a transfer IV gives 48 bytes.
//!
//! A payload is one continuous CBC stream, so any window of it can be decrypted from
//! the ciphertext block preceding the window (used as IV) and the window itself. The
//! window generally ends mid-stream; a synthetic final block is appended so that padding
//! validation succeeds. See [`chunk`].

mod cipher;
pub mod chunk;
mod iv;
mod key_header;

pub use {
    cipher::{BlockKey, cbc_decrypt, cbc_encrypt, decrypt_envelope, encrypt_envelope, encrypt_json},
    iv::{decrypt_url_query, derive_iv, encrypt_url},
    key_header::{decrypt_key_header, encrypt_key_header},
};
