use {
    super::cipher::{cbc_decrypt, cbc_encrypt},
    crate::{Error, Result},
    shroud_protocol::{
        ENCRYPTION_VERSION, EncryptedKeyHeader, Iv, KEY_HEADER_TYPE, KeyHeader, SharedSecret,
    },
};

/// Wraps a file's key header for transfer under the session secret.
#[must_use]
#[inline]
pub fn encrypt_key_header(
    key_header: &KeyHeader,
    transfer_iv: &Iv,
    shared_secret: &SharedSecret,
) -> EncryptedKeyHeader {
    EncryptedKeyHeader {
        iv: *transfer_iv,
        encrypted_aes_key: cbc_encrypt(&key_header.to_bytes(), transfer_iv, shared_secret),
        encryption_version: ENCRYPTION_VERSION,
        header_type: KEY_HEADER_TYPE,
    }
}

#[inline]
pub fn decrypt_key_header(
    encrypted: &EncryptedKeyHeader,
    shared_secret: &SharedSecret,
) -> Result<KeyHeader> {
    encrypted.check_version()?;
    let bytes = cbc_decrypt(&encrypted.encrypted_aes_key, &encrypted.iv, shared_secret)?;
    // Valid padding with a wrong length means the wrong secret, not a format change.
    KeyHeader::from_bytes(&bytes).map_err(|_| Error::DecryptionFailed)
}
