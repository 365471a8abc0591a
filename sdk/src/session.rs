use {
    crate::{
        Result,
        crypto::{decrypt_key_header, encrypt_key_header, encrypt_url},
    },
    shroud_protocol::{EncryptedKeyHeader, Iv, KeyHeader, SharedSecret},
    url::Url,
};

/// State of one authenticated login.
///
/// Created once the remote service has issued a shared secret and dropped at logout.
/// Every component that encrypts on behalf of the session borrows it; nothing keeps a
/// secret anywhere else, so several sessions can coexist in one process.
#[derive(Debug)]
pub struct Session {
    shared_secret: SharedSecret,
}

impl Session {
    #[must_use]
    #[inline]
    pub fn new(shared_secret: SharedSecret) -> Self {
        Self { shared_secret }
    }

    #[must_use]
    #[inline]
    pub fn shared_secret(&self) -> &SharedSecret {
        &self.shared_secret
    }

    #[must_use]
    #[inline]
    pub fn encrypt_key_header(&self, key_header: &KeyHeader, transfer_iv: &Iv) -> EncryptedKeyHeader {
        encrypt_key_header(key_header, transfer_iv, &self.shared_secret)
    }

    #[inline]
    pub fn decrypt_key_header(&self, encrypted: &EncryptedKeyHeader) -> Result<KeyHeader> {
        decrypt_key_header(encrypted, &self.shared_secret)
    }

    #[inline]
    pub fn encrypt_url(&self, url: &Url) -> Result<Url> {
        encrypt_url(url, &self.shared_secret)
    }
}
