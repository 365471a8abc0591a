use {
    crate::{Error, Result},
    aes::Aes128,
    cbc::{
        Decryptor, Encryptor,
        cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7},
    },
    serde::Serialize,
    shroud_protocol::{
        AesKey, BLOCK_SIZE, Envelope, Iv, KEY_LENGTH, SharedSecret, encoding::to_canonical_json,
    },
};

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;

/// Key material usable as an AES-128 key.
pub trait BlockKey {
    fn key_bytes(&self) -> &[u8; KEY_LENGTH];
}

impl BlockKey for AesKey {
    #[inline]
    fn key_bytes(&self) -> &[u8; KEY_LENGTH] {
        self.as_bytes()
    }
}

impl BlockKey for SharedSecret {
    #[inline]
    fn key_bytes(&self) -> &[u8; KEY_LENGTH] {
        self.as_bytes()
    }
}

#[must_use]
#[inline]
pub fn cbc_encrypt(plaintext: &[u8], iv: &Iv, key: &impl BlockKey) -> Vec<u8> {
    Aes128CbcEnc::new(key.key_bytes().into(), iv.as_bytes().into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypts and removes the padding.
///
/// `ciphertext` must be a non-empty multiple of the block size.
#[inline]
pub fn cbc_decrypt(ciphertext: &[u8], iv: &Iv, key: &impl BlockKey) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(Error::InvalidCiphertextLength(ciphertext.len()));
    }
    Aes128CbcDec::new(key.key_bytes().into(), iv.as_bytes().into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::DecryptionFailed)
}

#[must_use]
#[inline]
pub fn encrypt_envelope(plaintext: &[u8], iv: Iv, key: &impl BlockKey) -> Envelope {
    Envelope {
        data: cbc_encrypt(plaintext, &iv, key),
        iv,
    }
}

#[inline]
pub fn decrypt_envelope(envelope: &Envelope, key: &impl BlockKey) -> Result<Vec<u8>> {
    cbc_decrypt(&envelope.data, &envelope.iv, key)
}

/// Encrypts the canonical JSON form of `value`.
#[inline]
pub fn encrypt_json<T: Serialize + ?Sized>(
    value: &T,
    iv: Iv,
    key: &impl BlockKey,
) -> Result<Envelope> {
    Ok(encrypt_envelope(&to_canonical_json(value)?, iv, key))
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::default_numeric_fallback,
    reason = "test"
)]
mod tests {
    use {super::*, crate::ErrorKind, serde_json::json};

    #[test]
    fn roundtrip_all_lengths() {
        let key = AesKey::generate();
        let iv = Iv::generate();
        for len in 0..100 {
            let plaintext: Vec<u8> = (0..len).map(|_| rand::random::<u8>()).collect();
            let ciphertext = cbc_encrypt(&plaintext, &iv, &key);
            assert_eq!(ciphertext.len(), (len / 16 + 1) * 16);
            assert_eq!(cbc_decrypt(&ciphertext, &iv, &key).unwrap(), plaintext);
        }
    }

    #[test]
    fn known_vector() {
        let envelope = encrypt_json(
            &json!({"hello": "world"}),
            Iv::new([0; 16]),
            &SharedSecret::new([0; 16]),
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "iv": "AAAAAAAAAAAAAAAAAAAAAA==",
                "data": "0ZJeIvw/oDGVsgk+10zcM0DesUUAQ2b0qepUotQ0oL8=",
            })
        );
        assert_eq!(
            decrypt_envelope(&envelope, &SharedSecret::new([0; 16])).unwrap(),
            br#"{"hello":"world"}"#
        );
    }

    #[test]
    fn rejects_misaligned_ciphertext() {
        let key = AesKey::generate();
        let iv = Iv::generate();
        for len in [0, 1, 15, 17, 33] {
            assert_eq!(
                cbc_decrypt(&vec![0; len], &iv, &key).unwrap_err().kind(),
                ErrorKind::InvalidKeyMaterial
            );
        }
    }

    #[test]
    fn wrong_key_fails_padding() {
        let iv = Iv::generate();
        let ciphertext = cbc_encrypt(b"some secret text", &iv, &AesKey::new([1; 16]));
        // A wrong key yields valid padding with probability ~1/256 per attempt;
        // a fixed key pair keeps the result stable.
        let result = cbc_decrypt(&ciphertext, &iv, &AesKey::new([2; 16]));
        match result {
            Err(err) => assert_eq!(err.kind(), ErrorKind::DecryptionFailed),
            Ok(plaintext) => assert_ne!(plaintext, b"some secret text"),
        }

        let mut corrupted = ciphertext;
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        assert!(
            cbc_decrypt(&corrupted, &iv, &AesKey::new([1; 16]))
                .map_or(true, |plaintext| plaintext != b"some secret text")
        );
    }
}
