use {
    crate::{AesKey, Iv, KEY_LENGTH, ProtocolError, encoding::base64_bytes},
    base64::{Engine, prelude::BASE64_STANDARD},
    byteorder::{ByteOrder, LE},
    serde::{Deserialize, Serialize},
};

/// The only key header encryption version this client understands.
pub const ENCRYPTION_VERSION: u32 = 1;

/// Value of the `type` field of every encrypted key header.
pub const KEY_HEADER_TYPE: u32 = 11;

/// 32 bytes of `iv || aesKey` encrypt to 48 bytes under CBC with PKCS#7 padding.
pub const ENCRYPTED_AES_KEY_LENGTH: usize = 48;

/// `iv (16) || encryptedAesKey (48) || encryptionVersion (4)`.
pub const COMPACT_KEY_HEADER_LENGTH: usize = 68;

const VERSION_LENGTH: usize = 4;

/// Per-file key and IV. Generated fresh for each uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHeader {
    pub iv: Iv,
    pub aes_key: AesKey,
}

impl KeyHeader {
    pub const LENGTH: usize = 2 * KEY_LENGTH;

    #[must_use]
    #[inline]
    pub fn generate() -> Self {
        Self {
            iv: Iv::generate(),
            aes_key: AesKey::generate(),
        }
    }

    /// `iv || aes_key`, in this order.
    #[must_use]
    #[inline]
    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut bytes = [0; Self::LENGTH];
        let (iv, aes_key) = bytes.split_at_mut(KEY_LENGTH);
        iv.copy_from_slice(self.iv.as_bytes());
        aes_key.copy_from_slice(self.aes_key.as_bytes());
        bytes
    }

    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidKeyMaterial {
            what: "key header",
            actual: bytes.len(),
            expected: Self::LENGTH,
        };
        if bytes.len() != Self::LENGTH {
            return Err(invalid());
        }
        let (iv, aes_key) = bytes.split_first_chunk::<KEY_LENGTH>().ok_or_else(invalid)?;
        Ok(Self {
            iv: Iv::new(*iv),
            aes_key: AesKey::from_slice(aes_key)?,
        })
    }
}

/// A [`KeyHeader`] wrapped with the session's shared secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedKeyHeader {
    /// Transfer IV used to wrap the key header.
    pub iv: Iv,
    #[serde(with = "base64_bytes")]
    pub encrypted_aes_key: Vec<u8>,
    pub encryption_version: u32,
    #[serde(rename = "type", default = "default_header_type")]
    pub header_type: u32,
}

fn default_header_type() -> u32 {
    KEY_HEADER_TYPE
}

impl EncryptedKeyHeader {
    /// Parses the base64-carried 68-byte form found in payload response headers.
    #[inline]
    pub fn parse_compact(value: &str) -> Result<Self, ProtocolError> {
        let bytes = BASE64_STANDARD.decode(value.trim())?;
        let malformed = || ProtocolError::MalformedKeyHeader {
            actual: bytes.len(),
            expected: COMPACT_KEY_HEADER_LENGTH,
        };
        if bytes.len() != COMPACT_KEY_HEADER_LENGTH {
            return Err(malformed());
        }
        let (iv, rest) = bytes.split_first_chunk::<KEY_LENGTH>().ok_or_else(malformed)?;
        let (encrypted_aes_key, version) = rest
            .split_first_chunk::<ENCRYPTED_AES_KEY_LENGTH>()
            .ok_or_else(malformed)?;
        // Accumulated from the last byte to the first: little-endian.
        let encryption_version = LE::read_u32(version);
        Ok(Self {
            iv: Iv::new(*iv),
            encrypted_aes_key: encrypted_aes_key.to_vec(),
            encryption_version,
            header_type: KEY_HEADER_TYPE,
        })
    }

    #[inline]
    pub fn to_compact(&self) -> Result<String, ProtocolError> {
        if self.encrypted_aes_key.len() != ENCRYPTED_AES_KEY_LENGTH {
            return Err(ProtocolError::MalformedKeyHeader {
                actual: KEY_LENGTH
                    .saturating_add(self.encrypted_aes_key.len())
                    .saturating_add(VERSION_LENGTH),
                expected: COMPACT_KEY_HEADER_LENGTH,
            });
        }
        let mut bytes = Vec::with_capacity(COMPACT_KEY_HEADER_LENGTH);
        bytes.extend_from_slice(self.iv.as_bytes());
        bytes.extend_from_slice(&self.encrypted_aes_key);
        let mut version = [0; VERSION_LENGTH];
        LE::write_u32(&mut version, self.encryption_version);
        bytes.extend_from_slice(&version);
        Ok(BASE64_STANDARD.encode(bytes))
    }

    /// Fails with `UnsupportedVersion` unless the header uses [`ENCRYPTION_VERSION`].
    #[inline]
    pub fn check_version(&self) -> Result<(), ProtocolError> {
        if self.encryption_version == ENCRYPTION_VERSION {
            Ok(())
        } else {
            Err(ProtocolError::UnsupportedVersion(self.encryption_version))
        }
    }
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

    fn sample() -> EncryptedKeyHeader {
        EncryptedKeyHeader {
            iv: Iv::new([7; 16]),
            encrypted_aes_key: (0..48).collect(),
            encryption_version: ENCRYPTION_VERSION,
            header_type: KEY_HEADER_TYPE,
        }
    }

    #[test]
    fn key_header_bytes_order() {
        let header = KeyHeader {
            iv: Iv::new([1; 16]),
            aes_key: AesKey::new([2; 16]),
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[..16], [1_u8; 16]);
        assert_eq!(bytes[16..], [2_u8; 16]);
        assert_eq!(KeyHeader::from_bytes(&bytes).unwrap(), header);
        assert_eq!(
            KeyHeader::from_bytes(&bytes[..31]).unwrap_err().kind(),
            ErrorKind::InvalidKeyMaterial
        );
    }

    #[test]
    fn compact_layout() {
        let mut raw: Vec<u8> = vec![7; 16];
        raw.extend(0..48);
        raw.extend([1, 0, 0, 0]);
        let parsed = EncryptedKeyHeader::parse_compact(&BASE64_STANDARD.encode(&raw)).unwrap();
        assert_eq!(parsed, sample());
        assert_eq!(parsed.to_compact().unwrap(), BASE64_STANDARD.encode(&raw));
    }

    #[test]
    fn compact_version_is_accumulated_from_last_byte() {
        let mut raw: Vec<u8> = vec![0; 64];
        raw.extend([0x01, 0x02, 0x03, 0x04]);
        let parsed = EncryptedKeyHeader::parse_compact(&BASE64_STANDARD.encode(&raw)).unwrap();
        assert_eq!(parsed.encryption_version, 0x0403_0201);
        assert_eq!(
            parsed.check_version().unwrap_err().kind(),
            ErrorKind::UnsupportedVersion
        );
    }

    #[test]
    fn compact_rejects_wrong_length() {
        for len in [0, 1, 64, 67, 69, 100] {
            let err = EncryptedKeyHeader::parse_compact(&BASE64_STANDARD.encode(vec![0_u8; len]))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedKeyHeader, "length {len}");
        }
        let mut short = sample();
        short.encrypted_aes_key.pop();
        assert_eq!(
            short.to_compact().unwrap_err().kind(),
            ErrorKind::MalformedKeyHeader
        );
    }

    #[test]
    fn json_form_accepts_base64_and_raw_bytes() {
        let expected = sample();
        let as_base64 = serde_json::to_value(&expected).unwrap();
        assert_eq!(
            as_base64,
            json!({
                "iv": BASE64_STANDARD.encode([7_u8; 16]),
                "encryptedAesKey": BASE64_STANDARD.encode((0..48).collect::<Vec<u8>>()),
                "encryptionVersion": 1,
                "type": 11,
            })
        );
        assert_eq!(
            serde_json::from_value::<EncryptedKeyHeader>(as_base64).unwrap(),
            expected
        );

        let raw_iv = vec![7_u8; 16];
        let as_raw = json!({
            "iv": raw_iv,
            "encryptedAesKey": (0..48).collect::<Vec<u8>>(),
            "encryptionVersion": 1,
        });
        assert_eq!(
            serde_json::from_value::<EncryptedKeyHeader>(as_raw).unwrap(),
            expected
        );
    }
}
