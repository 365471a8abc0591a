use {
    crate::{ProtocolError, encoding},
    base64::{Engine, display::Base64Display, prelude::BASE64_STANDARD},
    rand::{CryptoRng, RngCore},
    serde::{Deserialize, Deserializer, Serialize, Serializer, de},
    std::{
        fmt::{self, Debug, Display},
        str::FromStr,
    },
};

/// Length of every key and IV used by the protocol (AES-128).
pub const KEY_LENGTH: usize = 16;

macro_rules! key_material {
    ($name:ident, $what:literal) => {
        impl $name {
            #[must_use]
            #[inline]
            pub const fn new(bytes: [u8; KEY_LENGTH]) -> Self {
                Self(bytes)
            }

            #[must_use]
            #[inline]
            pub fn generate() -> Self {
                Self::generate_with_rng(&mut rand::rng())
            }

            #[inline]
            pub fn generate_with_rng<R: CryptoRng + ?Sized>(rng: &mut R) -> Self {
                let mut bytes = [0; KEY_LENGTH];
                rng.fill_bytes(&mut bytes);
                Self(bytes)
            }

            #[inline]
            pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
                <[u8; KEY_LENGTH]>::try_from(bytes)
                    .map(Self)
                    .map_err(|_| ProtocolError::InvalidKeyMaterial {
                        what: $what,
                        actual: bytes.len(),
                        expected: KEY_LENGTH,
                    })
            }

            #[must_use]
            #[inline]
            pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_slice(&BASE64_STANDARD.decode(s)?)
            }
        }

        impl Serialize for $name {
            #[inline]
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                BASE64_STANDARD.encode(self.0).serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            #[inline]
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                Self::from_slice(&encoding::deserialize_bytes(deserializer)?)
                    .map_err(de::Error::custom)
            }
        }
    };
}

/// Symmetric key bound to one authenticated session.
///
/// It secures all request and response bodies of the session and wraps
/// per-file key headers. It is replaced wholesale on re-login, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret([u8; KEY_LENGTH]);
key_material!(SharedSecret, "shared secret");

impl SharedSecret {
    #[must_use]
    #[inline]
    pub fn display_unmasked(&self) -> impl Display + '_ {
        Base64Display::new(&self.0, &BASE64_STANDARD)
    }
}

impl Debug for SharedSecret {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret").finish()
    }
}

/// Per-file AES-128 key.
#[derive(Clone, PartialEq, Eq)]
pub struct AesKey([u8; KEY_LENGTH]);
key_material!(AesKey, "AES key");

impl Debug for AesKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesKey").finish()
    }
}

/// Initialization vector of a CBC stream. Not secret.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Iv([u8; KEY_LENGTH]);
key_material!(Iv, "IV");

impl Display for Iv {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Base64Display::new(&self.0, &BASE64_STANDARD))
    }
}

impl Debug for Iv {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iv({self})")
    }
}
