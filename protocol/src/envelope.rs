use {
    crate::{Iv, encoding::base64_bytes},
    serde::{Deserialize, Serialize},
};

/// `{"iv": "<base64>", "data": "<base64>"}` wrapper carrying any encrypted JSON payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    pub iv: Iv,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Envelope {
    /// Parses `body` if it structurally is an envelope.
    ///
    /// Returns `None` for anything else (plain JSON, binary payloads, empty bodies).
    #[must_use]
    #[inline]
    pub fn from_body(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }

    #[inline]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
