use {
    super::cipher::{decrypt_envelope, encrypt_envelope},
    crate::{Error, Result},
    sha1::{Digest, Sha1},
    shroud_protocol::{
        DETERMINISTIC_IV_PARAM, ENCRYPTED_QUERY_PARAM, Envelope, Iv, KEY_LENGTH, SharedSecret,
    },
    url::{Url, form_urlencoded},
};

/// Derives the IV of an encrypted query from the file id it refers to.
///
/// Returns `None` when the query has no `fileId`; such requests must use a random IV.
#[must_use]
#[inline]
pub fn derive_iv(query: &str) -> Option<Iv> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let (_, file_id) = form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == DETERMINISTIC_IV_PARAM)?;
    let digest = Sha1::digest(file_id.as_bytes());
    let (iv, _) = digest.split_first_chunk::<KEY_LENGTH>()?;
    Some(Iv::new(*iv))
}

/// Replaces the query of `url` with its encrypted form in a single `ss` parameter.
///
/// A URL without a query is returned unchanged. For a fixed secret, the output is
/// a pure function of the input whenever [`derive_iv`] yields an IV.
#[inline]
pub fn encrypt_url(url: &Url, shared_secret: &SharedSecret) -> Result<Url> {
    let Some(query) = url.query().filter(|query| !query.is_empty()) else {
        return Ok(url.clone());
    };
    let iv = derive_iv(query).unwrap_or_else(Iv::generate);
    let envelope = encrypt_envelope(query.as_bytes(), iv, shared_secret);
    let mut encrypted = url.clone();
    encrypted.set_query(None);
    encrypted
        .query_pairs_mut()
        .append_pair(ENCRYPTED_QUERY_PARAM, &envelope.to_json()?);
    Ok(encrypted)
}

/// Recovers the original query string from a URL produced by [`encrypt_url`].
///
/// Returns `None` if the URL carries no encrypted query.
#[inline]
pub fn decrypt_url_query(url: &Url, shared_secret: &SharedSecret) -> Result<Option<String>> {
    let Some((_, value)) = url
        .query_pairs()
        .find(|(key, _)| key == ENCRYPTED_QUERY_PARAM)
    else {
        return Ok(None);
    };
    let envelope: Envelope = serde_json::from_str(&value)?;
    let plaintext = decrypt_envelope(&envelope, shared_secret)?;
    String::from_utf8(plaintext)
        .map(Some)
        .map_err(|_| Error::DecryptionFailed)
}
