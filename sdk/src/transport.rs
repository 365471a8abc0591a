//! Transparent encryption of API traffic under the session secret.

use {
    crate::{
        Result,
        crypto::{decrypt_envelope, encrypt_envelope},
        session::Session,
    },
    bytes::Bytes,
    reqwest::{
        Method, StatusCode,
        header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
    },
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
    shroud_protocol::{Envelope, Iv, encoding::to_canonical_json},
    std::sync::Arc,
    tracing::warn,
    url::Url,
};

const JSON_CONTENT_TYPE: &str = "application/json";

/// An outgoing API request before or after encryption.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    #[must_use]
    #[inline]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    #[inline]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    #[inline]
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Sets the body to the canonical JSON form of `value`.
    #[inline]
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.body = Some(to_canonical_json(value)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        Ok(self)
    }

    #[must_use]
    #[inline]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether requests with this method may carry an encrypted body.
    #[must_use]
    #[inline]
    pub fn method_has_body(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

/// A received API response, body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Decrypted content of a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Json(Value),
    Text(String),
    /// Body that was not an envelope, passed through as is.
    Raw(Bytes),
}

impl Payload {
    /// Classifies a decrypted plaintext.
    #[must_use]
    #[inline]
    pub fn from_plaintext(plaintext: Vec<u8>) -> Self {
        if plaintext.is_empty() {
            return Self::Empty;
        }
        if let Ok(value) = serde_json::from_slice(&plaintext) {
            return Self::Json(value);
        }
        match String::from_utf8(plaintext) {
            Ok(text) => Self::Text(text),
            Err(err) => Self::Raw(err.into_bytes().into()),
        }
    }

    /// Deserializes a JSON payload. Raw bodies are parsed as JSON too.
    #[inline]
    pub fn into_json<T: DeserializeOwned>(self) -> Result<Option<T>> {
        match self {
            Self::Empty => Ok(None),
            Self::Json(value) => Ok(Some(serde_json::from_value(value)?)),
            Self::Text(text) => Ok(Some(serde_json::from_str(&text)?)),
            Self::Raw(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        }
    }
}

/// Encrypts requests and decrypts responses of one session.
#[derive(Debug, Clone)]
pub struct TransportCipher {
    session: Arc<Session>,
}

impl TransportCipher {
    #[must_use]
    #[inline]
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    #[must_use]
    #[inline]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Replaces the body with an envelope, or encrypts the query of a bodiless request.
    #[inline]
    pub fn encrypt_request(&self, mut request: ApiRequest) -> Result<ApiRequest> {
        match request.body.take() {
            Some(body) if request.method_has_body() => {
                let envelope = encrypt_envelope(&body, Iv::generate(), self.session.shared_secret());
                request.body = Some(to_canonical_json(&envelope)?);
                request
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            }
            body => {
                if body.is_some() {
                    warn!(method = %request.method, url = %request.url, "dropping body of a bodiless request");
                }
                request.url = self.session.encrypt_url(&request.url)?;
            }
        }
        Ok(request)
    }

    #[inline]
    pub fn decrypt_response(&self, response: ApiResponse) -> Result<Payload> {
        if response.status == StatusCode::NO_CONTENT {
            return Ok(Payload::Empty);
        }
        let Some(envelope) = Envelope::from_body(&response.body) else {
            return Ok(Payload::Raw(response.body));
        };
        let plaintext = decrypt_envelope(&envelope, self.session.shared_secret())?;
        Ok(Payload::from_plaintext(plaintext))
    }

    /// Decrypts an envelope where failure must not abort the caller.
    #[must_use]
    #[inline]
    pub fn decrypt_best_effort(&self, envelope: &Envelope) -> Option<Value> {
        match decrypt_envelope(envelope, self.session.shared_secret()) {
            Ok(plaintext) => match Payload::from_plaintext(plaintext) {
                Payload::Empty => Some(Value::Null),
                Payload::Json(value) => Some(value),
                Payload::Text(text) => Some(Value::String(text)),
                Payload::Raw(_) => {
                    warn!("decrypted envelope is not text");
                    None
                }
            },
            Err(err) => {
                warn!(error = %err, "failed to decrypt envelope");
                None
            }
        }
    }
}

/// Passes responses through when no session is bound.
pub(crate) fn plain_payload(response: ApiResponse) -> Payload {
    if response.status == StatusCode::NO_CONTENT || response.body.is_empty() {
        return Payload::Empty;
    }
    match serde_json::from_slice(&response.body) {
        Ok(value) => Payload::Json(value),
        Err(_) => Payload::Raw(response.body),
    }
}
