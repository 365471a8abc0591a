mod download;

pub use self::download::{PayloadChunk, PayloadHeader, PayloadInfo, PayloadReader};

use {
    crate::{
        Error, Result,
        coalesce::RequestCoalescer,
        session::Session,
        transport::{ApiRequest, ApiResponse, Payload, TransportCipher, plain_payload},
    },
    reqwest::{StatusCode, header::HeaderMap},
    serde::{Serialize, de::DeserializeOwned},
    shroud_protocol::{EncryptedKeyHeader, Envelope, Iv, KeyHeader},
    std::{future::Future, sync::Arc, time::Duration},
    tokio::time::sleep,
    tracing::{debug, instrument, warn},
    url::Url,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRIES: usize = 5;
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    /// Timeout of a single HTTP request.
    pub timeout: Duration,
    /// Total number of attempts for requests failing at the transport level.
    pub retries: usize,
    pub retry_period: Duration,
}

impl Default for ClientOptions {
    #[inline]
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_period: DEFAULT_RETRY_PERIOD,
        }
    }
}

type PayloadHeaderCoalescer = RequestCoalescer<(Url, bool), PayloadInfo, Arc<Error>>;

/// HTTP client of the remote service.
///
/// Without a session, requests and responses pass through unmodified; this is only
/// meant for calls made before authentication. Clone it to reuse the connection pool.
#[derive(Clone)]
pub struct Client {
    reqwest: reqwest::Client,
    server_url: Url,
    options: ClientOptions,
    transport: Option<TransportCipher>,
    payload_headers: Arc<PayloadHeaderCoalescer>,
}

/// Status and headers of a response along with its decrypted body.
#[derive(Debug, Clone)]
pub struct DecryptedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub payload: Payload,
}

impl Client {
    #[inline]
    pub fn new(server_url: Url, options: ClientOptions) -> Result<Self> {
        Ok(Self {
            reqwest: reqwest::Client::builder().timeout(options.timeout).build()?,
            server_url,
            options,
            transport: None,
            payload_headers: Arc::default(),
        })
    }

    /// Binds the client to a session. All further traffic is encrypted.
    #[must_use]
    #[inline]
    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.transport = Some(TransportCipher::new(session));
        // Cached lookups may hold keys unwrapped with the previous secret.
        self.payload_headers = Arc::default();
        self
    }

    #[inline]
    pub fn end_session(&mut self) {
        self.transport = None;
        self.payload_headers = Arc::default();
    }

    #[inline]
    pub fn session(&self) -> Result<&Arc<Session>> {
        self.transport
            .as_ref()
            .map(TransportCipher::session)
            .ok_or(Error::MissingSharedSecret)
    }

    #[must_use]
    #[inline]
    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    /// Resolves `path` (with an optional query) against the server URL.
    #[inline]
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.server_url.join(path)?)
    }

    /// Sends a request and returns the response with its body still encrypted.
    ///
    /// Error statuses are turned into errors: `ResourceUnavailable` for 404 and
    /// `Status` otherwise. Errors always refer to the URL before encryption.
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    #[inline(never)]
    pub async fn send_raw(&self, request: ApiRequest) -> Result<ApiResponse> {
        let plain_url = request.url.clone();
        let request = match &self.transport {
            Some(transport) => transport.encrypt_request(request)?,
            None => request,
        };
        let response = ok_or_retry(&self.options, || async {
            let mut builder = self
                .reqwest
                .request(request.method.clone(), request.url.clone())
                .headers(request.headers.clone());
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }
            let response = builder.send().await.map_err(RequestError::from_reqwest)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(RequestError::from_reqwest)?;
            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        })
        .await?;
        debug!(status = %response.status, len = response.body.len(), "received response");
        self.check_status(response, plain_url)
    }

    fn check_status(&self, response: ApiResponse, url: Url) -> Result<ApiResponse> {
        if response.status.is_success() {
            return Ok(response);
        }
        if let Some(transport) = &self.transport {
            let details = Envelope::from_body(&response.body)
                .and_then(|envelope| transport.decrypt_best_effort(&envelope));
            if let Some(details) = details {
                warn!(status = %response.status, %url, %details, "server returned an error");
            }
        }
        if response.status == StatusCode::NOT_FOUND {
            return Err(Error::ResourceUnavailable { url });
        }
        Err(Error::Status {
            status: response.status,
            url,
            body: response.body,
        })
    }

    /// Sends a request and decrypts the response body.
    #[inline]
    pub async fn send(&self, request: ApiRequest) -> Result<DecryptedResponse> {
        let response = self.send_raw(request).await?;
        let status = response.status;
        let headers = response.headers.clone();
        let payload = match &self.transport {
            Some(transport) => transport.decrypt_response(response)?,
            None => plain_payload(response),
        };
        Ok(DecryptedResponse {
            status,
            headers,
            payload,
        })
    }

    /// `GET path`, returning the decoded JSON body, if any.
    #[inline]
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let request = ApiRequest::get(self.url(path)?);
        self.send(request).await?.payload.into_json()
    }

    /// `POST path` with a JSON body, returning the decoded JSON response, if any.
    #[inline]
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(self.url(path)?).json(body)?;
        self.send(request).await?.payload.into_json()
    }

    /// Wraps a file key for upload under the session secret, with a fresh transfer IV.
    #[inline]
    pub fn encrypt_key_header(&self, key_header: &KeyHeader) -> Result<EncryptedKeyHeader> {
        Ok(self
            .session()?
            .encrypt_key_header(key_header, &Iv::generate()))
    }

    #[inline]
    pub fn decrypt_key_header(&self, encrypted: &EncryptedKeyHeader) -> Result<KeyHeader> {
        self.session()?.decrypt_key_header(encrypted)
    }

    /// Encrypted form of `url`, as sent by [`Client::send_raw`] for bodiless requests.
    #[inline]
    pub fn encrypt_url(&self, url: &Url) -> Result<Url> {
        self.session()?.encrypt_url(url)
    }
}

/// Retries the request if an error arises due to the transport.
async fn ok_or_retry<T, F, Fut>(options: &ClientOptions, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut attempt: usize = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let transport_err = match f().await {
            Ok(x) => break Ok(x),
            Err(RequestError::Application(err)) => break Err(err),
            Err(RequestError::Transport(err)) => err,
        };
        if attempt >= options.retries {
            break Err(transport_err);
        }
        warn!(error = %transport_err, attempt, "transport failed, will retry");
        sleep(options.retry_period).await;
    }
}

enum RequestError {
    Transport(Error),
    Application(Error),
}

impl RequestError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            Self::Transport(err.into())
        } else {
            Self::Application(err.into())
        }
    }
}
