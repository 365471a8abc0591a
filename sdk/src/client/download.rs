use {
    super::Client,
    crate::{Error, Result, crypto::chunk::ChunkWindow, transport::ApiRequest},
    bytes::Bytes,
    reqwest::{
        Method, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, HeaderValue, RANGE},
    },
    shroud_protocol::{EncryptedKeyHeader, KeyHeader, headers},
    std::sync::{Arc, OnceLock},
    tracing::{debug, instrument},
    url::Url,
};

/// Payload description carried in response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Whether the body is encrypted with a per-file key header.
    pub encrypted: bool,
    pub key_header: Option<EncryptedKeyHeader>,
    /// Content type of the plaintext.
    pub content_type: Option<String>,
    /// Length of the stored body.
    pub content_length: Option<u64>,
}

impl PayloadHeader {
    /// Reads the payload headers. A missing encryption flag is inferred from the
    /// presence of a key header.
    #[inline]
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let key_header = header_str(headers, headers::PAYLOAD_KEY_HEADER)
            .filter(|value| !value.is_empty())
            .map(EncryptedKeyHeader::parse_compact)
            .transpose()?;
        let encrypted = match header_str(headers, headers::PAYLOAD_ENCRYPTED) {
            Some(flag) => flag.eq_ignore_ascii_case("true") || flag == "1",
            None => key_header.is_some(),
        };
        let content_type = header_str(headers, headers::DECRYPTED_CONTENT_TYPE)
            .or_else(|| {
                if encrypted {
                    None
                } else {
                    header_str(headers, CONTENT_TYPE.as_str())
                }
            })
            .map(str::to_owned);
        let content_length =
            header_str(headers, CONTENT_LENGTH.as_str()).and_then(|value| value.parse().ok());
        Ok(Self {
            encrypted,
            key_header,
            content_type,
            content_length,
        })
    }
}

/// Result of a payload header lookup.
#[derive(Debug, Clone)]
pub struct PayloadInfo {
    pub header: PayloadHeader,
    /// Unwrapped key header, if decryption was requested and the payload is encrypted.
    pub key_header: Option<KeyHeader>,
}

/// Requested plaintext bytes of a payload.
#[derive(Debug, Clone)]
pub struct PayloadChunk {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    /// Size of the stored body, when known.
    pub total_size: Option<u64>,
    /// Key header the chunk was decrypted with.
    pub key_header: Option<KeyHeader>,
}

impl Client {
    /// Looks up payload headers with a `HEAD` request.
    ///
    /// Concurrent lookups of the same `(url, decrypt)` pair share one request.
    #[instrument(skip_all, fields(%url, decrypt))]
    #[inline(never)]
    pub async fn payload_header(&self, url: &Url, decrypt: bool) -> Result<PayloadInfo> {
        let this = self.clone();
        let lookup_url = url.clone();
        self.payload_headers
            .get_or_create((url.clone(), decrypt), move || async move {
                this.fetch_payload_header(&lookup_url, decrypt)
                    .await
                    .map_err(Arc::new)
            })
            .await
            .map_err(Error::Shared)
    }

    async fn fetch_payload_header(&self, url: &Url, decrypt: bool) -> Result<PayloadInfo> {
        let response = self
            .send_raw(ApiRequest::new(Method::HEAD, url.clone()))
            .await?;
        let header = PayloadHeader::from_headers(&response.headers)?;
        let key_header = if decrypt && header.encrypted {
            let encrypted = header
                .key_header
                .as_ref()
                .ok_or_else(|| Error::payload_unavailable(url, "missing key header"))?;
            Some(self.decrypt_key_header(encrypted)?)
        } else {
            None
        };
        Ok(PayloadInfo { header, key_header })
    }

    /// Fetches and decrypts plaintext bytes `[start, end]` of a payload.
    ///
    /// Only the block-aligned ciphertext around the window is fetched. `known_key`
    /// skips unwrapping the key header from the response.
    #[instrument(skip_all, fields(%url, start, ?end))]
    #[inline(never)]
    pub async fn fetch_payload_range(
        &self,
        url: &Url,
        start: u64,
        end: Option<u64>,
        known_key: Option<&KeyHeader>,
    ) -> Result<PayloadChunk> {
        let window = ChunkWindow::new(start, end)?;
        let request = ApiRequest::get(url.clone())
            .header(RANGE, HeaderValue::from_str(&window.range_header())?);
        let response = self.send_raw(request).await?;
        let header = PayloadHeader::from_headers(&response.headers)?;
        if response.body.is_empty() {
            return Err(Error::payload_unavailable(url, "empty response body"));
        }

        let content_range = header_str(&response.headers, CONTENT_RANGE.as_str())
            .and_then(ContentRange::parse);
        let ranged = response.status == StatusCode::PARTIAL_CONTENT;
        if ranged
            && content_range.is_some_and(|range| range.first != window.aligned_start)
        {
            return Err(Error::payload_unavailable(url, "unexpected content range"));
        }
        let window = if ranged { window } else { window.whole_payload() };
        let mut total_size = content_range
            .and_then(|range| range.total)
            .or(if ranged { None } else { header.content_length });
        debug!(
            status = %response.status,
            fetched = response.body.len(),
            encrypted = header.encrypted,
            "received payload window"
        );

        if !header.encrypted {
            return Ok(PayloadChunk {
                bytes: slice_plain(&response.body, &window),
                content_type: header.content_type,
                total_size,
                key_header: None,
            });
        }

        let key_header = match known_key {
            Some(key_header) => key_header.clone(),
            None => {
                let encrypted = header
                    .key_header
                    .as_ref()
                    .ok_or_else(|| Error::payload_unavailable(url, "missing key header"))?;
                self.decrypt_key_header(encrypted)?
            }
        };
        let fetched = u64::try_from(response.body.len()).unwrap_or(u64::MAX);
        let at_end = match (ranged, content_range) {
            (false, _) => true,
            (
                true,
                Some(ContentRange {
                    last,
                    total: Some(total),
                    ..
                }),
            ) => last.saturating_add(1) >= total,
            // Without a total, only a short read proves the end. A full read may still end
            // inside the padded last block, so the stored size decides.
            (true, _) => match window.fetch_len() {
                Some(len) if fetched >= len => {
                    let stored = self.stored_size(url).await?;
                    total_size = Some(stored);
                    window.aligned_start.saturating_add(fetched) >= stored
                }
                Some(_) | None => true,
            },
        };
        let plaintext = window
            .decrypt(&response.body, &key_header, at_end)
            .map_err(|err| Error::payload_unavailable(url, err))?;
        Ok(PayloadChunk {
            bytes: plaintext.into(),
            content_type: header.content_type,
            total_size,
            key_header: Some(key_header),
        })
    }

    /// Size of the stored body, from a coalesced `HEAD` lookup.
    async fn stored_size(&self, url: &Url) -> Result<u64> {
        let info = self
            .payload_header(url, false)
            .await
            .map_err(|err| Error::payload_unavailable(url, format!("payload size unknown: {err}")))?;
        debug!(size = ?info.header.content_length, "looked up stored payload size");
        info.header
            .content_length
            .ok_or_else(|| Error::payload_unavailable(url, "payload size unknown"))
    }

    #[must_use]
    #[inline]
    pub fn payload_reader(&self, url: Url) -> PayloadReader {
        PayloadReader::new(self.clone(), url)
    }
}

/// Reads windows of one payload, unwrapping its key header only once.
pub struct PayloadReader {
    client: Client,
    url: Url,
    key_header: OnceLock<KeyHeader>,
}

impl PayloadReader {
    #[must_use]
    #[inline]
    pub fn new(client: Client, url: Url) -> Self {
        Self {
            client,
            url,
            key_header: OnceLock::new(),
        }
    }

    /// Creates a reader for a payload whose key header is already known.
    #[must_use]
    #[inline]
    pub fn with_key_header(client: Client, url: Url, key_header: KeyHeader) -> Self {
        Self {
            client,
            url,
            key_header: OnceLock::from(key_header),
        }
    }

    #[must_use]
    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    #[inline]
    pub fn key_header(&self) -> Option<&KeyHeader> {
        self.key_header.get()
    }

    #[inline]
    pub async fn read_range(&self, start: u64, end: Option<u64>) -> Result<PayloadChunk> {
        let chunk = self
            .client
            .fetch_payload_range(&self.url, start, end, self.key_header.get())
            .await?;
        if let Some(key_header) = &chunk.key_header {
            self.key_header.get_or_init(|| key_header.clone());
        }
        Ok(chunk)
    }
}

/// `content-range: bytes <first>-<last>/<total or *>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContentRange {
    first: u64,
    last: u64,
    total: Option<u64>,
}

impl ContentRange {
    fn parse(value: &str) -> Option<Self> {
        let (range, total) = value.strip_prefix("bytes ")?.split_once('/')?;
        let (first, last) = range.split_once('-')?;
        Some(Self {
            first: first.trim().parse().ok()?,
            last: last.trim().parse().ok()?,
            total: total.trim().parse().ok(),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

/// Cuts the requested bytes out of an unencrypted window.
fn slice_plain(body: &Bytes, window: &ChunkWindow) -> Bytes {
    let len = body.len();
    let from = usize::try_from(window.chunk_start.saturating_sub(window.aligned_start))
        .unwrap_or(usize::MAX)
        .min(len);
    let to = window
        .requested_len()
        .and_then(|requested| usize::try_from(requested).ok())
        .map_or(len, |requested| from.saturating_add(requested).min(len));
    body.slice(from..to)
}
