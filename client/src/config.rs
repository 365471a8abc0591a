use {
    anyhow::{Context as _, Result},
    derivative::Derivative,
    serde::{Deserialize, Serialize},
    shroud_protocol::SharedSecret,
    shroud_sdk::client::{ClientOptions, DEFAULT_RETRIES, DEFAULT_RETRY_PERIOD, DEFAULT_TIMEOUT},
    std::{path::Path, path::PathBuf, time::Duration},
    url::Url,
};

#[derive(Derivative, Clone, Serialize, Deserialize)]
#[derivative(Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server_url: Url,
    /// Secret of an established session. Requests are sent in the clear without it.
    #[derivative(Debug = "ignore")]
    #[serde(default)]
    pub shared_secret: Option<SharedSecret>,
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(with = "humantime_serde", default = "default_retry_period")]
    pub retry_period: Duration,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_request_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_retries() -> usize {
    DEFAULT_RETRIES
}

fn default_retry_period() -> Duration {
    DEFAULT_RETRY_PERIOD
}

fn default_log_filter() -> String {
    "info".into()
}

impl Config {
    #[inline]
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs_err::read_to_string(path)?;
        json5::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    #[must_use]
    #[inline]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: self.request_timeout,
            retries: self.retries,
            retry_period: self.retry_period,
        }
    }
}
