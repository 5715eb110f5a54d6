use std::fmt;

use async_trait::async_trait;
use clockface::{ClockFetcher, FetchError, FetchResult, TimePayload};
use log::debug;
use serde::Deserialize;
use url::{Url, form_urlencoded};

use crate::config::Config;
use crate::error::ClockfaceError;

pub const IDENTITY_PLACEHOLDER: &str = "{identity}";

/// Installs the process-wide TLS crypto provider reqwest needs. Installing
/// twice is harmless.
#[cfg(feature = "rustcrypto-tls")]
pub fn install_crypto_provider() {
    if rustls_rustcrypto::provider().install_default().is_err() {
        debug!("crypto provider was already installed");
    }
}

#[cfg(not(feature = "rustcrypto-tls"))]
pub fn install_crypto_provider() {}

/// Time services disagree on whether numbers are numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Field {
    Number(i64),
    Text(String),
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Number(n) => write!(f, "{n}"),
            Field::Text(s) => f.write_str(s),
        }
    }
}

/// The subset of a timeapi.io style response we care about.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeResponse {
    year: Field,
    month: Field,
    day: Field,
    hour: Field,
    minute: Field,
    #[serde(alias = "weekday", alias = "day_of_week")]
    day_of_week: String,
}

impl From<TimeResponse> for TimePayload {
    fn from(response: TimeResponse) -> Self {
        TimePayload {
            hour: response.hour.to_string(),
            minute: response.minute.to_string(),
            day: response.day.to_string(),
            month: response.month.to_string(),
            year: response.year.to_string(),
            weekday: response.day_of_week,
        }
    }
}

fn time_url_for(template: &str, identity: &str) -> Result<Url, ClockfaceError> {
    let encoded: String = form_urlencoded::byte_serialize(identity.as_bytes()).collect();
    let url = template.replace(IDENTITY_PLACEHOLDER, &encoded);
    Url::parse(&url).map_err(|err| ClockfaceError::InvalidEndpoint(url, err))
}

pub struct HttpClockFetcher {
    client: reqwest::Client,
    identity_url: Url,
    time_url: String,
}

impl HttpClockFetcher {
    pub fn new(config: &Config) -> Result<Self, ClockfaceError> {
        let identity_url = Url::parse(&config.identity_url)
            .map_err(|err| ClockfaceError::InvalidEndpoint(config.identity_url.clone(), err))?;
        if !config.time_url.contains(IDENTITY_PLACEHOLDER) {
            return Err(ClockfaceError::MissingIdentityPlaceholder(
                config.time_url.clone(),
            ));
        }
        // catch a broken template at startup rather than on first sync
        time_url_for(&config.time_url, "192.0.2.1")?;

        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpClockFetcher {
            client,
            identity_url,
            time_url: config.time_url.clone(),
        })
    }

    async fn get(&self, url: Url) -> FetchResult<reqwest::Response> {
        debug!("GET {url}");
        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(FetchError::transport)
    }
}

#[async_trait]
impl ClockFetcher for HttpClockFetcher {
    async fn fetch_identity(&self) -> FetchResult<String> {
        self.get(self.identity_url.clone())
            .await?
            .text()
            .await
            .map_err(FetchError::transport)
    }

    async fn fetch_time(&self, identity: &str) -> FetchResult<TimePayload> {
        let url = time_url_for(&self.time_url, identity).map_err(FetchError::transport)?;
        let response: TimeResponse = self
            .get(url)
            .await?
            .json()
            .await
            .map_err(FetchError::transport)?;
        Ok(response.into())
    }
}
