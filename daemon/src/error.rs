use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClockfaceError {
    #[error("Config file parsing error: {0}")]
    ConfigFileParsingError(#[from] toml::de::Error),
    #[error("Tokio error: {0}")]
    TokioError(#[from] tokio::io::Error),
    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),
    #[error("Invalid endpoint URL {0:?}: {1}")]
    InvalidEndpoint(String, url::ParseError),
    #[error("Time endpoint {0:?} has no {{identity}} placeholder")]
    MissingIdentityPlaceholder(String),
}
