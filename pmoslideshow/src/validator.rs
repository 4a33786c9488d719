//! Validation des URLs d'images
//!
//! Une URL est valide si un GET aboutit et renvoie un corps non vide dont le
//! type (quand il est annoncé) est une image.
//!
//! # Example
//!
//! ```no_run
//! use pmoslideshow::{HttpImageValidator, ImageValidator};
//!
//! # async fn example() -> pmoslideshow::Result<()> {
//! let validator = HttpImageValidator::builder().build()?;
//! validator.validate("https://images.example.com/beach.jpg").await?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Délai de connexion par défaut (5 secondes)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Délai de requête par défaut (30 secondes)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// User-Agent par défaut
pub const DEFAULT_USER_AGENT: &str = concat!("PMOSlideshow/", env!("CARGO_PKG_VERSION"));

/// Vérifie qu'une URL désigne une image téléchargeable
#[async_trait]
pub trait ImageValidator: Send + Sync {
    async fn validate(&self, url: &str) -> Result<()>;
}

/// Réglages réseau du validateur HTTP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Validateur HTTP (reqwest)
#[derive(Debug, Clone)]
pub struct HttpImageValidator {
    client: Client,
    request_timeout: Duration,
}

impl HttpImageValidator {
    pub fn new(options: ValidatorOptions) -> Result<Self> {
        Self::builder().options(options).build()
    }

    pub fn builder() -> ValidatorBuilder {
        ValidatorBuilder::default()
    }

    /// Réutilise un client reqwest existant (pool de connexions partagé)
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    fn parse_url(url: &str) -> Result<Url> {
        let parsed =
            Url::parse(url).map_err(|e| Error::invalid_image(url, format!("malformed URL: {}", e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(Error::invalid_image(
                url,
                format!("unsupported scheme: {}", scheme),
            )),
        }
    }

    fn classify(url: &str, err: reqwest::Error) -> Error {
        if err.is_connect() {
            Error::invalid_image(url, "unreachable")
        } else if err.is_timeout() {
            Error::ValidationTimeout {
                url: url.to_string(),
            }
        } else if err.is_builder() {
            Error::invalid_image(url, format!("malformed URL: {}", err))
        } else {
            Error::internal(format!("failed to fetch {}: {}", url, err))
        }
    }
}

/// Un type absent est accepté : beaucoup de stockages objets n'en annoncent pas
fn is_image_content_type(value: Option<&header::HeaderValue>) -> bool {
    let Some(value) = value.and_then(|v| v.to_str().ok()) else {
        return true;
    };
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("image/") || mime == "application/octet-stream" || mime == "binary/octet-stream"
}

#[async_trait]
impl ImageValidator for HttpImageValidator {
    async fn validate(&self, url: &str) -> Result<()> {
        let parsed = Self::parse_url(url)?;
        debug!("Validating image {}", url);

        let response = self
            .client
            .get(parsed)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Self::classify(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::invalid_image(url, "image not found"));
        }
        if !status.is_success() {
            return Err(Error::internal(format!(
                "unexpected status {} for {}",
                status, url
            )));
        }

        if !is_image_content_type(response.headers().get(header::CONTENT_TYPE)) {
            return Err(Error::invalid_image(url, "not an image"));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify(url, e))?;
        if body.is_empty() {
            return Err(Error::invalid_image(url, "empty body"));
        }

        debug!("Image {} is valid ({} bytes)", url, body.len());
        Ok(())
    }
}

/// Builder du validateur HTTP
#[derive(Debug, Default)]
pub struct ValidatorBuilder {
    client: Option<Client>,
    options: ValidatorOptions,
}

impl ValidatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client reqwest personnalisé (les délais de connexion sont alors ceux du client)
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn options(mut self, options: ValidatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.options.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<HttpImageValidator> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.options.user_agent)
                .connect_timeout(self.options.connect_timeout)
                .timeout(self.options.request_timeout)
                .build()
                .map_err(|e| Error::internal(format!("failed to build HTTP client: {}", e)))?,
        };

        Ok(HttpImageValidator {
            client,
            request_timeout: self.options.request_timeout,
        })
    }
}
