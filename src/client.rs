//! Authenticated client for the image-generation service.
//!
//! A [`FireflyClient`] fetches the option catalog and opens a session once,
//! then serves any number of independent, concurrent generation calls. It is
//! cheap to clone; clones share the catalog and connection pool.

use crate::catalog::OptionCatalog;
use crate::config::Config;
use crate::decode::{DecodedPayload, GeneratedImage, ImageFormat, decode_payload};
use crate::error::{FireflyError, Result};
use crate::options::{GlyphOptions, ImageOptions};
use crate::request::{
    GenerationRequest, PayloadBuilder, multipart_form, resolve_seed, session_envelope,
};
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, header};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SESSION_ID_HEADER: &str = "x-session-id";
const TRANSACTION_ID_HEADER: &str = "x-transaction-id";
const PREFER_SYNC: &str = "respond-sync, wait=100";

/// A generation session opened with the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session id sent with every prediction.
    pub id: String,
    /// When the service will stop accepting this session.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create a session from a known id and expiry.
    pub fn new(id: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            expires_at,
        }
    }

    /// Whether the session's lifetime has elapsed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Client for the image-generation service.
#[derive(Clone)]
pub struct FireflyClient {
    http: Client,
    config: Arc<Config>,
    catalog: Arc<OptionCatalog>,
    session: Session,
}

impl std::fmt::Debug for FireflyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FireflyClient")
            .field("base_url", &self.config.service.base_url())
            .field("session", &self.session)
            .field("image_styles", &self.catalog.image_styles.len())
            .field("text_presets", &self.catalog.text_presets.len())
            .finish_non_exhaustive()
    }
}

impl FireflyClient {
    /// Connect to the service: fetch the option catalog and open a session.
    ///
    /// Fails with [`FireflyError::Authentication`] if the token is rejected and
    /// [`FireflyError::ServiceUnavailable`] if the service cannot be reached.
    pub async fn connect(token: impl Into<String>, config: Config) -> Result<Self> {
        config.validate()?;
        let token: String = token.into();
        let http = build_http_client(&token, &config)?;

        let catalog = OptionCatalog::fetch(
            &http,
            &config.service.asset_base_url(),
            config.service.fetch_text_assets,
        )
        .await?;

        let session = open_session(&http, &config).await?;

        info!(
            base_url = %config.service.base_url(),
            image_styles = catalog.image_styles.len(),
            text_presets = catalog.text_presets.len(),
            text_fonts = catalog.text_fonts.len(),
            session_expires_at = %session.expires_at,
            "Connected to image service"
        );

        Ok(Self {
            http,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            session,
        })
    }

    /// Build a client from an already-known catalog and session, without network access.
    pub fn with_catalog(
        token: impl Into<String>,
        config: Config,
        catalog: OptionCatalog,
        session: Session,
    ) -> Result<Self> {
        config.validate()?;
        let token: String = token.into();
        let http = build_http_client(&token, &config)?;

        Ok(Self {
            http,
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            session,
        })
    }

    /// Open a fresh session, replacing the current one.
    pub async fn create_session(&mut self) -> Result<&Session> {
        self.session = open_session(&self.http, &self.config).await?;
        Ok(&self.session)
    }

    /// Generate an image from a text prompt.
    ///
    /// The prompt must not be blank and every style must be in the catalog;
    /// both are checked before anything is sent.
    pub async fn text_to_image(&self, prompt: &str, options: &ImageOptions) -> Result<GeneratedImage> {
        if prompt.trim().is_empty() {
            return Err(FireflyError::InvalidRequest(
                "prompt cannot be empty".to_string(),
            ));
        }

        let styles = self.catalog.resolve_styles(options.styles.as_slice())?;
        self.ensure_session()?;

        let seed = resolve_seed(options.seed);
        let envelope = self.payloads().text_to_image(prompt, &styles, options, seed);
        let form = multipart_form(&envelope, None)?;

        let payload = self.predict(form).await?;
        Ok(into_image(payload, seed))
    }

    /// Fill a glyph image with a text effect.
    ///
    /// The glyph must be a PNG, JPEG or WebP image. At least one preset or a
    /// free-text prompt is required.
    pub async fn glyph_to_image(&self, glyph: &[u8], options: &GlyphOptions) -> Result<GeneratedImage> {
        if glyph.is_empty() {
            return Err(FireflyError::InvalidRequest(
                "glyph image cannot be empty".to_string(),
            ));
        }
        let format = ImageFormat::from_magic_bytes(glyph).ok_or_else(|| {
            FireflyError::InvalidRequest("glyph must be a PNG, JPEG or WebP image".to_string())
        })?;

        let presets = self.catalog.resolve_presets(options.presets.as_slice())?;
        let has_prompt = options
            .prompt
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        if presets.is_empty() && !has_prompt {
            return Err(FireflyError::InvalidRequest(
                "select at least one preset or give an effect prompt".to_string(),
            ));
        }
        self.ensure_session()?;

        let seed = resolve_seed(options.seed);
        let envelope = self.payloads().glyph_to_image(&presets, options, format, seed);
        let form = multipart_form(&envelope, Some((glyph, format)))?;

        let payload = self.predict(form).await?;
        Ok(into_image(payload, seed))
    }

    /// Perform any generation request.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        match request {
            GenerationRequest::Text { prompt, options } => self.text_to_image(prompt, options).await,
            GenerationRequest::Glyph { image, options } => {
                self.glyph_to_image(image, options).await
            }
        }
    }

    /// The option catalog fetched at connect time.
    pub fn catalog(&self) -> &OptionCatalog {
        &self.catalog
    }

    /// The current session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The client configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Titles of the available image styles.
    pub fn style_names(&self) -> Vec<&str> {
        self.catalog.style_names()
    }

    /// Titles of the available text-effect presets.
    pub fn preset_names(&self) -> Vec<&str> {
        self.catalog.preset_names()
    }

    /// Titles of the available fonts.
    pub fn font_names(&self) -> Vec<&str> {
        self.catalog.font_names()
    }

    fn payloads(&self) -> PayloadBuilder<'_> {
        PayloadBuilder::new(self.config.service.engine(), &self.config.service.language)
    }

    fn ensure_session(&self) -> Result<()> {
        if self.session.is_expired() {
            return Err(FireflyError::SessionExpired);
        }
        Ok(())
    }

    /// Send one prediction and decode its response.
    async fn predict(&self, form: reqwest::multipart::Form) -> Result<DecodedPayload> {
        let url = format!("{}v2/predict", self.config.service.base_url());
        let transaction_id = Uuid::new_v4().to_string();
        let start = Instant::now();

        debug!(url = %url, transaction_id = %transaction_id, "Sending prediction request");

        let response = self
            .http
            .post(&url)
            .header(SESSION_ID_HEADER, &self.session.id)
            .header(TRANSACTION_ID_HEADER, &transaction_id)
            .header("prefer", PREFER_SYNC)
            .multipart(form)
            .send()
            .await?;
        let response = error_for_status(response).await?;

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;

        let payload = decode_payload(content_type.as_deref(), &body)?;

        debug!(
            transaction_id = %transaction_id,
            latency_ms = start.elapsed().as_millis() as u64,
            bytes = payload.data.len(),
            format = %payload.format,
            "Prediction complete"
        );

        Ok(payload)
    }
}

fn into_image(payload: DecodedPayload, seed: u32) -> GeneratedImage {
    GeneratedImage {
        data: payload.data,
        format: payload.format,
        seed,
        metadata: payload.metadata,
    }
}

/// Build the shared HTTP client with the service's default headers.
fn build_http_client(token: &str, config: &Config) -> Result<Client> {
    let token = token.trim();
    if token.is_empty() {
        return Err(FireflyError::Authentication(
            "bearer token cannot be empty".to_string(),
        ));
    }

    let mut auth = header::HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
        FireflyError::Authentication("bearer token contains invalid characters".to_string())
    })?;
    auth.set_sensitive(true);

    let service = &config.service;
    let mut headers = header::HeaderMap::new();
    headers.insert(header::AUTHORIZATION, auth);
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("multipart/form-data"),
    );
    headers.insert(header::ORIGIN, header_value("origin", &service.origin)?);
    headers.insert("x-api-key", header_value("api_key", &service.api_key)?);

    Client::builder()
        .timeout(config.request.timeout)
        .pool_max_idle_per_host(config.request.workers)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .user_agent(service.user_agent.as_str())
        .default_headers(headers)
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(FireflyError::ServiceUnavailable)
}

fn header_value(name: &str, value: &str) -> Result<header::HeaderValue> {
    header::HeaderValue::from_str(value)
        .map_err(|_| FireflyError::InvalidConfig(format!("{name} is not a valid header value")))
}

/// Open a session with the configured lifetime.
async fn open_session(http: &Client, config: &Config) -> Result<Session> {
    let url = format!("{}session/create", config.service.base_url());
    let ttl = config.service.session_ttl;
    let form = multipart_form(&session_envelope(ttl.as_secs()), None)?;

    debug!(url = %url, ttl_secs = ttl.as_secs(), "Creating session");

    let response = http.post(&url).multipart(form).send().await?;
    let response = error_for_status(response).await?;

    let id = response
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            FireflyError::UnexpectedResponse("session response carried no session id".to_string())
        })?
        .to_string();

    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| FireflyError::InvalidConfig(format!("session_ttl out of range: {e}")))?;

    info!(session_id = %id, "Session created");
    Ok(Session::new(id, Utc::now() + ttl))
}

/// Turn a non-success response into the matching error.
async fn error_for_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    warn!(url = %url, status = status.as_u16(), "Service returned error status");
    Err(FireflyError::from_status(status.as_u16(), &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::error::OptionKind;

    fn offline_client(expires_in: chrono::Duration) -> FireflyClient {
        let mut config = Config::default();
        // Nothing listens here; tests below must fail before any I/O.
        config.service.base_url = Some("http://127.0.0.1:9".to_string());
        FireflyClient::with_catalog(
            "token",
            config,
            sample_catalog(),
            Session::new("session", Utc::now() + expires_in),
        )
        .unwrap()
    }

    #[test]
    fn test_session_expiry() {
        let live = Session::new("a", Utc::now() + chrono::Duration::minutes(5));
        assert!(!live.is_expired());
        assert!(live.remaining() > Duration::from_secs(200));

        let dead = Session::new("b", Utc::now() - chrono::Duration::seconds(1));
        assert!(dead.is_expired());
        assert_eq!(dead.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_empty_token_rejected() {
        let err = FireflyClient::with_catalog(
            "  ",
            Config::default(),
            OptionCatalog::default(),
            Session::new("s", Utc::now()),
        )
        .unwrap_err();
        assert!(matches!(err, FireflyError::Authentication(_)));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = offline_client(chrono::Duration::minutes(5));
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("token"));
        assert!(rendered.contains("session"));
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected() {
        let client = offline_client(chrono::Duration::minutes(5));
        let err = client
            .text_to_image("   ", &ImageOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FireflyError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_style_rejected_locally() {
        let client = offline_client(chrono::Duration::minutes(5));
        let err = client
            .text_to_image("flying pigs", &ImageOptions::new().with_style("photo "))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FireflyError::InvalidOption { kind: OptionKind::Style, .. }
        ));
    }

    #[tokio::test]
    async fn test_expired_session_rejected_locally() {
        let client = offline_client(-chrono::Duration::seconds(1));
        let err = client
            .text_to_image("flying pigs", &ImageOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FireflyError::SessionExpired));
    }

    #[tokio::test]
    async fn test_glyph_validation() {
        let client = offline_client(chrono::Duration::minutes(5));
        let png: [u8; 10] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

        let err = client
            .glyph_to_image(&[], &GlyphOptions::new().with_preset("Snake"))
            .await
            .unwrap_err();
        assert!(matches!(err, FireflyError::InvalidRequest(_)));

        let err = client
            .glyph_to_image(b"not an image", &GlyphOptions::new().with_preset("Snake"))
            .await
            .unwrap_err();
        assert!(matches!(err, FireflyError::InvalidRequest(_)));

        let err = client
            .glyph_to_image(&png, &GlyphOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FireflyError::InvalidRequest(_)));

        let err = client
            .glyph_to_image(&png, &GlyphOptions::new().with_preset("Marble"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FireflyError::InvalidOption { kind: OptionKind::Preset, .. }
        ));
    }
}
