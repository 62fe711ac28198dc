//! Configuration management for the Firefly client.
//!
//! Supports configuration via CLI arguments, environment variables,
//! and JSON configuration files with sensible defaults.

use crate::error::{FireflyError, Result};
use crate::options::{AspectRatio, GlyphFit};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

/// Default asset host serving the style/preset/font catalogs.
pub const DEFAULT_ASSET_BASE_URL: &str = "https://clio-assets.adobe.com/clio-playground/";

/// CLI arguments for the `firefly` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "firefly",
    author = "Yiğit Konur <yigit@wope.com>",
    version,
    about = "Batch image generation against the Firefly web API",
    long_about = "Generates images from text prompts or glyph masks, firing many\n\
                  requests concurrently and saving each result with its detected extension.",
    after_help = "EXAMPLES:\n    \
        firefly -p \"flying pigs\" --count 4 --output-dir out\n    \
        firefly -p \"a lighthouse\" --style Photo --aspect-ratio widescreen\n    \
        firefly --glyph A.png --preset Snake --fit tight\n    \
        firefly --list-styles"
)]
pub struct Args {
    /// Bearer token for the service
    #[arg(short, long, env = "FIREFLY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Text prompt (repeatable)
    #[arg(short, long = "prompt")]
    pub prompts: Vec<String>,

    /// Number of images to generate per prompt
    #[arg(short = 'n', long, default_value = "1", env = "FIREFLY_COUNT")]
    pub count: usize,

    /// Image style name or id (repeatable)
    #[arg(short, long = "style")]
    pub styles: Vec<String>,

    /// Free-text style prompt, added after the selected styles
    #[arg(long)]
    pub style_prompt: Option<String>,

    /// Free-text anchor prompt, added after the selected styles
    #[arg(long)]
    pub anchor_prompt: Option<String>,

    /// Aspect ratio: square, landscape, portrait, widescreen
    #[arg(long)]
    pub aspect_ratio: Option<AspectRatio>,

    /// Number of inference steps
    #[arg(long)]
    pub steps: Option<u32>,

    /// Fixed seed (random per image when omitted)
    #[arg(long)]
    pub seed: Option<u32>,

    /// Glyph image to fill with a text effect instead of a text prompt
    #[arg(short, long)]
    pub glyph: Option<PathBuf>,

    /// Text-effect preset name or id (repeatable, glyph mode)
    #[arg(long = "preset")]
    pub presets: Vec<String>,

    /// Free-text effect description (glyph mode)
    #[arg(long)]
    pub effect: Option<String>,

    /// How tightly the effect follows the glyph: tight, medium, loose
    #[arg(long)]
    pub fit: Option<GlyphFit>,

    /// Directory generated images are written to
    #[arg(short, long, default_value = "firefly-output", env = "FIREFLY_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Number of concurrent requests
    #[arg(short, long, default_value = "4", env = "FIREFLY_WORKERS")]
    pub workers: usize,

    /// Maximum requests per second (0 = unpaced)
    #[arg(short, long, default_value = "0", env = "FIREFLY_RATE")]
    pub rate: u32,

    /// Request timeout in seconds
    #[arg(long, default_value = "120", env = "FIREFLY_TIMEOUT")]
    pub timeout: u64,

    /// Path to a configuration file (JSON)
    #[arg(short, long, env = "FIREFLY_CONFIG")]
    pub config: Option<PathBuf>,

    /// List available image styles and exit
    #[arg(long)]
    pub list_styles: bool,

    /// List available text-effect presets and exit
    #[arg(long)]
    pub list_presets: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "FIREFLY_VERBOSE")]
    pub verbose: bool,

    /// Output logs as JSON
    #[arg(long, env = "FIREFLY_JSON_LOGS")]
    pub json_logs: bool,

    /// Disable progress bar
    #[arg(long, env = "FIREFLY_NO_PROGRESS")]
    pub no_progress: bool,

    /// Dry run - validate config and options without generating
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Service build (deployment) to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Build {
    /// Development build.
    Dev,
    /// Staging build.
    Stage,
    /// Production build.
    #[default]
    Prod,
}

impl Build {
    /// Base URL of the generation services for this build.
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Dev | Self::Stage => "https://senseicore-stage-ue1.adobe.io/services/",
            Self::Prod => "https://sensei-ue1.adobe.io/services/",
        }
    }

    /// Diffusion engine identifier for this build.
    pub fn engine(self) -> &'static str {
        match self {
            Self::Dev => {
                "Classification:diffusion-service:Service-943088ea714543dd8289374cd1e92bb6"
            }
            Self::Stage => {
                "Classification:diffusion-service:Service-7367c21c82b946e7adb3995315de18a8"
            }
            Self::Prod => {
                "Classification:diffusion-service:Service-c742bc2eaae1491987dc00daff32fc07"
            }
        }
    }
}

impl std::str::FromStr for Build {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "stage" => Ok(Self::Stage),
            "prod" => Ok(Self::Prod),
            other => Err(format!("unknown build '{other}' (expected dev, stage or prod)")),
        }
    }
}

/// Where and how to reach the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service build; picks the default base URL and engine.
    #[serde(default)]
    pub build: Build,

    /// Overrides the build's base URL.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Base URL of the catalog assets.
    #[serde(default = "default_asset_base_url")]
    pub asset_base_url: String,

    /// Overrides the build's diffusion engine id.
    #[serde(default)]
    pub engine: Option<String>,

    /// Value of the `x-api-key` header.
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// Value of the `Origin` header.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Value of the `User-Agent` header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Prompt language sent with every generation.
    #[serde(default = "default_language")]
    pub language: String,

    /// Requested session lifetime.
    #[serde(with = "humantime_serde", default = "default_session_ttl")]
    pub session_ttl: Duration,

    /// Fetch text-effect presets and fonts in addition to image styles.
    #[serde(default = "default_true")]
    pub fetch_text_assets: bool,
}

impl ServiceConfig {
    /// Resolved service base URL, always ending in `/`.
    pub fn base_url(&self) -> String {
        with_trailing_slash(self.base_url.as_deref().unwrap_or(self.build.base_url()))
    }

    /// Resolved catalog asset base URL, always ending in `/`.
    pub fn asset_base_url(&self) -> String {
        with_trailing_slash(&self.asset_base_url)
    }

    /// Resolved diffusion engine id.
    pub fn engine(&self) -> &str {
        self.engine.as_deref().unwrap_or(self.build.engine())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            build: Build::default(),
            base_url: None,
            asset_base_url: default_asset_base_url(),
            engine: None,
            api_key: default_api_key(),
            origin: default_origin(),
            user_agent: default_user_agent(),
            language: default_language(),
            session_ttl: default_session_ttl(),
            fetch_text_assets: true,
        }
    }
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

fn default_asset_base_url() -> String {
    DEFAULT_ASSET_BASE_URL.to_string()
}

fn default_api_key() -> String {
    "clio-playground-web".to_string()
}

fn default_origin() -> String {
    "https://firefly.adobe.com".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/91.0.4472.114 Safari/537.36"
        .to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_true() -> bool {
    true
}

/// Full client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service endpoints and headers.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Request settings.
    #[serde(default)]
    pub request: RequestConfig,
}

/// Request-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Request timeout, enforced by the HTTP client.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Maximum requests per second for batches (0 = unpaced).
    #[serde(default)]
    pub rate_limit: u32,

    /// Number of concurrent requests in a batch.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            rate_limit: 0,
            workers: default_workers(),
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_workers() -> usize {
    4
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FireflyError::ConfigRead {
            path: path.clone(),
            source: e,
        })?;

        Ok(serde_json::from_str(&content)?)
    }

    /// Create configuration from CLI arguments.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = if let Some(config_path) = &args.config {
            Self::from_file(config_path)?
        } else {
            let mut config = Self::default();
            if let Ok(build) = std::env::var("FIREFLY_BUILD") {
                config.service.build = build.parse().map_err(FireflyError::InvalidConfig)?;
            }
            config.service.base_url = std::env::var("FIREFLY_BASE_URL").ok();
            config
        };

        // CLI args always win
        config.request.rate_limit = args.rate;
        config.request.workers = args.workers;
        config.request.timeout = Duration::from_secs(args.timeout);

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("base_url", self.service.base_url()),
            ("asset_base_url", self.service.asset_base_url()),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(FireflyError::InvalidConfig(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }

        if self.service.engine().is_empty() {
            return Err(FireflyError::InvalidConfig(
                "engine cannot be empty".to_string(),
            ));
        }

        if self.service.session_ttl < Duration::from_secs(1) {
            return Err(FireflyError::InvalidConfig(
                "session_ttl must be at least one second".to_string(),
            ));
        }

        if self.request.workers == 0 {
            return Err(FireflyError::InvalidConfig(
                "workers must be greater than 0".to_string(),
            ));
        }

        if self.request.timeout.is_zero() {
            return Err(FireflyError::InvalidConfig(
                "timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the batch rate limit, or `None` when batches are unpaced.
    pub fn rate_limit_nonzero(&self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.request.rate_limit)
    }
}

/// Serde helpers for durations written as `"30s"`, `"100ms"` or plain seconds.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();
        // "ms" must be checked before "s"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.service.base_url(), "https://sensei-ue1.adobe.io/services/");
        assert!(config.service.engine().ends_with("c742bc2eaae1491987dc00daff32fc07"));
        assert!(config.rate_limit_nonzero().is_none());
    }

    #[test]
    fn test_build_selects_urls_and_engine() {
        let mut service = ServiceConfig::default();
        service.build = Build::Stage;
        assert_eq!(
            service.base_url(),
            "https://senseicore-stage-ue1.adobe.io/services/"
        );
        assert!(service.engine().ends_with("7367c21c82b946e7adb3995315de18a8"));

        service.base_url = Some("http://127.0.0.1:9000".to_string());
        assert_eq!(service.base_url(), "http://127.0.0.1:9000/");
    }

    #[test]
    fn test_build_from_str() {
        assert_eq!("DEV".parse::<Build>(), Ok(Build::Dev));
        assert!("qa".parse::<Build>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.request.workers = 0;
        assert!(matches!(
            config.validate(),
            Err(FireflyError::InvalidConfig(_))
        ));

        let mut config = Config::default();
        config.service.base_url = Some("ftp://example.com".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.service.session_ttl = Duration::from_millis(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "service": {{ "build": "stage", "session_ttl": "600s", "fetch_text_assets": false }},
                "request": {{ "timeout": "1500ms", "workers": 8, "rate_limit": 3 }}
            }}"#
        )
        .unwrap();

        let config = Config::from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.service.build, Build::Stage);
        assert_eq!(config.service.session_ttl, Duration::from_secs(600));
        assert!(!config.service.fetch_text_assets);
        assert_eq!(config.service.api_key, "clio-playground-web");
        assert_eq!(config.request.timeout, Duration::from_millis(1500));
        assert_eq!(config.request.workers, 8);
        assert_eq!(config.rate_limit_nonzero(), NonZeroU32::new(3));
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file(&PathBuf::from("/nonexistent/firefly.json")).unwrap_err();
        assert!(matches!(err, FireflyError::ConfigRead { .. }));
    }

    #[test]
    fn test_args_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "request": {{ "workers": 8 }} }}"#).unwrap();

        let args = Args::parse_from([
            "firefly",
            "--config",
            file.path().to_str().unwrap(),
            "--workers",
            "2",
            "-p",
            "flying pigs",
        ]);
        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.request.workers, 2);
        assert_eq!(args.prompts, vec!["flying pigs".to_string()]);
    }
}
