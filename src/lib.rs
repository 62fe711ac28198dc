//! # Firefly API
//!
//! Async client for the Firefly image-generation web API.
//!
//! The client turns two simple calls, text-to-image and glyph-to-image, into
//! the multipart requests the service expects, and hands back the image bytes
//! together with the detected file extension.
//!
//! ## Features
//!
//! - **Option Catalog**: image styles, text-effect presets and fonts fetched once at connect time
//! - **Local Validation**: unknown styles and presets are rejected before anything is sent
//! - **Format Detection**: JPEG, PNG and WebP recognised from magic bytes or content type
//! - **Concurrent Batches**: fire many independent calls with bounded concurrency and optional pacing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use firefly_api::{Config, FireflyClient, ImageOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = FireflyClient::connect("your-bearer-token", Config::default()).await?;
//!
//!     let options = ImageOptions::new().with_style("Photo");
//!     let image = client.text_to_image("flying pigs", &options).await?;
//!
//!     println!("{} bytes of {}", image.size(), image.extension());
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrent Calls
//!
//! [`FireflyClient`] is cheap to clone and every call is independent, so any
//! concurrency primitive works. [`BatchRunner`] packages the common case and
//! reports each job's outcome separately.
//!
//! ## Configuration
//!
//! See [`Config`]; the `firefly` binary also reads `FIREFLY_*` environment
//! variables and JSON configuration files.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod catalog;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod options;
pub mod request;
pub mod tracker;

// Re-exports for convenience
pub use batch::{BatchOutcome, BatchReport, BatchRunner};
pub use catalog::{ImageStyle, OptionCatalog, TextFont, TextPreset};
pub use client::{FireflyClient, Session};
pub use config::{Args, Build, Config, RequestConfig, ServiceConfig};
pub use decode::{GeneratedImage, ImageFormat};
pub use error::{FireflyError, OptionKind, Result};
pub use options::{AspectRatio, GlyphFit, GlyphOptions, ImageOptions};
pub use request::GenerationRequest;
pub use tracker::{FailureKind, StatsSnapshot, StatsTracker};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
