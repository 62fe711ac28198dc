//! Caller-side generation options.
//!
//! Styles and presets are selected by name; names are resolved against the
//! client's catalog when a call is made, before anything is sent.

use serde::{Deserialize, Serialize};

/// Default number of inference steps.
pub const DEFAULT_STEPS: u32 = 40;

/// Default output edge length in pixels.
pub const DEFAULT_SIZE: u32 = 1024;

/// Upper bound (inclusive) of randomly chosen seeds.
pub const MAX_RANDOM_SEED: u32 = 100_000;

/// Output aspect ratios supported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    /// 1024 x 1024.
    Square,
    /// 1408 x 1024.
    Landscape,
    /// 1024 x 1408.
    Portrait,
    /// 1792 x 1024.
    Widescreen,
}

impl AspectRatio {
    /// Width and height in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Square => (1024, 1024),
            Self::Landscape => (1408, 1024),
            Self::Portrait => (1024, 1408),
            Self::Widescreen => (1792, 1024),
        }
    }

    /// Returns the aspect ratio name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "square",
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Widescreen => "widescreen",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "square" => Ok(Self::Square),
            "landscape" => Ok(Self::Landscape),
            "portrait" => Ok(Self::Portrait),
            "widescreen" => Ok(Self::Widescreen),
            other => Err(format!(
                "unknown aspect ratio '{other}' (expected square, landscape, portrait or widescreen)"
            )),
        }
    }
}

/// How closely a text effect hugs the glyph outline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlyphFit {
    /// Effect stays inside the outline.
    Tight,
    /// Effect may slightly exceed the outline.
    #[default]
    Medium,
    /// Effect spreads freely around the glyph.
    Loose,
}

impl GlyphFit {
    /// Returns the value sent to the service.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tight => "tight",
            Self::Medium => "medium",
            Self::Loose => "loose",
        }
    }
}

impl std::str::FromStr for GlyphFit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tight" => Ok(Self::Tight),
            "medium" => Ok(Self::Medium),
            "loose" => Ok(Self::Loose),
            other => Err(format!(
                "unknown fit '{other}' (expected tight, medium or loose)"
            )),
        }
    }
}

/// Options for a text-to-image call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOptions {
    /// Style names or ids, applied in order.
    #[serde(default)]
    pub styles: Vec<String>,
    /// Fixed seed; random when `None`.
    #[serde(default)]
    pub seed: Option<u32>,
    /// Inference steps.
    #[serde(default)]
    pub steps: Option<u32>,
    /// Explicit width, overriding the aspect ratio.
    #[serde(default)]
    pub width: Option<u32>,
    /// Explicit height, overriding the aspect ratio.
    #[serde(default)]
    pub height: Option<u32>,
    /// Aspect ratio preset.
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
    /// Whether the service should run face restoration.
    #[serde(default)]
    pub fix_face: Option<bool>,
    /// Free-text style prompt, appended after the selected styles' prompts.
    #[serde(default)]
    pub style_prompt: Option<String>,
    /// Free-text anchor prompt, appended after the selected styles' anchors.
    #[serde(default)]
    pub anchor_prompt: Option<String>,
}

impl ImageOptions {
    /// Creates options with service defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a style by name or id.
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.styles.push(style.into());
        self
    }

    /// Adds several styles by name or id.
    pub fn with_styles<I, S>(mut self, styles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.styles.extend(styles.into_iter().map(Into::into));
        self
    }

    /// Sets the seed for deterministic generation.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the number of inference steps.
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Sets explicit dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    /// Enables or disables face restoration.
    pub fn with_fix_face(mut self, fix_face: bool) -> Self {
        self.fix_face = Some(fix_face);
        self
    }

    /// Sets a free-text style prompt.
    pub fn with_style_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.style_prompt = Some(prompt.into());
        self
    }

    /// Sets a free-text anchor prompt.
    pub fn with_anchor_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.anchor_prompt = Some(prompt.into());
        self
    }

    /// Resolved output dimensions: explicit size, then aspect ratio, then square.
    pub fn dimensions(&self) -> (u32, u32) {
        let (w, h) = self
            .aspect_ratio
            .map(AspectRatio::dimensions)
            .unwrap_or((DEFAULT_SIZE, DEFAULT_SIZE));
        (self.width.unwrap_or(w), self.height.unwrap_or(h))
    }

    /// Resolved step count.
    pub fn steps(&self) -> u32 {
        self.steps.unwrap_or(DEFAULT_STEPS)
    }
}

/// Options for a glyph-to-image call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphOptions {
    /// Text-effect preset names or ids, applied in order.
    #[serde(default)]
    pub presets: Vec<String>,
    /// Free-text effect description, appended after the presets.
    #[serde(default)]
    pub prompt: Option<String>,
    /// Fit of the effect to the glyph.
    #[serde(default)]
    pub fit: GlyphFit,
    /// Fixed seed; random when `None`.
    #[serde(default)]
    pub seed: Option<u32>,
    /// Inference steps.
    #[serde(default)]
    pub steps: Option<u32>,
}

impl GlyphOptions {
    /// Creates options with service defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a preset by name or id.
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.presets.push(preset.into());
        self
    }

    /// Sets a free-text effect description.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Sets the glyph fit.
    pub fn with_fit(mut self, fit: GlyphFit) -> Self {
        self.fit = fit;
        self
    }

    /// Sets the seed for deterministic generation.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the number of inference steps.
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    /// Resolved step count.
    pub fn steps(&self) -> u32 {
        self.steps.unwrap_or(DEFAULT_STEPS)
    }
}
