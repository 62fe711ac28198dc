//! Request types and payload building.
//!
//! Every call to the service is a multipart form whose
//! `contentAnalyzerRequests` field carries a JSON envelope describing the
//! engine, the generation graph and its parameters.

use crate::catalog::{ImageStyle, TextPreset};
use crate::decode::ImageFormat;
use crate::error::{FireflyError, Result};
use crate::options::{GlyphOptions, ImageOptions, MAX_RANDOM_SEED};
use rand::Rng;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};
use uuid::Uuid;

/// Multipart field holding the JSON envelope.
pub const ENVELOPE_FIELD: &str = "contentAnalyzerRequests";

/// Multipart field holding the glyph image.
pub const GLYPH_FIELD: &str = "gi_GLYPH";

const TEXT_TO_IMAGE_GRAPH: &str = "urn:graph:Text2Image_v2";
const TEXT_EFFECTS_GRAPH: &str = "urn:graph:TextEffects_v1";

/// A single generation to perform.
#[derive(Debug, Clone)]
pub enum GenerationRequest {
    /// Generate from a text prompt.
    Text {
        /// The prompt.
        prompt: String,
        /// Style and size options.
        options: ImageOptions,
    },
    /// Fill a glyph image with a text effect.
    Glyph {
        /// Source glyph image bytes (PNG, JPEG or WebP).
        image: Vec<u8>,
        /// Preset and fit options.
        options: GlyphOptions,
    },
}

impl GenerationRequest {
    /// Create a text-to-image request.
    pub fn text(prompt: impl Into<String>, options: ImageOptions) -> Self {
        Self::Text {
            prompt: prompt.into(),
            options,
        }
    }

    /// Create a glyph-to-image request.
    pub fn glyph(image: Vec<u8>, options: GlyphOptions) -> Self {
        Self::Glyph { image, options }
    }

    /// Get a display string for logging.
    pub fn display_input(&self) -> String {
        match self {
            Self::Text { prompt, .. } => {
                if prompt.chars().count() > 50 {
                    format!("{}...", prompt.chars().take(50).collect::<String>())
                } else {
                    prompt.clone()
                }
            }
            Self::Glyph { image, options } => {
                format!("[glyph {} bytes, presets: {}]", image.len(), options.presets.join(", "))
            }
        }
    }
}

/// Builds JSON envelopes for one engine and language.
#[derive(Debug, Clone, Copy)]
pub struct PayloadBuilder<'a> {
    engine: &'a str,
    language: &'a str,
}

impl<'a> PayloadBuilder<'a> {
    /// Create a builder for the given engine id and prompt language.
    pub fn new(engine: &'a str, language: &'a str) -> Self {
        Self { engine, language }
    }

    /// Envelope for a text-to-image generation.
    ///
    /// Selected styles contribute their style and anchor prompts, joined in
    /// selection order and followed by the free-text prompts from `options`.
    pub fn text_to_image(
        &self,
        prompt: &str,
        styles: &[&ImageStyle],
        options: &ImageOptions,
        seed: u32,
    ) -> Value {
        let steps = options.steps();
        let (width, height) = options.dimensions();

        let mut advanced = serde_json::Map::new();
        advanced.insert("num_inference_steps".to_string(), json!(steps));
        let style_prompt = join_fragments(
            styles
                .iter()
                .map(|s| s.style_prompt.as_str())
                .chain(options.style_prompt.as_deref()),
        );
        if let Some(style_prompt) = style_prompt {
            advanced.insert("style_prompt".to_string(), Value::String(style_prompt));
        }
        let anchor_prompt = join_fragments(
            styles
                .iter()
                .map(|s| s.anchor_prompt.as_str())
                .chain(options.anchor_prompt.as_deref()),
        );
        if let Some(anchor_prompt) = anchor_prompt {
            advanced.insert("anchor_prompt".to_string(), Value::String(anchor_prompt));
        }

        let params = vec![
            scalar("gi_SEED", seed),
            scalar("gi_NUM_STEPS", steps),
            scalar("gi_OUTPUT_WIDTH", width),
            scalar("gi_OUTPUT_HEIGHT", height),
            string_param("gi_ADVANCED", &Value::Object(advanced).to_string()),
            string_param("gi_LANGUAGE", self.language),
            json!({
                "name": "gi_USE_FACE_FIX",
                "type": "boolean",
                "value": options.fix_face.unwrap_or(true),
            }),
        ];

        let inputs = json!({
            "gi_PROMPT": {
                "id": Uuid::new_v4().to_string(),
                "type": "string",
                "value": prompt,
            }
        });

        self.envelope(TEXT_TO_IMAGE_GRAPH, params, inputs)
    }

    /// Envelope for a glyph-to-image generation.
    ///
    /// The effect prompt is the selected presets' prompts followed by the
    /// free-text prompt, if any.
    pub fn glyph_to_image(
        &self,
        presets: &[&TextPreset],
        options: &GlyphOptions,
        glyph_format: ImageFormat,
        seed: u32,
    ) -> Value {
        let effect = join_fragments(
            presets
                .iter()
                .map(|p| p.prompt.as_str())
                .chain(options.prompt.as_deref()),
        )
        .unwrap_or_default();

        let params = vec![
            scalar("gi_SEED", seed),
            scalar("gi_NUM_STEPS", options.steps()),
            string_param("gi_FIT", options.fit.as_str()),
            string_param("gi_LANGUAGE", self.language),
        ];

        let inputs = json!({
            "gi_PROMPT": {
                "id": Uuid::new_v4().to_string(),
                "type": "string",
                "value": effect,
            },
            "gi_GLYPH": {
                "id": Uuid::new_v4().to_string(),
                "type": "image",
                "mimeType": glyph_format.mime_type(),
                "sensei:multipart_field_name": GLYPH_FIELD,
            }
        });

        self.envelope(TEXT_EFFECTS_GRAPH, params, inputs)
    }

    fn envelope(&self, graph: &str, params: Vec<Value>, inputs: Value) -> Value {
        json!({
            "sensei:name": "SelectionParse v2",
            "sensei:invocation_mode": "synchronous",
            "sensei:invocation_batch": false,
            "sensei:in_response": false,
            "sensei:engines": [{
                "sensei:execution_info": {
                    "sensei:engine": self.engine,
                },
                "sensei:inputs": {},
                "sensei:outputs": {
                    "spl:response": {
                        "dc:format": "application/json",
                        "sensei:multipart_field_name": "spl:response",
                    },
                    "gt_GEN_IMAGE": {
                        "dc:format": "image/jpeg",
                        "sensei:multipart_field_name": "outfile",
                    },
                },
                "sensei:params": {
                    "spl:request": {
                        "graph": { "uri": graph },
                        "params": params,
                        "inputs": inputs,
                        "outputs": {
                            "gt_GEN_IMAGE": {
                                "id": Uuid::new_v4().to_string(),
                                "type": "image",
                                "expectedMimeType": "image/jpeg",
                            },
                            "gt_GEN_STATUS": {
                                "id": Uuid::new_v4().to_string(),
                                "type": "scalar",
                            },
                        },
                    }
                },
            }],
        })
    }
}

/// Envelope requesting a new session with the given lifetime.
pub fn session_envelope(ttl_secs: u64) -> Value {
    json!({ "session_ttl": ttl_secs })
}

/// Wrap an envelope (and optionally a glyph image) into a multipart form.
pub fn multipart_form(envelope: &Value, glyph: Option<(&[u8], ImageFormat)>) -> Result<Form> {
    let mut form = Form::new().text(ENVELOPE_FIELD, envelope.to_string());

    if let Some((data, format)) = glyph {
        let part = Part::bytes(data.to_vec())
            .file_name(format!("glyph.{}", format.extension()))
            .mime_str(format.mime_type())
            .map_err(|e| FireflyError::InvalidRequest(e.to_string()))?;
        form = form.part(GLYPH_FIELD, part);
    }

    Ok(form)
}

/// The given seed, or a random one in `0..=MAX_RANDOM_SEED`.
pub fn resolve_seed(seed: Option<u32>) -> u32 {
    seed.unwrap_or_else(|| rand::rng().random_range(0..=MAX_RANDOM_SEED))
}

fn join_fragments<'s>(fragments: impl Iterator<Item = &'s str>) -> Option<String> {
    let joined = fragments
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!joined.is_empty()).then_some(joined)
}

fn scalar(name: &str, value: u32) -> Value {
    json!({ "name": name, "type": "scalar", "value": value })
}

fn string_param(name: &str, value: &str) -> Value {
    json!({ "name": name, "type": "string", "value": value })
}

/// Find a named entry in an envelope's `params` list.
pub fn find_param<'v>(envelope: &'v Value, name: &str) -> Option<&'v Value> {
    envelope["sensei:engines"][0]["sensei:params"]["spl:request"]["params"]
        .as_array()?
        .iter()
        .find(|p| p["name"] == name)
        .map(|p| &p["value"])
}
