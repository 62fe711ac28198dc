//! The option catalog: image styles, text-effect presets and fonts.
//!
//! Fetched once when a client connects and read-only afterwards. Lookups
//! match an entry's `id` or `title` exactly; there is no case folding.

use crate::error::{FireflyError, OptionKind, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

const IMAGE_STYLES_PATH: &str = "image-styles/v4/en-US/content.json";
const TEXT_PRESETS_PATH: &str = "text-presets/v3/en-US/content.json";
const TEXT_FONTS_PATH: &str = "text-fonts/v2/en-US/content.json";

/// A selectable visual style for text-to-image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStyle {
    /// Service identifier.
    pub id: String,
    /// Human-readable name.
    pub title: String,
    /// Grouping shown in the web UI (e.g. "Movements", "Themes").
    #[serde(default)]
    pub group: String,
    /// Fragment appended to the advanced style prompt.
    #[serde(default)]
    pub style_prompt: String,
    /// Fragment appended to the advanced anchor prompt.
    #[serde(default)]
    pub anchor_prompt: String,
}

/// A text-effect preset for glyph-to-image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPreset {
    /// Service identifier.
    pub id: String,
    /// Human-readable name.
    pub title: String,
    /// Effect description sent to the service.
    #[serde(default, alias = "text_prompt")]
    pub prompt: String,
}

/// A font offered for text effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFont {
    /// Service identifier.
    pub id: String,
    /// Human-readable name.
    pub title: String,
    /// Font family name.
    #[serde(default)]
    pub family: String,
}

#[derive(Deserialize)]
struct StylesDocument {
    #[serde(default)]
    styles: Vec<ImageStyle>,
}

#[derive(Deserialize)]
struct PresetsDocument {
    #[serde(default)]
    presets: Vec<TextPreset>,
}

#[derive(Deserialize)]
struct FontsDocument {
    #[serde(default)]
    fonts: Vec<TextFont>,
}

/// Read-only set of options offered by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionCatalog {
    /// Image styles.
    pub image_styles: Vec<ImageStyle>,
    /// Text-effect presets.
    pub text_presets: Vec<TextPreset>,
    /// Text fonts.
    pub text_fonts: Vec<TextFont>,
}

impl OptionCatalog {
    /// Create a catalog from already-known entries.
    pub fn new(
        image_styles: Vec<ImageStyle>,
        text_presets: Vec<TextPreset>,
        text_fonts: Vec<TextFont>,
    ) -> Self {
        Self {
            image_styles,
            text_presets,
            text_fonts,
        }
    }

    /// Fetch the catalog from the asset host.
    ///
    /// Styles are always fetched; presets and fonts only when `include_text` is set.
    /// The documents are fetched concurrently.
    pub async fn fetch(client: &Client, asset_base_url: &str, include_text: bool) -> Result<Self> {
        let styles = fetch_document::<StylesDocument>(client, asset_base_url, IMAGE_STYLES_PATH);

        if !include_text {
            let styles = styles.await?;
            return Ok(Self::new(styles.styles, Vec::new(), Vec::new()));
        }

        let presets = fetch_document::<PresetsDocument>(client, asset_base_url, TEXT_PRESETS_PATH);
        let fonts = fetch_document::<FontsDocument>(client, asset_base_url, TEXT_FONTS_PATH);
        let (styles, presets, fonts) = tokio::try_join!(styles, presets, fonts)?;

        Ok(Self::new(styles.styles, presets.presets, fonts.fonts))
    }

    /// Look up an image style by id or title.
    pub fn style(&self, name: &str) -> Option<&ImageStyle> {
        self.image_styles
            .iter()
            .find(|s| s.id == name || s.title == name)
    }

    /// Look up a text-effect preset by id or title.
    pub fn preset(&self, name: &str) -> Option<&TextPreset> {
        self.text_presets
            .iter()
            .find(|p| p.id == name || p.title == name)
    }

    /// Look up a font by id or title.
    pub fn font(&self, name: &str) -> Option<&TextFont> {
        self.text_fonts
            .iter()
            .find(|f| f.id == name || f.title == name)
    }

    /// Resolve style names, failing on the first unknown one.
    pub fn resolve_styles<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&ImageStyle>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.style(name).ok_or_else(|| FireflyError::InvalidOption {
                    kind: OptionKind::Style,
                    name: name.to_string(),
                })
            })
            .collect()
    }

    /// Resolve preset names, failing on the first unknown one.
    pub fn resolve_presets<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&TextPreset>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.preset(name).ok_or_else(|| FireflyError::InvalidOption {
                    kind: OptionKind::Preset,
                    name: name.to_string(),
                })
            })
            .collect()
    }

    /// Distinct style groups, sorted.
    pub fn groups(&self) -> Vec<&str> {
        self.image_styles
            .iter()
            .map(|s| s.group.as_str())
            .filter(|g| !g.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Styles belonging to a group.
    pub fn styles_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a ImageStyle> {
        self.image_styles.iter().filter(move |s| s.group == group)
    }

    /// Titles of all image styles.
    pub fn style_names(&self) -> Vec<&str> {
        self.image_styles.iter().map(|s| s.title.as_str()).collect()
    }

    /// Titles of all text-effect presets.
    pub fn preset_names(&self) -> Vec<&str> {
        self.text_presets.iter().map(|p| p.title.as_str()).collect()
    }

    /// Titles of all fonts.
    pub fn font_names(&self) -> Vec<&str> {
        self.text_fonts.iter().map(|f| f.title.as_str()).collect()
    }
}

async fn fetch_document<T: DeserializeOwned>(
    client: &Client,
    asset_base_url: &str,
    path: &str,
) -> Result<T> {
    let url = format!("{asset_base_url}{path}");
    debug!(url = %url, "Fetching catalog document");

    let response = client.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FireflyError::from_status(status.as_u16(), &body));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        FireflyError::UnexpectedResponse(format!("malformed catalog document {path}: {e}"))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_catalog() -> OptionCatalog {
        OptionCatalog::new(
            vec![
                ImageStyle {
                    id: "photo".to_string(),
                    title: "Photo".to_string(),
                    group: "Content type".to_string(),
                    style_prompt: "photographic, realistic".to_string(),
                    anchor_prompt: "photo".to_string(),
                },
                ImageStyle {
                    id: "neon".to_string(),
                    title: "Neon".to_string(),
                    group: "Effects".to_string(),
                    style_prompt: "neon lights, glowing".to_string(),
                    anchor_prompt: "neon".to_string(),
                },
                ImageStyle {
                    id: "synthwave".to_string(),
                    title: "Synthwave".to_string(),
                    group: "Effects".to_string(),
                    style_prompt: "synthwave, retro".to_string(),
                    anchor_prompt: "synthwave".to_string(),
                },
            ],
            vec![TextPreset {
                id: "snake".to_string(),
                title: "Snake".to_string(),
                prompt: "snake skin scales".to_string(),
            }],
            vec![TextFont {
                id: "acumin".to_string(),
                title: "Acumin Pro".to_string(),
                family: "acumin-pro".to_string(),
            }],
        )
    }

    #[test]
    fn test_lookup_by_id_or_title() {
        let catalog = sample_catalog();
        assert_eq!(catalog.style("Neon").map(|s| s.id.as_str()), Some("neon"));
        assert_eq!(catalog.style("neon").map(|s| s.title.as_str()), Some("Neon"));
        assert_eq!(catalog.preset("Snake").map(|p| p.id.as_str()), Some("snake"));
        assert!(catalog.font("Acumin Pro").is_some());
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let catalog = sample_catalog();
        assert!(catalog.style("NEON").is_none());
        assert!(catalog.style("photo ").is_none());
        assert!(catalog.preset("SNAKE").is_none());
    }

    #[test]
    fn test_resolve_styles_reports_unknown_name() {
        let catalog = sample_catalog();
        let resolved = catalog.resolve_styles(&["Photo", "neon"]).unwrap();
        assert_eq!(resolved.len(), 2);

        match catalog.resolve_styles(&["Photo", "Vaporwave"]) {
            Err(FireflyError::InvalidOption { kind, name }) => {
                assert_eq!(kind, OptionKind::Style);
                assert_eq!(name, "Vaporwave");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_groups() {
        let catalog = sample_catalog();
        assert_eq!(catalog.groups(), vec!["Content type", "Effects"]);
        assert_eq!(catalog.styles_in_group("Effects").count(), 2);
    }

    #[test]
    fn test_deserialize_ignores_unknown_fields() {
        let doc: StylesDocument = serde_json::from_str(
            r#"{"styles": [{"id": "a", "title": "A", "thumbnail": "a.png"}], "version": 4}"#,
        )
        .unwrap();
        assert_eq!(doc.styles[0].style_prompt, "");
        assert_eq!(doc.styles[0].group, "");
    }
}
