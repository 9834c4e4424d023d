//! Edit variants that get their own regenerated metadata.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ProviderError;

/// A post-processing edit applied to an image, identified by its file-name tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditTag {
    #[serde(rename = "_bw")]
    BlackAndWhite,
    #[serde(rename = "_negative")]
    Negative,
    #[serde(rename = "_sharpen")]
    Sharpen,
    #[serde(rename = "_misty")]
    Misty,
    #[serde(rename = "_blurred")]
    Blurred,
}

impl EditTag {
    pub const ALL: [EditTag; 5] = [
        EditTag::BlackAndWhite,
        EditTag::Negative,
        EditTag::Sharpen,
        EditTag::Misty,
        EditTag::Blurred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EditTag::BlackAndWhite => "_bw",
            EditTag::Negative => "_negative",
            EditTag::Sharpen => "_sharpen",
            EditTag::Misty => "_misty",
            EditTag::Blurred => "_blurred",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EditTag::BlackAndWhite => "black and white",
            EditTag::Negative => "color negative",
            EditTag::Sharpen => "sharpened",
            EditTag::Misty => "misty/foggy",
            EditTag::Blurred => "blurred",
        }
    }

    /// Words the regenerated title may use to mark the variant.
    pub fn hint(&self) -> &'static str {
        match self {
            EditTag::BlackAndWhite => "black and white, monochrome, or B&W",
            EditTag::Negative => "negative, inverted colors, or color inversion",
            EditTag::Sharpen => "sharp, detailed, crisp, or high-detail",
            EditTag::Misty => "misty, foggy, hazy, or ethereal",
            EditTag::Blurred => "blurred, soft focus, or abstract",
        }
    }

    pub fn title_instructions(&self) -> &'static str {
        match self {
            EditTag::BlackAndWhite => {
                "Add 'black and white', 'monochrome', or 'B&W' naturally at the end of the title"
            }
            EditTag::Negative => {
                "Add 'negative', 'inverted colors', or 'color inversion' naturally at the end"
            }
            EditTag::Sharpen => "Add 'sharp', 'detailed', 'crisp', or 'high-detail' naturally at the end",
            EditTag::Misty => "Add 'misty', 'foggy', 'hazy', or 'ethereal' naturally at the end",
            EditTag::Blurred => "Add 'blurred', 'soft focus', or 'abstract' naturally at the end",
        }
    }

    pub fn description_instructions(&self) -> &'static str {
        match self {
            EditTag::BlackAndWhite => {
                "Remove all color descriptions, mention the monochrome look, contrast and tonal range"
            }
            EditTag::Negative => {
                "Adjust color descriptions for the inversion, mention the surreal palette and inverted tones"
            }
            EditTag::Sharpen => "Keep all details, mention the enhanced sharpness, crisp detail and clarity",
            EditTag::Misty => {
                "Adjust visibility descriptions, mention the ethereal atmosphere, fog and dreamy quality"
            }
            EditTag::Blurred => {
                "Adjust sharpness descriptions, mention the soft blur, abstract quality and dreamy look"
            }
        }
    }

    pub fn keywords_instructions(&self) -> &'static str {
        match self {
            EditTag::BlackAndWhite => {
                "Remove color keywords, add: black and white, monochrome, grayscale, bw, contrast, tones"
            }
            EditTag::Negative => {
                "Adjust color keywords for inversion, add: negative, inverted, reversed colors, surreal, artistic effect"
            }
            EditTag::Sharpen => {
                "Keep all keywords, add: sharp, sharpened, detailed, crisp, clarity, high definition"
            }
            EditTag::Misty => {
                "Adjust clarity keywords, add: misty, foggy, hazy, fog, mist, ethereal, dreamy, atmospheric"
            }
            EditTag::Blurred => {
                "Adjust or remove sharp keywords, add: blurred, blur, soft focus, gaussian blur, abstract, dreamy"
            }
        }
    }
}

impl std::fmt::Display for EditTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditTag {
    type Err = ProviderError;

    /// Accepts the tag with or without its leading underscore.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = format!("_{}", s.trim().trim_start_matches('_').to_lowercase());
        EditTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == wanted)
            .ok_or_else(|| {
                ProviderError::InvalidArgument(format!(
                    "unknown edit tag '{s}' (expected one of _bw, _negative, _sharpen, _misty, _blurred)"
                ))
            })
    }
}
