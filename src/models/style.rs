//! The fixed list of visual styles offered to users.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Style tag stored on records generated without an explicit style.
pub const NO_STYLE: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    Watercolor,
    Illustration,
    Minimalist,
    Fantasy,
    Anime,
    Cyberpunk,
}

impl Style {
    pub const ALL: [Style; 6] = [
        Style::Watercolor,
        Style::Illustration,
        Style::Minimalist,
        Style::Fantasy,
        Style::Anime,
        Style::Cyberpunk,
    ];

    /// Tag stored in `generated_images.style`.
    pub fn as_str(self) -> &'static str {
        match self {
            Style::Watercolor => "watercolor",
            Style::Illustration => "illustration",
            Style::Minimalist => "minimalist",
            Style::Fantasy => "fantasy",
            Style::Anime => "anime",
            Style::Cyberpunk => "cyberpunk",
        }
    }

    /// Phrase appended to the user's prompt before it is sent upstream.
    pub fn prompt_suffix(self) -> &'static str {
        match self {
            Style::Watercolor => "in a vibrant watercolor style",
            Style::Illustration => "as a cozy storybook illustration",
            Style::Minimalist => "as minimalist line art, clean background",
            Style::Fantasy => "as glowing fantasy art",
            Style::Anime => "as a detailed anime scene",
            Style::Cyberpunk => "in cyberpunk style with neon colors",
        }
    }

    /// `"<prompt>, <suffix>"`
    pub fn compose(self, prompt: &str) -> String {
        format!("{}, {}", prompt, self.prompt_suffix())
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownStyle(pub String);

impl fmt::Display for UnknownStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown style `{}`", self.0)
    }
}

impl std::error::Error for UnknownStyle {}

impl FromStr for Style {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Style::ALL
            .into_iter()
            .find(|style| style.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownStyle(s.to_string()))
    }
}
