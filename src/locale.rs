//! Kiosk display language.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Language the kiosk speaks. Drives survey schema, prompts and fixed copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Es,
    En,
}

impl Locale {
    /// Pick a locale from a BCP-47 tag such as `en-US` or `es-MX`.
    /// Anything that is not English falls back to Spanish.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().to_lowercase().starts_with("en") {
            Locale::En
        } else {
            Locale::Es
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Locale::Es => "es",
            Locale::En => "en",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "es" => Ok(Locale::Es),
            "en" => Ok(Locale::En),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}
