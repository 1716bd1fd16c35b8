//! The viewer's language preference.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Languages the site is translated into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    En,
    #[default]
    #[serde(rename = "zh_hans")]
    ZhHans,
    #[serde(rename = "zh_hant")]
    ZhHant,
}

impl Language {
    /// Map a stored setting, a route sub-path or a BCP 47 tag to a language.
    pub fn from_user_value(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase().replace('-', "_");
        match value.as_str() {
            "" => None,
            "zh_hans" | "zh_cn" | "zh_sg" => Some(Language::ZhHans),
            "zh_hant" | "zh_tw" | "zh_hk" | "zh_mo" | "zh" => Some(Language::ZhHant),
            en if en == "en" || en.starts_with("en_") => Some(Language::En),
            _ => None,
        }
    }

    /// Pick the first language found, in order of preference: the viewer's
    /// account setting, the language cookie, the route sub-path, then the
    /// user agent's preference. Defaults to simplified Chinese.
    pub fn resolve(
        viewer: Option<&str>,
        cookie: Option<&str>,
        route: Option<&str>,
        user_agent: Option<&str>,
    ) -> Self {
        [viewer, cookie, route, user_agent]
            .into_iter()
            .flatten()
            .find_map(Language::from_user_value)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::ZhHans => "zh_hans",
            Language::ZhHant => "zh_hant",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
