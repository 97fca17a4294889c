//! Closed enumerations shared by snippet selection, sessions and statistics.
//!
//! Raw codes arrive from the command line, the config file and the wire. None of them are
//! rejected: anything unrecognized is normalized to a documented default.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Difficulty tier. Scopes both snippet selection and statistics filtering.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    #[default]
    Normal,
    Pro,
    Expert,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Normal, Mode::Pro, Mode::Expert];

    pub fn parse(code: &str) -> Option<Mode> {
        code.parse().ok()
    }

    /// Unknown codes fall back to `normal`.
    pub fn normalize(code: &str) -> Mode {
        Self::parse(code).unwrap_or_default()
    }

    /// Parses an optional statistics filter. Unknown values mean "no filter".
    pub fn filter(code: Option<&str>) -> Option<Mode> {
        code.and_then(Self::parse)
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Language a concrete snippet is written in.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    Js,
    Html,
    Css,
    Php,
    Python,
    Java,
    Cpp,
}

impl Language {
    /// Languages a `mixed` selection draws from.
    pub const MIXED_POOL: [Language; 3] = [Language::Js, Language::Css, Language::Html];

    pub fn parse(code: &str) -> Option<Language> {
        code.parse().ok()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Language selection requested for the next snippet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LanguageFilter {
    #[default]
    Mixed,
    Only(Language),
}

impl LanguageFilter {
    /// Unknown codes fall back to `mixed`.
    pub fn normalize(code: &str) -> LanguageFilter {
        match code {
            "mixed" => LanguageFilter::Mixed,
            other => Language::parse(other)
                .map(LanguageFilter::Only)
                .unwrap_or_default(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LanguageFilter::Mixed => "mixed",
            LanguageFilter::Only(language) => language.as_str(),
        }
    }

    /// Languages this filter admits, in query order.
    pub fn languages(&self) -> Vec<Language> {
        match self {
            LanguageFilter::Mixed => Language::MIXED_POOL.to_vec(),
            LanguageFilter::Only(language) => vec![*language],
        }
    }

    /// Picks one concrete language, randomly among the mixed pool when unrestricted.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Language {
        match self {
            LanguageFilter::Mixed => *Language::MIXED_POOL
                .choose(rng)
                .unwrap_or(&Language::Js),
            LanguageFilter::Only(language) => *language,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_normalizes_unknown_codes_to_normal() {
        assert_eq!(Mode::normalize("expert"), Mode::Expert);
        assert_eq!(Mode::normalize("pro"), Mode::Pro);
        assert_eq!(Mode::normalize("insane"), Mode::Normal);
        assert_eq!(Mode::normalize(""), Mode::Normal);
        assert_eq!(Mode::normalize("PRO"), Mode::Normal);
    }

    #[test]
    fn mode_filter_treats_unknown_as_unfiltered() {
        assert_eq!(Mode::filter(Some("pro")), Some(Mode::Pro));
        assert_eq!(Mode::filter(Some("all")), None);
        assert_eq!(Mode::filter(None), None);
    }

    #[test]
    fn mode_display_matches_wire_code() {
        for mode in Mode::ALL {
            assert_eq!(mode.to_string(), mode.as_str());
        }
    }

    #[test]
    fn language_codes_parse_back() {
        for code in ["js", "html", "css", "php", "python", "java", "cpp"] {
            let language = Language::parse(code).unwrap();
            assert_eq!(language.as_str(), code);
            assert_eq!(language.to_string(), code);
        }
        assert_eq!(Language::parse("Js"), None);
        assert_eq!(Language::parse("mixed"), None);
    }

    #[test]
    fn language_filter_normalization() {
        assert_eq!(LanguageFilter::normalize("mixed"), LanguageFilter::Mixed);
        assert_eq!(
            LanguageFilter::normalize("python"),
            LanguageFilter::Only(Language::Python)
        );
        assert_eq!(LanguageFilter::normalize("rust"), LanguageFilter::Mixed);
        assert_eq!(LanguageFilter::Only(Language::Cpp).code(), "cpp");
    }

    #[test]
    fn mixed_resolves_within_pool() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let language = LanguageFilter::Mixed.resolve(&mut rng);
            assert!(Language::MIXED_POOL.contains(&language));
        }
        assert_eq!(
            LanguageFilter::Only(Language::Java).resolve(&mut rng),
            Language::Java
        );
    }

    #[test]
    fn language_serde_uses_lowercase_codes() {
        let json = serde_json::to_string(&Language::Html).unwrap();
        assert_eq!(json, "\"html\"");
        let parsed: Language = serde_json::from_str("\"cpp\"").unwrap();
        assert_eq!(parsed, Language::Cpp);
    }
}
