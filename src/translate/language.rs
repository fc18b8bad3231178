//! Language registry and resolver.
//!
//! The registry is the single source of truth for the language codes the
//! translation backend understands. It is initialized once on first access
//! (`OnceLock`) and is immutable thereafter.

use crate::translate::error::{TranslateError, TranslateResult};
use std::fmt;
use std::sync::OnceLock;

/// Metadata for one backend language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Canonical lowercase code (e.g., "en", "pt-br")
    pub code: &'static str,

    /// Symbolic name accepted from users (e.g., "ENGLISH")
    pub name: &'static str,

    /// Whether the language may be used as a translation target
    pub target: bool,

    /// Regional variant the API requires when this language is the target
    pub target_variant: Option<&'static str>,
}

/// Registry of all languages the backend supports.
pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Get the global registry instance.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    /// Look up a language by its exact canonical code.
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    /// Look up a language by its symbolic name (uppercase).
    pub fn get_by_name(&self, name: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.name == name)
    }

    /// All registered languages.
    pub fn list_all(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().collect()
    }
}

/// A language resolved against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Language {
    code: &'static str,
}

impl Language {
    pub const AUTO: Language = Language { code: "auto" };
    pub const ENGLISH: Language = Language { code: "en" };
    pub const JAPANESE: Language = Language { code: "ja" };

    /// Resolve a user-supplied identifier into a registered language.
    ///
    /// Exact lowercase codes are accepted as-is. Anything else is uppercased
    /// and matched against symbolic names (`"english"` -> `en`) and then
    /// against uppercased codes (`"EN_US"` -> `en-us`).
    ///
    /// # Errors
    /// `TranslateError::UnsupportedLanguage` carrying the offending input.
    pub fn resolve(identifier: &str) -> TranslateResult<Language> {
        let registry = LanguageRegistry::get();
        let trimmed = identifier.trim();

        if let Some(config) = registry.get_by_code(trimmed) {
            return Ok(Language { code: config.code });
        }

        let upper = trimmed.to_uppercase();
        if let Some(config) = registry.get_by_name(&upper) {
            return Ok(Language { code: config.code });
        }

        let as_code = upper.replace('_', "-");
        registry
            .list_all()
            .into_iter()
            .find(|lang| lang.code.to_uppercase() == as_code)
            .map(|config| Language { code: config.code })
            .ok_or_else(|| TranslateError::UnsupportedLanguage(identifier.to_string()))
    }

    /// Resolve an identifier that must be usable as a translation target.
    pub fn resolve_target(identifier: &str) -> TranslateResult<Language> {
        let language = Self::resolve(identifier)?;
        if language.config().target {
            Ok(language)
        } else {
            Err(TranslateError::UnsupportedLanguage(identifier.to_string()))
        }
    }

    /// Canonical lowercase code (used in translator page URLs).
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// API `target_lang` value. Bare English and Portuguese are not
    /// accepted as targets and map to a regional variant ("en" -> "EN-US").
    pub fn target_api_code(&self) -> String {
        self.config()
            .target_variant
            .unwrap_or(self.code)
            .to_uppercase()
    }

    /// API `source_lang` value. Sources carry no region ("en-gb" -> "EN").
    pub fn source_api_code(&self) -> String {
        let base = self.code.split('-').next().unwrap_or(self.code);
        base.to_uppercase()
    }

    /// Whether this is automatic source language detection.
    pub fn is_auto(&self) -> bool {
        *self == Language::AUTO
    }

    fn config(&self) -> &'static LanguageConfig {
        // Every Language is built from a registry entry.
        LanguageRegistry::get()
            .get_by_code(self.code)
            .unwrap_or(&AUTO_CONFIG)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}

static AUTO_CONFIG: LanguageConfig = LanguageConfig {
    code: "auto",
    name: "AUTO",
    target: false,
    target_variant: None,
};

fn default_languages() -> Vec<LanguageConfig> {
    const fn lang(code: &'static str, name: &'static str) -> LanguageConfig {
        LanguageConfig {
            code,
            name,
            target: true,
            target_variant: None,
        }
    }

    const fn variant(code: &'static str, name: &'static str, target: &'static str) -> LanguageConfig {
        LanguageConfig {
            code,
            name,
            target: true,
            target_variant: Some(target),
        }
    }

    vec![
        AUTO_CONFIG.clone(),
        lang("bg", "BULGARIAN"),
        lang("cs", "CZECH"),
        lang("da", "DANISH"),
        lang("de", "GERMAN"),
        lang("el", "GREEK"),
        variant("en", "ENGLISH", "en-us"),
        lang("en-gb", "ENGLISH_BRITISH"),
        lang("en-us", "ENGLISH_AMERICAN"),
        lang("es", "SPANISH"),
        lang("et", "ESTONIAN"),
        lang("fi", "FINNISH"),
        lang("fr", "FRENCH"),
        lang("hu", "HUNGARIAN"),
        lang("id", "INDONESIAN"),
        lang("it", "ITALIAN"),
        lang("ja", "JAPANESE"),
        lang("ko", "KOREAN"),
        lang("lt", "LITHUANIAN"),
        lang("lv", "LATVIAN"),
        lang("nb", "NORWEGIAN"),
        lang("nl", "DUTCH"),
        lang("pl", "POLISH"),
        variant("pt", "PORTUGUESE", "pt-br"),
        lang("pt-br", "PORTUGUESE_BRAZILIAN"),
        lang("pt-pt", "PORTUGUESE_EUROPEAN"),
        lang("ro", "ROMANIAN"),
        lang("ru", "RUSSIAN"),
        lang("sk", "SLOVAK"),
        lang("sl", "SLOVENIAN"),
        lang("sv", "SWEDISH"),
        lang("tr", "TURKISH"),
        lang("uk", "UKRAINIAN"),
        lang("zh", "CHINESE"),
    ]
}
