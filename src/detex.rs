//! TeX markup stripping for titles and abstracts.

use regex::Regex;
use std::sync::OnceLock;

/// Style commands whose argument is kept as plain text.
const TEXT_STYLES: &str = "bb|bf|it|gt|mc|md|rm|sc|sf|sl|tt|up";

/// Ordered (pattern, replacement) pairs.
fn rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (format!(r"\\text({})\{{(.+?)\}}", TEXT_STYLES), "$2"),
            (format!(r"\{{\\text({}) (.+?)\}}", TEXT_STYLES), "$2"),
            (r"\{\\(bf|em|it|rm|sc|sf|sl|tt) (.+?)\}".to_string(), "$2"),
            (r"\\emph\{(.+?)\}".to_string(), "$1"),
            (r"\s+".to_string(), " "),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| match Regex::new(&pattern) {
            Ok(regex) => Some((regex, replacement)),
            Err(e) => {
                tracing::error!("Invalid detex pattern {:?}: {}", pattern, e);
                None
            }
        })
        .collect()
    })
}

/// Remove TeX style commands and collapse whitespace (including newlines).
pub fn detex(text: &str) -> String {
    let mut text = text.to_string();
    for (pattern, replacement) in rules() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    text.trim().to_string()
}
