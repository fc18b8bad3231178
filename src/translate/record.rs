//! The record contract consumed by the translation pipeline.

use crate::translate::error::RecordError;

/// A value that can be translated as a single piece of text.
///
/// `render` produces the text submitted to the backend. `with_replacement`
/// builds a new value from the `(original, translated)` pair, leaving every
/// non-text field untouched. Implementations never mutate `self`.
pub trait Translatable: Sized {
    /// Text to submit for translation (may be empty).
    fn render(&self) -> String;

    /// Build the translated counterpart of `self`.
    ///
    /// # Errors
    /// Returns a `RecordError` when `translated` cannot be split back into
    /// the record's fields.
    fn with_replacement(&self, original: &str, translated: &str) -> Result<Self, RecordError>;
}

impl Translatable for String {
    fn render(&self) -> String {
        self.clone()
    }

    fn with_replacement(&self, _original: &str, translated: &str) -> Result<Self, RecordError> {
        Ok(translated.to_string())
    }
}

/// Rebuild `record` from its translation, keeping the original on failure.
///
/// The returned flag is `false` when the record was passed through.
pub(crate) fn replace_or_keep<R: Translatable>(
    record: R,
    original: &str,
    translated: &str,
) -> (R, bool) {
    match record.with_replacement(original, translated) {
        Ok(replaced) => (replaced, true),
        Err(e) => {
            tracing::warn!(
                "Failed to translate: {:?} ({})",
                preview(original, 50),
                e
            );
            (record, false)
        }
    }
}

/// Collapse whitespace and truncate `text` to at most `width` characters,
/// marking the cut with ` [...]`.
pub fn preview(text: &str, width: usize) -> String {
    const PLACEHOLDER: &str = " [...]";

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let budget = width.saturating_sub(PLACEHOLDER.len());
    let mut kept = String::new();
    for word in collapsed.split(' ') {
        let extra = if kept.is_empty() { 0 } else { 1 };
        if kept.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if !kept.is_empty() {
            kept.push(' ');
        }
        kept.push_str(word);
    }

    if kept.is_empty() {
        PLACEHOLDER.trim_start().to_string()
    } else {
        format!("{}{}", kept, PLACEHOLDER)
    }
}
