//! Error taxonomy for the translation pipeline.

use thiserror::Error;

/// Failure to rebuild a record from translated text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The translated text did not contain the expected number of separators.
    #[error("expected {expected} separator(s) in translated text, found {found}")]
    SeparatorMismatch { expected: usize, found: usize },
}

/// Errors produced by the translation pipeline.
///
/// Only `UnsupportedLanguage`, `UnsupportedMode`, `Backend` and
/// `Infrastructure` ever reach the caller of `translate`. The others are
/// recovered inside the pipeline: `Authorization` falls back to the browser,
/// `ItemTimeout`, `Action` and `Record` pass the item through untranslated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("unsupported language: {0:?}")]
    UnsupportedLanguage(String),

    #[error("unsupported translation mode: {0:?}")]
    UnsupportedMode(String),

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("translation backend error: {0}")]
    Backend(String),

    #[error("browser infrastructure error: {0}")]
    Infrastructure(String),

    #[error("translated text did not appear in time")]
    ItemTimeout,

    #[error("page action failed: {0}")]
    Action(String),

    #[error(transparent)]
    Record(#[from] RecordError),
}

impl TranslateError {
    /// Whether the failure is confined to a single item of the batch.
    pub fn is_item_failure(&self) -> bool {
        matches!(
            self,
            TranslateError::ItemTimeout | TranslateError::Action(_) | TranslateError::Record(_)
        )
    }
}

/// Result type for translation operations
pub type TranslateResult<T> = Result<T, TranslateError>;
