use crate::detex::detex;
use crate::translate::{RecordError, Translatable};
use serde::{Deserialize, Serialize};

/// Separator between title and summary in the rendered text.
///
/// `detex` collapses every newline inside the fields, so it only ever
/// appears here.
pub const SEPARATOR: &str = "\n";

/// An arXiv article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    /// Abstract page (e.g., http://arxiv.org/abs/2101.00001v1)
    pub arxiv_url: String,
    /// The article before translation, if this one is translated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<Box<Article>>,
}

impl Article {
    /// Create an article, stripping TeX markup from title and summary.
    pub fn new(
        title: &str,
        authors: Vec<String>,
        summary: &str,
        arxiv_url: impl Into<String>,
    ) -> Self {
        Self {
            title: detex(title),
            authors,
            summary: detex(summary),
            arxiv_url: arxiv_url.into(),
            original: None,
        }
    }

    /// PDF URL of the article.
    pub fn arxiv_pdf_url(&self) -> String {
        self.arxiv_url.replacen("abs", "pdf", 1)
    }

    /// The untranslated article (itself if never translated).
    pub fn source(&self) -> &Article {
        self.original.as_deref().unwrap_or(self)
    }
}

impl Translatable for Article {
    fn render(&self) -> String {
        format!("{}{}{}", self.title, SEPARATOR, self.summary)
    }

    fn with_replacement(&self, _original: &str, translated: &str) -> Result<Self, RecordError> {
        let found = translated.matches(SEPARATOR).count();
        let Some((title, summary)) = translated.split_once(SEPARATOR).filter(|_| found == 1)
        else {
            return Err(RecordError::SeparatorMismatch { expected: 1, found });
        };

        Ok(Self {
            title: title.trim().to_string(),
            summary: summary.trim().to_string(),
            original: Some(Box::new(self.clone())),
            ..self.clone()
        })
    }
}
