//! Hosted translation API driver.
//!
//! The whole batch is sent in one `POST /v2/translate` request; the quota is
//! read from `GET /v2/usage`. Transient failures (429, 5xx, transport) are
//! retried before the batch is given up.

use crate::retry::{with_retry_if, RetryConfig};
use crate::translate::error::{TranslateError, TranslateResult};
use crate::translate::language::Language;
use crate::translate::record::{replace_or_keep, Translatable};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

const FREE_API_URL: &str = "https://api-free.deepl.com";
const PRO_API_URL: &str = "https://api.deepl.com";

/// Character quota of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(rename = "character_count")]
    pub characters_used: u64,
    #[serde(rename = "character_limit", default)]
    pub characters_limit: Option<u64>,
}

impl Usage {
    pub fn new(characters_used: u64, characters_limit: Option<u64>) -> Self {
        Self {
            characters_used,
            characters_limit,
        }
    }

    /// Remaining characters, or `None` when the limit is not reported.
    pub fn remaining(&self) -> Option<u64> {
        self.characters_limit
            .map(|limit| limit.saturating_sub(self.characters_used))
    }
}

/// A hosted translation backend.
#[async_trait]
pub trait TranslationApi: Send + Sync {
    /// Query the remaining quota of the configured credential.
    ///
    /// A rejected credential is reported as `TranslateError::Authorization`.
    async fn usage(&self) -> TranslateResult<Usage>;

    /// Translate `texts` in one call; the result has the same length and order.
    async fn translate_texts(
        &self,
        texts: &[String],
        source: Language,
        target: Language,
    ) -> TranslateResult<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a [String],
    target_lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

/// Failure of a single HTTP exchange, before retry classification.
#[derive(Debug)]
enum RequestError {
    Status(StatusCode, String),
    Transport(reqwest::Error),
}

impl RequestError {
    fn is_retryable(&self) -> bool {
        match self {
            RequestError::Status(status, _) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            RequestError::Transport(_) => true,
        }
    }

    fn is_authorization(&self) -> bool {
        matches!(
            self,
            RequestError::Status(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _)
        )
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Status(status, body) => write!(f, "DeepL API error ({}): {}", status, body),
            RequestError::Transport(e) => write!(f, "DeepL request failed: {}", e),
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        RequestError::Transport(err)
    }
}

/// DeepL v2 API client.
#[derive(Debug, Clone)]
pub struct DeepLClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl DeepLClient {
    /// Create a client whose endpoint is derived from the key
    /// (free-tier keys end in `:fx`).
    pub fn new(api_key: impl Into<String>) -> TranslateResult<Self> {
        let api_key = api_key.into();
        let base_url = Self::default_base_url(&api_key).to_string();
        Self::with_base_url(api_key, base_url)
    }

    /// Create a client against an explicit endpoint.
    ///
    /// # Errors
    /// `TranslateError::Backend` when the key cannot be sent as a header or
    /// the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> TranslateResult<Self> {
        let mut auth = HeaderValue::from_str(&format!("DeepL-Auth-Key {}", api_key.into()))
            .map_err(|_| {
                TranslateError::Backend("DeepL credential is not a valid header value".to_string())
            })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .default_headers(headers)
            .build()
            .map_err(|e| TranslateError::Backend(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryConfig::deepl_api(),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Endpoint for a key: free-tier keys end in `:fx`.
    pub fn default_base_url(api_key: &str) -> &'static str {
        if api_key.ends_with(":fx") {
            FREE_API_URL
        } else {
            PRO_API_URL
        }
    }

    async fn fetch_usage(&self) -> Result<Usage, RequestError> {
        let response = self
            .client
            .get(format!("{}/v2/usage", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(RequestError::Status(status, body));
        }

        Ok(response.json::<Usage>().await?)
    }

    async fn post_translate(
        &self,
        request: &TranslateRequest<'_>,
    ) -> Result<TranslateResponse, RequestError> {
        let response = self
            .client
            .post(format!("{}/v2/translate", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(RequestError::Status(status, body));
        }

        Ok(response.json::<TranslateResponse>().await?)
    }
}

#[async_trait]
impl TranslationApi for DeepLClient {
    async fn usage(&self) -> TranslateResult<Usage> {
        let usage = with_retry_if(
            &self.retry,
            "DeepL usage",
            || self.fetch_usage(),
            RequestError::is_retryable,
        )
        .await
        .map_err(|e| {
            if e.is_authorization() {
                TranslateError::Authorization(e.to_string())
            } else {
                TranslateError::Backend(e.to_string())
            }
        })?;

        debug!(
            "DeepL usage: {} used of {:?}",
            usage.characters_used, usage.characters_limit
        );
        Ok(usage)
    }

    async fn translate_texts(
        &self,
        texts: &[String],
        source: Language,
        target: Language,
    ) -> TranslateResult<Vec<String>> {
        let request = TranslateRequest {
            text: texts,
            target_lang: target.target_api_code(),
            source_lang: (!source.is_auto()).then(|| source.source_api_code()),
        };

        let response = with_retry_if(
            &self.retry,
            &format!("DeepL translation to {}", target),
            || self.post_translate(&request),
            RequestError::is_retryable,
        )
        .await
        .map_err(|e| TranslateError::Backend(e.to_string()))?;

        Ok(response
            .translations
            .into_iter()
            .map(|translation| translation.text)
            .collect())
    }
}

/// Translate a batch through the hosted API in a single request.
///
/// Records rendering to an empty string are not submitted and come back
/// unchanged. Any transport or authorization failure aborts the batch.
pub async fn translate_by_api<R: Translatable>(
    records: Vec<R>,
    target: Language,
    source: Language,
    api: &dyn TranslationApi,
) -> TranslateResult<Vec<R>> {
    let originals: Vec<String> = records.iter().map(Translatable::render).collect();
    let pending: Vec<usize> = originals
        .iter()
        .enumerate()
        .filter(|(_, text)| !text.is_empty())
        .map(|(index, _)| index)
        .collect();

    if pending.is_empty() {
        debug!("Nothing to translate: all {} records are empty", records.len());
        return Ok(records);
    }

    let texts: Vec<String> = pending.iter().map(|&i| originals[i].clone()).collect();
    info!(
        "Translating {} of {} records via API ({} -> {})",
        texts.len(),
        records.len(),
        source,
        target
    );

    let translated = api.translate_texts(&texts, source, target).await?;
    if translated.len() != texts.len() {
        return Err(TranslateError::Backend(format!(
            "API returned {} translations for {} texts",
            translated.len(),
            texts.len()
        )));
    }

    let mut by_index: Vec<Option<String>> = vec![None; records.len()];
    for (index, text) in pending.into_iter().zip(translated) {
        by_index[index] = Some(text);
    }

    let mut failed = 0;
    let results: Vec<R> = records
        .into_iter()
        .zip(originals)
        .zip(by_index)
        .map(|((record, original), translated)| match translated {
            Some(translated) => {
                let (record, ok) = replace_or_keep(record, &original, &translated);
                if !ok {
                    failed += 1;
                }
                record
            }
            None => record,
        })
        .collect();

    if failed > 0 {
        warn!("{} records kept their original text", failed);
    }
    Ok(results)
}
