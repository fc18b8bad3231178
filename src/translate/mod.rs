//! Translation pipeline.
//!
//! `translate` takes a batch of [`Translatable`] records and returns the
//! batch with each record's text translated, in the same order and with the
//! same length, whatever happens to individual items.
//!
//! # Architecture
//!
//! - `language`: registry of backend language codes and the resolver
//! - `mode`: API/browser mode and the per-batch backend selection
//! - `deepl`: hosted API driver (single request per batch)
//! - `browser`: page-pool driver polling the translator UI
//! - `chromium`: headless Chromium implementation of the browser traits
//! - `record`: the record contract
//!
//! # Example
//!
//! ```rust,ignore
//! use arxiv_post::translate::{translate, TranslateOptions};
//!
//! let options = TranslateOptions {
//!     target: "ja".to_string(),
//!     ..TranslateOptions::default()
//! };
//! let translated = translate(vec!["Hello".to_string()], &options).await?;
//! ```

mod browser;
mod chromium;
mod deepl;
mod error;
mod language;
mod mode;
mod record;

pub use browser::{
    divide, translate_by_browser, translator_url, BrowserLauncher, BrowserOptions,
    BrowserSession, TranslatorPage, POLL_INTERVAL,
};
pub use chromium::{ChromiumLauncher, ChromiumPage, ChromiumSession};
pub use deepl::{translate_by_api, DeepLClient, TranslationApi, Usage};
pub use error::{RecordError, TranslateError, TranslateResult};
pub use language::{Language, LanguageConfig, LanguageRegistry};
pub use mode::{batch_cost, select_backend, Backend, TranslationMode};
pub use record::{preview, Translatable};

use std::time::Duration;
use tracing::{debug, info};

/// Public translator page.
pub const DEFAULT_TRANSLATOR_URL: &str = "https://www.deepl.com/translator";

/// Everything `translate` needs besides the batch itself.
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    /// Language to translate into (code or name, e.g. "ja", "japanese")
    pub target: String,
    /// Language of the input ("auto" to let the backend detect it)
    pub source: String,
    pub mode: TranslationMode,
    /// API credential; empty means none
    pub credential: String,
    /// API endpoint override (derived from the credential when unset)
    pub api_url: Option<String>,
    pub translator_url: String,
    /// Maximum number of browser pages working in parallel
    pub concurrency: usize,
    /// Per-item timeout of the browser driver
    pub timeout: Duration,
    pub chromium: ChromiumLauncher,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            target: "ja".to_string(),
            source: "en".to_string(),
            mode: TranslationMode::Auto,
            credential: String::new(),
            api_url: None,
            translator_url: DEFAULT_TRANSLATOR_URL.to_string(),
            concurrency: 2,
            timeout: Duration::from_secs(30),
            chromium: ChromiumLauncher::default(),
        }
    }
}

impl TranslateOptions {
    /// API client for the configured credential, if any.
    pub fn api_client(&self) -> TranslateResult<Option<DeepLClient>> {
        if self.credential.is_empty() {
            return Ok(None);
        }
        let client = match &self.api_url {
            Some(url) => DeepLClient::with_base_url(self.credential.clone(), url.clone())?,
            None => DeepLClient::new(self.credential.clone())?,
        };
        Ok(Some(client))
    }

    fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            translator_url: self.translator_url.clone(),
            concurrency: self.concurrency,
            timeout: self.timeout,
        }
    }
}

/// Translate a batch with the hosted API or a local headless Chromium.
pub async fn translate<R>(records: Vec<R>, options: &TranslateOptions) -> TranslateResult<Vec<R>>
where
    R: Translatable + Send,
{
    if records.is_empty() {
        return Ok(records);
    }
    let api = options.api_client()?;
    translate_with(
        records,
        options,
        api.as_ref().map(|client| client as &dyn TranslationApi),
        &options.chromium,
    )
    .await
}

/// Translate a batch with explicit backends.
///
/// `api` is `None` when no credential is available.
pub async fn translate_with<R, L>(
    records: Vec<R>,
    options: &TranslateOptions,
    api: Option<&dyn TranslationApi>,
    launcher: &L,
) -> TranslateResult<Vec<R>>
where
    R: Translatable + Send,
    L: BrowserLauncher,
{
    if records.is_empty() {
        return Ok(records);
    }

    let target = Language::resolve_target(&options.target)?;
    let source = Language::resolve(&options.source)?;

    if source == target {
        debug!("Source and target are both {}, nothing to translate", target);
        return Ok(records);
    }

    let backend = select_backend(&records, options.mode, api).await;
    info!(
        "Translating {} records from {} to {} ({:?}, mode {})",
        records.len(),
        source,
        target,
        backend,
        options.mode
    );

    match backend {
        Backend::Api => {
            let api = api.ok_or_else(|| {
                TranslateError::Backend("API mode requires a credential".to_string())
            })?;
            translate_by_api(records, target, source, api).await
        }
        Backend::Browser => {
            translate_by_browser(records, target, source, launcher, &options.browser_options())
                .await
        }
    }
}

/// Blocking wrapper around [`translate`].
///
/// Builds its own runtime, so it must not be called from async code.
pub fn translate_blocking<R>(records: Vec<R>, options: &TranslateOptions) -> TranslateResult<Vec<R>>
where
    R: Translatable + Send,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| TranslateError::Infrastructure(format!("Failed to start runtime: {}", e)))?;
    runtime.block_on(translate(records, options))
}
