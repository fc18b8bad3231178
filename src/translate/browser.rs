//! Browser translation driver.
//!
//! The batch is split into contiguous slices, one per page. Pages share a
//! single browser session and run concurrently; within a page items are
//! processed strictly one after another since the page's source and target
//! boxes hold a single text at a time.
//!
//! Per-item failures (timeouts, failed actions, unparsable output) keep the
//! original record. Infrastructure failures (launching the browser, opening
//! a page, losing it mid-slice) abort the batch.
//!
//! The target box lags behind the source box, so right after a new fill it
//! may still show the previous item's translation. Reads equal to that
//! translation are skipped unless both items have the same source text.

use crate::translate::error::{TranslateError, TranslateResult};
use crate::translate::language::Language;
use crate::translate::record::{preview, replace_or_keep, Translatable};
use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Interval between two reads of the target box.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Width of the text preview logged for untranslated items.
const PREVIEW_WIDTH: usize = 50;

/// A page of the translator UI.
#[async_trait]
pub trait TranslatorPage: Send + Sync + Sized {
    /// Empty the source text box.
    async fn clear_source(&self) -> TranslateResult<()>;

    /// Put `text` into the source text box.
    async fn fill_source(&self, text: &str) -> TranslateResult<()>;

    /// Current content of the target box (`None` if the box is missing).
    async fn target_text(&self) -> TranslateResult<Option<String>>;

    async fn close(self) -> TranslateResult<()>;
}

/// A running browser shared by all pages of a batch.
#[async_trait]
pub trait BrowserSession: Send + Sync + Sized {
    type Page: TranslatorPage;

    /// Open a new page and navigate it to `url`.
    async fn open_page(&self, url: &str) -> TranslateResult<Self::Page>;

    async fn close(self) -> TranslateResult<()>;
}

/// Starts browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    /// Launch a browser whose page actions time out after `action_timeout`.
    async fn launch(&self, action_timeout: Duration) -> TranslateResult<Self::Session>;
}

/// Settings of the browser driver.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Translator page URL without the language fragment
    pub translator_url: String,
    /// Maximum number of pages working in parallel
    pub concurrency: usize,
    /// Per-item time budget, also the default timeout of page actions
    pub timeout: Duration,
}

/// Translator URL for a language pair: `{base}#{source}/{target}/`.
pub fn translator_url(base: &str, source: Language, target: Language) -> String {
    format!(
        "{}#{}/{}/",
        base.trim_end_matches('/'),
        source.code(),
        target.code()
    )
}

/// Translate a batch by driving translator pages in a headless browser.
pub async fn translate_by_browser<R, L>(
    records: Vec<R>,
    target: Language,
    source: Language,
    launcher: &L,
    options: &BrowserOptions,
) -> TranslateResult<Vec<R>>
where
    R: Translatable + Send,
    L: BrowserLauncher,
{
    if records.is_empty() {
        return Ok(records);
    }

    let concurrency = options.concurrency.clamp(1, records.len());
    let url = translator_url(&options.translator_url, source, target);
    info!(
        "Translating {} records via browser ({} pages, {} -> {})",
        records.len(),
        concurrency,
        source,
        target
    );

    let session = launcher.launch(options.timeout).await?;

    let slices = divide(records, concurrency);
    let outcomes = join_all(
        slices
            .into_iter()
            .map(|slice| translate_slice(&session, &url, slice, options.timeout)),
    )
    .await;

    if let Err(e) = session.close().await {
        warn!("Failed to close browser: {}", e);
    }

    let mut results = Vec::new();
    for outcome in outcomes {
        results.extend(outcome?);
    }
    Ok(results)
}

/// Translate one slice sequentially on its own page.
async fn translate_slice<R, S>(
    session: &S,
    url: &str,
    slice: Vec<R>,
    timeout: Duration,
) -> TranslateResult<Vec<R>>
where
    R: Translatable + Send,
    S: BrowserSession,
{
    let page = session.open_page(url).await?;

    let mut results = Vec::with_capacity(slice.len());
    let mut previous = None;
    let mut outcome = Ok(());
    for record in slice {
        match translate_item(&page, record, &mut previous, timeout).await {
            Ok(record) => results.push(record),
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    if let Err(e) = page.close().await {
        warn!("Failed to close page: {}", e);
    }
    outcome.map(|()| results)
}

/// The last `(source, translation)` pair read from a page.
type Previous = Option<(String, String)>;

/// Translate one record. Failures confined to the item pass it through
/// untranslated; anything else is returned and aborts the slice.
async fn translate_item<R, P>(
    page: &P,
    record: R,
    previous: &mut Previous,
    timeout: Duration,
) -> TranslateResult<R>
where
    R: Translatable,
    P: TranslatorPage,
{
    let original = record.render();
    if original.is_empty() {
        return Ok(record);
    }

    // The target box still shows the previous output until the page catches
    // up with the new source; that text must not be taken for this item.
    let stale = previous
        .as_ref()
        .filter(|(source, _)| *source != original)
        .map(|(_, output)| output.clone());

    match read_translation(page, &original, stale.as_deref(), timeout).await {
        Ok(translated) => {
            *previous = Some((original.clone(), translated.clone()));
            Ok(replace_or_keep(record, &original, &translated).0)
        }
        Err(e) if e.is_item_failure() => {
            warn!(
                "Failed to translate: {:?} ({})",
                preview(&original, PREVIEW_WIDTH),
                e
            );
            Ok(record)
        }
        Err(e) => Err(e),
    }
}

/// Submit `original` and poll the target box until a non-blank result other
/// than `stale` shows up.
async fn read_translation<P: TranslatorPage>(
    page: &P,
    original: &str,
    stale: Option<&str>,
    timeout: Duration,
) -> TranslateResult<String> {
    page.clear_source().await?;
    page.fill_source(original).await?;

    for attempt in 0..poll_attempts(timeout) {
        sleep(POLL_INTERVAL).await;

        let Some(content) = page.target_text().await? else {
            continue;
        };

        let content = content.trim();
        if content.is_empty() {
            continue;
        }

        let content = collapse_newlines(content);
        if stale == Some(content.as_str()) {
            debug!("Target still shows the previous translation");
            continue;
        }

        debug!("Translation appeared after {} polls", attempt + 1);
        return Ok(content);
    }

    Err(TranslateError::ItemTimeout)
}

/// Number of polls that fit in `timeout`.
pub fn poll_attempts(timeout: Duration) -> u32 {
    (timeout.as_secs_f64() / POLL_INTERVAL.as_secs_f64()).floor() as u32
}

fn collapse_newlines(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut previous_newline = false;
    for c in text.chars() {
        if c == '\n' {
            if !previous_newline {
                collapsed.push(c);
            }
            previous_newline = true;
        } else {
            collapsed.push(c);
            previous_newline = false;
        }
    }
    collapsed
}

/// Split `items` into `parts` contiguous slices whose sizes differ by at most one.
///
/// Earlier slices take the remainder, so flattening restores the input order.
pub fn divide<T>(items: Vec<T>, parts: usize) -> Vec<Vec<T>> {
    let parts = parts.max(1);
    let base = items.len() / parts;
    let extra = items.len() % parts;

    let mut iter = items.into_iter();
    (0..parts)
        .map(|index| {
            let size = base + usize::from(index < extra);
            iter.by_ref().take(size).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::error::RecordError;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    // ==================== Stub Browser ====================

    /// How the stub translator answers a source text.
    #[derive(Clone, Copy)]
    enum Answer {
        /// Uppercase after `polls` reads, padded with blank lines
        Upper { polls: usize },
        /// Keep showing the previous output for one read after each fill
        Lagging,
        /// Never produce any output
        Never,
        /// Lose the browser on the first read
        Crash,
    }

    #[derive(Default)]
    struct Counters {
        launched: AtomicUsize,
        browsers_closed: AtomicUsize,
        pages_opened: AtomicUsize,
        pages_closed: AtomicUsize,
        open_now: AtomicUsize,
        max_open: AtomicUsize,
        fills: AtomicUsize,
        urls: Mutex<Vec<String>>,
    }

    struct StubLauncher {
        counters: Arc<Counters>,
        answer: Answer,
        fail_launch: bool,
        fail_open_after: Option<usize>,
        hang_on: Option<&'static str>,
    }

    impl StubLauncher {
        fn new(answer: Answer) -> Self {
            Self {
                counters: Arc::new(Counters::default()),
                answer,
                fail_launch: false,
                fail_open_after: None,
                hang_on: None,
            }
        }
    }

    struct StubSession {
        counters: Arc<Counters>,
        answer: Answer,
        fail_open_after: Option<usize>,
        hang_on: Option<&'static str>,
    }

    struct StubPage {
        counters: Arc<Counters>,
        answer: Answer,
        hang_on: Option<&'static str>,
        source: Mutex<String>,
        shown: Mutex<String>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl BrowserLauncher for StubLauncher {
        type Session = StubSession;

        async fn launch(&self, _action_timeout: Duration) -> TranslateResult<StubSession> {
            if self.fail_launch {
                return Err(TranslateError::Infrastructure("no chromium".into()));
            }
            self.counters.launched.fetch_add(1, Ordering::SeqCst);
            Ok(StubSession {
                counters: self.counters.clone(),
                answer: self.answer,
                fail_open_after: self.fail_open_after,
                hang_on: self.hang_on,
            })
        }
    }

    #[async_trait]
    impl BrowserSession for StubSession {
        type Page = StubPage;

        async fn open_page(&self, url: &str) -> TranslateResult<StubPage> {
            let opened = self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
            if self.fail_open_after.is_some_and(|limit| opened >= limit) {
                return Err(TranslateError::Infrastructure("navigation failed".into()));
            }
            self.counters.urls.lock().unwrap().push(url.to_string());
            let now = self.counters.open_now.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_open.fetch_max(now, Ordering::SeqCst);
            Ok(StubPage {
                counters: self.counters.clone(),
                answer: self.answer,
                hang_on: self.hang_on,
                source: Mutex::new(String::new()),
                shown: Mutex::new(String::new()),
                reads: AtomicUsize::new(0),
            })
        }

        async fn close(self) -> TranslateResult<()> {
            self.counters.browsers_closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl TranslatorPage for StubPage {
        async fn clear_source(&self) -> TranslateResult<()> {
            self.source.lock().unwrap().clear();
            Ok(())
        }

        async fn fill_source(&self, text: &str) -> TranslateResult<()> {
            if self.hang_on == Some(text) {
                return Err(TranslateError::Action("fill timed out".into()));
            }
            self.counters.fills.fetch_add(1, Ordering::SeqCst);
            *self.source.lock().unwrap() = text.to_string();
            self.reads.store(0, Ordering::SeqCst);
            Ok(())
        }

        async fn target_text(&self) -> TranslateResult<Option<String>> {
            let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            let source = self.source.lock().unwrap().clone();
            match self.answer {
                Answer::Upper { polls } if reads >= polls => {
                    Ok(Some(format!("\n {} \n", source.to_uppercase().replace('\n', "\n\n\n"))))
                }
                Answer::Upper { .. } => Ok(Some("   ".to_string())),
                Answer::Lagging => {
                    let mut shown = self.shown.lock().unwrap();
                    if reads > 1 || shown.is_empty() {
                        *shown = source.to_uppercase();
                    }
                    Ok(Some(shown.clone()))
                }
                Answer::Never => Ok(None),
                Answer::Crash => Err(TranslateError::Infrastructure("target closed".into())),
            }
        }

        async fn close(self) -> TranslateResult<()> {
            self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
            self.counters.open_now.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Record that refuses translations without exactly one newline.
    #[derive(Debug, Clone, PartialEq)]
    struct TwoLine(String);

    impl Translatable for TwoLine {
        fn render(&self) -> String {
            self.0.clone()
        }

        fn with_replacement(&self, _original: &str, translated: &str) -> Result<Self, RecordError> {
            let found = translated.matches('\n').count();
            if found != 1 {
                return Err(RecordError::SeparatorMismatch { expected: 1, found });
            }
            Ok(TwoLine(translated.to_string()))
        }
    }

    fn options(concurrency: usize) -> BrowserOptions {
        BrowserOptions {
            translator_url: "https://translator.test/".to_string(),
            concurrency,
            timeout: Duration::from_secs(3),
        }
    }

    fn tagged(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("item {}", i)).collect()
    }

    // ==================== Helper Tests ====================

    #[test]
    fn test_translator_url() {
        assert_eq!(
            translator_url("https://www.deepl.com/translator", Language::ENGLISH, Language::JAPANESE),
            "https://www.deepl.com/translator#en/ja/"
        );
        assert_eq!(
            translator_url("https://x.test/", Language::AUTO, Language::ENGLISH),
            "https://x.test#auto/en/"
        );
    }

    #[test]
    fn test_poll_attempts() {
        assert_eq!(poll_attempts(Duration::from_secs(30)), 60);
        assert_eq!(poll_attempts(Duration::from_millis(1250)), 2);
        assert_eq!(poll_attempts(Duration::from_millis(400)), 0);
    }

    #[test]
    fn test_collapse_newlines() {
        assert_eq!(collapse_newlines("a\n\n\nb\nc"), "a\nb\nc");
        assert_eq!(collapse_newlines("no breaks"), "no breaks");
    }

    #[test]
    fn test_divide_near_equal_contiguous() {
        let parts = divide((1..=7).collect::<Vec<_>>(), 3);
        assert_eq!(parts, vec![vec![1, 2, 3], vec![4, 5], vec![6, 7]]);
    }

    #[test]
    fn test_divide_more_parts_than_items() {
        let parts = divide(vec![1, 2], 4);
        assert_eq!(parts, vec![vec![1], vec![2], vec![], vec![]]);
    }

    proptest! {
        #[test]
        fn prop_divide_preserves_order_and_balance(len in 0usize..200, parts in 1usize..20) {
            let items: Vec<usize> = (0..len).collect();
            let slices = divide(items.clone(), parts);

            prop_assert_eq!(slices.len(), parts);
            let sizes: Vec<usize> = slices.iter().map(Vec::len).collect();
            let max = sizes.iter().max().copied().unwrap_or(0);
            let min = sizes.iter().min().copied().unwrap_or(0);
            prop_assert!(max - min <= 1);

            let flattened: Vec<usize> = slices.into_iter().flatten().collect();
            prop_assert_eq!(flattened, items);
        }
    }

    // ==================== Driver Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_translates_all_items_in_order() {
        let launcher = StubLauncher::new(Answer::Upper { polls: 2 });
        let batch = tagged(7);

        let result = translate_by_browser(
            batch.clone(),
            Language::JAPANESE,
            Language::ENGLISH,
            &launcher,
            &options(3),
        )
        .await
        .unwrap();

        let expected: Vec<String> = batch.iter().map(|s| s.to_uppercase()).collect();
        assert_eq!(result, expected);
        assert_eq!(launcher.counters.launched.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.counters.pages_opened.load(Ordering::SeqCst), 3);
        assert_eq!(launcher.counters.pages_closed.load(Ordering::SeqCst), 3);
        assert_eq!(launcher.counters.browsers_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigates_every_page_to_language_pair() {
        let launcher = StubLauncher::new(Answer::Upper { polls: 1 });
        translate_by_browser(tagged(4), Language::JAPANESE, Language::ENGLISH, &launcher, &options(2))
            .await
            .unwrap();

        let urls = launcher.counters.urls.lock().unwrap().clone();
        assert_eq!(urls.len(), 2);
        assert!(urls.iter().all(|u| u == "https://translator.test#en/ja/"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_clamped_to_batch_size() {
        let launcher = StubLauncher::new(Answer::Upper { polls: 1 });
        translate_by_browser(tagged(2), Language::JAPANESE, Language::ENGLISH, &launcher, &options(10))
            .await
            .unwrap();

        assert_eq!(launcher.counters.pages_opened.load(Ordering::SeqCst), 2);
        assert!(launcher.counters.max_open.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_concurrency_uses_one_page() {
        let launcher = StubLauncher::new(Answer::Upper { polls: 1 });
        let result =
            translate_by_browser(tagged(3), Language::JAPANESE, Language::ENGLISH, &launcher, &options(0))
                .await
                .unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(launcher.counters.pages_opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_passes_through_without_fill() {
        let launcher = StubLauncher::new(Answer::Upper { polls: 1 });
        let batch = vec!["hello".to_string(), String::new()];

        let result = translate_by_browser(batch, Language::JAPANESE, Language::ENGLISH, &launcher, &options(1))
            .await
            .unwrap();

        assert_eq!(result, vec!["HELLO".to_string(), String::new()]);
        assert_eq!(launcher.counters.fills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_output_is_not_taken_for_next_item() {
        let launcher = StubLauncher::new(Answer::Lagging);
        let batch = vec!["first".to_string(), "second".to_string(), "third".to_string()];

        let result = translate_by_browser(batch, Language::JAPANESE, Language::ENGLISH, &launcher, &options(1))
            .await
            .unwrap();

        assert_eq!(result, vec!["FIRST", "SECOND", "THIRD"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_source_accepts_same_output() {
        let launcher = StubLauncher::new(Answer::Lagging);
        let batch = vec!["again".to_string(), "again".to_string()];

        let result = translate_by_browser(batch, Language::JAPANESE, Language::ENGLISH, &launcher, &options(1))
            .await
            .unwrap();

        assert_eq!(result, vec!["AGAIN", "AGAIN"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_passes_item_through() {
        let launcher = StubLauncher::new(Answer::Never);
        let batch = tagged(3);

        let start = tokio::time::Instant::now();
        let result = translate_by_browser(
            batch.clone(),
            Language::JAPANESE,
            Language::ENGLISH,
            &launcher,
            &options(3),
        )
        .await
        .unwrap();

        assert_eq!(result, batch);
        // 6 polls of 0.5s per page, pages in parallel
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "got {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(6), "pages ran sequentially: {:?}", elapsed);
        assert_eq!(launcher.counters.browsers_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_action_only_affects_its_item() {
        let mut launcher = StubLauncher::new(Answer::Upper { polls: 1 });
        launcher.hang_on = Some("item 1");

        let result = translate_by_browser(tagged(3), Language::JAPANESE, Language::ENGLISH, &launcher, &options(1))
            .await
            .unwrap();

        assert_eq!(result, vec!["ITEM 0", "item 1", "ITEM 2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_failure_passes_item_through() {
        let launcher = StubLauncher::new(Answer::Upper { polls: 1 });
        let batch = vec![
            TwoLine("title\nsummary".to_string()),
            TwoLine("no separator".to_string()),
        ];

        let result = translate_by_browser(batch, Language::JAPANESE, Language::ENGLISH, &launcher, &options(2))
            .await
            .unwrap();

        assert_eq!(
            result,
            vec![
                TwoLine("TITLE\nSUMMARY".to_string()),
                TwoLine("no separator".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_aborts_batch() {
        let mut launcher = StubLauncher::new(Answer::Upper { polls: 1 });
        launcher.fail_launch = true;

        let result =
            translate_by_browser(tagged(2), Language::JAPANESE, Language::ENGLISH, &launcher, &options(2)).await;

        assert!(matches!(result, Err(TranslateError::Infrastructure(_))));
        assert_eq!(launcher.counters.pages_opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_failure_aborts_batch_but_cleans_up() {
        let mut launcher = StubLauncher::new(Answer::Upper { polls: 1 });
        launcher.fail_open_after = Some(1);

        let result =
            translate_by_browser(tagged(4), Language::JAPANESE, Language::ENGLISH, &launcher, &options(2)).await;

        assert!(matches!(result, Err(TranslateError::Infrastructure(_))));
        // the page that did open is closed, and so is the browser
        assert_eq!(launcher.counters.pages_closed.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.counters.browsers_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_browser_aborts_batch_instead_of_passing_through() {
        let launcher = StubLauncher::new(Answer::Crash);

        let result =
            translate_by_browser(tagged(4), Language::JAPANESE, Language::ENGLISH, &launcher, &options(2)).await;

        assert!(matches!(result, Err(TranslateError::Infrastructure(_))));
        // one fill per slice, then the slice stops
        assert_eq!(launcher.counters.fills.load(Ordering::SeqCst), 2);
        assert_eq!(launcher.counters.pages_closed.load(Ordering::SeqCst), 2);
        assert_eq!(launcher.counters.browsers_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_never_launches() {
        let launcher = StubLauncher::new(Answer::Upper { polls: 1 });
        let result = translate_by_browser(
            Vec::<String>::new(),
            Language::JAPANESE,
            Language::ENGLISH,
            &launcher,
            &options(2),
        )
        .await
        .unwrap();

        assert!(result.is_empty());
        assert_eq!(launcher.counters.launched.load(Ordering::SeqCst), 0);
    }
}
