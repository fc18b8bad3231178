use crate::arxiv::{SearchQuery, DEFAULT_API_URL, DEFAULT_PAGE_SIZE};
use crate::translate::{ChromiumLauncher, TranslateOptions, TranslationMode, DEFAULT_TRANSLATOR_URL};
use anyhow::{bail, Context, Result};
use chrono::{Days, NaiveDate, Utc};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // arXiv search
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub arxiv_api_url: String,
    pub arxiv_max_results: usize,

    // Translation
    pub source_lang: String,
    pub target_lang: String,
    pub deepl_mode: TranslationMode,
    pub deepl_api_key: String,
    pub deepl_api_url: Option<String>,
    pub deepl_translator_url: String,
    pub n_concurrent: usize,
    /// Per-item browser timeout
    pub timeout: Duration,
    pub chromium_path: Option<PathBuf>,
    pub chromium_no_sandbox: bool,

    // Slack
    pub slack_webhook_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let today = Utc::now().date_naive();

        Ok(Self {
            // arXiv search
            categories: parse_list(
                &std::env::var("ARXIV_CATEGORIES").unwrap_or_else(|_| "astro-ph.*".to_string()),
            ),
            keywords: parse_list(&std::env::var("ARXIV_KEYWORDS").unwrap_or_default()),
            start_date: match std::env::var("START_DATE") {
                Ok(v) => parse_date(&v).context("Invalid START_DATE")?,
                Err(_) => days_ago(today, 3),
            },
            end_date: match std::env::var("END_DATE") {
                Ok(v) => parse_date(&v).context("Invalid END_DATE")?,
                Err(_) => days_ago(today, 2),
            },
            arxiv_api_url: std::env::var("ARXIV_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            arxiv_max_results: std::env::var("ARXIV_MAX_RESULTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PAGE_SIZE),

            // Translation
            source_lang: std::env::var("SOURCE_LANG").unwrap_or_else(|_| "en".to_string()),
            target_lang: std::env::var("TARGET_LANG").unwrap_or_else(|_| "ja".to_string()),
            deepl_mode: std::env::var("DEEPL_MODE")
                .unwrap_or_else(|_| "auto".to_string())
                .parse()
                .context("Invalid DEEPL_MODE")?,
            deepl_api_key: std::env::var("DEEPL_API_KEY").unwrap_or_default(),
            deepl_api_url: std::env::var("DEEPL_API_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            deepl_translator_url: std::env::var("DEEPL_TRANSLATOR_URL")
                .unwrap_or_else(|_| DEFAULT_TRANSLATOR_URL.to_string()),
            n_concurrent: std::env::var("N_CONCURRENT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            timeout: match std::env::var("TIMEOUT") {
                Ok(v) => parse_timeout(&v).context("Invalid TIMEOUT")?,
                Err(_) => Duration::from_secs(30),
            },
            chromium_path: std::env::var("CHROMIUM_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            chromium_no_sandbox: std::env::var("CHROMIUM_NO_SANDBOX")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),

            // Slack
            slack_webhook_url: std::env::var("SLACK_WEBHOOK_URL").unwrap_or_default(),
        })
    }

    pub fn search_query(&self) -> SearchQuery {
        SearchQuery {
            categories: self.categories.clone(),
            keywords: self.keywords.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }

    pub fn translate_options(&self) -> TranslateOptions {
        TranslateOptions {
            target: self.target_lang.clone(),
            source: self.source_lang.clone(),
            mode: self.deepl_mode,
            credential: self.deepl_api_key.clone(),
            api_url: self.deepl_api_url.clone(),
            translator_url: self.deepl_translator_url.clone(),
            concurrency: self.n_concurrent,
            timeout: self.timeout,
            chromium: ChromiumLauncher {
                executable: self.chromium_path.clone(),
                no_sandbox: self.chromium_no_sandbox,
            },
        }
    }
}

/// Split a comma-separated list, dropping empty items.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Could not parse {:?} as YYYY-MM-DD", value))
}

/// Parse a timeout given in (possibly fractional) seconds.
pub fn parse_timeout(value: &str) -> Result<Duration> {
    let seconds: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("Could not parse {:?} as seconds", value))?;
    timeout_from_secs(seconds)
}

/// Convert seconds to a timeout; it must be positive and finite.
pub fn timeout_from_secs(seconds: f64) -> Result<Duration> {
    if !(seconds > 0.0) {
        bail!("Timeout must be a positive number of seconds, got {}", seconds);
    }
    Duration::try_from_secs_f64(seconds)
        .with_context(|| format!("Timeout of {} seconds is out of range", seconds))
}

fn days_ago(today: NaiveDate, days: u64) -> NaiveDate {
    today.checked_sub_days(Days::new(days)).unwrap_or(today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "ARXIV_CATEGORIES",
        "ARXIV_KEYWORDS",
        "START_DATE",
        "END_DATE",
        "ARXIV_API_URL",
        "ARXIV_MAX_RESULTS",
        "SOURCE_LANG",
        "TARGET_LANG",
        "DEEPL_MODE",
        "DEEPL_API_KEY",
        "DEEPL_API_URL",
        "DEEPL_TRANSLATOR_URL",
        "N_CONCURRENT",
        "TIMEOUT",
        "CHROMIUM_PATH",
        "CHROMIUM_NO_SANDBOX",
        "SLACK_WEBHOOK_URL",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    // ==================== Defaults Tests ====================

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();
        let today = Utc::now().date_naive();

        assert_eq!(config.categories, vec!["astro-ph.*"]);
        assert!(config.keywords.is_empty());
        assert_eq!(config.start_date, days_ago(today, 3));
        assert_eq!(config.end_date, days_ago(today, 2));
        assert_eq!(config.arxiv_api_url, DEFAULT_API_URL);
        assert_eq!(config.arxiv_max_results, 100);
        assert_eq!(config.source_lang, "en");
        assert_eq!(config.target_lang, "ja");
        assert_eq!(config.deepl_mode, TranslationMode::Auto);
        assert_eq!(config.deepl_api_key, "");
        assert_eq!(config.deepl_api_url, None);
        assert_eq!(config.deepl_translator_url, DEFAULT_TRANSLATOR_URL);
        assert_eq!(config.n_concurrent, 2);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.chromium_path.is_none());
        assert!(!config.chromium_no_sandbox);
        assert_eq!(config.slack_webhook_url, "");
    }

    // ==================== Override Tests ====================

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("ARXIV_CATEGORIES", "astro-ph.GA, astro-ph.IM");
        std::env::set_var("ARXIV_KEYWORDS", "galaxy,,quasar");
        std::env::set_var("START_DATE", "2024-01-01");
        std::env::set_var("END_DATE", "2024-01-02");
        std::env::set_var("DEEPL_MODE", "browser");
        std::env::set_var("N_CONCURRENT", "5");
        std::env::set_var("TIMEOUT", "12.5");
        std::env::set_var("CHROMIUM_NO_SANDBOX", "true");

        let config = Config::from_env().unwrap();
        clear_env();

        assert_eq!(config.categories, vec!["astro-ph.GA", "astro-ph.IM"]);
        assert_eq!(config.keywords, vec!["galaxy", "quasar"]);
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(config.end_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(config.deepl_mode, TranslationMode::Browser);
        assert_eq!(config.n_concurrent, 5);
        assert_eq!(config.timeout, Duration::from_millis(12_500));
        assert!(config.chromium_no_sandbox);
    }

    #[test]
    #[serial]
    fn test_invalid_mode_fails() {
        clear_env();
        std::env::set_var("DEEPL_MODE", "carrier-pigeon");
        let result = Config::from_env();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_invalid_date_fails() {
        clear_env();
        std::env::set_var("START_DATE", "yesterday");
        let result = Config::from_env();
        clear_env();

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_unparseable_concurrency_falls_back() {
        clear_env();
        std::env::set_var("N_CONCURRENT", "many");
        let config = Config::from_env().unwrap();
        clear_env();

        assert_eq!(config.n_concurrent, 2);
    }

    #[test]
    #[serial]
    fn test_invalid_timeout_fails() {
        for value in ["soon", "-5", "0", "NaN", "inf", "1e30"] {
            clear_env();
            std::env::set_var("TIMEOUT", value);
            let result = Config::from_env();
            clear_env();

            assert!(result.is_err(), "TIMEOUT={} was accepted", value);
        }
    }

    // ==================== Conversion Tests ====================

    #[test]
    #[serial]
    fn test_translate_options() {
        clear_env();
        std::env::set_var("DEEPL_API_KEY", "key:fx");
        std::env::set_var("DEEPL_API_URL", "http://localhost:1234");
        std::env::set_var("CHROMIUM_PATH", "/usr/bin/chromium");
        let config = Config::from_env().unwrap();
        clear_env();

        let options = config.translate_options();
        assert_eq!(options.target, "ja");
        assert_eq!(options.source, "en");
        assert_eq!(options.credential, "key:fx");
        assert_eq!(options.api_url.as_deref(), Some("http://localhost:1234"));
        assert_eq!(options.concurrency, 2);
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(
            options.chromium.executable,
            Some(PathBuf::from("/usr/bin/chromium"))
        );
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(timeout_from_secs(0.75).unwrap(), Duration::from_millis(750));
        assert!(timeout_from_secs(-1.0).is_err());
        assert!(timeout_from_secs(f64::NAN).is_err());
        assert!(timeout_from_secs(f64::INFINITY).is_err());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout(" 12.5 ").unwrap(), Duration::from_millis(12_500));
        assert!(parse_timeout("twelve").is_err());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list(""), Vec::<String>::new());
        assert_eq!(parse_list(" a , b,"), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date("2024-02-30").is_err());
    }
}
