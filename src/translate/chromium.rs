//! Headless Chromium backing for the browser translation driver.

use crate::translate::browser::{BrowserLauncher, BrowserSession, TranslatorPage, POLL_INTERVAL};
use crate::translate::error::{TranslateError, TranslateResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

/// Source text box of the translator page.
const SOURCE_SELECTOR: &str = r#"d-textarea[data-testid="translator-source-input"]"#;

/// Target text box of the translator page.
const TARGET_SELECTOR: &str = r#"d-textarea[data-testid="translator-target-input"]"#;

/// Launches a local Chromium through the DevTools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    /// Chromium binary; detected on the system when unset
    pub executable: Option<PathBuf>,
    /// Disable the Chromium sandbox (needed when running as root in containers)
    pub no_sandbox: bool,
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self, action_timeout: Duration) -> TranslateResult<ChromiumSession> {
        let mut builder = BrowserConfig::builder().request_timeout(action_timeout);
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(TranslateError::Infrastructure)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| TranslateError::Infrastructure(format!("Failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler stopped: {}", e);
                    break;
                }
            }
        });

        debug!("Launched headless browser");
        Ok(ChromiumSession {
            browser,
            handler,
            action_timeout,
        })
    }
}

/// A running Chromium instance and its event loop.
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    action_timeout: Duration,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    type Page = ChromiumPage;

    async fn open_page(&self, url: &str) -> TranslateResult<ChromiumPage> {
        let page = timeout(self.action_timeout, self.browser.new_page(url))
            .await
            .map_err(|_| TranslateError::Infrastructure(format!("Timed out opening {}", url)))?
            .map_err(|e| TranslateError::Infrastructure(format!("Failed to open {}: {}", url, e)))?;

        // The translator is rendered client-side; wait for its input box.
        let deadline = Instant::now() + self.action_timeout;
        while page.find_element(SOURCE_SELECTOR).await.is_err() {
            if Instant::now() >= deadline {
                // Best effort: the session close tears it down anyway.
                let _ = page.close().await;
                return Err(TranslateError::Infrastructure(format!(
                    "Translator input did not appear on {}",
                    url
                )));
            }
            sleep(POLL_INTERVAL).await;
        }

        Ok(ChromiumPage {
            page,
            action_timeout: self.action_timeout,
        })
    }

    async fn close(mut self) -> TranslateResult<()> {
        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| TranslateError::Infrastructure(format!("Failed to close browser: {}", e)));
        let _ = self.browser.wait().await;
        self.handler.abort();
        closed
    }
}

/// One translator tab.
pub struct ChromiumPage {
    page: Page,
    action_timeout: Duration,
}

impl ChromiumPage {
    /// Run a page action under the session's action timeout.
    async fn action<T, E, F>(&self, name: &str, fut: F) -> TranslateResult<T>
    where
        F: Future<Output = Result<T, E>> + Send,
        E: std::fmt::Display,
    {
        timeout(self.action_timeout, fut)
            .await
            .map_err(|_| TranslateError::Action(format!("{} timed out", name)))?
            .map_err(|e| TranslateError::Action(format!("{} failed: {}", name, e)))
    }

    async fn eval_bool(&self, name: &str, script: String) -> TranslateResult<bool> {
        let result = self.action(name, self.page.evaluate(script)).await?;
        result
            .into_value::<bool>()
            .map_err(|e| TranslateError::Action(format!("{} returned no value: {}", name, e)))
    }
}

/// Script that empties the editable part of `selector` and focuses it.
fn clear_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const host = document.querySelector({selector});
  if (!host) return false;
  const el = host.querySelector('[contenteditable]') ?? host;
  if ('value' in el) {{ el.value = ''; }} else {{ el.textContent = ''; }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.focus();
  return true;
}})()"#,
        selector = js_string(selector)
    )
}

/// Script that focuses the editable part of `selector`.
fn focus_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const host = document.querySelector({selector});
  if (!host) return false;
  (host.querySelector('[contenteditable]') ?? host).focus();
  return true;
}})()"#,
        selector = js_string(selector)
    )
}

/// Script that returns the JSON-encoded text of `selector`, or `null`.
fn read_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  return JSON.stringify(el ? el.innerText : null);
}})()"#,
        selector = js_string(selector)
    )
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[async_trait]
impl TranslatorPage for ChromiumPage {
    async fn clear_source(&self) -> TranslateResult<()> {
        if self.eval_bool("clear", clear_script(SOURCE_SELECTOR)).await? {
            Ok(())
        } else {
            Err(TranslateError::Action("source box not found".to_string()))
        }
    }

    async fn fill_source(&self, text: &str) -> TranslateResult<()> {
        if !self.eval_bool("focus", focus_script(SOURCE_SELECTOR)).await? {
            return Err(TranslateError::Action("source box not found".to_string()));
        }
        self.action("fill", self.page.execute(InsertTextParams::new(text)))
            .await
            .map(|_| ())
    }

    async fn target_text(&self) -> TranslateResult<Option<String>> {
        let result = self
            .action("read", self.page.evaluate(read_script(TARGET_SELECTOR)))
            .await?;
        let encoded = result
            .into_value::<String>()
            .map_err(|e| TranslateError::Action(format!("read returned no value: {}", e)))?;
        serde_json::from_str::<Option<String>>(&encoded)
            .map_err(|e| TranslateError::Action(format!("read returned bad JSON: {}", e)))
    }

    async fn close(self) -> TranslateResult<()> {
        self.page
            .close()
            .await
            .map_err(|e| TranslateError::Action(format!("Failed to close page: {}", e)))
    }
}
