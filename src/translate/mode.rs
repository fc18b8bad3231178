//! Translation mode and per-batch backend selection.

use crate::translate::deepl::TranslationApi;
use crate::translate::error::TranslateError;
use crate::translate::record::Translatable;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How a batch should be delivered to the translation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationMode {
    /// Decide per batch from the credential and its remaining quota
    #[default]
    Auto,
    /// Hosted API (requires a credential)
    Api,
    /// Headless browser driving the public translator page
    Browser,
}

/// The concrete driver a batch is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Api,
    Browser,
}

impl FromStr for TranslationMode {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(TranslationMode::Auto),
            "api" => Ok(TranslationMode::Api),
            "browser" => Ok(TranslationMode::Browser),
            _ => Err(TranslateError::UnsupportedMode(s.to_string())),
        }
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TranslationMode::Auto => "auto",
            TranslationMode::Api => "api",
            TranslationMode::Browser => "browser",
        };
        f.write_str(name)
    }
}

/// Total number of characters the batch would consume from the quota.
pub fn batch_cost<R: Translatable>(records: &[R]) -> u64 {
    records
        .iter()
        .map(|record| record.render().chars().count() as u64)
        .sum()
}

/// Pick the backend for a whole batch.
///
/// Explicit modes are returned unchanged. In `Auto` mode: no credential
/// (`api` is `None`) or a rejected credential selects the browser; a known
/// quota that cannot cover the batch selects the browser; otherwise the API.
pub async fn select_backend<R: Translatable>(
    records: &[R],
    mode: TranslationMode,
    api: Option<&dyn TranslationApi>,
) -> Backend {
    match mode {
        TranslationMode::Api => return Backend::Api,
        TranslationMode::Browser => return Backend::Browser,
        TranslationMode::Auto => {}
    }

    let Some(api) = api else {
        debug!("No API credential configured, using browser");
        return Backend::Browser;
    };

    let usage = match api.usage().await {
        Ok(usage) => usage,
        Err(TranslateError::Authorization(reason)) => {
            warn!("API credential rejected ({}), falling back to browser", reason);
            return Backend::Browser;
        }
        Err(e) => {
            warn!("Quota check failed ({}), falling back to browser", e);
            return Backend::Browser;
        }
    };

    match usage.remaining() {
        Some(remaining) => {
            let cost = batch_cost(records);
            if remaining < cost {
                info!(
                    "Insufficient API quota ({} remaining, {} needed), using browser",
                    remaining, cost
                );
                Backend::Browser
            } else {
                debug!("API quota sufficient ({} remaining, {} needed)", remaining, cost);
                Backend::Api
            }
        }
        None => {
            debug!("API quota is unbounded, using API");
            Backend::Api
        }
    }
}
