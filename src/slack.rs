use crate::article::Article;
use crate::retry::{with_retry_if, RetryConfig};
use anyhow::{bail, Result};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Incoming-webhook message with a Block Kit layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    /// Notification fallback text
    pub text: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { text: Text },
    Section { text: Text },
    Actions { elements: Vec<Element> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Text {
    PlainText { text: String },
    Mrkdwn { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Button {
        action_id: String,
        url: String,
        text: Text,
    },
}

impl Text {
    fn plain(text: impl Into<String>) -> Self {
        Text::PlainText { text: text.into() }
    }

    fn mrkdwn(text: impl Into<String>) -> Self {
        Text::Mrkdwn { text: text.into() }
    }
}

/// Slack rejects header blocks whose text is longer than this.
const HEADER_MAX_CHARS: usize = 150;

fn header_text(title: &str) -> String {
    if title.chars().count() <= HEADER_MAX_CHARS {
        return title.to_string();
    }
    let mut text: String = title.chars().take(HEADER_MAX_CHARS - 1).collect();
    text.push('…');
    text
}

fn button(action_id: &str, label: &str, url: String) -> Element {
    Element::Button {
        action_id: action_id.to_string(),
        url,
        text: Text::plain(label),
    }
}

/// Build the Slack message for an article.
///
/// The header and summary come from the (translated) article; title,
/// authors and links from the article before translation.
pub fn to_payload(article: &Article) -> Payload {
    let original = article.source();

    Payload {
        text: article.title.clone(),
        blocks: vec![
            Block::Header {
                text: Text::plain(header_text(&article.title)),
            },
            Block::Section {
                text: Text::mrkdwn(format!("*Title:* {}", original.title)),
            },
            Block::Section {
                text: Text::mrkdwn(format!("*Authors:* {}", original.authors.join(", "))),
            },
            Block::Section {
                text: Text::mrkdwn(format!("*Summary:* {}", article.summary)),
            },
            Block::Actions {
                elements: vec![
                    button("view_arxiv", "View arXiv", original.arxiv_url.clone()),
                    button("view_pdf", "View PDF", original.arxiv_pdf_url()),
                ],
            },
        ],
    }
}

/// Outcome of posting a batch of articles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostSummary {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
enum PostError {
    #[error("Slack webhook error ({0}): {1}")]
    Status(StatusCode, String),
    #[error("Failed to send request to Slack: {0}")]
    Transport(#[from] reqwest::Error),
}

impl PostError {
    fn is_retryable(&self) -> bool {
        match self {
            PostError::Status(status, _) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            PostError::Transport(_) => true,
        }
    }
}

async fn send(client: &reqwest::Client, webhook_url: &str, payload: &Payload) -> Result<(), PostError> {
    let response = client.post(webhook_url).json(payload).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(PostError::Status(status, body));
    }

    Ok(())
}

/// Post articles to a Slack incoming webhook with the default retry policy.
pub async fn post(
    client: &reqwest::Client,
    articles: &[Article],
    webhook_url: &str,
    dry_run: bool,
) -> Result<PostSummary> {
    post_with_retry(client, articles, webhook_url, dry_run, &RetryConfig::webhook()).await
}

/// Post articles one by one. A failed article is logged and counted; the
/// rest are still posted.
pub async fn post_with_retry(
    client: &reqwest::Client,
    articles: &[Article],
    webhook_url: &str,
    dry_run: bool,
    retry: &RetryConfig,
) -> Result<PostSummary> {
    if webhook_url.is_empty() && !dry_run {
        bail!("Slack webhook URL is not set");
    }

    let mut summary = PostSummary::default();

    for article in articles {
        let payload = to_payload(article);

        if dry_run {
            debug!(
                "Dry run, not posting {}: {}",
                article.arxiv_url,
                serde_json::to_string(&payload).unwrap_or_default()
            );
            continue;
        }

        let result = with_retry_if(
            retry,
            "Slack post",
            || send(client, webhook_url, &payload),
            PostError::is_retryable,
        )
        .await;

        match result {
            Ok(()) => {
                debug!("Posted {}", article.arxiv_url);
                summary.sent += 1;
            }
            Err(e) => {
                warn!("Failed to post {}: {}", article.arxiv_url, e);
                summary.failed += 1;
            }
        }
    }

    if !dry_run {
        info!(
            "Slack: {} posted, {} failed",
            summary.sent, summary.failed
        );
    }

    Ok(summary)
}
