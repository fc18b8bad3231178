use anyhow::{bail, Result};
use arxiv_post::arxiv::ArxivClient;
use arxiv_post::config::{parse_date, parse_list, timeout_from_secs, Config};
use arxiv_post::{slack, translate};
use clap::{Args, Parser, Subcommand};
use tracing::info;

/// Translate and post newly published arXiv articles
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search, translate and post articles to a Slack incoming webhook
    Slack(SlackArgs),
}

/// Every option falls back to its environment variable, then to the default.
#[derive(Args, Debug, Default)]
struct SlackArgs {
    /// Comma-separated arXiv categories (e.g. astro-ph.GA,astro-ph.IM)
    #[arg(long)]
    categories: Option<String>,

    /// Comma-separated keywords searched in abstracts
    #[arg(long)]
    keywords: Option<String>,

    /// Start of the submission window (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,

    /// End of the submission window (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<String>,

    /// Language of the articles ("auto" to detect)
    #[arg(long)]
    source_lang: Option<String>,

    /// Language to translate into
    #[arg(long)]
    target_lang: Option<String>,

    /// Translation mode: auto, api or browser
    #[arg(long)]
    deepl_mode: Option<String>,

    /// DeepL API key
    #[arg(long)]
    deepl_api_key: Option<String>,

    /// Number of browser pages working in parallel
    #[arg(long)]
    n_concurrent: Option<usize>,

    /// Per-article browser timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Slack incoming webhook URL
    #[arg(long)]
    webhook_url: Option<String>,

    /// Log payloads instead of posting them
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl SlackArgs {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(v) = &self.categories {
            config.categories = parse_list(v);
        }
        if let Some(v) = &self.keywords {
            config.keywords = parse_list(v);
        }
        if let Some(v) = &self.start_date {
            config.start_date = parse_date(v)?;
        }
        if let Some(v) = &self.end_date {
            config.end_date = parse_date(v)?;
        }
        if let Some(v) = &self.source_lang {
            config.source_lang = v.clone();
        }
        if let Some(v) = &self.target_lang {
            config.target_lang = v.clone();
        }
        if let Some(v) = &self.deepl_mode {
            config.deepl_mode = v.parse()?;
        }
        if let Some(v) = &self.deepl_api_key {
            config.deepl_api_key = v.clone();
        }
        if let Some(v) = self.n_concurrent {
            config.n_concurrent = v;
        }
        if let Some(v) = self.timeout {
            config.timeout = timeout_from_secs(v)?;
        }
        if let Some(v) = &self.webhook_url {
            config.slack_webhook_url = v.clone();
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production/GitHub Actions)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let Command::Slack(args) = cli.command;

    let directive = if args.debug {
        "arxiv_post=debug"
    } else {
        "arxiv_post=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    let mut config = Config::from_env()?;
    args.apply(&mut config)?;

    if config.slack_webhook_url.is_empty() && !args.dry_run {
        bail!("SLACK_WEBHOOK_URL not set (use --webhook-url or --dry-run)");
    }

    run(&config, args.dry_run).await
}

async fn run(config: &Config, dry_run: bool) -> Result<()> {
    let client = reqwest::Client::new();

    // Step 1: Search arXiv
    let articles = ArxivClient::new(client.clone(), config.arxiv_api_url.clone())
        .with_page_size(config.arxiv_max_results)
        .search(&config.search_query())
        .await?;

    if articles.is_empty() {
        info!("No articles found in the search window, nothing to post");
        return Ok(());
    }

    // Step 2: Translate
    let articles = translate::translate(articles, &config.translate_options()).await?;

    // Step 3: Post to Slack
    slack::post(&client, &articles, &config.slack_webhook_url, dry_run).await?;

    info!("Done!");
    Ok(())
}
