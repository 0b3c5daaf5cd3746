use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use feedline::feed::{FetchSettings, HttpFetcher};
use feedline::store::{Field, Item, SUCCESS_KEY};
use feedline::sync::poll_once;
use feedline::util::{clean_line, UrlValidator};
use feedline::{
    spawn_poller, Change, Config, Phase, PollConfig, Store, Submission, SubmitOutcome,
};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Width used when printing feed-supplied text
const LINE_WIDTH: usize = 100;

#[derive(Parser, Debug)]
#[command(name = "feedline", about = "Follow RSS feeds from the terminal")]
struct Args {
    /// Feed addresses to subscribe to
    #[arg(value_name = "URL", required = true)]
    urls: Vec<String>,

    /// Config file (default: ~/.config/feedline/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Seconds between poll rounds, 0 for no automatic polling
    /// (overrides the config file)
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Accept addresses on localhost and private networks
    #[arg(long)]
    allow_private: bool,

    /// Run a single poll round after subscribing, then exit
    #[arg(long)]
    once: bool,

    /// Print store changes as JSON lines
    #[arg(long)]
    json: bool,
}

/// Get the default config file path (~/.config/feedline/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedline")
        .join("config.toml"))
}

/// English text for the symbolic message keys the core emits.
fn message(key: &str) -> &str {
    match key {
        "rssAdded" => "Feed added",
        "required" => "The address must not be empty",
        "urlNotValid" => "The address must be a valid URL",
        "urlAlredyExist" => "This feed is already subscribed",
        "notValid" => "The resource does not contain a valid RSS feed",
        "networkError" => "Network error",
        other => other,
    }
}

/// Console renderer: one line per store change.
fn render(change: &Change) {
    match change {
        Change::Appended {
            item: Item::Feed(feed),
        } => println!(
            "[feed] {} | {}",
            clean_line(&feed.title, LINE_WIDTH),
            clean_line(&feed.description, LINE_WIDTH)
        ),
        Change::Appended {
            item: Item::Entry(entry),
        } => println!(
            "  * {} <{}>",
            clean_line(&entry.title, LINE_WIDTH),
            clean_line(&entry.link, LINE_WIDTH)
        ),
        Change::ItemPropertyChanged { link, .. } => {
            println!("  (read) {}", clean_line(link, LINE_WIDTH))
        }
        Change::FieldChanged {
            field: Field::Submission(status),
        } => match (status.phase, status.error) {
            (Phase::Success, _) => println!("{}", message(SUCCESS_KEY)),
            (Phase::Failure, Some(reason)) => eprintln!("{}", message(reason.key())),
            _ => {}
        },
        Change::FieldChanged {
            field: Field::Preview(_),
        } => {}
    }
}

fn render_json(change: &Change) {
    match serde_json::to_string(change) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize change"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so rendered changes own stdout
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(secs) = args.interval {
        config.poll_interval_secs = secs;
    }
    if args.allow_private {
        config.allow_private_hosts = true;
    }

    let store = Store::new();
    if args.json {
        store.subscribe_all(render_json);
    } else {
        store.subscribe_all(render);
    }

    let fetcher = Arc::new(
        HttpFetcher::new(FetchSettings::from(&config)).context("Failed to create HTTP client")?,
    );
    let validator = Arc::new(UrlValidator::new(config.allow_private_hosts));
    let submission = Submission::new(store.clone(), fetcher.clone(), validator);

    for url in &args.urls {
        if let SubmitOutcome::Failed(reason) = submission.submit(url).await {
            tracing::debug!(url = %url, reason = reason.key(), "Subscription failed");
        }
    }

    if store.feeds().is_empty() {
        anyhow::bail!("No feed could be subscribed");
    }

    if args.once {
        let results = poll_once(&store, fetcher.as_ref(), config.max_concurrent_fetches).await;
        let failed = results.iter().filter(|r| r.outcome.is_err()).count();
        tracing::info!(sources = results.len(), failed = failed, "Poll round complete");
        return Ok(());
    }

    if !config.polling_enabled() {
        tracing::info!("Polling interval is 0, feeds will not be refreshed automatically");
    }
    let poller = spawn_poller(store.clone(), fetcher, PollConfig::from(&config), None);

    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT, shutting down gracefully"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }

    poller.stop().await.context("Poller task failed")?;
    println!(
        "{} feeds, {} entries, {} unread",
        store.feeds().len(),
        store.entries().len(),
        store.unread_count()
    );
    Ok(())
}
