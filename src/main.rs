use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use csfloat_tracker::api::CsFloatClient;
use csfloat_tracker::core::{config, logging, Config};
use csfloat_tracker::display;
use csfloat_tracker::search::items::{fuzzy_search, load_item_names};
use csfloat_tracker::search::selection::page_count;
use csfloat_tracker::search::{Category, Filter, ItemType, SearchHistory, SortBy, Wear};
use csfloat_tracker::tracking::{
    AlertRule, EventBus, ObservationScope, RecordMode, StopReason, TrackedSearch, TrackedStore,
    TrackerRegistry, TrackingEvent,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[clap(name = "csfloat", author, version, about = "CSFloat listing search and price tracker")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, default_value = config::DEFAULT_CONFIG_FILE, help = "Path to the JSON config file")]
    config: PathBuf,

    #[clap(long, help = "Override the configured log level")]
    log_level: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct FilterArgs {
    /// Market hash name, e.g. "AK-47 | Redline (Field-Tested)"
    name: Option<String>,

    #[clap(long = "type", default_value = "skin")]
    item_type: ItemType,

    #[clap(long)]
    wear: Option<Wear>,

    #[clap(long)]
    min_float: Option<f64>,

    #[clap(long)]
    max_float: Option<f64>,

    #[clap(long, help = "normal, stattrak or souvenir")]
    category: Option<Category>,

    #[clap(long, help = "most_recent, lowest_price or lowest_float")]
    sort: Option<SortBy>,

    #[clap(long, help = "Only buy-now listings")]
    no_auctions: bool,

    #[clap(long, default_value_t = 50)]
    limit: u32,
}

impl FilterArgs {
    fn into_filter(self) -> Filter {
        Filter {
            market_hash_name: self.name,
            item_type: self.item_type,
            wear: self.wear,
            min_float: self.min_float,
            max_float: self.max_float,
            category: self.category,
            sort_by: self.sort,
            include_auctions: !self.no_auctions,
            limit: self.limit,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search active listings
    Search {
        #[clap(flatten)]
        filter: FilterArgs,

        #[clap(long, default_value_t = 1)]
        page: usize,

        #[clap(long, help = "Print every page")]
        all: bool,
    },
    /// Show the cheapest listing for a search
    Lowest {
        #[clap(flatten)]
        filter: FilterArgs,
    },
    /// Cheapest listing for several items
    Bulk {
        names: Vec<String>,

        #[clap(long, help = "File with one market hash name per line")]
        file: Option<PathBuf>,

        #[clap(long)]
        wear: Option<Wear>,

        #[clap(long)]
        no_auctions: bool,
    },
    /// Fuzzy-search the local item database
    Items {
        query: String,

        #[clap(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show recent searches, optionally re-running one
    History {
        #[clap(long, help = "Re-run the entry with this number")]
        run: Option<usize>,
    },
    /// Manage the stored API key
    Key {
        #[clap(subcommand)]
        action: KeyCommands,
    },
    /// Manage and run tracked searches
    Track {
        #[clap(subcommand)]
        action: TrackCommands,
    },
}

#[derive(Subcommand, Debug)]
enum KeyCommands {
    Set { key: String },
    Delete,
    Show,
}

#[derive(Subcommand, Debug)]
enum TrackCommands {
    /// Save a search for tracking
    Add {
        #[clap(flatten)]
        filter: FilterArgs,

        #[clap(long, help = "Name to save the search under (defaults to the item name)")]
        label: Option<String>,

        #[clap(long, help = "Do not log prices, only alert")]
        no_prices: bool,

        #[clap(long, help = "Alert when a listing is at or below this price in dollars")]
        alert_below: Option<f64>,

        #[clap(long)]
        alert_float_min: Option<f64>,

        #[clap(long)]
        alert_float_max: Option<f64>,

        #[clap(long, help = "Only write a row when the lowest listing changes")]
        on_change: bool,

        #[clap(long, help = "Record every returned listing, not only the cheapest")]
        all_listings: bool,
    },
    List,
    Remove {
        name: String,
    },
    /// Disable price logging (or alerts with --alerts)
    Pause {
        name: String,
        #[clap(long)]
        alerts: bool,
    },
    Resume {
        name: String,
        #[clap(long)]
        alerts: bool,
    },
    /// Poll tracked searches until Ctrl-C
    Run {
        #[clap(help = "Only run these saved searches")]
        names: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    logging::init_logging(log_level, &config.log_file)?;

    tracing::info!("🚀 CSFloat tracker starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Search { filter, page, all } => search(&config, filter.into_filter(), page, all).await,
        Commands::Lowest { filter } => lowest(&config, filter.into_filter()).await,
        Commands::Bulk {
            names,
            file,
            wear,
            no_auctions,
        } => bulk(&config, names, file, wear, no_auctions).await,
        Commands::Items { query, limit } => {
            let names = load_item_names(&config.item_db_path())?;
            if names.is_empty() {
                println!("Item database {} not found or empty", config.item_db_path().display());
                return Ok(());
            }
            for name in fuzzy_search(&query, &names, limit) {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::History { run } => history(&config, run).await,
        Commands::Key { action } => key(&cli.config, &config, action),
        Commands::Track { action } => track(&config, action).await,
    }
}

async fn search(config: &Config, filter: Filter, page: usize, all: bool) -> Result<()> {
    let client = CsFloatClient::from_config(config)?;
    let listings = client.search(&filter).await?;

    let mut history = SearchHistory::load(config.history_path())?;
    history.add(&filter)?;

    if all {
        for idx in 0..page_count(listings.len(), display::PAGE_SIZE).max(1) {
            println!("{}\n", display::results_page(&listings, idx));
        }
    } else {
        println!("{}", display::results_page(&listings, page.saturating_sub(1)));
    }

    let stats = client.rate_limits().get_stats().await;
    tracing::debug!("{}", stats.format_status());
    Ok(())
}

async fn lowest(config: &Config, filter: Filter) -> Result<()> {
    let client = CsFloatClient::from_config(config)?;
    match client.fetch_lowest(&filter).await? {
        Some(listing) => println!("{}", display::listing_line(&listing)),
        None => println!("No listings found"),
    }
    Ok(())
}

async fn bulk(
    config: &Config,
    mut names: Vec<String>,
    file: Option<PathBuf>,
    wear: Option<Wear>,
    no_auctions: bool,
) -> Result<()> {
    if let Some(path) = file {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        names.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from),
        );
    }
    if names.is_empty() {
        anyhow::bail!("No item names given");
    }

    let filters: Vec<Filter> = names
        .into_iter()
        .map(|name| Filter {
            wear,
            include_auctions: !no_auctions,
            ..Filter::for_item(name)
        })
        .collect();

    let client = CsFloatClient::from_config(config)?;
    let results = client.bulk_lowest(&filters).await;
    for entry in &results {
        println!("{}", display::bulk_line(entry));
    }
    if results.iter().any(|e| matches!(&e.result, Err(err) if err.is_fatal())) {
        anyhow::bail!("API key rejected; run `csfloat key set <KEY>`");
    }
    Ok(())
}

async fn history(config: &Config, run: Option<usize>) -> Result<()> {
    let history = SearchHistory::load(config.history_path())?;
    let entries = history.entries();
    if entries.is_empty() {
        println!("No recent searches");
        return Ok(());
    }

    match run {
        Some(n) => {
            let entry = n
                .checked_sub(1)
                .and_then(|idx| entries.get(idx))
                .with_context(|| format!("No history entry {}", n))?;
            let filter = entry.filter.clone();
            search(config, filter, 1, false).await
        }
        None => {
            for (idx, entry) in entries.iter().enumerate() {
                println!("{}. {}", idx + 1, entry.label());
            }
            Ok(())
        }
    }
}

fn key(config_path: &std::path::Path, config: &Config, action: KeyCommands) -> Result<()> {
    match action {
        KeyCommands::Set { key } => {
            config::store_api_key(config_path, &key)?;
            println!("API key saved");
        }
        KeyCommands::Delete => {
            if config::delete_api_key(config_path)? {
                println!("API key deleted");
            } else {
                println!("No API key stored");
            }
        }
        KeyCommands::Show => match config.api_key() {
            Some(key) => println!("{}", config::mask_key(key)),
            None => println!("No API key configured"),
        },
    }
    Ok(())
}

fn dollars_to_cents(dollars: f64) -> Result<u64> {
    if !dollars.is_finite() || dollars < 0.0 {
        anyhow::bail!("Price must be a non-negative amount, got {}", dollars);
    }
    Ok((dollars * 100.0).round() as u64)
}

async fn track(config: &Config, action: TrackCommands) -> Result<()> {
    let mut store = TrackedStore::load(config.tracked_items_path())?;

    match action {
        TrackCommands::Add {
            filter,
            label,
            no_prices,
            alert_below,
            alert_float_min,
            alert_float_max,
            on_change,
            all_listings,
        } => {
            let filter = filter.into_filter();
            filter.validate()?;
            if filter.market_hash_name.is_none() {
                anyhow::bail!("Tracked searches need an item name");
            }

            let alert = alert_below
                .map(|price| -> Result<AlertRule> {
                    let rule = AlertRule::new(dollars_to_cents(price)?);
                    let rule = match (alert_float_min, alert_float_max) {
                        (None, None) => rule,
                        (min, max) => rule.with_float_band(min.unwrap_or(0.0), max.unwrap_or(1.0)),
                    };
                    rule.validate().context("Invalid alert float band")?;
                    Ok(rule)
                })
                .transpose()?;

            let search = TrackedSearch {
                track_prices: !no_prices,
                track_alerts: alert.is_some(),
                alert,
                record_mode: on_change.then_some(RecordMode::OnChange),
                scope: if all_listings {
                    ObservationScope::AllListings
                } else {
                    ObservationScope::Lowest
                },
                ..TrackedSearch::new(filter)
            };
            if !search.is_active() {
                anyhow::bail!("Nothing to track: enable price logging or set --alert-below");
            }

            let name = label.unwrap_or_else(|| search.filter.display_key());
            store.upsert(name.clone(), search)?;
            println!("Tracking '{}'", name);
        }
        TrackCommands::List => {
            if store.is_empty() {
                println!("No tracked searches");
            }
            for (name, search) in store.iter() {
                println!("{}", display::tracked_line(name, search));
            }
        }
        TrackCommands::Remove { name } => {
            if store.remove(&name)? {
                println!("Removed '{}'", name);
            } else {
                println!("No tracked search named '{}'", name);
            }
        }
        TrackCommands::Pause { name, alerts } => toggle(&mut store, &name, alerts, false)?,
        TrackCommands::Resume { name, alerts } => toggle(&mut store, &name, alerts, true)?,
        TrackCommands::Run { names } => run_tracking(config, store, names).await?,
    }
    Ok(())
}

fn toggle(store: &mut TrackedStore, name: &str, alerts: bool, enabled: bool) -> Result<()> {
    let found = if alerts {
        store.set_track_alerts(name, enabled)?
    } else {
        store.set_track_prices(name, enabled)?
    };
    if !found {
        anyhow::bail!("No tracked search named '{}'", name);
    }
    println!(
        "{} {} for '{}'",
        if alerts { "Alerts" } else { "Price logging" },
        if enabled { "resumed" } else { "paused" },
        name
    );
    Ok(())
}

async fn run_tracking(config: &Config, mut store: TrackedStore, only: Vec<String>) -> Result<()> {
    let client = Arc::new(CsFloatClient::from_config(config)?);
    let events = EventBus::default();
    let mut rx = events.subscribe();
    let registry = TrackerRegistry::new(client.clone(), events);

    for (name, search) in store.iter() {
        if !only.is_empty() && !only.contains(name) {
            continue;
        }
        if !search.is_active() {
            tracing::info!("Skipping paused search '{}'", name);
            continue;
        }
        let session = match search.to_session(name, &config.tracking) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("⚠️ Not tracking '{}': {}", name, e);
                continue;
            }
        };
        if let Err(e) = registry.start(session).await {
            tracing::error!("❌ Failed to start tracking '{}': {:#}", name, e);
        }
    }

    let started = registry.running_count().await;
    if started == 0 {
        println!("Nothing to track");
        return Ok(());
    }
    tracing::info!("✅ Tracking {} search(es), press Ctrl-C to stop", started);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut auth_rejected = false;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
            event = rx.recv() => match event {
                Ok(event) => {
                    println!("{}", display::event_line(&event));
                    match &event {
                        TrackingEvent::AlertTriggered { name, alert } => {
                            if let Err(e) = store.record_notified(name, alert.price_cents) {
                                tracing::error!("Failed to persist alert for '{}': {:#}", name, e);
                            }
                        }
                        TrackingEvent::Stopped { reason: StopReason::AuthRejected, .. } => {
                            // Every session shares the key, so none of them can continue.
                            auth_rejected = true;
                            break;
                        }
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Display fell behind, {} events skipped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    for (name, state) in registry.stop_all().await {
        let state = state.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into());
        tracing::info!("'{}' finished: {}", name, state);
    }
    tracing::info!("{}", client.rate_limits().get_stats().await.format_status());

    if auth_rejected {
        anyhow::bail!("API key rejected; run `csfloat key set <KEY>` and start tracking again");
    }
    Ok(())
}
