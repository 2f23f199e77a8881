use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveTime};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use nxguard::config::Config;
use nxguard::filter::defaults::default_sources;
use nxguard::filter::download::BlocklistDownloader;
use nxguard::filter::{hosts, normalize_domain, normalize_user_domain};
use nxguard::intercept::InterceptLoop;
use nxguard::resolver::Resolver;
use nxguard::rules::{Category, Days, RuleAction, RuleTarget, TimeRule, TimeRuleEngine};
use nxguard::schedule::{run_daily_reset, watch_store_changes};
use nxguard::stats::Stats;
use nxguard::store::{RuleStore, SqliteStore};
use nxguard::upstream::UdpUpstream;

#[derive(Parser)]
#[command(name = "nxguard")]
#[command(about = "DNS filtering firewall for a tunnel interface", long_about = None)]
struct Cli {
    /// Config file; defaults apply when it does not exist
    #[arg(short, long, default_value = "nxguard.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Filter DNS on an already established tunnel
    Run {
        /// Open tunnel file descriptor handed over by the platform
        #[arg(long)]
        tun_fd: i32,
    },
    /// Import hosts files or plain domain lists into a category
    Import {
        #[arg(long)]
        category: Category,
        /// Store the entries disabled
        #[arg(long)]
        disabled: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Download a category's blocklist and replace its entries
    Update {
        #[arg(long)]
        category: Category,
        /// Hosts file URL; repeat for several. Defaults to the category's public lists
        #[arg(long = "url")]
        urls: Vec<String>,
        /// Store the entries disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Restore a category's built-in entries
    ResetCategory {
        #[arg(long)]
        category: Category,
    },
    /// Block a single domain
    Block { domain: String },
    /// Remove a blocked domain
    Unblock { domain: String },
    /// Manage custom lists
    #[command(subcommand)]
    List(ListCommand),
    /// Create time rules
    #[command(subcommand)]
    Rule(RuleCommand),
    /// Reset every rule's daily usage now
    ResetUsage,
}

#[derive(Subcommand)]
enum ListCommand {
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Add {
        id: i64,
        #[arg(required = true)]
        domains: Vec<String>,
    },
    Enable { id: i64 },
    Disable { id: i64 },
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum RuleCommand {
    /// Daily time budget
    Quota {
        /// Minutes allowed per day
        #[arg(long)]
        limit: u32,
        #[command(flatten)]
        rule: RuleArgs,
    },
    /// Time-of-day window; an end before the start wraps midnight
    Schedule {
        #[arg(long, value_parser = parse_time)]
        start: NaiveTime,
        #[arg(long, value_parser = parse_time)]
        end: NaiveTime,
        #[command(flatten)]
        rule: RuleArgs,
    },
}

#[derive(Args)]
#[group(id = "target", multiple = false)]
struct TargetArgs {
    #[arg(long)]
    domain: Option<String>,
    #[arg(long)]
    category: Option<Category>,
    #[arg(long)]
    list: Option<i64>,
}

#[derive(Args)]
struct RuleArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, default_value = "allow")]
    action: RuleAction,
    /// ISO weekdays, Monday = 1
    #[arg(long, default_value = "1,2,3,4,5,6,7")]
    days: Days,
}

impl TargetArgs {
    fn into_target(self) -> RuleTarget {
        match (self.domain, self.category, self.list) {
            (Some(domain), _, _) => RuleTarget::Domain(normalize_user_domain(&domain)),
            (_, Some(category), _) => RuleTarget::Category(category),
            (_, _, Some(list)) => RuleTarget::List(list),
            _ => RuleTarget::All,
        }
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("expected HH:MM: {}", e))
}

/// Sets up the tracing subscriber; `RUST_LOG` wins over the config.
fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path))?;
    Ok(Arc::new(store))
}

#[cfg(unix)]
fn open_tunnel(fd: i32) -> Result<nxguard::tunnel::Tunnel> {
    if fd < 0 {
        bail!("Invalid tunnel descriptor {}", fd);
    }
    // SAFETY: the descriptor is an open tunnel handed to this process,
    // which takes ownership of it here and nowhere else.
    unsafe { nxguard::tunnel::Tunnel::from_raw_fd(fd) }.context("Failed to attach tunnel descriptor")
}

#[cfg(not(unix))]
fn open_tunnel(_fd: i32) -> Result<tokio::io::DuplexStream> {
    bail!("Tunnel descriptors are only supported on unix platforms")
}

fn spawn_stats(stats: Arc<Stats>, interval_secs: u64) {
    if interval_secs == 0 {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let s = stats.snapshot_and_reset();
            info!(
                "[stats] requests={} forwarded={} blocked_list={} blocked_rule={} dropped={} upstream_failures={} avg_response={:.2}ms",
                s.requests,
                s.forwarded,
                s.blocked_list,
                s.blocked_rule,
                s.dropped,
                s.upstream_failures,
                s.avg_response_ms
            );
        }
    });
}

#[cfg(unix)]
fn spawn_refresh_on_hangup(intercept: Arc<InterceptLoop>) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            let intercept = intercept.clone();
            match tokio::task::spawn_blocking(move || intercept.refresh_snapshot()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!("Blocklist refresh failed, keeping previous snapshot: {}", e),
                Err(e) => error!("Blocklist refresh task failed: {}", e),
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_refresh_on_hangup(_intercept: Arc<InterceptLoop>) -> Result<()> {
    Ok(())
}

async fn run(config: Config, tun_fd: i32) -> Result<()> {
    let store = open_store(&config)?;
    if config.seed_default_blocklists {
        store
            .seed_default_blocklists()
            .context("Failed to seed default blocklists")?;
    }

    let engine = TimeRuleEngine::new(store.clone(), store.clone());
    let resolver = Arc::new(
        Resolver::new(store.clone(), engine)
            .with_fail_closed_on_parse_error(config.fail_closed_on_parse_error),
    );
    resolver
        .refresh_snapshot()
        .context("Failed to load blocklist")?;

    let upstream = Arc::new(UdpUpstream::from_config(&config.upstream));
    info!("Forwarding to upstream {}", upstream.addr());

    let intercept = Arc::new(
        InterceptLoop::new(resolver.clone(), upstream)
            .with_max_in_flight(config.max_in_flight)
            .with_mtu(config.mtu),
    );
    let (reader, writer) = tokio::io::split(open_tunnel(tun_fd)?);

    spawn_stats(intercept.stats(), config.stats_interval_seconds);
    spawn_refresh_on_hangup(intercept.clone())?;
    if let Some(period) = config.store_poll_interval() {
        tokio::spawn(watch_store_changes(resolver, period));
    }
    let rule_store: Arc<dyn RuleStore> = store;
    tokio::spawn(run_daily_reset(rule_store));

    tokio::select! {
        result = intercept.run(reader, writer) => {
            result.context("Tunnel I/O failed")?;
        }
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received.");
        }
    }

    Ok(())
}

async fn import(store: &SqliteStore, category: Category, enabled: bool, files: &[PathBuf]) -> Result<()> {
    let mut domains = Vec::new();
    for file in files {
        let text = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let parsed = hosts::parse_list(&text);
        println!("{}: {} domains", file.display(), parsed.len());
        domains.extend(parsed.iter().map(|d| normalize_domain(d)));
    }
    domains.sort_unstable();
    domains.dedup();

    let stored = store.replace_category_sites(category, &domains, enabled)?;
    println!("Stored {} domains under {}", stored, category);
    Ok(())
}

async fn update(
    store: &SqliteStore,
    config: &Config,
    category: Category,
    urls: Vec<String>,
    enabled: bool,
) -> Result<()> {
    let urls = if urls.is_empty() {
        default_sources(category).iter().map(|u| u.to_string()).collect()
    } else {
        urls
    };
    if urls.is_empty() {
        bail!("No download sources for {}; pass --url", category);
    }

    let downloader = BlocklistDownloader::new(config.download_timeout())?;
    let domains = downloader.fetch(urls.as_slice()).await?;
    let stored = store.replace_category_sites(category, &domains, enabled)?;
    println!("Stored {} domains under {}", stored, category);
    Ok(())
}

fn list(store: &SqliteStore, command: ListCommand) -> Result<()> {
    match command {
        ListCommand::Create { name, description } => {
            let id = store.create_list(&name, &description)?;
            println!("Created list {} ({})", id, name);
        }
        ListCommand::Add { id, domains } => {
            if store.list(id)?.is_none() {
                bail!("No list with id {}", id);
            }
            for domain in domains {
                let domain = normalize_user_domain(&domain);
                if store.add_domain_to_list(id, &domain)? {
                    println!("Added {}", domain);
                } else {
                    println!("{} is already in list {}", domain, id);
                }
            }
        }
        ListCommand::Enable { id } => store.set_list_enabled(id, true)?,
        ListCommand::Disable { id } => store.set_list_enabled(id, false)?,
        ListCommand::Delete { id } => store.delete_list(id)?,
    }
    Ok(())
}

fn rule(store: &SqliteStore, command: RuleCommand) -> Result<()> {
    let rule = match command {
        RuleCommand::Quota { limit, rule } => {
            TimeRule::quota(rule.target.into_target(), rule.action, limit, rule.days)
        }
        RuleCommand::Schedule { start, end, rule } => {
            TimeRule::schedule(rule.target.into_target(), rule.action, start, end, rule.days)
        }
    };
    let id = store.add_rule(&rule)?;
    println!("Created rule {}", id);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config).await?;
    setup_logging(&config);

    match cli.command {
        Command::Run { tun_fd } => run(config, tun_fd).await,
        Command::Import {
            category,
            disabled,
            files,
        } => import(&*open_store(&config)?, category, !disabled, &files).await,
        Command::Update {
            category,
            urls,
            disabled,
        } => update(&*open_store(&config)?, &config, category, urls, !disabled).await,
        Command::ResetCategory { category } => {
            let stored = open_store(&config)?.reset_category(category)?;
            println!("Restored {} built-in entries under {}", stored, category);
            Ok(())
        }
        Command::Block { domain } => {
            let domain = normalize_user_domain(&domain);
            if open_store(&config)?.add_custom_site(&domain)? {
                println!("Blocked {}", domain);
            } else {
                println!("{} is already blocked", domain);
            }
            Ok(())
        }
        Command::Unblock { domain } => {
            let domain = normalize_user_domain(&domain);
            if open_store(&config)?.remove_site(&domain)? {
                println!("Unblocked {}", domain);
            } else {
                println!("{} was not blocked", domain);
            }
            Ok(())
        }
        Command::List(command) => list(&*open_store(&config)?, command),
        Command::Rule(command) => rule(&*open_store(&config)?, command),
        Command::ResetUsage => {
            let today = Local::now().date_naive();
            open_store(&config)?.reset_daily_usage(today)?;
            println!("Usage reset for {}", today);
            Ok(())
        }
    }
}
