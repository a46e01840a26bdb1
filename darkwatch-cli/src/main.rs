//! DarkWatch CLI
//!
//! Continuous dark web target monitoring: scheduled scans, threat scoring,
//! entity diffing, alerts and correlation graphs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use darkwatch_core::{ContentSnapshot, RuleStore, Target, TargetSource};
use darkwatch_intel::{
    AlertDispatcher, ReputationConfig, VirusTotalClient, WebhookNotifier,
    VIRUSTOTAL_API_KEY_ENV, WEBHOOK_URL_ENV,
};
use darkwatch_runtime::{MonitorConfig, Scanner, Scheduler, DEFAULT_CONFIG_FILE};
use darkwatch_store::{build_graph, SqliteStore, Store};
use darkwatch_tor::{TorConfig, DEFAULT_SOCKS_ADDR, TOR_PROXY_ENV};

#[derive(Parser)]
#[command(name = "darkwatch")]
#[command(author, version, about = "DarkWatch: continuous dark web target monitoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1", global = true)]
    verbose: u8,

    /// VirusTotal API key (or set VIRUSTOTAL_API_KEY env var)
    #[arg(long, env = VIRUSTOTAL_API_KEY_ENV, global = true, hide_env_values = true)]
    vt_key: Option<String>,

    /// Alert webhook URL (or set SLACK_WEBHOOK_URL env var)
    #[arg(long, env = WEBHOOK_URL_ENV, global = true, hide_env_values = true)]
    webhook: Option<String>,

    /// Tor SOCKS proxy (or set TOR_PROXY env var)
    #[arg(long, env = TOR_PROXY_ENV, default_value = DEFAULT_SOCKS_ADDR, global = true)]
    tor_proxy: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring daemon (scheduled full-fleet scans)
    Run,

    /// Scan one URL now
    Scan {
        #[arg(short, long)]
        url: String,

        /// Run the scheduled-path task: reputation, diff and alerting
        #[arg(long)]
        full: bool,
    },

    /// Scan one URL and up to N same-site links it references
    DeepScan {
        #[arg(short, long)]
        url: String,
    },

    /// Add a target
    AddTarget {
        #[arg(short, long)]
        url: String,
    },

    /// Remove a target by id
    RemoveTarget {
        #[arg(long)]
        id: i64,
    },

    /// List targets and their status
    Targets,

    /// Print the correlation graph as JSON
    Graph {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Snapshots captured in the last N hours
    Changes {
        #[arg(long, default_value = "24")]
        hours: i64,
    },

    /// Search snapshots by URL, title, content or findings
    Search {
        #[arg(short, long)]
        query: String,
    },

    /// Check Tor connection status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = MonitorConfig::load(&cli.config)?;
    let tor_config = TorConfig::default().with_socks_addr(&cli.tor_proxy);

    match &cli.command {
        Commands::Run => run_daemon(&cli, &config, tor_config).await?,
        Commands::Scan { url, full } => {
            let scanner = build_scanner(&cli, &config, tor_config)?;
            let target = scanner.store().upsert_target(url, TargetSource::Manual)?;
            let status = if *full {
                scanner.scan_target_with_diff(&target).await
            } else {
                scanner.scan_target(&target).await
            };
            println!("📡 {} -> {}", target.url, status);
            if let Some(snapshot) = scanner.store().latest_snapshot_before(url, Utc::now())? {
                print_snapshot(&snapshot);
            }
        }
        Commands::DeepScan { url } => {
            let scanner = build_scanner(&cli, &config, tor_config)?;
            let target = scanner.store().upsert_target(url, TargetSource::Manual)?;
            let status = scanner.deep_scan(&target).await;
            println!("🕸️  {} -> {}", target.url, status);
        }
        Commands::AddTarget { url } => {
            let store = open_store(&config)?;
            let target = store.upsert_target(url, TargetSource::Manual)?;
            println!("✅ Target #{} {} ({})", target.id, target.url, target.status);
        }
        Commands::RemoveTarget { id } => {
            let store = open_store(&config)?;
            if store.delete_target(*id)? {
                println!("🗑️  Removed target #{}", id);
            } else {
                println!("⚠️  No target #{}", id);
            }
        }
        Commands::Targets => {
            let store = open_store(&config)?;
            let targets = store.all_targets()?;
            if targets.is_empty() {
                println!("No targets. Add one with: darkwatch add-target -u <url>");
            }
            for target in &targets {
                print_target(target);
            }
        }
        Commands::Graph { output } => {
            let store = open_store(&config)?;
            let graph = build_graph(store.as_ref())?;
            let json = serde_json::to_string_pretty(&graph)?;
            match output {
                Some(path) => {
                    std::fs::write(path, &json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!(
                        "📄 Graph ({} nodes, {} edges) saved to: {}",
                        graph.nodes.len(),
                        graph.edges.len(),
                        path.display()
                    );
                }
                None => println!("{}", json),
            }
        }
        Commands::Changes { hours } => {
            let store = open_store(&config)?;
            let hours = if *hours > 0 { *hours } else { 24 };
            let since = Utc::now() - Duration::hours(hours);
            let snapshots = store.recent_snapshots(since)?;
            println!("📊 {} snapshots in the last {}h\n", snapshots.len(), hours);
            for snapshot in &snapshots {
                print_snapshot(snapshot);
            }
        }
        Commands::Search { query } => {
            let store = open_store(&config)?;
            let hits = store.search_snapshots(query)?;
            println!("🔍 {} matches for {:?}\n", hits.len(), query);
            for snapshot in &hits {
                print_snapshot(snapshot);
            }
        }
        Commands::Status => check_status(&tor_config).await?,
    }

    Ok(())
}

fn open_store(config: &MonitorConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    Ok(Arc::new(store))
}

fn build_scanner(cli: &Cli, config: &MonitorConfig, tor_config: TorConfig) -> Result<Scanner> {
    let store = open_store(config)?;
    let rules = Arc::new(RuleStore::load(&config.rules));

    if cli.vt_key.is_none() {
        info!("No VirusTotal API key, reputation lookups disabled");
    }

    let reputation =
        VirusTotalClient::new(ReputationConfig::default().with_api_key(cli.vt_key.clone()))?;
    let notifier = WebhookNotifier::new(cli.webhook.clone());
    let alerts = AlertDispatcher::new(Arc::new(reputation), Arc::new(notifier));

    Ok(Scanner::new(
        config.build_fetcher(tor_config),
        store,
        rules,
        alerts,
        config.scan_config(),
    ))
}

async fn run_daemon(cli: &Cli, config: &MonitorConfig, tor_config: TorConfig) -> Result<()> {
    println!("🕵️ DarkWatch - continuous dark web monitoring\n");

    let scanner = build_scanner(cli, config, tor_config)?;

    let mut loaded = 0;
    for url in config.targets.iter().filter(|u| !u.trim().is_empty()) {
        scanner.store().upsert_target(url.trim(), TargetSource::Config)?;
        loaded += 1;
    }
    info!("{} targets loaded from config", loaded);

    let scheduler = Scheduler::new(scanner, config.scheduler_config());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    println!("\n🛑 Shutting down after the current cycle...");
    let _ = shutdown_tx.send(true);

    let cycles = handle.await?;
    println!("✅ Stopped after {} scan cycles", cycles);
    Ok(())
}

fn print_target(target: &Target) {
    let scanned = target
        .last_scanned_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "#{:<4} {:<24} {:<8} last scan: {}  {}",
        target.id,
        target.status.as_str(),
        target.source.as_str(),
        scanned,
        target.url
    );
}

fn print_snapshot(snapshot: &ContentSnapshot) {
    println!(
        "[{}] {} {}/10 {} | {}",
        snapshot.captured_at.format("%Y-%m-%d %H:%M"),
        snapshot.risk_level().as_str(),
        snapshot.score,
        snapshot.category,
        snapshot.source_url
    );
    println!("    {}", snapshot.title);
    if !snapshot.findings.is_empty() {
        println!("    {}", snapshot.findings);
    }
}

async fn check_status(config: &TorConfig) -> Result<()> {
    println!("🔌 Checking Tor connection...\n");

    match darkwatch_tor::check_tor_connection(config).await {
        Ok(true) => {
            println!("✅ Tor is running and accessible");
            println!("   Proxy: {}", config.socks_addr);
        }
        Ok(false) => {
            println!("❌ Tor is not accessible");
            println!("   Expected proxy at: {}", config.socks_addr);
            println!("\n   To install Tor:");
            println!("   - Linux: sudo apt install tor");
            println!("   - Mac: brew install tor");
            println!("   - Then start: sudo systemctl start tor (or brew services start tor)");
        }
        Err(e) => {
            println!("❌ Error checking Tor: {}", e);
        }
    }

    Ok(())
}
