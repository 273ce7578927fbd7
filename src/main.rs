use anyhow::{Context as _, Result, bail};
use async_trait::async_trait;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use lookout::aggregator::{self, FeedAggregator, create_digest};
use lookout::config::{AppConfig, LoggingConfig};
use lookout::history::import_csv;
use lookout::mailer::{BulkMailer, EmailTemplate, OutgoingEmail, Outbox, SmtpOutbox};
use lookout::models::{DigestFormat, Guest};
use lookout::monitor::PriceMonitor;
use lookout::plugins::{NotificationEvent, PluginManager};
use lookout::price_parser::format_price;
use lookout::templates::GuestMessenger;
use lookout::utils::fs::load_document;

#[derive(Parser)]
#[command(name = "lookout", version, about = "Price monitoring, feed digests and templated messaging")]
struct Cli {
    /// Extra configuration file layered over config/default and config/local
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track product prices
    #[command(subcommand)]
    Prices(PricesCommand),
    /// Aggregate RSS/Atom feeds
    #[command(subcommand)]
    Feeds(FeedsCommand),
    /// Guest messaging for rental properties
    #[command(subcommand)]
    Guests(GuestsCommand),
    /// Bulk templated email
    #[command(subcommand)]
    Mail(MailCommand),
    /// Notification channels
    #[command(subcommand)]
    Notify(NotifyCommand),
}

#[derive(Subcommand)]
enum PricesCommand {
    /// Scrape every product once and report alerts
    Check {
        #[arg(short, long)]
        products: Option<PathBuf>,
        /// Broadcast alerts to configured notifiers
        #[arg(long)]
        notify: bool,
    },
    /// Show recorded prices for a URL
    History { url: String },
    /// Export all recorded prices to CSV
    Export { output: PathBuf },
    /// Merge prices from a CSV export into the history
    Import { input: PathBuf },
}

#[derive(Subcommand)]
enum FeedsCommand {
    Fetch(FetchArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Built-in feed set: tech, finance or ai
    #[arg(long)]
    preset: Vec<String>,
    /// Feed list file; defaults to aggregator.feeds_file when no preset is given
    #[arg(short, long)]
    feeds: Option<PathBuf>,
    #[arg(long)]
    only_new: bool,
    #[arg(long)]
    format: Option<DigestFormat>,
    #[arg(long)]
    max: Option<usize>,
    #[arg(long)]
    search: Vec<String>,
    #[arg(long)]
    category: Option<String>,
    /// Write the digest here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Also write the matching items as JSON
    #[arg(long)]
    export: Option<PathBuf>,
    #[arg(long)]
    notify: bool,
}

#[derive(Subcommand)]
enum GuestsCommand {
    /// Render every scheduled message for a guest
    Schedule {
        /// Guest JSON or TOML document
        guest: PathBuf,
        #[arg(short, long)]
        property: String,
    },
    /// List message templates, optionally exporting them
    Templates {
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MailCommand {
    Send {
        #[arg(long)]
        csv: PathBuf,
        /// Email template JSON or TOML document
        #[arg(short, long)]
        template: PathBuf,
        #[arg(long)]
        email_column: Option<String>,
        #[arg(long)]
        max: Option<usize>,
        #[arg(long)]
        dry_run: bool,
        /// Write per-recipient results as JSON
        #[arg(long)]
        results: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum NotifyCommand {
    /// Check connectivity and send a test message to every channel
    Test,
}

/// Stands in for SMTP when none is configured; dry runs never reach it.
struct UnconfiguredOutbox;

#[async_trait]
impl Outbox for UnconfiguredOutbox {
    async fn deliver(&self, _email: OutgoingEmail) -> lookout::Result<String> {
        Err(lookout::AppError::Validation("notifications.smtp is not configured".into()))
    }
}

fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lookout={}", logging.level)));

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _guard = init_logging(&config.logging);

    match cli.command {
        Command::Prices(cmd) => prices(&config, cmd).await,
        Command::Feeds(FeedsCommand::Fetch(args)) => feeds(&config, args).await,
        Command::Guests(cmd) => guests(&config, cmd),
        Command::Mail(cmd) => mail(&config, cmd).await,
        Command::Notify(NotifyCommand::Test) => notify_test(&config).await,
    }
}

async fn broadcast(config: &AppConfig, event: &NotificationEvent) -> Result<()> {
    let manager = PluginManager::from_config(&config.notifications).await?;
    if manager.list_notifier_types().await.is_empty() {
        warn!("No notification channels configured");
        return Ok(());
    }

    for (channel, result) in manager.broadcast(event).await {
        if result.success {
            info!(channel = %channel, "Notification sent");
        }
    }
    manager.shutdown().await?;
    Ok(())
}

async fn prices(config: &AppConfig, cmd: PricesCommand) -> Result<()> {
    let mut monitor = PriceMonitor::from_config(config)?;

    match cmd {
        PricesCommand::Check { products, notify } => {
            let path = products.unwrap_or_else(|| config.monitor.products_file.clone());
            let count = monitor
                .add_products_from_file(&path)
                .with_context(|| format!("Failed to load products from {}", path.display()))?;
            info!(count, "Checking products");

            let results = monitor.check_all().await?;
            for result in &results {
                match (&result.record, &result.error) {
                    (Some(record), _) => println!(
                        "{:<40} {:>12}  ({} ms)",
                        result.product,
                        format_price(record.price, &record.currency),
                        result.response_time_ms
                    ),
                    (None, Some(error)) => println!("{:<40} {:>12}  {}", result.product, "ERROR", error),
                    (None, None) => {}
                }
            }

            let alerts: Vec<_> = results.into_iter().filter_map(|r| r.alert).collect();
            if alerts.is_empty() {
                println!("\nNo price alerts.");
                return Ok(());
            }

            println!("\n{}", lookout::monitor::format_alert_message(&alerts));
            if notify {
                broadcast(config, &NotificationEvent::from_alerts(&alerts)).await?;
            }
        }
        PricesCommand::History { url } => {
            let history = monitor.get_price_history(&url);
            if history.is_empty() {
                println!("No history for {}", url);
            }
            for record in history {
                println!(
                    "{}  {}",
                    record.timestamp.format("%Y-%m-%d %H:%M"),
                    format_price(record.price, &record.currency)
                );
            }
        }
        PricesCommand::Export { output } => {
            let rows = monitor.store().export_csv(&output)?;
            println!("Exported {} records to {}", rows, output.display());
        }
        PricesCommand::Import { input } => {
            let records = import_csv(&input)?;
            let count = records.len();
            let added = monitor.store_mut().extend(records);
            monitor.store().save()?;
            println!("Imported {} of {} records from {}", added, count, input.display());
        }
    }

    Ok(())
}

async fn feeds(config: &AppConfig, args: FetchArgs) -> Result<()> {
    let mut aggregator = FeedAggregator::from_config(config)?;

    for preset in &args.preset {
        let feeds = match preset.as_str() {
            "tech" => aggregator::tech_feeds(),
            "finance" => aggregator::finance_feeds(),
            "ai" => aggregator::ai_feeds(),
            other => bail!("Unknown preset '{}' (expected tech, finance or ai)", other),
        };
        for feed in feeds {
            aggregator.add_feed(feed)?;
        }
    }

    let feeds_file = match (&args.feeds, args.preset.is_empty()) {
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(config.aggregator.feeds_file.clone()),
        (None, false) => None,
    };
    if let Some(path) = feeds_file {
        aggregator
            .add_feeds_from_file(&path)
            .with_context(|| format!("Failed to load feeds from {}", path.display()))?;
    }

    let mut items = aggregator.fetch_all(args.only_new).await?;
    if !args.search.is_empty() {
        items = aggregator::search(&items, &args.search);
    }
    if let Some(category) = &args.category {
        items = aggregator::filter_by_category(&items, category);
    }
    aggregator::sort_by_recency(&mut items);

    if let Some(path) = &args.export {
        aggregator::export_items(&items, path)?;
    }

    let format = args.format.unwrap_or(config.aggregator.format);
    let max = args.max.unwrap_or(config.aggregator.max_items);
    let today = Local::now().date_naive();
    let digest = create_digest(&items, max, format, today);

    match &args.output {
        Some(path) => {
            std::fs::write(path, &digest)?;
            println!("Wrote digest of {} items to {}", items.len().min(max), path.display());
        }
        None => println!("{}", digest),
    }

    if args.notify && !items.is_empty() {
        let text = create_digest(&items, max, DigestFormat::Markdown, today);
        let html = create_digest(&items, max, DigestFormat::Html, today);
        let event = NotificationEvent::digest(format!("Daily Digest - {}", today.format("%B %d, %Y")), text, Some(html));
        broadcast(config, &event).await?;
    }

    Ok(())
}

fn messenger(config: &AppConfig) -> Result<GuestMessenger> {
    let mut messenger = match &config.messaging.templates_file {
        Some(path) => {
            let mut messenger = GuestMessenger::new();
            messenger.add_templates_from_file(path)?;
            messenger
        }
        None => GuestMessenger::with_default_templates(),
    };

    let properties = &config.messaging.properties_file;
    if properties.exists() {
        messenger.add_properties_from_file(properties)?;
    }
    Ok(messenger)
}

fn guests(config: &AppConfig, cmd: GuestsCommand) -> Result<()> {
    let messenger = messenger(config)?;

    match cmd {
        GuestsCommand::Schedule { guest, property } => {
            let guest: Guest = load_document(&guest)?;
            let scheduled = messenger.get_scheduled_messages(&guest, &property, Local::now().naive_local())?;

            for message in scheduled {
                println!("=== {} [{}] ===", message.send_at.format("%Y-%m-%d %H:%M"), message.message.template_name);
                if let Some(subject) = &message.message.subject {
                    println!("Subject: {}", subject);
                }
                println!("{}\n", message.message.body);
            }
        }
        GuestsCommand::Templates { export } => {
            for template in messenger.templates() {
                println!("{:<20} {:<28} {:+}h", template.stage.as_str(), template.name, template.send_offset_hours);
            }
            if let Some(path) = export {
                messenger.export_templates(&path)?;
                println!("Exported templates to {}", path.display());
            }
        }
    }

    Ok(())
}

async fn mail(config: &AppConfig, cmd: MailCommand) -> Result<()> {
    let MailCommand::Send {
        csv,
        template,
        email_column,
        max,
        dry_run,
        results,
    } = cmd;

    let template: EmailTemplate = load_document(&template)?;
    let outbox: Arc<dyn Outbox> = match (&config.notifications.smtp, dry_run) {
        (Some(smtp), _) => Arc::new(SmtpOutbox::new(smtp)?),
        (None, true) => Arc::new(UnconfiguredOutbox),
        (None, false) => bail!("notifications.smtp must be configured to send mail"),
    };

    let mut mailer = BulkMailer::new(outbox, Duration::from_millis(config.mailer.rate_limit_ms));
    let column = email_column.unwrap_or_else(|| config.mailer.email_column.clone());
    mailer.send_from_csv(&csv, &template, &column, max, dry_run).await?;

    let stats = mailer.stats();
    println!(
        "{} {} of {} emails ({} failed, {:.1}% success)",
        if dry_run { "Would send" } else { "Sent" },
        stats.successful,
        stats.total,
        stats.failed,
        stats.success_rate
    );

    if let Some(path) = results {
        mailer.export_results(&path)?;
    }
    Ok(())
}

async fn notify_test(config: &AppConfig) -> Result<()> {
    let manager = PluginManager::from_config(&config.notifications).await?;
    let channels = manager.list_notifier_types().await;
    if channels.is_empty() {
        println!("No notification channels configured.");
        return Ok(());
    }

    for (channel, status) in manager.test_all().await {
        match status {
            Ok(true) => println!("{:<10} reachable", channel),
            Ok(false) => println!("{:<10} unreachable", channel),
            Err(e) => println!("{:<10} error: {}", channel, e),
        }
    }

    let event = NotificationEvent::message("Lookout test", "If you can read this, **notifications work**.");
    for (channel, result) in manager.broadcast(&event).await {
        match result.error {
            None => println!("{:<10} sent", channel),
            Some(error) => println!("{:<10} failed: {}", channel, error),
        }
    }

    manager.shutdown().await?;
    Ok(())
}
