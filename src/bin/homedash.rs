use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use homedash::{
    Snapshot,
    actors::{DashboardEvent, DashboardHandle},
    aggregator::{AggregateError, Aggregator},
    config::Config,
    control::NodeControl,
    discord::WebhookNotifier,
    render::{DashboardRenderer, DiscordRenderer, TelegramRenderer},
    sources::proxy::ProxyApi,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Homelab dashboard aggregator")]
struct Args {
    /// Config file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Aggregate once and print the dashboard
    Status {
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
    },

    /// Switch the VPN exit node, then print the refreshed dashboard
    Switch {
        node: String,

        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
    },

    /// Refresh periodically and post each dashboard to the Discord webhook
    Watch {
        /// Refresh interval in seconds
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Discord,
    Json,
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![("homedash", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Status { format } => status(&config, format).await,
        Command::Switch { node, format } => switch(&config, &node, format).await,
        Command::Watch { interval } => watch(config, Duration::from_secs(interval)).await,
    }
}

async fn status(config: &Config, format: Format) -> anyhow::Result<ExitCode> {
    let aggregator = Aggregator::from_config(config)?;
    let result = aggregator.aggregate(&CancellationToken::new()).await;
    print_result(&result, format)
}

async fn switch(config: &Config, node: &str, format: Format) -> anyhow::Result<ExitCode> {
    let control = NodeControl::new(ProxyApi::new(config.proxy.clone())?);
    if let Err(e) = control.switch_exit_node(node).await {
        error!("{e}");
        println!("❌ {e}");
        return Ok(ExitCode::FAILURE);
    }
    println!("✅ Switched to {node}");

    let aggregator = Aggregator::from_config(config)?;
    let result = aggregator.aggregate(&CancellationToken::new()).await;
    print_result(&result, format)
}

fn print_result(result: &Result<Snapshot, AggregateError>, format: Format) -> anyhow::Result<ExitCode> {
    let snapshot = match result {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("{e}");
            let text = match format {
                Format::Discord => {
                    serde_json::to_string_pretty(&DiscordRenderer.render_failure(e))?
                }
                Format::Markdown | Format::Json => TelegramRenderer.render_failure(e),
            };
            println!("{text}");
            return Ok(ExitCode::FAILURE);
        }
    };

    for (source, reason) in snapshot.failures() {
        warn!("{source} unavailable: {reason}");
    }

    let text = match format {
        Format::Markdown => TelegramRenderer.render_snapshot(snapshot),
        Format::Discord => {
            let mut message = DiscordRenderer.render_snapshot(snapshot);
            message.components = DiscordRenderer.render_controls(snapshot);
            serde_json::to_string_pretty(&message)?
        }
        Format::Json => serde_json::to_string_pretty(snapshot)?,
    };
    println!("{text}");

    Ok(ExitCode::SUCCESS)
}

async fn watch(config: Config, interval: Duration) -> anyhow::Result<ExitCode> {
    let aggregator = Arc::new(Aggregator::from_config(&config)?);
    let control = NodeControl::new(ProxyApi::new(config.proxy.clone())?);
    let notifier = config.discord.clone().map(WebhookNotifier::new);
    if notifier.is_none() {
        info!("no Discord webhook configured, dashboards will only be logged");
    }

    let (event_tx, mut event_rx) = broadcast::channel(16);
    let handle = DashboardHandle::spawn(aggregator, control, event_tx, interval);

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Ok(event) => publish(notifier.as_ref(), event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("skipped {skipped} dashboard events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!("shutting down");
                handle.shutdown().await?;
                break;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn publish(notifier: Option<&WebhookNotifier>, event: DashboardEvent) {
    let message = match &event {
        DashboardEvent::Snapshot(snapshot) => {
            for (source, reason) in snapshot.failures() {
                warn!("{source} unavailable: {reason}");
            }
            DiscordRenderer.render_snapshot(snapshot)
        }
        DashboardEvent::Failed(e) => {
            error!("{e}");
            DiscordRenderer.render_failure(e)
        }
    };

    match notifier {
        Some(notifier) => {
            if let Err(e) = notifier.send_message(&message).await {
                error!("{e:#}");
            }
        }
        None => {
            if let DashboardEvent::Snapshot(snapshot) = &event {
                info!("\n{}", TelegramRenderer.render_snapshot(snapshot));
            }
            debug!("dashboard message not posted");
        }
    }
}
