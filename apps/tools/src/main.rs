use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use controller::Controller;
use hue_gateway::{pair_bridge, DeviceGateway, HueGateway, RetryPolicy, UnconfiguredGateway};
use shared::domain::{CurveId, CurveKind};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/daylight.db")]
    database_url: String,
    #[arg(long, env = "HUE_BRIDGE_URL")]
    bridge_url: Option<String>,
    #[arg(long, env = "HUE_USERNAME")]
    username: Option<String>,
    #[arg(long, default_value_t = 5)]
    timeout_seconds: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Registers with the bridge; press its link button first.
    Pair {
        #[arg(long, default_value = "daylight#tools")]
        device_type: String,
        #[arg(long, default_value_t = 30)]
        attempts: usize,
    },
    /// Mirrors the bridge's light list into the database.
    Sync,
    /// Runs one reconciliation pass.
    Reconcile {
        #[arg(long)]
        force_disable: bool,
    },
    /// Prints a curve's value at minute `x` of the curve day (default: now).
    Eval {
        curve_id: i64,
        #[arg(long)]
        x: Option<f64>,
    },
    /// Zeroes curve offsets and clears manual overrides.
    ResetDaily,
    Curves {
        #[arg(long)]
        kind: Option<CurveKind>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("DAYLIGHT_LOG").unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_seconds);

    if let Command::Pair {
        device_type,
        attempts,
    } = &cli.command
    {
        let bridge_url = cli
            .bridge_url
            .as_deref()
            .context("pairing needs --bridge-url or HUE_BRIDGE_URL")?;
        let policy = RetryPolicy {
            attempts: *attempts,
            ..RetryPolicy::default()
        };
        println!("press the link button on the bridge at {bridge_url}");
        let username = pair_bridge(bridge_url, device_type, policy).await?;
        println!("paired; set HUE_USERNAME={username}");
        return Ok(());
    }

    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open database '{}'", cli.database_url))?;
    let gateway: Arc<dyn DeviceGateway> = match (&cli.bridge_url, &cli.username) {
        (Some(bridge_url), Some(username)) => {
            Arc::new(HueGateway::new(bridge_url, username, timeout)?)
        }
        _ => Arc::new(UnconfiguredGateway),
    };
    let controller = Controller::new(storage, gateway);

    match cli.command {
        Command::Pair { .. } => {}
        Command::Sync => {
            let report = controller.sync_inventory().await?;
            println!(
                "added={} updated={} removed={}",
                report.added, report.updated, report.removed
            );
            println!(
                "groups added={} updated={} removed={}",
                report.groups_added, report.groups_updated, report.groups_removed
            );
        }
        Command::Reconcile { force_disable } => {
            let report = controller.reconcile(force_disable).await?;
            println!(
                "dispatched={} unchanged={} skipped={} failed={}",
                report.dispatched, report.unchanged, report.skipped, report.failed
            );
        }
        Command::Eval { curve_id, x } => {
            let value = controller.evaluate_curve(CurveId(curve_id), x).await?;
            println!("{value}");
        }
        Command::ResetDaily => {
            let report = controller.reset_daily_offsets_and_overrides().await?;
            println!(
                "offsets_reset={} overrides_reset={}",
                report.offsets_reset, report.overrides_reset
            );
        }
        Command::Curves { kind } => {
            let curves = controller.list_curves(kind).await?;
            println!("{}", serde_json::to_string_pretty(&curves)?);
        }
    }

    Ok(())
}
