//! Portfolio Monitor CLI
//!
//! Every invocation signs in with the given credentials, runs one command
//! and flushes the audit trail before exiting.

use anyhow::Result;
use clap::{Parser, Subcommand};
use portfolio_monitor::app::PortfolioMonitor;
use portfolio_monitor::auth::{Credentials, DEMO_EMAIL};
use portfolio_monitor::commands::{
    self, AuditArgs, DashboardArgs, LegacyArgs, MonitorArgs, OrderArgs, PortfolioArgs, TransactionArgs,
};
use portfolio_monitor::config::AppConfig;
use portfolio_monitor::telemetry::{init_metrics, init_tracing};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (without extension is fine)
    #[arg(short, long, env = "PM_CONFIG")]
    config: Option<String>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, env = "PM_EMAIL", default_value = DEMO_EMAIL)]
    email: String,

    #[arg(long, env = "PM_PASSWORD", hide_env_values = true, default_value = "")]
    password: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and print the session user
    Login,
    /// Portfolio totals, allocation and trade analytics
    Dashboard(DashboardArgs),
    /// Holdings with filters and sorting
    Portfolio(PortfolioArgs),
    /// Settled transactions, optionally exported
    Transactions(TransactionArgs),
    /// Validate and submit an order
    Order(OrderArgs),
    /// Cache, queue, audit, error and security statistics
    Monitor(MonitorArgs),
    /// Run a legacy operation through the job queue
    Legacy(LegacyArgs),
    /// Export the audit trail
    Audit(AuditArgs),
    /// End-to-end walkthrough against the configured store
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    let _guard = init_tracing(&config.logging)?;
    let metrics_handle = init_metrics()?;

    info!("📈 Starting {}", portfolio_monitor::BUILD_INFO);

    let app = PortfolioMonitor::new(config)?;
    let credentials = Credentials::new(cli.email, cli.password);

    let outcome = run(&app, &cli.command, &credentials, &metrics_handle).await;
    if let Err(err) = &outcome {
        error!("💥 Command failed: {:#}", err);
    }

    if app.auth().is_authenticated() {
        app.auth().logout()?;
    }
    app.shutdown().await;
    info!("✅ Portfolio Monitor shut down");
    outcome
}

async fn run(
    app: &PortfolioMonitor,
    command: &Command,
    credentials: &Credentials,
    metrics: &metrics_exporter_prometheus::PrometheusHandle,
) -> Result<()> {
    let user = app.auth().login(credentials)?;

    match command {
        Command::Login => {
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Command::Dashboard(args) => commands::dashboard(app, args).await,
        Command::Portfolio(args) => commands::portfolio(app, args).await,
        Command::Transactions(args) => commands::transactions(app, args).await,
        Command::Order(args) => commands::order(app, args).await,
        Command::Monitor(args) => commands::monitor(app, args, metrics).await,
        Command::Legacy(args) => commands::legacy(app, args).await,
        Command::Audit(args) => commands::audit(app, args).await,
        Command::Demo => commands::demo(app, metrics).await,
    }
}
