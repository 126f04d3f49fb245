//! Portfolio Rebalancer - Main Entry Point
//!
//! Runs the scheduled rebalancer, or a one-shot inspection command.

use anyhow::Result;
use clap::{Parser, Subcommand};
use portfolio_rebalancer::config::Config;
use portfolio_rebalancer::exchange::{
    BalanceSource, CoinGeckoClient, PriceSource, RecallClient, TokenRegistry,
};
use portfolio_rebalancer::scheduler::{log_summary, TradingScheduler};
use portfolio_rebalancer::strategy::{PortfolioManager, PortfolioSummary, RebalanceExecutor};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Portfolio Rebalancer CLI
#[derive(Parser)]
#[command(name = "portfolio-rebalancer")]
#[command(version, about = "Target-weight portfolio rebalancing on Recall")]
struct Cli {
    /// Path to a config file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Run the scheduler until interrupted (default)
    Run,
    /// Show portfolio status and allocation
    Status,
    /// Trigger a manual portfolio rebalance
    Rebalance,
    /// Show current token balances
    Balance,
    /// Show current token prices
    Prices,
    /// Show detailed portfolio information
    Portfolio,
}

/// Clients and the scheduler wired from configuration.
struct Services {
    tokens: TokenRegistry,
    recall: Arc<RecallClient>,
    coingecko: Arc<CoinGeckoClient>,
    scheduler: TradingScheduler,
}

impl Services {
    fn build(config: &Config) -> Result<Self> {
        let tokens = config.token_registry()?;
        let recall = Arc::new(RecallClient::new(&config.recall, config.http_timeout())?);
        let coingecko = Arc::new(CoinGeckoClient::new(
            &config.coingecko,
            &tokens,
            config.http_timeout(),
        )?);

        if config.recall.api_key.is_empty() {
            info!("⚠️  No Recall API key provided. Venue calls will be rejected.");
        }

        let manager = PortfolioManager::new(
            coingecko.clone(),
            recall.clone(),
            tokens.clone(),
            config.target_allocation()?,
            config.rebalance_config(),
        )?;
        let executor = RebalanceExecutor::new(
            Arc::new(manager),
            recall.clone(),
            config.trade_delay(),
        );

        Ok(Self {
            tokens,
            recall,
            coingecko,
            scheduler: TradingScheduler::new(Arc::new(executor)),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    let mut services = Services::build(&config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(&config, &mut services).await,
        Commands::Status => {
            let summary = services.scheduler.portfolio_status().await?;
            print_status(&summary);
            Ok(())
        }
        Commands::Rebalance => {
            println!("Triggering manual rebalance...");
            let report = services.scheduler.trigger_rebalance().await?;
            if report.is_noop() {
                println!("Portfolio already balanced, no trades needed.");
            } else {
                for trade in &report.trades {
                    println!(
                        "{:<4} {:<6} {} ({})",
                        trade.order.side.to_string(),
                        trade.order.symbol,
                        trade.order.amount.round_dp(8),
                        trade.response.status()
                    );
                }
                for order in &report.skipped {
                    println!("skip {:<6} {} (base asset)", order.symbol, order.amount.round_dp(8));
                }
            }
            println!("Rebalance completed!");
            Ok(())
        }
        Commands::Balance => {
            let balances = services.recall.get_balances().await?;
            println!("\n=== Current Balances ===");
            let mut balances: Vec<_> = balances.into_iter().collect();
            balances.sort_by(|a, b| a.0.cmp(&b.0));
            for (symbol, amount) in balances {
                println!("{:<6}: {}", symbol, amount);
            }
            Ok(())
        }
        Commands::Prices => {
            let prices = services
                .coingecko
                .get_prices(&services.tokens.symbols())
                .await?;
            println!("\n=== Current Prices (USD) ===");
            for symbol in services.tokens.symbols() {
                if let Some(price) = prices.get(&symbol) {
                    println!("{:<6}: ${:.2}", symbol, price);
                }
            }
            Ok(())
        }
        Commands::Portfolio => {
            let portfolio = services.recall.get_portfolio().await?;
            println!("\n=== Portfolio Details ===");
            println!("{}", serde_json::to_string_pretty(&portfolio)?);
            Ok(())
        }
    }
}

/// Log the initial status, start the jobs and wait for a shutdown signal.
async fn run_daemon(config: &Config, services: &mut Services) -> Result<()> {
    info!("🚀 Starting portfolio rebalancer");
    log_config(config);

    info!("Getting initial portfolio status...");
    let initial = services.scheduler.portfolio_status().await?;
    log_summary(&initial);

    services.scheduler.schedule_rebalancing(config.rebalance_time()?);
    services
        .scheduler
        .schedule_reporting(config.trading.report_interval_minutes);

    info!(
        schedules = ?services.scheduler.active_schedules(),
        "✅ Rebalancer started"
    );

    shutdown_signal().await;

    info!("🛑 Shutdown signal received, stopping jobs");
    services.scheduler.stop_all();
    info!("👋 Portfolio rebalancer stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_status(summary: &PortfolioSummary) {
    println!("\n=== Portfolio Status ===");
    println!("Total Value: ${:.2}", summary.total_value);
    println!(
        "Rebalance Needed: {}\n",
        if summary.rebalance_needed { "YES" } else { "NO" }
    );

    println!("Positions:");
    for p in &summary.positions {
        println!(
            "{:<6} | Balance: {:.6} | Value: ${:.2} | Weight: {:.1}% (Target: {:.1}%) | Drift: {:.1}%",
            p.symbol,
            p.balance,
            p.value,
            p.current_weight * dec!(100),
            p.target_weight * dec!(100),
            p.drift * dec!(100)
        );
    }
}

/// Initialize logging with tracing, writing to both stdout and file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "rebalancer.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the guard alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("portfolio_rebalancer=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Recall Environment: {:?}", config.recall.environment);
    info!("   Rebalance Time: {}", config.trading.rebalance_time);
    info!(
        "   Drift Threshold: {:.1}%",
        config.trading.drift_threshold * dec!(100)
    );
    info!("   Min Trade Amount: ${}", config.trading.min_trade_amount);
    info!("   Trade Delay: {}ms", config.trading.trade_delay_ms);
    info!(
        "   Report Interval: {}m",
        config.trading.report_interval_minutes
    );
    info!("   Base Asset: {}", config.trading.base_asset);
    for target in &config.portfolio.targets {
        info!(
            "   Target {}: {:.1}%",
            target.symbol,
            target.weight * dec!(100)
        );
    }
}
