use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::seq::SliceRandom;
use spreadbot::backtest::SimulationRunner;
use spreadbot::execution::{
    MarketDataGateway, MovingAverageTrader, Shutdown, ShutdownTrigger, Speculator,
};
use spreadbot::persistence::{Store, TradeLedger};
use spreadbot::{Brokerage, HttpBroker, Security, Settings};

#[derive(Parser)]
#[command(name = "spreadbot", about = "Spread speculation bot for crypto limit orders")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Buy the most volatile candidate under market, sell above the fill, repeat
    Idle,
    /// Replay the moving average rule over recent history
    Sim {
        /// Security to replay; defaults to the pinned one or a random candidate
        #[arg(long)]
        security: Option<String>,
        /// Number of most recent 5-minute ticks to replay
        #[arg(long)]
        ticks: Option<usize>,
        /// Starting cash in USD
        #[arg(long)]
        cash: Option<f64>,
    },
    /// Trade one security live on the moving average rule
    Movavg,
    /// Print buying power, holdings and bookkeeping
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load().context("loading settings")?;
    let broker = HttpBroker::new(
        &settings.broker_base_url,
        &settings.broker_api_token,
        settings.broker_requests_per_minute,
    )
    .context("building brokerage client")?;

    match cli.command {
        Commands::Idle => run_idle(&broker, &settings).await,
        Commands::Sim {
            security,
            ticks,
            cash,
        } => run_sim(&broker, &settings, security, ticks, cash).await,
        Commands::Movavg => run_movavg(&broker, &settings).await,
        Commands::Status => run_status(&broker, &settings).await,
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("spreadbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Flip the shutdown flag on Ctrl+C
fn watch_ctrl_c() -> Shutdown {
    let (trigger, shutdown) = Shutdown::channel();
    tokio::spawn(wait_for_interrupt(trigger));
    shutdown
}

async fn wait_for_interrupt(trigger: ShutdownTrigger) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl+C: {}", e);
        return;
    }
    tracing::info!("Received Ctrl+C, finishing at the next wait point...");
    trigger.trigger();
}

/// Pinned security, else a random candidate
fn choose_security(settings: &Settings) -> Result<Security> {
    if let Some(pinned) = settings.pinned() {
        return Ok(pinned);
    }
    settings
        .candidate_securities()
        .choose(&mut rand::thread_rng())
        .cloned()
        .context("no candidate securities configured")
}

// ============================================================================
// Commands
// ============================================================================

async fn run_idle(broker: &HttpBroker, settings: &Settings) -> Result<()> {
    let store = Store::from_settings(settings)
        .await
        .context("opening counter store")?;
    let ledger = TradeLedger::new(store);
    let shutdown = watch_ctrl_c();

    let stats = Speculator::new(broker, &ledger, settings, shutdown)
        .run()
        .await
        .context("idle speculation")?;

    tracing::info!(
        "Session: {} cycles, {} sold, profit ${:.2}",
        stats.cycles_started,
        stats.sells_filled,
        stats.session_profit
    );
    tracing::info!("TOTAL RUN PROFIT: ${:.2}", ledger.total_profit().await?);
    Ok(())
}

async fn run_sim(
    broker: &HttpBroker,
    settings: &Settings,
    security: Option<String>,
    ticks: Option<usize>,
    cash: Option<f64>,
) -> Result<()> {
    let security = match security {
        Some(symbol) => Security::new(symbol),
        None => choose_security(settings)?,
    };
    let ticks = ticks.unwrap_or(settings.sim_ticks);
    let cash = cash.unwrap_or(settings.sim_initial_cash);

    let gateway = MarketDataGateway::new(broker);
    let history = gateway
        .weekly_closes(&security)
        .await
        .with_context(|| format!("fetching history for {}", security))?;

    let report = SimulationRunner::new(ticks, cash).run_windows(
        &history,
        settings.ma_long_window,
        settings.ma_short_window,
    );

    tracing::info!(
        security = %security,
        ticks = report.ticks,
        buys = report.buys,
        sells = report.sells,
        refused_sells = report.refused_sells,
        "Simulation finished"
    );
    println!(
        "{}: ${:.2} -> ${:.2} ({:+.2}%)",
        security,
        report.initial_cash,
        report.final_cash,
        report.return_pct()
    );
    Ok(())
}

async fn run_movavg(broker: &HttpBroker, settings: &Settings) -> Result<()> {
    let security = choose_security(settings)?;
    let cash = match settings.spec_cash {
        Some(cash) => cash,
        None => broker.buying_power().await?,
    };
    let shutdown = watch_ctrl_c();

    let book = MovingAverageTrader::new(broker, security.clone(), settings, shutdown)
        .run(cash)
        .await
        .with_context(|| format!("moving average trader on {}", security))?;

    tracing::info!(
        "Stopped with ${:.2} cash and {} {}",
        book.cash,
        book.shares,
        security
    );
    Ok(())
}

async fn run_status(broker: &HttpBroker, settings: &Settings) -> Result<()> {
    let buying_power = broker.buying_power().await?;
    let holdings = broker.get_positions().await?;

    println!("Buying Power: ${:.2}", buying_power);
    for holding in holdings.iter().filter(|h| h.quantity > 0.0) {
        println!(
            "  {:<6} {:>16.8} ({} free)",
            holding.security,
            holding.quantity,
            holding.free_quantity()
        );
    }

    let ledger = TradeLedger::new(Store::from_settings(settings).await?);
    println!("Total profit: ${:.2}", ledger.total_profit().await?);

    let active = ledger.active_set().await?;
    if !active.is_empty() {
        let symbols: Vec<&str> = active.iter().map(|s| s.as_str()).collect();
        println!("Actively trading: {}", symbols.join(", "));
    }
    Ok(())
}
