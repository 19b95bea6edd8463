use anyhow::Result;
use chrono::{Duration, Utc};
use dotenv::dotenv;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use degen_sim::backtest::{BacktestClock, MarketSimulator};
use degen_sim::config::Config;
use degen_sim::trading::{Account, JsonlEventLog, LogSink, StrategyProfile};

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load environment variables
    dotenv().ok();

    let config = Config::load()?;
    info!("Configuration loaded successfully");

    // Synthesize a market and run the v3 strategy against it
    let start = Utc::now() - Duration::days(config.backtest_days);
    let mut simulator = MarketSimulator::new(start, config.backtest_days, config.generator_seed);
    let (signals, price_paths) = simulator.generate(config.backtest_signals);

    let mut account = Account::new(StrategyProfile::backtest_v3(), config.initial_capital)?;
    account.add_sink(Box::new(LogSink));
    if let Some(path) = &config.events_log_path {
        account.add_sink(Box::new(JsonlEventLog::new(path)));
        info!("Recording trade events to {}", path);
    }

    let result = BacktestClock::new().run(&mut account, signals, price_paths)?;

    let stats = account.stats();
    info!("📊 Backtest complete");
    info!("  Final capital: {:.2}", result.final_capital);
    info!("  Equity:        {:.2} ({:+.1}%)", stats.equity, stats.roi_percent);
    info!(
        "  Trades:        {} ({} wins / {} losses, {:.1}% win rate)",
        stats.trade_count, stats.wins, stats.losses, stats.win_rate
    );
    info!("  Equity samples: {}", result.equity_curve.len());

    Ok(())
}
