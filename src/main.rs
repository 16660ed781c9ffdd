//! Candle Oracle
//!
//! Next-candle direction predictor with continuous walk-forward evaluation.

use candle_oracle::{
    client::{fetch_batched, BinanceClient, CandleSource},
    config::{Config, Preset},
    cycle::{CycleConfig, CycleOrchestrator},
    engine::PatternEngine,
    evaluation::{EvaluationResult, WalkForwardEvaluator},
    monitor::{start_server, AppState},
    storage,
    testing::random_walk,
    types::group_by_instrument,
};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "candle-oracle")]
#[command(about = "Pattern-voting next-candle predictor with walk-forward evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Operating profile; explicit config values still win
    #[arg(long, value_enum)]
    preset: Option<Preset>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP control server
    Serve {
        /// Start cycling immediately
        #[arg(long)]
        autostart: bool,
    },
    /// Run one evaluation against live market data
    Evaluate,
    /// Show the current prediction for an instrument
    Signal {
        /// Instrument symbol (e.g., BTCUSDT)
        instrument: String,
    },
    /// Evaluate offline on seeded random walks
    Simulate {
        /// Candles per synthetic instrument
        #[arg(long, default_value = "1000")]
        candles: usize,
        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,
        /// Number of synthetic instruments
        #[arg(long, default_value = "5")]
        instruments: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load_with_preset(&cli.config, cli.preset)?;

    match cli.command {
        Commands::Serve { autostart } => serve(config, autostart).await,
        Commands::Evaluate => evaluate(config).await,
        Commands::Signal { instrument } => signal(config, &instrument).await,
        Commands::Simulate {
            candles,
            seed,
            instruments,
        } => simulate(config, candles, seed, instruments),
    }
}

fn market_source(config: &Config) -> anyhow::Result<Arc<dyn CandleSource>> {
    let client = BinanceClient::new(&config.market_data.base_url, config.market_data.request_timeout())?;
    Ok(Arc::new(client))
}

async fn build_orchestrator(config: &Config) -> anyhow::Result<Arc<CycleOrchestrator>> {
    let source = market_source(config)?;
    let store = storage::open(&config.storage).await?;
    let orchestrator = CycleOrchestrator::new(CycleConfig::from_config(config), source, store);

    if let Err(e) = orchestrator.rehydrate().await {
        tracing::warn!("Failed to restore persisted state: {}", e);
    }
    Ok(Arc::new(orchestrator))
}

async fn serve(config: Config, autostart: bool) -> anyhow::Result<()> {
    tracing::info!(
        "Starting candle oracle (preset: {})",
        config
            .preset
            .map(|p| format!("{:?}", p).to_lowercase())
            .unwrap_or_else(|| "custom".to_string())
    );

    let orchestrator = build_orchestrator(&config).await?;
    tracing::info!("Run id {}", orchestrator.run_id());

    if autostart {
        let orch = orchestrator.clone();
        tokio::spawn(async move {
            orch.start().await;
        });
    }

    let state = Arc::new(AppState::new(orchestrator.clone()));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutdown requested");
    };
    start_server(state, &config.server.host, config.server.port, shutdown).await?;

    // Exiting is not a stop: persisted counters carry over to the next boot
    let state = orchestrator.status();
    tracing::info!(
        "👋 Exiting after {} cycles (best accuracy {:.2}%)",
        state.cycle_count,
        state.best_accuracy * 100.0
    );
    Ok(())
}

async fn evaluate(config: Config) -> anyhow::Result<()> {
    let source = market_source(&config)?;
    let store = storage::open(&config.storage).await?;

    let mut engine = PatternEngine::new(config.evaluation.learning_rate);
    if let Some(state) = store.load_engine().await? {
        engine.restore(&state);
    }

    let report = fetch_batched(
        source.as_ref(),
        &config.cycle.instruments,
        &candle_oracle::client::CandleRequest::latest(
            config.market_data.interval.clone(),
            config.market_data.limit,
        ),
        &config.market_data.batch_config(),
    )
    .await?;
    if report.candles.is_empty() {
        anyhow::bail!("No candles fetched from {} instruments", config.cycle.instruments.len());
    }

    let evaluator = WalkForwardEvaluator::new(config.evaluation.walk_forward());
    let result = evaluator.evaluate(&mut engine, &group_by_instrument(report.candles));
    print_result(&result);
    Ok(())
}

async fn signal(config: Config, instrument: &str) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(&config).await?;
    let report = orchestrator.signal(&instrument.to_uppercase()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn simulate(config: Config, candles: usize, seed: u64, instruments: usize) -> anyhow::Result<()> {
    let data: BTreeMap<String, _> = (0..instruments)
        .map(|i| {
            let name = format!("SIM{}USDT", i);
            let series = random_walk(&name, candles, seed.wrapping_add(i as u64));
            (name, series)
        })
        .collect();

    let mut engine = PatternEngine::new(config.evaluation.learning_rate);
    let evaluator = WalkForwardEvaluator::new(config.evaluation.walk_forward());
    let result = evaluator.evaluate(&mut engine, &data);
    print_result(&result);

    println!("\nModel:");
    for (pattern, stat) in engine.model_stats() {
        println!(
            "  {:<22} weight {:.3}  accuracy {:>6.2}%  trades {}",
            pattern.as_str(),
            stat.weight,
            stat.accuracy,
            stat.trades
        );
    }
    Ok(())
}

fn print_result(result: &EvaluationResult) {
    println!("\n📊 Walk-forward evaluation");
    println!("  Accuracy:     {:.2}%", result.accuracy * 100.0);
    println!("  Trades:       {}/{}", result.correct_trades, result.total_trades);
    println!(
        "  Training:     {}/{}",
        result.training_correct, result.training_trades
    );
    println!("  Phase:        {}", result.learning_phase);
    println!(
        "  Instruments:  {} evaluated, {} skipped",
        result.instruments_evaluated,
        result.instruments_skipped.len()
    );
    println!("  Data points:  {}", result.data_points);

    if result.total_trades > 0 {
        println!("\n  Test segment phases:");
        for (phase, stats) in &result.phase_results {
            println!(
                "    {:<8} {:>6.2}% ({}/{})",
                format!("{:?}", phase).to_lowercase(),
                stats.accuracy() * 100.0,
                stats.correct,
                stats.total
            );
        }
    }

    if !result.per_pattern_stats.is_empty() {
        println!("\n  Patterns (test phase):");
        for (pattern, stats) in &result.per_pattern_stats {
            println!(
                "    {:<22} {:>6.2}% ({}/{})",
                pattern.as_str(),
                stats.accuracy() * 100.0,
                stats.correct,
                stats.total
            );
        }
    }
}
