use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use turbulence_risk_core::training::{EarlyStopping, TracingObserver};
use turbulence_risk_core::weather::{Location, WeatherSource};
use turbulence_risk_core::{
    evaluate_dataset, train_with_observer, Celsius, Hectopascals, MetersPerSecond, SampleBuilder,
    StaticWeather, TrainingConfig,
};

/// Physics-informed turbulence risk estimate for a single location
#[derive(Parser, Debug)]
#[command(name = "turbulence-risk")]
#[command(about = "Train a turbulence risk estimator from a weather reading", long_about = None)]
struct Args {
    /// Wind speed in m/s
    #[arg(short, long, default_value_t = 12.0)]
    wind_speed: f64,

    /// Station pressure in hPa
    #[arg(short, long, default_value_t = 1005.0)]
    pressure: f64,

    /// Air temperature in °C
    #[arg(short, long, default_value_t = 24.0)]
    temperature: f64,

    /// Latitude of the first sample
    #[arg(long, default_value_t = Location::SEOUL.latitude)]
    lat: f64,

    /// Longitude of the first sample
    #[arg(long, default_value_t = Location::SEOUL.longitude)]
    lon: f64,

    /// Number of optimizer iterations
    #[arg(short, long, default_value_t = 1000)]
    epochs: usize,

    /// Weight of the transport residual in the total loss
    #[arg(long, default_value_t = 1.0)]
    physics_weight: f64,

    /// Width of both hidden layers
    #[arg(long, default_value_t = 20)]
    hidden_dim: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    learning_rate: f64,

    /// Seed for parameter initialisation (random when omitted)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Stop after this many iterations without improvement (disabled when omitted)
    #[arg(long)]
    patience: Option<usize>,

    /// Log losses every N iterations
    #[arg(short, long, default_value_t = 100)]
    log_interval: usize,

    /// Write the loss history as JSON to this file
    #[arg(long)]
    history_out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let temperature = Celsius::try_from(args.temperature).map_err(anyhow::Error::msg)?;
    let source = StaticWeather::new(
        MetersPerSecond::new(args.wind_speed),
        Hectopascals::new(args.pressure),
        temperature,
    );
    let origin = Location::new(args.lat, args.lon);

    println!("=== Turbulence Risk ===\n");
    let Some(reading) = source.current(origin) else {
        warn!("No weather data available, nothing to train on");
        return Ok(());
    };
    let heuristic = reading.heuristic_risk();
    println!(
        "Reading at ({:.4}, {:.4}): wind {}, pressure {}, temperature {}",
        origin.latitude, origin.longitude, reading.wind_speed, reading.pressure, reading.temperature
    );
    println!("Heuristic risk: {heuristic:.4}\n");

    let dataset = SampleBuilder::new(origin).from_reading(&reading);

    let mut config = TrainingConfig::default()
        .with_epochs(args.epochs)
        .with_physics_weight(args.physics_weight)
        .with_hidden_dim(args.hidden_dim)
        .with_learning_rate(args.learning_rate);
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(patience) = args.patience {
        config = config.with_early_stopping(EarlyStopping::new(patience, 0.0));
    }

    let mut observer = TracingObserver::new(args.log_interval);
    let (estimator, history) = train_with_observer(&dataset, &config, &mut observer)
        .context("training failed")?;

    let learned = evaluate_dataset(&estimator, &dataset)?;
    info!("Evaluated {} samples", dataset.len());

    println!("\n=== Result ===");
    println!("Iterations:      {}", history.len());
    if let Some(last) = history.last() {
        println!(
            "Final loss:      total={:.6}, data={:.6}, physics={:.6}",
            last.total, last.data, last.physics
        );
    }
    if let Some((iteration, total)) = history.min_total() {
        println!("Best total:      {total:.6} (iteration {})", iteration + 1);
    }
    println!("Heuristic risk:  {heuristic:.4}");
    println!("Learned risk:    {learned:.4}");

    if let Some(path) = args.history_out {
        let file = File::create(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &history)
            .with_context(|| format!("cannot write history to {}", path.display()))?;
        info!("Loss history written to {}", path.display());
    }

    Ok(())
}
