//! Bringup harness entry point.
//!
//! Runs kernel tasks on a simulated board and inspects the simulation log
//! they leave behind.

mod blink;
mod board;
mod gpio;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orbit_common::config::KernelConfig;
use orbit_hal::SysTick;
use orbit_runtime::SchedulerBuilder;
use orbit_sim::SimLogReader;
use orbit_time::Clock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::blink::{blink, power_gated_bursts, Burst};
use crate::board::SimulationBoard;
use crate::gpio::PINS_PER_PORT;

/// Bringup command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "orbit-bringup",
    about = "Orbit kernel bringup harness - run tasks on a simulated board",
    version,
    long_about = None
)]
struct Args {
    /// Path to a kernel configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Blink LEDs and pulse a power-gated payload line.
    Blink {
        /// Number of LEDs to blink.
        #[arg(long, default_value = "1")]
        leds: u8,

        /// Time between toggles.
        #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
        delay: Duration,

        /// Simulated time to run for.
        #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
        duration: Duration,

        /// Idle time between payload bursts.
        #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
        burst_period: Duration,

        /// Simulation log file (overrides config file).
        #[arg(long, value_name = "FILE")]
        log_file: Option<PathBuf>,
    },

    /// Print a simulation log.
    ReadLog {
        /// Log file to read.
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    match &args.command {
        Command::Blink {
            leds,
            delay,
            duration,
            burst_period,
            log_file,
        } => {
            let mut config = load_config(&args)?;
            if let Some(path) = log_file {
                config.simulation.log_file = Some(path.clone());
            }
            let burst = Burst {
                period: *burst_period,
                ..Burst::default()
            };
            run_blink(&config, *leds, *delay, *duration, burst)
        }
        Command::ReadLog { file } => read_log(file),
    }
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "orbit_bringup={level},orbit_runtime={level},orbit_sim={level},orbit_time={level},orbit_hal={level},orbit_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `ORBIT_CONFIG_PATH` environment variable
/// 3. Built-in defaults
fn load_config(args: &Args) -> Result<KernelConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return KernelConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("ORBIT_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from ORBIT_CONFIG_PATH");
            return KernelConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from ORBIT_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "ORBIT_CONFIG_PATH set but file does not exist, using defaults"
        );
    }

    info!("Using built-in default configuration");
    Ok(KernelConfig::default())
}

/// Run the blink program on a fresh simulation board.
fn run_blink(
    config: &KernelConfig,
    leds: u8,
    delay: Duration,
    duration: Duration,
    burst: Burst,
) -> Result<()> {
    let board = SimulationBoard::new(config).context("Failed to build simulation board")?;
    let clock: Arc<dyn Clock> = board.clock().clone();

    let mut scheduler = SchedulerBuilder::new(Arc::clone(&clock))
        .config(config.scheduler.clone())
        .rcc(board.rcc().clone())
        .build();

    let leds = leds.min(PINS_PER_PORT);
    for i in 0..leds {
        let pin = (SimulationBoard::GREEN_LED_PIN + i) % PINS_PER_PORT;
        scheduler
            .add_task(blink(
                Arc::clone(&clock),
                Arc::clone(board.gpio_a()),
                pin,
                delay,
                duration,
            ))
            .context("Failed to schedule blink task")?;
    }
    scheduler
        .add_task(power_gated_bursts(
            Arc::clone(&clock),
            Arc::clone(board.gpio_b()),
            SimulationBoard::PAYLOAD_PIN,
            burst,
            duration,
        ))
        .context("Failed to schedule payload task")?;

    info!(leds, ?delay, ?duration, "Starting bringup run");
    let deadline = clock.now() + duration;
    let passes = scheduler
        .run_until(deadline)
        .context("Scheduler stopped with an error")?;

    let gpio_a = board.gpio_a().device().inner();
    let gpio_b = board.gpio_b().device().inner();
    println!("simulated time:    {}", clock.now());
    println!("scheduler passes:  {passes}");
    println!(
        "systick:           {} us",
        board.systick().current_time_micros()
    );
    println!("interrupts fired:  {}", board.reactor().interrupts_fired());
    println!(
        "port A (leds):     {} toggles, {} enables, {} disables",
        gpio_a.toggles(),
        gpio_a.enables(),
        gpio_a.disables()
    );
    println!(
        "port B (payload):  {} enables, {} disables",
        gpio_b.enables(),
        gpio_b.disables()
    );
    println!("simulation log:    {}", board.logger().path().display());

    drop(scheduler);
    board.shutdown().context("Failed to shut down simulation board")?;
    Ok(())
}

/// Print every record of a simulation log.
fn read_log(file: &Path) -> Result<()> {
    let reader =
        SimLogReader::open(file).with_context(|| format!("Failed to open log {file:?}"))?;

    let mut count = 0u64;
    for event in reader {
        let event = event.with_context(|| format!("Failed to read log {file:?}"))?;
        println!("{event}");
        count += 1;
    }
    info!(records = count, "Simulation log read");
    Ok(())
}
