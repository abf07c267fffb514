//! TaskMetrics CLI Entry Point
//!
//! Bridges an orchestrator to the metrics plugin: task state changes are
//! read as JSON lines and fed to the lifecycle listener while the sampler
//! reports gauges in the background.
//!
//! # Usage
//!
//! ```bash
//! # Read events from stdin
//! CUSTOM_METRICS_PLUGIN_ENABLED=true taskmetrics
//!
//! # Read events from a file or named pipe
//! taskmetrics /run/airflow/task-events
//! ```
//!
//! Each line is one event:
//!
//! ```json
//! {"airflow_id": "prod1", "dag_id": "etl", "task_id": "load", "state": "running", "pid": 1234}
//! {"airflow_id": "prod1", "dag_id": "etl", "task_id": "load", "state": "success"}
//! ```

use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::process::ExitCode;

use log::{info, warn};

use taskmetrics::lifecycle::{TaskEvent, TaskStateListener};
use taskmetrics::{MetricsPlugin, MonitorError, PluginConfig, APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    events_path: Option<String>,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: taskmetrics [OPTIONS] [EVENTS_FILE]");
    println!();
    println!("Arguments:");
    println!("  [EVENTS_FILE]   JSON-lines task events (default: stdin)");
    println!();
    println!("Options:");
    println!("  --verbose       Enable debug logging");
    println!("  --help          Show this help message");
    println!("  --version       Show version information");
    println!();
    println!("Environment:");
    println!("  CUSTOM_METRICS_PLUGIN_ENABLED                 true/false (default: false)");
    println!("  CUSTOM_METRICS_PLUGIN_SLEEP_INTERVAL_SECONDS  Sampling interval (default: 1)");
    println!("  CUSTOM_METRICS_PLUGIN_STATSD_HOST             StatsD host (default: localhost)");
    println!("  CUSTOM_METRICS_PLUGIN_STATSD_PORT             StatsD port (default: 8125)");
    println!("  CUSTOM_METRICS_PLUGIN_STATSD_PREFIX           Metric name prefix (default: none)");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            arg if arg.starts_with('-') && arg != "-" => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.events_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.events_path = Some(arg.clone());
            }
        }
    }

    Ok(config)
}

/// Opens the event source: a file, or stdin for none or `-`.
fn open_events(path: Option<&str>) -> Result<Box<dyn BufRead>, MonitorError> {
    match path {
        Some(path) if path != "-" => Ok(Box::new(BufReader::new(File::open(path)?))),
        _ => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Feeds every event line to the listener.
///
/// Blank lines are ignored and malformed lines are logged and skipped.
/// Returns the number of events dispatched.
fn dispatch_events<R: BufRead>(
    reader: R,
    listener: &dyn TaskStateListener,
) -> Result<usize, MonitorError> {
    let mut dispatched = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<TaskEvent>(&line) {
            Ok(event) => {
                listener.on_event(&event);
                dispatched += 1;
            }
            Err(source) => {
                let err = MonitorError::Event {
                    line: index + 1,
                    source,
                };
                warn!("{}", err);
            }
        }
    }

    Ok(dispatched)
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    info!("{} v{}", APP_NAME, VERSION);

    let plugin_config = PluginConfig::from_env();
    if !plugin_config.enabled {
        info!("Task metrics disabled; set CUSTOM_METRICS_PLUGIN_ENABLED=true to enable");
    }

    let plugin = MetricsPlugin::start(plugin_config);
    let listener = plugin.listener();

    let reader = open_events(config.events_path.as_deref())?;
    let result = dispatch_events(reader, &*listener);

    let swept = plugin.shutdown();
    let dispatched = result?;
    info!(
        "Event stream closed after {} event(s), {} task(s) finalized at shutdown",
        dispatched, swept
    );

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
