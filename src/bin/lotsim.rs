//! lotsim command-line runner
//!
//! Reads a car file, runs the simulation, and prints the summary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use lotsim::{
    load_records, render_json, render_text, validate_capacity, ClockKind, LotResult, Simulation,
    SimulationConfig,
};

/// Command-line configuration
#[derive(Debug)]
struct Config {
    /// Car file to read
    input: PathBuf,
    /// Raw capacity as given; validated before the run
    capacity: i64,
    /// Length of one logical time unit
    unit: Duration,
    /// Use the virtual clock instead of real delays
    virtual_time: bool,
    /// Optional wall-clock budget
    deadline: Option<Duration>,
    /// Print JSON instead of text
    json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from("demo/input/cars.txt"),
            capacity: 4,
            unit: Duration::from_secs(1),
            virtual_time: false,
            deadline: None,
            json: false,
        }
    }
}

fn usage() {
    println!("lotsim - parking lot simulation");
    println!();
    println!("USAGE:");
    println!("    lotsim [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -i, --input <FILE>        Car file [default: demo/input/cars.txt]");
    println!("    -c, --capacity <N>        Number of parking spots [default: 4]");
    println!("    -u, --unit-ms <MS>        Milliseconds per time unit [default: 1000]");
    println!("        --virtual             Run on virtual time (no real delays)");
    println!("    -d, --deadline-ms <MS>    Cancel cars still running after MS");
    println!("        --json                Print the report as JSON");
    println!("    -h, --help                Print help information");
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn number<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("invalid value for {flag}: {raw}"))
}

/// Returns `Ok(None)` when help was requested.
fn parse_args(args: &[String]) -> Result<Option<Config>, String> {
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            flag @ ("--input" | "-i") => {
                config.input = PathBuf::from(value(args, i, flag)?);
                i += 2;
            }
            flag @ ("--capacity" | "-c") => {
                config.capacity = number(value(args, i, flag)?, flag)?;
                i += 2;
            }
            flag @ ("--unit-ms" | "-u") => {
                config.unit = Duration::from_millis(number(value(args, i, flag)?, flag)?);
                i += 2;
            }
            flag @ ("--deadline-ms" | "-d") => {
                config.deadline = Some(Duration::from_millis(number(value(args, i, flag)?, flag)?));
                i += 2;
            }
            "--virtual" => {
                config.virtual_time = true;
                i += 1;
            }
            "--json" => {
                config.json = true;
                i += 1;
            }
            "--help" | "-h" => return Ok(None),
            arg => return Err(format!("unknown argument: {arg}")),
        }
    }

    Ok(Some(config))
}

fn run(config: &Config) -> LotResult<String> {
    let capacity = validate_capacity(config.capacity)?;
    let clock = if config.virtual_time {
        ClockKind::Virtual
    } else {
        ClockKind::Wall { unit: config.unit }
    };
    let simulation = Simulation::new(SimulationConfig {
        capacity,
        clock,
        deadline: config.deadline,
    })?;

    let parsed = load_records(&config.input)?;
    for rejected in &parsed.rejected {
        eprintln!("Invalid line {}: {} ({})", rejected.line_no, rejected.line, rejected.error);
    }

    let report = simulation.run(parsed.records)?;
    if config.json {
        render_json(&report)
    } else {
        Ok(render_text(&report))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = match parse_args(&args) {
        Ok(Some(config)) => config,
        Ok(None) => {
            usage();
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
