use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fruitbench::config::Config;
use fruitbench::display;
use fruitbench::record;
use fruitbench::session::Session;

#[derive(Parser)]
#[command(
    name = "fruitbench",
    version,
    about = "Benchmark the fruit indexing program over every corpus in the data directory"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (defaults to ./fruitbench.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print JSON instead of the human summary
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Parse finished result logs and print their records
    Inspect {
        #[arg(required = true, value_name = "LOG")]
        logs: Vec<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => {
            let config = Config::load(cli.config.as_deref())?;
            let mut session = Session::new(config.invoker(), config.policy()?);
            let report = session.run_all(&config.data_dir, &config.results_dir)?;

            if cli.json {
                println!("{}", display::format_summary_json(&report));
            } else {
                print!("{}", display::format_summary(&report));
            }
        }
        Some(Command::Inspect { logs }) => {
            let mut parsed = Vec::new();
            for path in &logs {
                let records = record::read_log(path)?;
                parsed.push((path.display().to_string(), records));
            }

            if cli.json {
                println!("{}", display::format_records_json(&parsed));
            } else {
                for (log, records) in &parsed {
                    print!("{}", display::format_records(log, records));
                }
            }
        }
    }

    Ok(())
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("{}", err);
        process::exit(1);
    }
}
