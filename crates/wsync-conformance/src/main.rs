use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wsync_conformance::{
    load_fixtures, record_golden_fixtures, run_checks, run_simulator, write_fixtures,
    ConformanceReport, SimulatorConfig,
};

/// Seeds exercised by `certify` on top of the configured one
const CERTIFY_SEEDS: [u64; 4] = [1, 7, 42, 1337];

fn cli() -> Command {
    Command::new("wsync-conformance")
        .version(env!("CARGO_PKG_VERSION"))
        .about("World sync protocol conformance suite")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("check")
                .about("Check recorded fixtures; records golden fixtures when no directory is given")
                .arg(
                    Arg::new("fixtures")
                        .long("fixtures")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory of *.json fixtures"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run the seeded protocol simulator")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML simulator configuration; flags override it"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("operations")
                        .long("operations")
                        .value_parser(value_parser!(u64))
                        .help("Number of operations to simulate"),
                )
                .arg(
                    Arg::new("replay-limit")
                        .long("replay-limit")
                        .value_parser(value_parser!(usize))
                        .help("Server replay limit"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("record")
                .about("Record golden fixtures from the reference server")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory to write fixtures into"),
                ),
        )
        .subcommand(
            Command::new("certify")
                .about("Run golden fixture checks and the simulator over several seeds")
                .arg(
                    Arg::new("operations")
                        .long("operations")
                        .default_value("500")
                        .value_parser(value_parser!(u64))
                        .help("Operations per seed"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn simulator_config(args: &ArgMatches) -> Result<SimulatorConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => SimulatorConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulatorConfig::new(),
    };
    if let Some(seed) = args.get_one::<u64>("seed") {
        config = config.with_seed(*seed);
    }
    if let Some(operations) = args.get_one::<u64>("operations") {
        config = config.with_operations(*operations);
    }
    if let Some(limit) = args.get_one::<usize>("replay-limit") {
        config = config.with_replay_limit(*limit);
    }
    if args.get_flag("stop-on-violation") {
        config = config.with_stop_on_first_violation(true);
    }
    config.validate()?;
    Ok(config)
}

fn print_report(report: &ConformanceReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.generate_text());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let passed = match matches.subcommand() {
        Some(("check", args)) => {
            let fixtures = match args.get_one::<PathBuf>("fixtures") {
                Some(dir) => load_fixtures(dir)?,
                None => record_golden_fixtures().await?,
            };
            let report = ConformanceReport::new(run_checks(&fixtures));
            print_report(&report, args.get_flag("json"))?;
            report.passed()
        }
        Some(("simulate", args)) => {
            let config = simulator_config(args)?;
            let report = run_simulator(config).await;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.generate_text());
            }
            report.passed()
        }
        Some(("record", args)) => {
            let out = args
                .get_one::<PathBuf>("out")
                .context("--out is required")?;
            let fixtures = record_golden_fixtures().await?;
            for path in write_fixtures(out, &fixtures)? {
                println!("wrote {}", path.display());
            }
            true
        }
        Some(("certify", args)) => {
            let operations = args
                .get_one::<u64>("operations")
                .copied()
                .context("--operations has a default")?;
            let fixtures = record_golden_fixtures().await?;
            let mut report = ConformanceReport::new(run_checks(&fixtures));
            for seed in CERTIFY_SEEDS {
                let config = SimulatorConfig::new()
                    .with_seed(seed)
                    .with_operations(operations);
                report = report.with_simulation(run_simulator(config).await);
            }
            // Tight replay limit forces the fresh fallback path
            let tight = SimulatorConfig::new()
                .with_seed(CERTIFY_SEEDS[0])
                .with_operations(operations)
                .with_replay_limit(1);
            report = report.with_simulation(run_simulator(tight).await);
            print_report(&report, false)?;
            report.passed()
        }
        _ => {
            cli().print_help()?;
            true
        }
    };

    std::process::exit(if passed { 0 } else { 1 });
}
