use culprit_core::command::{CommandOracle, InputDelivery};
use culprit_core::component::ComponentSet;
use culprit_core::config::{CommandSettings, CulpritConfig, OracleType};
use culprit_core::enumerator::Enumerator;
use culprit_core::oracle::{Oracle, PlantedOracle, Verdict};
use culprit_core::report::SearchReport;
use culprit_core::search::{Algorithm, ConflictSearch};
use culprit_core::session::Session;

use clap::Parser;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// additive, imcs, ddmin, quickxplain or adaptive.
    #[clap(short, long)]
    algorithm: Option<Algorithm>,
    /// Candidate count at or below which the adaptive search switches to QuickXplain.
    #[clap(long)]
    threshold: Option<usize>,
    /// Test command, split on whitespace. Receives the enabled components on stdin.
    #[clap(long)]
    target_command: Option<String>,
    /// Find every disjoint conflict instead of the first one.
    #[clap(long)]
    enumerate: bool,
    /// Print the report as JSON.
    #[clap(long)]
    json: bool,
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Reports go to stdout, logs to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(config_file: Option<PathBuf>) -> Result<CulpritConfig, anyhow::Error> {
    match config_file {
        Some(config_path) => {
            info!(path = ?config_path, "reading config");
            CulpritConfig::load_from_file(&config_path)
        }
        None => {
            let default_config_path = PathBuf::from("culprit.toml");
            if default_config_path.exists() {
                info!(path = ?default_config_path, "reading config from working directory");
                CulpritConfig::load_from_file(&default_config_path)
            } else {
                info!("no culprit.toml found, starting from defaults");
                Ok(CulpritConfig::default())
            }
        }
    }
}

fn apply_overrides(config: &mut CulpritConfig, cli: &Cli) {
    if let Some(algorithm) = cli.algorithm {
        config.search.algorithm = algorithm;
    }
    if let Some(threshold) = cli.threshold {
        config.search.adaptive_threshold = threshold;
    }
    if cli.enumerate {
        config.enumerate.enabled = true;
    }
    if let Some(target_cmd_str) = &cli.target_command {
        if config.oracle.oracle_type == OracleType::Command {
            let cmd_settings = config
                .oracle
                .command_settings
                .get_or_insert_with(|| CommandSettings {
                    command: Vec::new(),
                    input_delivery: InputDelivery::StdIn,
                    timeout_ms: 60_000,
                    timeout_verdict: Verdict::Fail,
                    working_dir: None,
                });
            cmd_settings.command = target_cmd_str.split_whitespace().map(String::from).collect();
        } else {
            warn!("ignoring --target-command: the configured oracle does not run a command");
        }
    }
}

fn build_oracle(
    config: &CulpritConfig,
    universe: &ComponentSet<String>,
) -> Result<Box<dyn Oracle<String>>, anyhow::Error> {
    match config.oracle.oracle_type {
        OracleType::Command => {
            let cmd_settings = config.oracle.command_settings.as_ref().ok_or_else(|| {
                anyhow::anyhow!("Command settings missing for command oracle type in config")
            })?;
            Ok(Box::new(CommandOracle::new(cmd_settings.to_oracle_config())?))
        }
        OracleType::Planted => {
            let settings = config.oracle.planted_settings.clone().unwrap_or_default();

            let mut conflicts: Vec<ComponentSet<String>> = Vec::new();
            for names in &settings.conflicts {
                let conflict: ComponentSet<String> = names.iter().cloned().collect();
                if !conflict.is_subset(universe) {
                    warn!(?conflict, "planted conflict is not contained in the universe and can never fail");
                }
                conflicts.push(conflict);
            }

            if !settings.random_sizes.is_empty() {
                let available: Vec<String> = universe
                    .iter()
                    .filter(|name| !conflicts.iter().any(|c| c.contains(*name)))
                    .cloned()
                    .collect();
                let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
                let random =
                    PlantedOracle::random_disjoint(&available, &settings.random_sizes, &mut rng)?;
                conflicts.extend(random.conflicts().iter().cloned());
            }

            info!(planted = ?conflicts, "using simulated oracle");
            Ok(Box::new(PlantedOracle::new(conflicts)))
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = load_config(cli.config_file.clone())?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let universe = config.universe.load()?;
    info!(components = universe.len(), "loaded universe");
    let mut oracle = build_oracle(&config, &universe)?;

    let report = if config.enumerate.enabled {
        let enumeration = Enumerator::new(config.enumerate.cache_scope)
            .with_check_remaining(config.enumerate.check_remaining)
            .find_all_conflicts(&mut oracle, &universe)?;
        SearchReport::new(
            "imcs (enumerate)",
            &enumeration.conflict_sets,
            enumeration.invocations,
        )
    } else {
        let threshold = config.adaptive_threshold()?;
        let search = config
            .search
            .algorithm
            .build::<String>(threshold, config.search.precheck);
        let outcome = Session::new(config.search.use_cache).run(
            search.as_ref(),
            &mut oracle,
            &universe,
        )?;
        SearchReport::new(search.name(), &[outcome.conflict_set], outcome.invocations)
    };

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }
    Ok(())
}
