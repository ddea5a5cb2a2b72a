//! WorldLoom - command-line runner.
//!
//! Loads a world configuration from JSON, drives one deterministic run, and
//! writes the world export and run statistics next to each other in the
//! output directory. Invalid configurations fail before anything is written.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use worldloom_domain::{RunId, WorldConfig};
use worldloom_engine::baseline;
use worldloom_engine::templates::CustomRegistry;
use worldloom_engine::{NullEnrichment, SyllableNameGenerator, WorldEngine};

#[derive(Debug)]
struct Args {
    config: PathBuf,
    output: PathBuf,
    seed: Option<u64>,
    run_id: Option<String>,
}

const USAGE: &str = "usage: worldloom --config <world.json> [--seed <u64>] \
[--run-id <id>] [--output <dir>]";

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut config = None;
    let mut output = PathBuf::from("out");
    let mut seed = None;
    let mut run_id = None;

    while let Some(flag) = argv.next() {
        let mut value = |name: &str| {
            argv.next()
                .ok_or_else(|| format!("{name} requires a value"))
        };
        match flag.as_str() {
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--output" => output = PathBuf::from(value("--output")?),
            "--seed" => {
                let raw = value("--seed")?;
                seed = Some(
                    raw.parse::<u64>()
                        .map_err(|_| format!("--seed must be an unsigned integer, got {raw:?}"))?,
                );
            }
            "--run-id" => run_id = Some(value("--run-id")?),
            other => return Err(format!("unknown argument {other:?}")),
        }
    }

    let config = config.ok_or_else(|| "--config is required".to_string())?;
    Ok(Args {
        config,
        output,
        seed,
        run_id,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}\n{USAGE}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "worldloom=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let mut config: WorldConfig = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", args.config.display()))?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    // Fail fast on a bad configuration, with its field path, before any
    // output file exists.
    if let Err(fault) = config.validate() {
        eprintln!("invalid configuration at {}: {}", fault.path, fault.message);
        std::process::exit(1);
    }

    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| RunId::new().to_string());
    tracing::info!(world = %config.name, run_id = %run_id, seed = config.seed, "starting");

    let world_name = config.name.clone();
    let name_seed = config.seed;
    let (templates, systems) = baseline::registries(&config);
    let engine = WorldEngine::new(
        config,
        &templates,
        &systems,
        Arc::new(CustomRegistry::new()),
        Arc::new(SyllableNameGenerator::new(name_seed)),
        Arc::new(NullEnrichment),
    )
    .map_err(|fault| anyhow::anyhow!("invalid configuration at {}: {}", fault.path, fault.message))?;

    let report = engine.run().await?;

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let stem = format!("{world_name}-{run_id}");
    let world_path = args.output.join(format!("{stem}.world.json"));
    let stats_path = args.output.join(format!("{stem}.stats.json"));

    std::fs::write(&world_path, report.export.to_json()?)
        .with_context(|| format!("writing {}", world_path.display()))?;
    std::fs::write(
        &stats_path,
        serde_json::to_string_pretty(&report.statistics)?,
    )
    .with_context(|| format!("writing {}", stats_path.display()))?;

    tracing::info!(
        world = %world_path.display(),
        stats = %stats_path.display(),
        entities = report.export.metadata.entity_count,
        relationships = report.export.metadata.relationship_count,
        overall_fitness = report.statistics.fitness_metrics.overall_fitness,
        "run complete"
    );
    Ok(())
}
