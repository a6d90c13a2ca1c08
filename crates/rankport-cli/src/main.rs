mod cli;

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, EngineArgs, FeatureArgs};
use rankport_backend_ort::{OptimizationLevel, OrtEngine, OrtOptions};
use rankport_core::{parse, Engine, EngineSession, InputContext};
use rankport_runtime::{Ranker, RankerConfig};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Rank {
            model_path,
            output_name,
            seed,
            engine,
            features,
        } => rank(&model_path, output_name, seed, &engine, &features),
        Command::Inspect { model_path, engine } => inspect(&model_path, &engine),
        Command::Check { features } => check(&features),
    }
}

fn rank(
    model_path: &Path,
    output_name: String,
    seed: u64,
    engine: &EngineArgs,
    features: &FeatureArgs,
) -> Result<()> {
    let engine = build_engine(engine)?;
    let ranker = Ranker::new(engine, RankerConfig::new(output_name));

    let model = read_model(model_path)?;
    ranker.update(&model)?;

    let notation = read_features(features)?;
    let output = ranker.choose_rank(seed, &notation)?;
    tracing::debug!(actions = output.actions.len(), "ranking complete");

    for action in &output.actions {
        println!("{}\t{}", action.action_id, action.probability);
    }
    Ok(())
}

fn inspect(model_path: &Path, engine: &EngineArgs) -> Result<()> {
    let engine = build_engine(engine)?;
    let model = read_model(model_path)?;
    let session = engine.load(&model)?;

    for (section, list) in [("input", &session.spec().inputs), ("output", &session.spec().outputs)] {
        for io in list {
            let dims: Vec<String> = io
                .dims
                .iter()
                .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
                .collect();
            println!("{section}\t{}\t{}\t[{}]", io.name, io.kind, dims.join(", "));
        }
    }
    Ok(())
}

fn check(features: &FeatureArgs) -> Result<()> {
    let notation = read_features(features)?;
    let mut context = InputContext::new();
    parse(&notation, &mut context)?;

    for entry in context.entries() {
        let tensor = entry.to_tensor()?;
        println!("{}\t{:?}\t{} values", entry.name, tensor.shape.dims(), tensor.byte_len() / 4);
    }
    Ok(())
}

fn build_engine(args: &EngineArgs) -> Result<OrtEngine> {
    Ok(OrtEngine::new(OrtOptions {
        intra_threads: args.threads,
        optimization_level: parse_opt_level(&args.opt_level)?,
    }))
}

fn read_model(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read model {}", path.display()))
}

fn read_features(args: &FeatureArgs) -> Result<String> {
    if let Some(inline) = &args.features {
        return Ok(inline.clone());
    }
    if let Some(path) = &args.features_file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read features {}", path.display()));
    }

    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read features from stdin")?;
    Ok(buf)
}

fn parse_opt_level(raw: &str) -> Result<OptimizationLevel> {
    match raw.to_ascii_lowercase().as_str() {
        "disable" | "0" => Ok(OptimizationLevel::Disable),
        "basic" | "1" => Ok(OptimizationLevel::Basic),
        "extended" | "2" => Ok(OptimizationLevel::Extended),
        "all" | "3" => Ok(OptimizationLevel::All),
        _ => anyhow::bail!(
            "unsupported optimization level: {raw} (expected disable, basic, extended or all)"
        ),
    }
}
