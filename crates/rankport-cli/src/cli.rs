use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rankport", version, about = "Rank actions with an ONNX model")]
pub struct Cli {
    /// Log filter (RUST_LOG syntax); RUST_LOG wins when set
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score a tensor-notation payload and print one action per line
    Rank {
        /// Path to the ONNX model file
        #[arg(long)]
        model_path: PathBuf,

        /// Model output whose elements are the action probabilities
        #[arg(long, default_value = "output")]
        output_name: String,

        /// Seed passed through to the ranker
        #[arg(long, default_value_t = 0)]
        seed: u64,

        #[command(flatten)]
        engine: EngineArgs,

        #[command(flatten)]
        features: FeatureArgs,
    },

    /// Print a model's inputs and outputs
    Inspect {
        /// Path to the ONNX model file
        #[arg(long)]
        model_path: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Parse a tensor-notation payload and print the decoded tensors
    Check {
        #[command(flatten)]
        features: FeatureArgs,
    },
}

#[derive(Args, Debug)]
pub struct EngineArgs {
    /// Intra-op thread count (defaults to ONNX Runtime's choice)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Graph optimization level (disable, basic, extended or all)
    #[arg(long, default_value = "all")]
    pub opt_level: String,
}

#[derive(Args, Debug)]
pub struct FeatureArgs {
    /// Tensor notation given inline
    #[arg(long, conflicts_with = "features_file")]
    pub features: Option<String>,

    /// File holding tensor notation; stdin is read when neither is given
    #[arg(long)]
    pub features_file: Option<PathBuf>,
}
