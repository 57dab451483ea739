use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// mdcnn: data preparation for a multi-drug resistance CNN
#[derive(Parser, Debug)]
#[command(name = "mdcnn")]
#[command(about = "Genotype/phenotype preparation for a multi-drug resistance CNN")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Panel configuration (JSON); built-in loci and drugs when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join per-locus FASTA files with the phenotype table
    Build(BuildArgs),

    /// Compute (or load the cached) alpha matrix
    Alpha(AlphaArgs),

    /// One-hot encode the merged table into a sparse input tensor
    Tensor(TensorArgs),

    /// Split the input tensor into train and test sets by category
    Split(SplitArgs),

    /// Select per-drug decision thresholds from predicted scores
    Threshold(ThresholdArgs),
}

/// Table building arguments
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Directory with one FASTA file per locus
    #[arg(short, long, required = true)]
    pub genotypes: PathBuf,

    /// Phenotype table (CSV or TSV, optionally gzipped)
    #[arg(short, long, required = true)]
    pub phenotypes: PathBuf,

    /// Output merged table
    #[arg(short, long, default_value = "geno_pheno.bin.gz")]
    pub output: PathBuf,
}

/// Alpha matrix arguments
#[derive(Args, Debug)]
pub struct AlphaArgs {
    /// Merged table from `build`
    #[arg(short, long, required = true)]
    pub table: PathBuf,

    /// Directory holding the alpha cache
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// Sensitive-class weight (overrides the configuration)
    #[arg(short, long)]
    pub weight: Option<f32>,
}

/// Tensor assembly arguments
#[derive(Args, Debug)]
pub struct TensorArgs {
    /// Merged table from `build`
    #[arg(short, long, required = true)]
    pub table: PathBuf,

    /// Output sparse tensor
    #[arg(short, long, default_value = "multitask_X.bin.gz")]
    pub output: PathBuf,

    /// Pad sequences of unequal length within a locus instead of failing
    #[arg(long)]
    pub allow_ragged: bool,
}

/// Train/test split arguments
#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Merged table from `build`
    #[arg(short, long, required = true)]
    pub table: PathBuf,

    /// Sparse tensor from `tensor`
    #[arg(short = 'x', long, required = true)]
    pub tensor: PathBuf,

    /// Alpha matrix to split alongside the tensor
    #[arg(short, long)]
    pub alpha: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// Metadata column holding the split category (overrides the configuration)
    #[arg(long)]
    pub category_column: Option<String>,

    /// Category value of the training set
    #[arg(long, required = true)]
    pub train_category: String,
}

/// Threshold selection arguments
#[derive(Args, Debug)]
pub struct ThresholdArgs {
    /// Merged table from `build` (labels)
    #[arg(short, long, required = true)]
    pub table: PathBuf,

    /// Predicted scores, one row per isolate and one column per drug, no header
    #[arg(short, long, required = true)]
    pub predictions: PathBuf,

    /// Alpha matrix of the same isolates; adds masked loss and accuracy to the log
    #[arg(short, long)]
    pub alpha: Option<PathBuf>,

    /// Output report (.json or .csv)
    #[arg(short, long, default_value = "thresholds.csv")]
    pub output: PathBuf,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity
pub fn setup_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
