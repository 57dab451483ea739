use anyhow::{Context, Result};
use burn::config::Config;
use mdcnn::cli::{
    parse_args, setup_logging, AlphaArgs, BuildArgs, Commands, SplitArgs, TensorArgs, ThresholdArgs,
};
use mdcnn::data::genotype::GenotypeTableBuilder;
use mdcnn::data::loader::PhenotypeLoader;
use mdcnn::data::phenotype::encode_phenotypes;
use mdcnn::data::preprocessing::{select_rows, split_by_category, split_sparse, GenoPhenoTable};
use mdcnn::data::sparse::SparseTensor;
use mdcnn::data::tensor::TensorAssembler;
use mdcnn::data::{PanelConfig, SplitConfig};
use mdcnn::error::PrepError;
use mdcnn::model::alpha::{read_matrix_csv, write_matrix_csv};
use mdcnn::model::loss::labeled_count;
use mdcnn::model::{alpha_cache_name, metrics, AlphaMatrix, MaskedWeightedBce, WeightedLabel};
use mdcnn::predict::evaluate_drugs;
use mdcnn::utils::{ensure_dir, format_number};
use std::path::Path;
use tracing::{error, info, warn};

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", mdcnn::info());

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Build(args) => run_build(args, &config),
        Commands::Alpha(args) => run_alpha(args, &config),
        Commands::Tensor(args) => run_tensor(args, &config),
        Commands::Split(args) => run_split(args, &config),
        Commands::Threshold(args) => run_threshold(args),
    });

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<PanelConfig> {
    match path {
        Some(path) => {
            info!("Loading panel configuration from {:?}", path);
            PanelConfig::load(path)
                .map_err(|e| anyhow::anyhow!("Failed to load config {:?}: {}", path, e))
        }
        None => Ok(PanelConfig::new()),
    }
}

fn run_build(args: BuildArgs, config: &PanelConfig) -> Result<()> {
    info!("Building genotype/phenotype table...");
    info!("Genotype directory: {:?}", args.genotypes);
    info!("Phenotype file: {:?}", args.phenotypes);

    let genotypes = GenotypeTableBuilder::new(config)
        .build(&args.genotypes)
        .with_context(|| format!("Failed to load genotypes from {:?}", args.genotypes))?;

    let raw = PhenotypeLoader::new(config.isolate_column.as_str(), &config.drugs)
        .load(&args.phenotypes)
        .with_context(|| format!("Failed to load phenotypes from {:?}", args.phenotypes))?;
    let phenotypes = encode_phenotypes(&raw).context("Failed to encode phenotypes")?;

    let table = GenoPhenoTable::merge(&genotypes, &phenotypes);
    if table.is_empty() {
        warn!("No isolate has both a complete genotype and a phenotype");
    }

    table.save(&args.output)?;
    Ok(())
}

fn run_alpha(args: AlphaArgs, config: &PanelConfig) -> Result<()> {
    let table = GenoPhenoTable::load(&args.table)?;
    let weight = args.weight.unwrap_or(config.sensitive_weight);

    ensure_dir(&args.output)?;
    let path = args.output.join(alpha_cache_name(weight));

    let labels = table.label_matrix();
    let alpha = AlphaMatrix::load_or_build(&path, labels.view(), &table.drugs, weight)?;

    info!(
        "{} labeled entries out of {}",
        format_number(labeled_count(alpha.to_signed().view())),
        format_number(labels.len())
    );
    Ok(())
}

fn run_tensor(args: TensorArgs, config: &PanelConfig) -> Result<()> {
    let table = GenoPhenoTable::load(&args.table)?;

    let tensor = TensorAssembler::new(args.allow_ragged || config.allow_ragged_loci)
        .with_progress(true)
        .assemble(&table)
        .context("Failed to assemble input tensor")?;

    info!("Input tensor shape: {:?}", tensor.data.dim());
    tensor.to_sparse()?.save(&args.output)?;
    Ok(())
}

fn run_split(args: SplitArgs, config: &PanelConfig) -> Result<()> {
    let mut split_config = SplitConfig::new(config, args.train_category.as_str());
    if let Some(column) = &args.category_column {
        split_config = split_config.with_category_column(column.as_str());
    }

    let table = GenoPhenoTable::load(&args.table)?;
    let tensor = SparseTensor::load(&args.tensor)?;

    let n_rows = tensor.shape()[0];
    if n_rows != table.len() {
        return Err(PrepError::shape("tensor rows", &[table.len()], &[n_rows]).into());
    }

    let categories = table.metadata_column(&split_config.category_column);
    if categories.iter().all(Option::is_none) {
        warn!("Column {:?} is missing from the phenotype metadata", split_config.category_column);
    }
    let split = split_by_category(&categories, &split_config.train_category);

    let (train, test) = split_sparse(&tensor, &split)?;
    ensure_dir(&args.output)?;
    train.save(args.output.join("train_X.bin.gz"))?;
    test.save(args.output.join("test_X.bin.gz"))?;

    let labels = table.label_matrix().mapv(f32::from);
    write_matrix_csv(args.output.join("train_y.csv"), &select_rows(&labels, &split.train))?;
    write_matrix_csv(args.output.join("test_y.csv"), &select_rows(&labels, &split.test))?;

    if let Some(alpha_path) = &args.alpha {
        let alpha = read_matrix_csv(alpha_path)?;
        if alpha.nrows() != table.len() {
            return Err(PrepError::shape("alpha rows", &[table.len()], &[alpha.nrows()]).into());
        }
        write_matrix_csv(args.output.join("train_alpha.csv"), &select_rows(&alpha, &split.train))?;
        write_matrix_csv(args.output.join("test_alpha.csv"), &select_rows(&alpha, &split.test))?;
    }

    info!("Split outputs written to {:?}", args.output);
    Ok(())
}

fn run_threshold(args: ThresholdArgs) -> Result<()> {
    let table = GenoPhenoTable::load(&args.table)?;
    let scores = read_matrix_csv(&args.predictions)
        .with_context(|| format!("Failed to read predictions from {:?}", args.predictions))?;

    let labels = table.label_matrix();
    let report = evaluate_drugs(labels.view(), scores.view(), &table.drugs)?;

    if let Some(alpha_path) = &args.alpha {
        log_masked_metrics(alpha_path, &scores)?;
    }

    report.print();
    report.save(&args.output)?;
    Ok(())
}

fn log_masked_metrics(alpha_path: &Path, scores: &ndarray::Array2<f32>) -> Result<()> {
    let alpha = read_matrix_csv(alpha_path)?;
    if alpha.dim() != scores.dim() {
        let (ar, ac) = alpha.dim();
        let (sr, sc) = scores.dim();
        return Err(PrepError::shape("alpha matrix", &[sr, sc], &[ar, ac]).into());
    }

    let labeled_rows: Vec<usize> = alpha
        .rows()
        .into_iter()
        .enumerate()
        .filter(|(_, row)| row.iter().any(|&a| WeightedLabel::from_signed(a).is_some()))
        .map(|(i, _)| i)
        .collect();
    if labeled_rows.len() < alpha.nrows() {
        info!("{} isolates without labels excluded from the loss", alpha.nrows() - labeled_rows.len());
    }

    let alpha = select_rows(&alpha, &labeled_rows);
    let scores = select_rows(scores, &labeled_rows);

    let loss = MaskedWeightedBce::new().mean(alpha.view(), scores.view())?;
    let accuracy = metrics::masked_weighted_accuracy(alpha.view(), scores.view())?;
    info!("Masked weighted BCE: {:.4}", loss);
    info!("Masked accuracy: {:.4}", accuracy);
    Ok(())
}
