//! cvaudit CLI Module
//!
//! Command-line interface for cross-validation, leakage audits and ablation.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::Dataset;
use crate::leakage::LeakageAuditor;
use crate::metrics::{Metric, Scorer, ScoringConvention};
use crate::pipeline::{ModelSpec, PipelineSpec, StageSpec};
use crate::preprocessing::ImputeStrategy;
use crate::training::{CVResults, CrossValidator, EvaluationConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString { s.truecolor(230, 190, 90) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "cvaudit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "K-fold cross-validation and target-leakage auditing for tabular data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Cross-validate a pipeline on a CSV file
    Evaluate {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        eval: EvalArgs,
    },

    /// Report sentinel fractions of candidate columns per target class
    Audit {
        #[command(flatten)]
        input: InputArgs,

        /// Candidate columns to audit (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// Value a leaking column is expected to take
        #[arg(long, default_value = "0")]
        sentinel: f64,
    },

    /// Cross-validate with and without suspect columns
    Ablate {
        #[command(flatten)]
        input: InputArgs,

        /// Columns to drop in the second run (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        suspects: Vec<String>,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        eval: EvalArgs,
    },

    /// Show data information
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,
    },
}

/// Dataset, target and feature selection
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Input data file (CSV or TSV, header row required)
    #[arg(short, long)]
    pub data: PathBuf,

    /// Target column name
    #[arg(short, long)]
    pub target: String,

    /// Feature columns (comma-separated); defaults to every numeric column but the target
    #[arg(short, long, value_delimiter = ',')]
    pub features: Vec<String>,
}

/// Pipeline construction
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Model (random_forest_regressor, random_forest_classifier,
    /// decision_tree_regressor, decision_tree_classifier)
    #[arg(short, long, default_value = "random_forest_regressor")]
    pub model: String,

    /// Number of trees for forest models
    #[arg(long, default_value = "100")]
    pub n_estimators: usize,

    /// Maximum tree depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Model random state
    #[arg(long, default_value = "0")]
    pub model_seed: u64,

    /// Imputation strategy (mean, median, most_frequent, constant:<v>, none)
    #[arg(long, default_value = "mean")]
    pub impute: String,

    /// Pipeline description as JSON; overrides the flags above
    #[arg(long)]
    pub pipeline: Option<PathBuf>,
}

/// Evaluation settings
#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    /// Evaluation config as JSON; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of folds
    #[arg(short = 'k', long)]
    pub folds: Option<usize>,

    /// Metric (mae, mse, r2, accuracy); defaults by model kind
    #[arg(long)]
    pub metric: Option<String>,

    /// Score convention (higher_is_better, lower_is_better)
    #[arg(long)]
    pub convention: Option<String>,

    /// Shuffle rows with this seed before partitioning
    #[arg(long)]
    pub shuffle_seed: Option<u64>,

    /// Run folds in parallel
    #[arg(long)]
    pub parallel: bool,
}

// ─── Setup ─────────────────────────────────────────────────────────────────────

fn load_dataset(path: &Path) -> anyhow::Result<Dataset> {
    step_run("Loading data");
    let start = Instant::now();
    let dataset = Dataset::from_csv(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        dataset.n_rows(),
        dataset.n_columns(),
        start.elapsed()
    ));
    Ok(dataset)
}

/// Drop rows without a target, then resolve the feature list
fn prepare(input: &InputArgs) -> anyhow::Result<(Dataset, Vec<String>)> {
    let dataset = load_dataset(&input.data)?;
    let dataset = dataset.drop_missing(&input.target)?;

    let features = if input.features.is_empty() {
        dataset.numeric_columns(&[input.target.as_str()])
    } else {
        input.features.clone()
    };
    if features.is_empty() {
        anyhow::bail!("no numeric feature columns besides '{}'", input.target);
    }

    Ok((dataset, features))
}

fn pipeline_spec(args: &ModelArgs) -> anyhow::Result<PipelineSpec> {
    if let Some(path) = &args.pipeline {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(serde_json::from_str(&text)?);
    }

    let model = ModelSpec::from_name(
        &args.model,
        args.n_estimators,
        args.max_depth,
        Some(args.model_seed),
    )
    .ok_or_else(|| anyhow::anyhow!("Invalid model type: {}", args.model))?;

    let mut spec = PipelineSpec::new(model);
    if args.impute != "none" {
        let strategy: ImputeStrategy = args.impute.parse()?;
        spec = spec.with_stage(StageSpec::Imputer { strategy });
    }
    Ok(spec)
}

fn evaluation_config(args: &EvalArgs) -> anyhow::Result<EvaluationConfig> {
    let mut config = match &args.config {
        Some(path) => EvaluationConfig::from_json_file(path)?,
        None => EvaluationConfig::default(),
    };

    if let Some(k) = args.folds {
        config = config.with_fold_count(k);
    }
    if let Some(convention) = &args.convention {
        config = config.with_convention(convention.parse::<ScoringConvention>()?);
    }
    if let Some(seed) = args.shuffle_seed {
        config = config.with_shuffle(seed);
    }
    if args.parallel {
        config = config.with_parallel(true);
    }

    config.validate()?;
    Ok(config)
}

fn scorer_for(args: &EvalArgs, config: &EvaluationConfig, spec: &PipelineSpec) -> anyhow::Result<Scorer> {
    let metric = match &args.metric {
        Some(name) => name.parse::<Metric>()?,
        None if spec.model.is_classifier() => Metric::Accuracy,
        None => Metric::MeanAbsoluteError,
    };
    Ok(config.scorer(metric))
}

// ─── Output ────────────────────────────────────────────────────────────────────

fn print_results(results: &CVResults, scorer: &Scorer) {
    println!();
    println!(
        "  {:<8} {:>8} {:>10} {:>14}",
        muted("Fold"),
        muted("Train"),
        muted("Held-out"),
        muted(&results.scorer)
    );
    println!("  {}", dim(&"─".repeat(44)));

    for fold in &results.folds {
        println!(
            "  {:<8} {:>8} {:>10} {:>14.4}",
            fold.fold, fold.train_rows, fold.held_out_rows, fold.score
        );
    }

    println!("  {}", dim(&"─".repeat(44)));
    println!(
        "  {:<16} {}",
        muted("Mean"),
        format!("{:.4}", results.mean_score).white().bold()
    );
    println!("  {:<16} {:.4}", muted("Std"), results.std_score);
    if scorer.sign() < 0.0 {
        println!(
            "  {:<16} {:.4}",
            muted(scorer.metric.short_name()),
            scorer.display_value(results.mean_score)
        );
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_evaluate(input: &InputArgs, model: &ModelArgs, eval: &EvalArgs) -> anyhow::Result<()> {
    section("Evaluate");

    let (dataset, features) = prepare(input)?;
    let spec = pipeline_spec(model)?;
    let config = evaluation_config(eval)?;
    let scorer = scorer_for(eval, &config, &spec)?;

    println!("  {:<12} {}", muted("Features"), features.join(", "));
    println!("  {:<12} {}", muted("Folds"), config.fold_count);

    step_run(&format!("Cross-validating {}", spec.build().stage_names().join(" → ").cyan()));
    let start = Instant::now();
    let results = CrossValidator::new(config).evaluate_spec(
        &dataset,
        &input.target,
        &features,
        &spec,
        &scorer,
    )?;
    step_done(&format!("{:?}", start.elapsed()));

    print_results(&results, &scorer);
    println!();
    Ok(())
}

pub fn cmd_audit(input: &InputArgs, columns: &[String], sentinel: f64) -> anyhow::Result<()> {
    section("Leakage Audit");

    let dataset = load_dataset(&input.data)?;
    let auditor = LeakageAuditor::new().with_sentinel(sentinel);
    let reports = auditor.audit_columns(&dataset, &input.target, columns)?;

    println!();
    println!(
        "  {:<20} {:>14} {:>14}",
        muted("Column"),
        muted(&format!("{}=false", input.target)),
        muted(&format!("{}=true", input.target))
    );
    println!("  {}", dim(&"─".repeat(50)));

    for report in &reports {
        println!(
            "  {:<20} {:>14.2} {:>14.2}",
            report.feature, report.fraction_false, report.fraction_true
        );
    }

    println!();
    println!(
        "  {}",
        dim(&format!("share of rows per class where the column equals {}", sentinel))
    );
    println!();
    Ok(())
}

pub fn cmd_ablate(
    input: &InputArgs,
    suspects: &[String],
    model: &ModelArgs,
    eval: &EvalArgs,
) -> anyhow::Result<()> {
    section("Ablation");

    let (dataset, features) = prepare(input)?;
    let spec = pipeline_spec(model)?;
    let config = evaluation_config(eval)?;
    let scorer = scorer_for(eval, &config, &spec)?;

    step_run("Cross-validating with and without suspects");
    let start = Instant::now();
    let report = LeakageAuditor::new().ablation(
        &CrossValidator::new(config),
        &dataset,
        &input.target,
        &features,
        suspects,
        || spec.build(),
        &scorer,
    )?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    println!("  {:<24} {:>12} {:>10}", muted("Features"), muted(&report.baseline.scorer), muted("Std"));
    println!("  {}", dim(&"─".repeat(48)));
    println!(
        "  {:<24} {:>12.4} {:>10.4}",
        "all",
        report.baseline.mean_score,
        report.baseline.std_score
    );
    println!(
        "  {:<24} {:>12.4} {:>10.4}",
        format!("without {}", report.dropped.join(", ")),
        report.without_suspects.mean_score,
        report.without_suspects.std_score
    );
    println!("  {}", dim(&"─".repeat(48)));

    let change = report.score_change();
    let change_str = format!("{:+.4}", change);
    let styled = if change < 0.0 { warn(&change_str) } else { ok(&change_str) };
    println!("  {:<24} {:>12}", muted("Change"), styled);
    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let dataset = Dataset::from_csv(data_path)?;

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), dataset.n_rows());
    println!("  {:<12} {}", muted("Columns"), dataset.n_columns());
    println!(
        "  {:<12} {:.2} MB",
        muted("Memory"),
        dataset.frame().estimated_size() as f64 / 1024.0 / 1024.0
    );
    println!();

    println!(
        "  {:<20} {:<12} {:>6} {:>10}",
        muted("Column"),
        muted("Type"),
        muted("Nulls"),
        muted("Usable")
    );
    println!("  {}", dim(&"─".repeat(52)));

    for col in dataset.summary() {
        let usable = if col.kind.is_model_ready() { ok("yes") } else { dim("no") };
        println!(
            "  {:<20} {:<12} {:>6} {:>10}",
            col.name,
            col.dtype.truecolor(140, 140, 140),
            col.null_count,
            usable
        );
    }

    println!();
    Ok(())
}
