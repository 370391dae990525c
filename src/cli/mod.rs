//! Kolosal IDS CLI Module
//!
//! `kolosal-ids <DATASET> <CORES>...` trains and evaluates the classifier on a
//! flow CSV and appends the results for the given worker core layout.

use clap::Parser;
use colored::*;
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::data::CsvDatasetSource;
use crate::pipeline::{layout_names, FileResultSink, PipelineRunner, RunReport};
use crate::training::Criterion;
use crate::utils::ParallelConfig;

// ─── Summary box ───────────────────────────────────────────────────────────────

const W: usize = 58; // box inner width
const KEY_W: usize = 22;

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }

fn rule(left: char, right: char) {
    println!("  {}", dim(&format!("{}{}{}", left, "─".repeat(W + 1), right)));
}

/// Spaces needed to fill the box after `plain`, measured before styling
fn padding(plain: &str) -> usize {
    W.saturating_sub(plain.chars().count())
}

fn title(text: &str) {
    let pad = padding(text);
    let left = pad / 2;
    println!(
        "  {} {}{}{} {}",
        dim("│"),
        " ".repeat(left),
        text.white().bold(),
        " ".repeat(pad - left),
        dim("│")
    );
}

fn row(key: &str, val: &str) {
    let pad = padding(&format!("{:<KEY_W$} {}", key, val));
    println!(
        "  {} {} {}{} {}",
        dim("│"),
        format!("{:<KEY_W$}", key).truecolor(140, 140, 140),
        val.white(),
        " ".repeat(pad),
        dim("│")
    );
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "kolosal-ids")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Flow-record intrusion classifier: PCA + decision tree with k-fold cross-validation")]
#[command(long_about = None)]
pub struct Cli {
    /// Headerless flow CSV (endpoints, 40 flow statistics, label)
    pub dataset: PathBuf,

    /// Core count of each worker, in worker order (0 = worker idle)
    #[arg(required = true, num_args = 1..)]
    pub cores: Vec<usize>,

    /// JSON configuration file; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Worker threads (default: sum of the core counts)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Number of principal components
    #[arg(short = 'k', long)]
    pub components: Option<usize>,

    /// Maximum tree depth
    #[arg(short = 'd', long)]
    pub max_depth: Option<usize>,

    /// Impurity criterion (entropy, gini)
    #[arg(long)]
    pub impurity: Option<Criterion>,

    /// Candidate thresholds per feature
    #[arg(long)]
    pub max_bins: Option<usize>,

    /// Number of cross-validation folds
    #[arg(short, long)]
    pub folds: Option<usize>,

    /// Share of records held out for testing
    #[arg(long)]
    pub test_fraction: Option<f64>,

    /// Seed for the split and the fold partition
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Directory receiving the results
    #[arg(short, long)]
    pub results_dir: Option<PathBuf>,

    /// The dataset starts with a header line
    #[arg(long)]
    pub header: bool,
}

impl Cli {
    /// Merge the optional JSON file with the flags
    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(k) = self.components {
            config.n_components = k;
        }
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(impurity) = self.impurity {
            config.impurity = impurity;
        }
        if let Some(bins) = self.max_bins {
            config.max_bins = Some(bins);
        }
        if let Some(folds) = self.folds {
            config.num_folds = folds;
        }
        if let Some(fraction) = self.test_fraction {
            config.test_fraction = fraction;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(dir) = &self.results_dir {
            config.results_dir = dir.clone();
        }

        config.threads = self
            .threads
            .or(config.threads)
            .or(ParallelConfig::from_cores(&self.cores).n_threads);

        layout_names(&self.cores)?;
        config.validate()?;
        Ok(config)
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Train, evaluate and write results
pub fn cmd_run(cli: &Cli) -> anyhow::Result<RunReport> {
    let config = cli.pipeline_config()?;
    let runner = PipelineRunner::new(config.clone())?;
    let source = CsvDatasetSource::new(&cli.dataset).with_header(cli.header);
    let sink = FileResultSink::new(&config.results_dir, &config.csv_file);

    print_header(cli, &config);

    let report = runner.run_to_sink(&source, &sink, &cli.cores)?;
    println!(
        "  {} {} train / {} test, results appended to {}",
        "✓".truecolor(100, 210, 120),
        report.n_train,
        report.n_test,
        sink.csv_path().display()
    );

    print_report(&report);
    Ok(report)
}

fn print_header(cli: &Cli, config: &PipelineConfig) {
    println!();
    rule('┌', '┐');
    title("Kolosal IDS");
    rule('├', '┤');
    row("Dataset", &cli.dataset.display().to_string());
    let cores: Vec<String> = cli.cores.iter().map(|c| c.to_string()).collect();
    row("Cores", &cores.join(" "));
    row(
        "Threads",
        &config
            .threads
            .map(|t| t.to_string())
            .unwrap_or_else(|| "auto".to_string()),
    );
    row("Components", &config.n_components.to_string());
    row("Max depth", &config.max_depth.to_string());
    row("Folds", &config.num_folds.to_string());
    rule('└', '┘');
    println!();
}

fn print_report(report: &RunReport) {
    let m = &report.metrics;
    println!();
    rule('┌', '┐');
    title("Test Metrics");
    rule('├', '┤');
    row("F1-Score", &format!("{:.6}", m.f1));
    row("Weighted Precision", &format!("{:.6}", m.weighted_precision));
    row("Weighted Recall", &format!("{:.6}", m.weighted_recall));
    row("Accuracy", &format!("{:.6}", m.accuracy));
    row("Area Under ROC", &format!("{:.6}", m.area_under_roc));
    rule('├', '┤');
    row("Model time", &format!("{:.3}s", m.fit_duration_secs));
    row("Test time", &format!("{:.3}s", m.eval_duration_secs));
    row("CV F1", &format!("{:.6}", report.cv_metrics.f1));
    let selected = match report.best_config.tree.criterion {
        Criterion::Entropy => "entropy",
        Criterion::Gini => "gini",
    };
    row(
        "Selected",
        &format!("depth {} / {}", report.best_config.tree.max_depth, selected),
    );
    rule('└', '┘');
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_dataset_and_cores() {
        assert!(Cli::try_parse_from(["kolosal-ids"]).is_err());
        assert!(Cli::try_parse_from(["kolosal-ids", "flows.csv"]).is_err());

        let cli = Cli::try_parse_from(["kolosal-ids", "flows.csv", "4", "0", "2"]).unwrap();
        assert_eq!(cli.dataset, PathBuf::from("flows.csv"));
        assert_eq!(cli.cores, vec![4, 0, 2]);
    }

    #[test]
    fn test_cores_size_the_pool() {
        let cli = Cli::try_parse_from(["kolosal-ids", "flows.csv", "4", "2"]).unwrap();
        assert_eq!(cli.pipeline_config().unwrap().threads, Some(6));

        let cli = Cli::try_parse_from(["kolosal-ids", "flows.csv", "4", "2", "--threads", "1"])
            .unwrap();
        assert_eq!(cli.pipeline_config().unwrap().threads, Some(1));
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "kolosal-ids",
            "flows.csv",
            "1",
            "-k",
            "3",
            "--max-depth",
            "4",
            "--impurity",
            "gini",
            "--folds",
            "5",
        ])
        .unwrap();
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.n_components, 3);
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.impurity, Criterion::Gini);
        assert_eq!(config.num_folds, 5);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_negative_depth_rejected() {
        assert!(Cli::try_parse_from(["kolosal-ids", "flows.csv", "1", "--max-depth", "-1"]).is_err());
    }

    #[test]
    fn test_invalid_fold_count() {
        let cli = Cli::try_parse_from(["kolosal-ids", "flows.csv", "1", "--folds", "1"]).unwrap();
        assert!(cli.pipeline_config().is_err());
    }

    #[test]
    fn test_idle_layout_rejected_before_training() {
        let cli = Cli::try_parse_from(["kolosal-ids", "missing.csv", "0", "0"]).unwrap();
        assert!(cli.pipeline_config().is_err());

        let cli = Cli::try_parse_from(["kolosal-ids", "missing.csv", "0", "3"]).unwrap();
        assert!(cli.pipeline_config().is_ok());
    }

    #[test]
    fn test_box_padding() {
        assert_eq!(padding("Test Metrics"), W - 12);
        assert_eq!(padding(&"x".repeat(W + 5)), 0);
    }
}
