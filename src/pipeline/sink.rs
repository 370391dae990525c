//! Result sinks
//!
//! A run ends by handing the per-worker core layout and the final
//! [`MetricsReport`] to a [`ResultSink`]. [`FileResultSink`] appends one CSV line
//! for spreadsheet tooling and a boxed text block for humans.

use crate::error::{IdsError, Result};
use crate::training::MetricsReport;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Suffix of the per-layout text report
pub const REPORT_SUFFIX: &str = "-decisionTreePCACrossVal.txt";

/// Consumer of a finished run
pub trait ResultSink {
    fn write(&self, cores: &[usize], report: &MetricsReport) -> Result<()>;
}

/// Appends results under a results directory
#[derive(Debug, Clone)]
pub struct FileResultSink {
    results_dir: PathBuf,
    csv_file: String,
}

impl FileResultSink {
    pub fn new(results_dir: impl Into<PathBuf>, csv_file: impl Into<String>) -> Self {
        Self {
            results_dir: results_dir.into(),
            csv_file: csv_file.into(),
        }
    }

    pub fn csv_path(&self) -> PathBuf {
        self.results_dir.join(&self.csv_file)
    }

    /// `<results_dir>/slave01+slave03/slave01-4Cores+slave03-2Cores-decisionTreePCACrossVal.txt`
    pub fn report_path(&self, cores: &[usize]) -> Result<PathBuf> {
        let (dirname, filename) = layout_names(cores)?;
        Ok(self
            .results_dir
            .join(dirname)
            .join(format!("{}{}", filename, REPORT_SUFFIX)))
    }
}

impl ResultSink for FileResultSink {
    fn write(&self, cores: &[usize], report: &MetricsReport) -> Result<()> {
        let report_path = self.report_path(cores)?;

        fs::create_dir_all(&self.results_dir)?;
        let csv_path = self.csv_path();
        append(&csv_path, &csv_line(cores, report))?;

        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        append(&report_path, &text_report(cores, report))?;

        info!(
            csv = %csv_path.display(),
            report = %report_path.display(),
            "Results written"
        );
        Ok(())
    }
}

fn append(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Directory and file stems naming every worker with a non-zero core count
pub fn layout_names(cores: &[usize]) -> Result<(String, String)> {
    let active: Vec<(usize, usize)> = cores
        .iter()
        .enumerate()
        .filter(|(_, &c)| c != 0)
        .map(|(i, &c)| (i + 1, c))
        .collect();

    if active.is_empty() {
        return Err(IdsError::invalid_config(
            "cores",
            format!("{:?}", cores),
            "at least one worker needs a non-zero core count",
        ));
    }

    let dirname = active
        .iter()
        .map(|(worker, _)| format!("slave0{}", worker))
        .collect::<Vec<_>>()
        .join("+");
    let filename = active
        .iter()
        .map(|(worker, count)| format!("slave0{}-{}Cores", worker, count))
        .collect::<Vec<_>>()
        .join("+");
    Ok((dirname, filename))
}

/// `c1,c2,...,f1,precision,recall,accuracy,auc,fit,eval\n`
pub fn csv_line(cores: &[usize], report: &MetricsReport) -> String {
    let mut line: String = cores.iter().map(|c| format!("{},", c)).collect();
    line.push_str(&format!(
        "{:?},{:?},{:?},{:?},{:?},{:?},{:?}\n",
        report.f1,
        report.weighted_precision,
        report.weighted_recall,
        report.accuracy,
        report.area_under_roc,
        report.fit_duration_secs,
        report.eval_duration_secs
    ));
    line
}

const RULE: &str = "+-----------------------------------------------+\n";

/// Fixed-width metrics block
pub fn text_report(cores: &[usize], report: &MetricsReport) -> String {
    let mut out = String::from("\n\n");
    out.push_str(RULE);
    out.push_str("+                 Test Metrics                  +\n");
    out.push_str(RULE);
    for (i, count) in cores.iter().enumerate() {
        out.push_str(&format!(
            "| Number of Cores in Slave {}         | {}  |\n",
            i + 1,
            count
        ));
    }
    out.push_str(&format!("| F1-Score                           | {:.6}  |\n", report.f1));
    out.push_str(&format!(
        "| Weighted Precision                 | {:.6}  |\n",
        report.weighted_precision
    ));
    out.push_str(&format!(
        "| Weighted Recall                    | {:.6}  |\n",
        report.weighted_recall
    ));
    out.push_str(&format!("| Accuracy                           | {:.6}  |\n", report.accuracy));
    out.push_str(&format!(
        "| Area Under ROC                     | {:.6}  |\n",
        report.area_under_roc
    ));
    out.push_str(&format!(
        "| Model Time (in seconds)            | {:.6} |\n",
        report.fit_duration_secs
    ));
    out.push_str(&format!(
        "| Test Time (in seconds)             | {:.6} |\n",
        report.eval_duration_secs
    ));
    out.push_str(RULE);
    out.push('\n');
    out
}
