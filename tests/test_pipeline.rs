//! Integration test: CSV dataset through the runner into the result files

use kolosal_ids::config::PipelineConfig;
use kolosal_ids::data::{CsvDatasetSource, DatasetSource, NUM_FLOW_STATS};
use kolosal_ids::error::IdsError;
use kolosal_ids::pipeline::{FileResultSink, PipelineRunner, ResultSink};
use kolosal_ids::training::MetricsReport;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tempfile::tempdir;

/// Flow CSV where attack rows carry much larger packet statistics
fn write_flows(path: &Path, n: usize) {
    let mut file = fs::File::create(path).unwrap();
    for i in 0..n {
        let label = usize::from(i % 4 == 0);
        let stats: Vec<String> = (0..NUM_FLOW_STATS)
            .map(|j| {
                let base = if label == 1 { 500.0 } else { 10.0 };
                format!("{}", base + ((i * 13 + j * 5) % 17) as f64)
            })
            .collect();
        writeln!(
            file,
            "10.0.0.{},{},192.168.1.1,80,6,{},{}",
            i % 250,
            1024 + i,
            stats.join(","),
            label
        )
        .unwrap();
    }
}

fn config(results: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_components(3)
        .with_max_depth(4)
        .with_folds(4)
        .with_results_dir(results)
}

#[test]
fn test_csv_run_writes_both_files() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("flows.csv");
    write_flows(&data_path, 200);

    let config = config(&dir.path().join("results"));
    let sink = FileResultSink::new(&config.results_dir, &config.csv_file);
    let runner = PipelineRunner::new(config).unwrap();

    let source = CsvDatasetSource::new(&data_path);
    assert_eq!(source.records().unwrap().len(), 200);

    let report = runner.run_to_sink(&source, &sink, &[2, 0, 1]).unwrap();
    assert_eq!(report.n_test, 60);
    assert!(report.metrics.accuracy >= 0.95);
    assert!(report.metrics.area_under_roc >= 0.95);

    let csv = fs::read_to_string(sink.csv_path()).unwrap();
    let fields: Vec<&str> = csv.trim_end().split(',').collect();
    assert_eq!(fields.len(), 3 + 7);
    assert_eq!(&fields[..3], &["2", "0", "1"]);
    let f1: f64 = fields[3].parse().unwrap();
    assert!((f1 - report.metrics.f1).abs() < 1e-12);

    let text_path = dir
        .path()
        .join("results")
        .join("slave01+slave03")
        .join("slave01-2Cores+slave03-1Cores-decisionTreePCACrossVal.txt");
    let text = fs::read_to_string(text_path).unwrap();
    assert!(text.contains("| Number of Cores in Slave 2         | 0  |"));
    assert!(text.contains("| Accuracy                           |"));
}

#[derive(Default)]
struct RecordingSink {
    writes: Mutex<Vec<(Vec<usize>, MetricsReport)>>,
}

impl ResultSink for RecordingSink {
    fn write(&self, cores: &[usize], report: &MetricsReport) -> kolosal_ids::Result<()> {
        self.writes.lock().unwrap().push((cores.to_vec(), *report));
        Ok(())
    }
}

#[test]
fn test_failed_run_writes_nothing() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("flows.csv");
    // Every row benign: evaluation cannot compute an ROC curve
    let mut file = fs::File::create(&data_path).unwrap();
    for i in 0..50 {
        let stats = vec![format!("{}", i); NUM_FLOW_STATS].join(",");
        writeln!(file, "10.0.0.1,1000,10.0.0.2,80,6,{},0", stats).unwrap();
    }
    drop(file);

    let sink = RecordingSink::default();
    let runner = PipelineRunner::new(config(dir.path()).with_components(1)).unwrap();
    let result = runner.run_to_sink(&CsvDatasetSource::new(&data_path), &sink, &[1]);

    assert!(matches!(result, Err(IdsError::NoPositiveOrNegativeExamples)));
    assert!(sink.writes.lock().unwrap().is_empty());
}

#[test]
fn test_sink_receives_cores_and_report() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("flows.csv");
    write_flows(&data_path, 120);

    let sink = RecordingSink::default();
    let runner = PipelineRunner::new(config(dir.path()).with_threads(2)).unwrap();
    let report = runner
        .run_to_sink(&CsvDatasetSource::new(&data_path), &sink, &[4])
        .unwrap();

    let writes = sink.writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].0, vec![4]);
    assert_eq!(writes[0].1, report.metrics);
}

#[test]
fn test_malformed_csv_rejected() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("flows.csv");
    fs::write(&data_path, "10.0.0.1,not-a-port,10.0.0.2\n").unwrap();

    let runner = PipelineRunner::new(config(dir.path())).unwrap();
    assert!(runner.run(&CsvDatasetSource::new(&data_path)).is_err());
}
