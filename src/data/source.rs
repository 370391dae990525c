//! Dataset sources
//!
//! The core pipeline only sees a [`DatasetSource`]. The CSV reader below loads
//! the headerless flowtbag export with polars and rejects malformed rows before
//! any record reaches the core.

use super::record::{
    FlowEndpoints, FlowRecord, ENDPOINT_COLUMNS, FLOW_STAT_COLUMNS, LABEL_COLUMN, NUM_FLOW_STATS,
};
use crate::error::{IdsError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Anything that can hand the pipeline a finite set of validated records
pub trait DatasetSource {
    fn records(&self) -> Result<Vec<FlowRecord>>;
}

impl DatasetSource for Vec<FlowRecord> {
    fn records(&self) -> Result<Vec<FlowRecord>> {
        Ok(self.clone())
    }
}

/// Full 46-column flow schema: endpoints, 40 statistics, label
pub fn flow_schema() -> Schema {
    let endpoints = ENDPOINT_COLUMNS.iter().map(|&name| {
        let dtype = match name {
            "srcip" | "dstip" => DataType::String,
            _ => DataType::Int64,
        };
        Field::new(name.into(), dtype)
    });
    let stats = FLOW_STAT_COLUMNS
        .iter()
        .map(|&name| Field::new(name.into(), DataType::Float64));
    let label = std::iter::once(Field::new(LABEL_COLUMN.into(), DataType::Int64));

    endpoints.chain(stats).chain(label).collect()
}

/// CSV flow dataset on disk
#[derive(Debug, Clone)]
pub struct CsvDatasetSource {
    path: PathBuf,
    has_header: bool,
}

impl CsvDatasetSource {
    /// Headerless CSV, as written by flowtbag
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            has_header: false,
        }
    }

    /// Skip a header line if the file has one
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_frame(&self) -> Result<DataFrame> {
        let file = File::open(&self.path).map_err(|e| {
            IdsError::DataError(format!("cannot open {}: {}", self.path.display(), e))
        })?;

        let df = CsvReadOptions::default()
            .with_has_header(self.has_header)
            .with_schema(Some(Arc::new(flow_schema())))
            .into_reader_with_file_handle(file)
            .finish()?;
        Ok(df)
    }
}

impl DatasetSource for CsvDatasetSource {
    fn records(&self) -> Result<Vec<FlowRecord>> {
        let start = Instant::now();
        let df = self.load_frame()?;
        let n_rows = df.height();

        let src_ip = string_column(&df, "srcip")?;
        let dst_ip = string_column(&df, "dstip")?;
        let src_port = int_column(&df, "srcport")?;
        let dst_port = int_column(&df, "dstport")?;
        let proto = int_column(&df, "proto")?;
        let labels = int_column(&df, LABEL_COLUMN)?;
        let stats = FLOW_STAT_COLUMNS
            .iter()
            .map(|name| float_column(&df, name))
            .collect::<Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(n_rows);
        for row in 0..n_rows {
            let endpoints = FlowEndpoints {
                src_ip: src_ip[row].clone(),
                src_port: narrow(src_port[row], "srcport", row)?,
                dst_ip: dst_ip[row].clone(),
                dst_port: narrow(dst_port[row], "dstport", row)?,
                proto: narrow(proto[row], "proto", row)?,
            };

            let mut values = [0.0; NUM_FLOW_STATS];
            for (value, column) in values.iter_mut().zip(&stats) {
                *value = column[row];
            }

            let label = usize::try_from(labels[row])
                .map_err(|_| row_error(LABEL_COLUMN, row, "negative label"))?;
            let record = FlowRecord::new(endpoints, values, label)
                .map_err(|e| IdsError::DataError(format!("row {}: {}", row + 1, e)))?;
            records.push(record);
        }

        info!(
            path = %self.path.display(),
            rows = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded flow dataset"
        );
        Ok(records)
    }
}

fn row_error(column: &str, row: usize, reason: &str) -> IdsError {
    IdsError::DataError(format!("column {} row {}: {}", column, row + 1, reason))
}

fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|_| IdsError::FeatureNotFound(name.to_string()))
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let values = series(df, name)?.cast(&DataType::Float64)?;
    values
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| v.ok_or_else(|| row_error(name, row, "missing value")))
        .collect()
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let values = series(df, name)?.cast(&DataType::Int64)?;
    values
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| v.ok_or_else(|| row_error(name, row, "missing value")))
        .collect()
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    series(df, name)?
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(str::to_string)
                .ok_or_else(|| row_error(name, row, "missing value"))
        })
        .collect()
}

fn narrow<T: TryFrom<i64>>(value: i64, column: &str, row: usize) -> Result<T> {
    T::try_from(value).map_err(|_| row_error(column, row, "value out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_line(src_port: u32, label: i64) -> String {
        let stats: Vec<String> = (0..NUM_FLOW_STATS).map(|i| i.to_string()).collect();
        format!(
            "10.0.0.1,{},10.0.0.2,80,6,{},{}\n",
            src_port,
            stats.join(","),
            label
        )
    }

    #[test]
    fn test_schema_layout() {
        let schema = flow_schema();
        assert_eq!(schema.len(), 46);
    }

    #[test]
    fn test_load_csv() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(csv_line(5000, 0).as_bytes()).unwrap();
        file.write_all(csv_line(5001, 1).as_bytes()).unwrap();
        file.flush().unwrap();

        let records = CsvDatasetSource::new(file.path()).records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].endpoints().src_ip, "10.0.0.1");
        assert_eq!(records[1].endpoints().src_port, 5001);
        assert_eq!(records[1].label(), 1);
        assert_eq!(records[0].stats()[39], 39.0);
    }

    #[test]
    fn test_rejects_out_of_range_port() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(csv_line(70000, 0).as_bytes()).unwrap();
        file.flush().unwrap();

        let result = CsvDatasetSource::new(file.path()).records();
        assert!(matches!(result, Err(IdsError::DataError(_))));
    }

    #[test]
    fn test_rejects_bad_label() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(csv_line(5000, 3).as_bytes()).unwrap();
        file.flush().unwrap();

        assert!(CsvDatasetSource::new(file.path()).records().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = CsvDatasetSource::new("/nonexistent/flows.csv").records();
        assert!(matches!(result, Err(IdsError::DataError(_))));
    }
}
