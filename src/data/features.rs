//! Feature vector assembly
//!
//! Turns [`FlowRecord`]s into fixed-order numeric vectors. The column order is
//! resolved once at construction so every record in a run produces vectors of
//! identical length and layout.

use super::dataset::LabeledData;
use super::record::{stat_index, FlowRecord, FLOW_STAT_COLUMNS};
use crate::error::{IdsError, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldAccessor {
    SrcPort,
    DstPort,
    Proto,
    Stat(usize),
}

impl FieldAccessor {
    fn resolve(name: &str) -> Option<Self> {
        match name {
            "srcport" => Some(Self::SrcPort),
            "dstport" => Some(Self::DstPort),
            "proto" => Some(Self::Proto),
            _ => stat_index(name).map(Self::Stat),
        }
    }

    fn read(self, record: &FlowRecord) -> f64 {
        match self {
            Self::SrcPort => f64::from(record.endpoints().src_port),
            Self::DstPort => f64::from(record.endpoints().dst_port),
            Self::Proto => f64::from(record.endpoints().proto),
            Self::Stat(i) => record.stats()[i],
        }
    }
}

/// Assembles feature vectors from named record fields
#[derive(Debug, Clone)]
pub struct FeatureVectorBuilder {
    columns: Vec<String>,
    accessors: Vec<FieldAccessor>,
}

impl Default for FeatureVectorBuilder {
    fn default() -> Self {
        Self::flow_statistics()
    }
}

impl FeatureVectorBuilder {
    /// Builder over an explicit, ordered list of numeric columns
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Result<Self> {
        if columns.is_empty() {
            return Err(IdsError::invalid_config(
                "feature_columns",
                "[]",
                "at least one column is required",
            ));
        }

        let accessors = columns
            .iter()
            .map(|c| {
                FieldAccessor::resolve(c.as_ref())
                    .ok_or_else(|| IdsError::FeatureNotFound(c.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            accessors,
        })
    }

    /// The 40 flow statistics, in file order (addresses, ports and protocol excluded)
    pub fn flow_statistics() -> Self {
        Self {
            columns: FLOW_STAT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            accessors: (0..FLOW_STAT_COLUMNS.len()).map(FieldAccessor::Stat).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_features(&self) -> usize {
        self.accessors.len()
    }

    /// Feature vector for a single record
    pub fn build(&self, record: &FlowRecord) -> Array1<f64> {
        self.accessors.iter().map(|a| a.read(record)).collect()
    }

    /// Feature matrix plus labels for a batch of records
    pub fn build_dataset(&self, records: &[FlowRecord]) -> Result<LabeledData> {
        let d = self.n_features();
        let flat: Vec<f64> = records
            .par_iter()
            .flat_map_iter(|r| self.accessors.iter().map(move |a| a.read(r)))
            .collect();
        let features = Array2::from_shape_vec((records.len(), d), flat)?;
        let labels = records.iter().map(FlowRecord::label).collect();
        LabeledData::new(features, labels)
    }
}
