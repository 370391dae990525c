//! Flow records as produced by the flowtbag exporter

use crate::error::{IdsError, Result};

/// Number of flow statistics carried by every record
pub const NUM_FLOW_STATS: usize = 40;

/// Flow statistic columns, in file order
pub const FLOW_STAT_COLUMNS: [&str; NUM_FLOW_STATS] = [
    "total_fpackets",
    "total_fvolume",
    "total_bpackets",
    "total_bvolume",
    "min_fpktl",
    "mean_fpktl",
    "max_fpktl",
    "std_fpktl",
    "min_bpktl",
    "mean_bpktl",
    "max_bpktl",
    "std_bpktl",
    "min_fiat",
    "mean_fiat",
    "max_fiat",
    "std_fiat",
    "min_biat",
    "mean_biat",
    "max_biat",
    "std_biat",
    "duration",
    "min_active",
    "mean_active",
    "max_active",
    "std_active",
    "min_idle",
    "mean_idle",
    "max_idle",
    "std_idle",
    "sflow_fpackets",
    "sflow_fbytes",
    "sflow_bpackets",
    "sflow_bbytes",
    "fpsh_cnt",
    "bpsh_cnt",
    "furg_cnt",
    "burg_cnt",
    "total_fhlen",
    "total_bhlen",
    "dscp",
];

/// Leading endpoint columns, in file order
pub const ENDPOINT_COLUMNS: [&str; 5] = ["srcip", "srcport", "dstip", "dstport", "proto"];

/// Label column (0 = normal, 1 = attack)
pub const LABEL_COLUMN: &str = "label";

/// Flow endpoints (excluded from the feature vector by default)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlowEndpoints {
    pub src_ip: String,
    pub src_port: u16,
    pub dst_ip: String,
    pub dst_port: u16,
    pub proto: u8,
}

/// A single labelled flow record. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    endpoints: FlowEndpoints,
    stats: [f64; NUM_FLOW_STATS],
    label: usize,
}

impl FlowRecord {
    /// Build a record, rejecting non-binary labels and non-finite statistics
    pub fn new(endpoints: FlowEndpoints, stats: [f64; NUM_FLOW_STATS], label: usize) -> Result<Self> {
        if label > 1 {
            return Err(IdsError::DataError(format!(
                "label must be 0 or 1, got {}",
                label
            )));
        }
        if let Some(pos) = stats.iter().position(|v| !v.is_finite()) {
            return Err(IdsError::DataError(format!(
                "non-finite value in column {}",
                FLOW_STAT_COLUMNS[pos]
            )));
        }
        Ok(Self { endpoints, stats, label })
    }

    /// Build a record from a stats slice (must hold exactly [`NUM_FLOW_STATS`] values)
    pub fn from_slice(endpoints: FlowEndpoints, stats: &[f64], label: usize) -> Result<Self> {
        let stats: [f64; NUM_FLOW_STATS] = stats.try_into().map_err(|_| IdsError::ShapeError {
            expected: format!("{} flow statistics", NUM_FLOW_STATS),
            actual: format!("{} values", stats.len()),
        })?;
        Self::new(endpoints, stats, label)
    }

    pub fn endpoints(&self) -> &FlowEndpoints {
        &self.endpoints
    }

    pub fn stats(&self) -> &[f64; NUM_FLOW_STATS] {
        &self.stats
    }

    pub fn label(&self) -> usize {
        self.label
    }

    /// Look up a numeric field by its column name
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "srcport" => Some(f64::from(self.endpoints.src_port)),
            "dstport" => Some(f64::from(self.endpoints.dst_port)),
            "proto" => Some(f64::from(self.endpoints.proto)),
            _ => stat_index(name).map(|i| self.stats[i]),
        }
    }
}

/// Position of a flow statistic within [`FLOW_STAT_COLUMNS`]
pub fn stat_index(name: &str) -> Option<usize> {
    FLOW_STAT_COLUMNS.iter().position(|&c| c == name)
}
