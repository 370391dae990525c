//! Flow records, dataset sources and feature assembly

mod dataset;
mod features;
mod record;
mod source;

pub use dataset::LabeledData;
pub use features::FeatureVectorBuilder;
pub use record::{
    stat_index, FlowEndpoints, FlowRecord, ENDPOINT_COLUMNS, FLOW_STAT_COLUMNS, LABEL_COLUMN,
    NUM_FLOW_STATS,
};
pub use source::{flow_schema, CsvDatasetSource, DatasetSource};
