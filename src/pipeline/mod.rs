//! Run orchestration and result output

pub mod runner;
pub mod sink;

pub use runner::{PipelineRunner, RunReport};
pub use sink::{csv_line, layout_names, text_report, FileResultSink, ResultSink, REPORT_SUFFIX};
