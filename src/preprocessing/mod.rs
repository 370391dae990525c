//! Dimensionality reduction
//!
//! Principal component analysis over a partitioned dataset:
//! - mergeable covariance accumulation (`accumulate` / `merge`)
//! - symmetric eigendecomposition and top-k projection

pub mod pca;

pub use pca::{CovarianceAccumulator, PcaConfig, PcaReducer, PrincipalComponentModel};
