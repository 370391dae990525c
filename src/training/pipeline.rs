//! PCA projection followed by a decision tree, trained as one unit

use super::cross_validation::{Classifier, Estimator};
use super::decision_tree::{DecisionTree, DecisionTreeTrainer, Prediction, TreeConfig};
use crate::data::LabeledData;
use crate::error::Result;
use crate::preprocessing::{PcaConfig, PcaReducer, PrincipalComponentModel};
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One grid entry: how to reduce and how to grow the tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PcaTreeEstimator {
    pub pca: PcaConfig,
    pub tree: TreeConfig,
}

impl PcaTreeEstimator {
    pub fn new(pca: PcaConfig, tree: TreeConfig) -> Self {
        Self { pca, tree }
    }
}

impl Estimator for PcaTreeEstimator {
    type Model = PcaTreeModel;

    fn fit(&self, data: &LabeledData) -> Result<PcaTreeModel> {
        let pca = PcaReducer::new(self.pca.clone()).fit(data.features())?;
        let reduced = pca.transform_batch(data.features())?;
        let tree = DecisionTreeTrainer::new(self.tree.clone()).fit(reduced.view(), data.labels())?;

        debug!(
            n_samples = data.len(),
            n_components = pca.n_components(),
            n_nodes = tree.n_nodes(),
            depth = tree.depth(),
            "Fitted PCA tree"
        );

        Ok(PcaTreeModel { pca, tree })
    }
}

/// Fitted projection plus tree over the projected space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaTreeModel {
    pca: PrincipalComponentModel,
    tree: DecisionTree,
}

impl PcaTreeModel {
    pub fn pca(&self) -> &PrincipalComponentModel {
        &self.pca
    }

    pub fn tree(&self) -> &DecisionTree {
        &self.tree
    }
}

impl Classifier for PcaTreeModel {
    fn predict(&self, x: ArrayView1<f64>) -> Result<Prediction> {
        let reduced = self.pca.transform(x)?;
        self.tree.predict(reduced.view())
    }

    fn predict_batch(&self, x: ArrayView2<f64>) -> Result<Vec<Prediction>> {
        let reduced = self.pca.transform_batch(x)?;
        (0..reduced.nrows())
            .into_par_iter()
            .map(|i| self.tree.predict(reduced.row(i)))
            .collect()
    }
}
