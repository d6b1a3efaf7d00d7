//! Decision tree implementation

use crate::error::{CvAuditError, Result};
use crate::pipeline::{ensure_no_missing, Estimator};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Tree root
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn at random for each split (all when `None`)
    pub max_features: Option<usize>,
    /// Impurity criterion
    pub criterion: Criterion,
    /// Seed for the per-split feature draw
    pub random_state: Option<u64>,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
    is_classification: bool,
    /// Sorted class values (classification only)
    classes: Vec<f64>,
}

/// Running sums for the rows on one side of a split
#[derive(Debug, Clone)]
struct NodeStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    class_counts: Vec<usize>,
}

impl NodeStats {
    fn empty(n_classes: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sq_sum: 0.0,
            class_counts: vec![0; n_classes],
        }
    }

    fn add(&mut self, y: f64, label: usize) {
        self.count += 1;
        self.sum += y;
        self.sq_sum += y * y;
        if let Some(c) = self.class_counts.get_mut(label) {
            *c += 1;
        }
    }

    fn remove(&mut self, y: f64, label: usize) {
        self.count -= 1;
        self.sum -= y;
        self.sq_sum -= y * y;
        if let Some(c) = self.class_counts.get_mut(label) {
            *c -= 1;
        }
    }
}

struct FitData<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    /// Class index per row; all zero for regression
    labels: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            random_state: None,
            n_features: 0,
            feature_importances: None,
            is_classification: true,
            classes: Vec::new(),
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn is_classifier(&self) -> bool {
        self.is_classification
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(CvAuditError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(CvAuditError::fit("cannot fit a tree on an empty training set"));
        }
        if n_features == 0 {
            return Err(CvAuditError::fit("cannot fit a tree without feature columns"));
        }

        self.n_features = n_features;

        let labels = if self.is_classification {
            let mut classes = y.to_vec();
            classes.sort_by(|a, b| a.total_cmp(b));
            classes.dedup();
            let labels: Vec<usize> = y
                .iter()
                .map(|v| classes.binary_search_by(|c| c.total_cmp(v)).unwrap_or_else(|i| i))
                .collect();
            self.classes = classes;
            labels
        } else {
            self.classes.clear();
            vec![0; n_samples]
        };

        let data = FitData { x, y, labels };
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut importances = vec![0.0; n_features];

        let indices: Vec<usize> = (0..n_samples).collect();
        let root = self.build_tree(&data, &indices, 0, &mut importances, &mut rng);
        self.root = Some(root);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = Some(Array1::from_vec(importances));

        Ok(self)
    }

    fn build_tree(
        &self,
        data: &FitData<'_>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let stats = self.node_stats(data, indices);
        let impurity = self.impurity(&stats);
        let leaf = TreeNode::Leaf {
            value: self.leaf_value(&stats),
            n_samples,
        };

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;
        if should_stop {
            return leaf;
        }

        let features = self.candidate_features(rng);
        let Some(split) = self.find_best_split(data, indices, &features, &stats, impurity) else {
            return leaf;
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| data.x[[i, split.feature_idx]] <= split.threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return leaf;
        }

        importances[split.feature_idx] += n_samples as f64 * split.gain;

        let left = Box::new(self.build_tree(data, &left_indices, depth + 1, importances, rng));
        let right = Box::new(self.build_tree(data, &right_indices, depth + 1, importances, rng));

        TreeNode::Split {
            feature_idx: split.feature_idx,
            threshold: split.threshold,
            left,
            right,
            n_samples,
            impurity,
        }
    }

    /// Features considered at one split, in ascending index order
    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let k = self
            .max_features
            .unwrap_or(self.n_features)
            .clamp(1, self.n_features);

        if k >= self.n_features {
            return (0..self.n_features).collect();
        }

        let mut features = sample(rng, self.n_features, k).into_vec();
        features.sort_unstable();
        features
    }

    fn find_best_split(
        &self,
        data: &FitData<'_>,
        indices: &[usize],
        features: &[usize],
        parent: &NodeStats,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        // Each feature independently finds its best threshold
        let per_feature: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&f| self.best_split_on(data, indices, f, parent, parent_impurity))
            .collect();

        // Lowest feature index wins ties
        per_feature.into_iter().flatten().fold(None, |best, cand| match best {
            Some(b) if b.gain >= cand.gain => Some(b),
            _ => Some(cand),
        })
    }

    /// Sweep the rows sorted by one feature, moving them left one at a time
    fn best_split_on(
        &self,
        data: &FitData<'_>,
        indices: &[usize],
        feature_idx: usize,
        parent: &NodeStats,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let mut order: Vec<(f64, usize)> = indices
            .iter()
            .map(|&i| (data.x[[i, feature_idx]], i))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = order.len();
        let mut left = NodeStats::empty(parent.class_counts.len());
        let mut right = parent.clone();
        let mut best: Option<SplitCandidate> = None;

        for pos in 0..n.saturating_sub(1) {
            let (value, i) = order[pos];
            left.add(data.y[i], data.labels[i]);
            right.remove(data.y[i], data.labels[i]);

            let next = order[pos + 1].0;
            if next <= value {
                continue;
            }

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                continue;
            }

            let weighted = (n_left as f64 * self.impurity(&left)
                + n_right as f64 * self.impurity(&right))
                / n as f64;
            let gain = parent_impurity - weighted;

            if gain > best.map_or(0.0, |b| b.gain) {
                best = Some(SplitCandidate {
                    feature_idx,
                    threshold: value + (next - value) / 2.0,
                    gain,
                });
            }
        }

        best
    }

    fn node_stats(&self, data: &FitData<'_>, indices: &[usize]) -> NodeStats {
        let mut stats = NodeStats::empty(self.classes.len());
        for &i in indices {
            stats.add(data.y[i], data.labels[i]);
        }
        stats
    }

    fn impurity(&self, stats: &NodeStats) -> f64 {
        if stats.count == 0 {
            return 0.0;
        }
        let n = stats.count as f64;

        match self.criterion {
            Criterion::Gini => {
                1.0 - stats
                    .class_counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -stats
                .class_counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            // Var = E[X²] - E[X]²
            Criterion::MSE => (stats.sq_sum / n - (stats.sum / n).powi(2)).max(0.0),
        }
    }

    fn leaf_value(&self, stats: &NodeStats) -> f64 {
        if stats.count == 0 {
            return 0.0;
        }

        if self.is_classification {
            // Mode; the smallest class wins ties
            let mut best = 0;
            for (k, &c) in stats.class_counts.iter().enumerate() {
                if c > stats.class_counts[best] {
                    best = k;
                }
            }
            self.classes.get(best).copied().unwrap_or(0.0)
        } else {
            stats.sum / stats.count as f64
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(CvAuditError::ModelNotFitted)?;

        if x.ncols() != self.n_features {
            return Err(CvAuditError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows().into_iter().map(|row| Self::predict_row(root, row)).collect())
    }

    fn predict_row(mut node: &TreeNode, row: ArrayView1<'_, f64>) -> f64 {
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Get tree depth
    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, Self::node_depth)
    }

    fn node_depth(node: &TreeNode) -> usize {
        match node {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => {
                1 + Self::node_depth(left).max(Self::node_depth(right))
            }
        }
    }
}

impl Estimator for DecisionTree {
    fn name(&self) -> &'static str {
        if self.is_classification {
            "decision_tree_classifier"
        } else {
            "decision_tree_regressor"
        }
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, columns: &[String]) -> Result<()> {
        ensure_no_missing(x, columns)?;
        DecisionTree::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier_simple() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        assert_eq!(predictions.to_vec(), y.to_vec());
    }

    #[test]
    fn test_regressor_simple() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new_regressor();
        tree.fit(&x, &y).unwrap();

        let predictions = tree.predict(&x).unwrap();
        let mse: f64 = predictions
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (p - a).powi(2))
            .sum::<f64>()
            / y.len() as f64;

        assert!(mse < 1e-12, "MSE too high: {}", mse);
    }

    #[test]
    fn test_max_depth() {
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![0.0, 1.0, 0.0, 1.0];

        let mut tree = DecisionTree::new_classifier().with_max_depth(2);
        tree.fit(&x, &y).unwrap();

        assert!(tree.get_depth() <= 3);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_tie_goes_to_smallest_class() {
        let x = array![[1.0], [1.0]];
        let y = array![1.0, 0.0];

        let mut tree = DecisionTree::new_classifier();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&array![[1.0]]).unwrap()[0], 0.0);
    }

    #[test]
    fn test_same_seed_same_tree() {
        let x = array![
            [1.0, 5.0, 2.0],
            [2.0, 3.0, 8.0],
            [3.0, 9.0, 1.0],
            [4.0, 1.0, 7.0],
            [5.0, 4.0, 3.0],
            [6.0, 2.0, 6.0]
        ];
        let y = array![1.5, 2.0, 3.5, 3.0, 5.5, 6.0];

        let fit = || {
            let mut tree = DecisionTree::new_regressor()
                .with_max_features(1)
                .with_random_state(7);
            tree.fit(&x, &y).unwrap();
            tree.predict(&x).unwrap()
        };
        assert_eq!(fit(), fit());
    }

    #[test]
    fn test_empty_training_set() {
        let x = Array2::<f64>::zeros((0, 2));
        let y = Array1::<f64>::zeros(0);
        let err = DecisionTree::new_regressor().fit(&x, &y).unwrap_err();
        assert!(matches!(err, CvAuditError::Fit { .. }));
    }

    #[test]
    fn test_predict_shape_mismatch() {
        let mut tree = DecisionTree::new_regressor();
        tree.fit(&array![[1.0], [2.0]], &array![1.0, 2.0]).unwrap();
        assert!(tree.predict(&array![[1.0, 2.0]]).is_err());
    }
}
