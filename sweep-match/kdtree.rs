//! Randomized k-d forest for floating-point rows.
//!
//! Every tree splits on a dimension drawn at random from the few with the
//! highest variance, at the mean. A query descends all trees once, then
//! keeps expanding the closest pending branch across the forest until the
//! leaf budget is spent.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::{ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::distance::{l2_squared, KBest, Neighbor};
use crate::NeighborSearch;

/// Split dimensions are drawn from this many highest-variance candidates
const RANDOM_DIMS: usize = 5;
/// Rows used to estimate per-dimension variance at a node
const VARIANCE_SAMPLE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdForestParams {
    pub trees: usize,
    pub checks: usize,
    pub seed: u64,
}

impl Default for KdForestParams {
    fn default() -> Self {
        Self {
            trees: 4,
            checks: 32,
            seed: 0x5eed_0002,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf(Vec<usize>),
    Split {
        dim: usize,
        value: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<Node>,
}

/// Pending subtree with a lower bound on its squared distance
#[derive(Debug, Clone, Copy)]
struct Branch {
    bound: f32,
    tree: usize,
    node: usize,
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Branch {}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Branch {
    // Reversed so the max-heap pops the smallest bound
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .bound
            .total_cmp(&self.bound)
            .then_with(|| other.tree.cmp(&self.tree))
            .then_with(|| other.node.cmp(&self.node))
    }
}

pub struct KdForest<'a> {
    train: ArrayView2<'a, f32>,
    trees: Vec<Tree>,
    checks: usize,
}

impl<'a> KdForest<'a> {
    pub fn build(train: ArrayView2<'a, f32>, params: &KdForestParams) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let trees = (0..params.trees.max(1))
            .map(|_| {
                let mut nodes = Vec::new();
                let indices: Vec<usize> = (0..train.nrows()).collect();
                grow(&train, indices, &mut nodes, &mut rng);
                Tree { nodes }
            })
            .collect();
        Self {
            train,
            trees,
            checks: params.checks.max(1),
        }
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Walks to a leaf, queueing the far side of every split on the way
    fn descend(
        &self,
        query: ArrayView1<'_, f32>,
        branch: Branch,
        heap: &mut BinaryHeap<Branch>,
        seen: &mut [bool],
        best: &mut KBest,
        checked: &mut usize,
    ) {
        let tree = &self.trees[branch.tree];
        let mut node = branch.node;
        loop {
            match &tree.nodes[node] {
                Node::Leaf(rows) => {
                    for &index in rows {
                        if seen[index] {
                            continue;
                        }
                        seen[index] = true;
                        *checked += 1;
                        best.offer(index, l2_squared(query, self.train.row(index)));
                    }
                    return;
                }
                Node::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    let diff = query[*dim] - value;
                    let (near, far) = if diff < 0.0 { (*left, *right) } else { (*right, *left) };
                    let bound = branch.bound + diff * diff;
                    if bound < best.worst() {
                        heap.push(Branch {
                            bound,
                            tree: branch.tree,
                            node: far,
                        });
                    }
                    node = near;
                }
            }
        }
    }
}

impl NeighborSearch<f32> for KdForest<'_> {
    fn len(&self) -> usize {
        self.train.nrows()
    }

    fn knn(&self, query: ArrayView1<'_, f32>, k: usize) -> Vec<Neighbor> {
        if self.train.nrows() == 0 {
            return Vec::new();
        }
        let mut best = KBest::new(k);
        let mut heap = BinaryHeap::new();
        let mut seen = vec![false; self.train.nrows()];
        let mut checked = 0usize;

        for tree in 0..self.trees.len() {
            let root = Branch {
                bound: 0.0,
                tree,
                node: 0,
            };
            self.descend(query, root, &mut heap, &mut seen, &mut best, &mut checked);
        }
        while let Some(branch) = heap.pop() {
            if checked >= self.checks && best.is_full() {
                break;
            }
            if branch.bound >= best.worst() {
                continue;
            }
            self.descend(query, branch, &mut heap, &mut seen, &mut best, &mut checked);
        }

        best.into_vec()
            .into_iter()
            .map(|n| Neighbor {
                index: n.index,
                distance: n.distance.sqrt(),
            })
            .collect()
    }
}

/// Appends the subtree over `indices` to `nodes`, returning its root
fn grow(
    train: &ArrayView2<'_, f32>,
    indices: Vec<usize>,
    nodes: &mut Vec<Node>,
    rng: &mut ChaCha8Rng,
) -> usize {
    let id = nodes.len();
    if indices.len() <= 1 {
        nodes.push(Node::Leaf(indices));
        return id;
    }

    let (mean, variance) = spread(train, &indices);
    let mut dims: Vec<usize> = (0..train.ncols()).collect();
    dims.sort_by(|a, b| variance[*b].total_cmp(&variance[*a]));
    dims.truncate(RANDOM_DIMS.min(dims.len()));
    if dims.is_empty() || variance[dims[0]] <= 0.0 {
        // Identical rows cannot be separated
        nodes.push(Node::Leaf(indices));
        return id;
    }
    let candidates: Vec<usize> = dims.into_iter().filter(|d| variance[*d] > 0.0).collect();
    let dim = candidates[rng.gen_range(0..candidates.len())];
    let value = mean[dim];

    let (mut left, mut right): (Vec<usize>, Vec<usize>) =
        indices.into_iter().partition(|&i| train[(i, dim)] < value);
    if left.is_empty() || right.is_empty() {
        let mut all = left;
        all.append(&mut right);
        let half = all.len() / 2;
        right = all.split_off(half);
        left = all;
    }

    nodes.push(Node::Leaf(Vec::new()));
    let l = grow(train, left, nodes, rng);
    let r = grow(train, right, nodes, rng);
    nodes[id] = Node::Split {
        dim,
        value,
        left: l,
        right: r,
    };
    id
}

fn spread(train: &ArrayView2<'_, f32>, indices: &[usize]) -> (Vec<f32>, Vec<f32>) {
    let cols = train.ncols();
    let sample = &indices[..indices.len().min(VARIANCE_SAMPLE)];
    let n = sample.len() as f32;
    let mut mean = vec![0.0f32; cols];
    for &i in sample {
        for (m, v) in mean.iter_mut().zip(train.row(i).iter()) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);
    let mut variance = vec![0.0f32; cols];
    for &i in sample {
        for ((s, v), m) in variance.iter_mut().zip(train.row(i).iter()).zip(mean.iter()) {
            *s += (v - m) * (v - m);
        }
    }
    (mean, variance)
}
