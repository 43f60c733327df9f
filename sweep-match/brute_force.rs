use ndarray::{ArrayView1, ArrayView2};

use crate::distance::{DescriptorElement, KBest, Neighbor};
use crate::NeighborSearch;

/// Exhaustive scan of every train row.
///
/// Rows are visited in index order, so equal distances resolve to the
/// lowest train index.
pub struct BruteForce<'a, T> {
    train: ArrayView2<'a, T>,
}

impl<'a, T: DescriptorElement> BruteForce<'a, T> {
    pub fn new(train: ArrayView2<'a, T>) -> Self {
        Self { train }
    }
}

impl<T: DescriptorElement> NeighborSearch<T> for BruteForce<'_, T> {
    fn len(&self) -> usize {
        self.train.nrows()
    }

    fn knn(&self, query: ArrayView1<'_, T>, k: usize) -> Vec<Neighbor> {
        let mut best = KBest::new(k);
        for (index, row) in self.train.outer_iter().enumerate() {
            best.offer(index, T::distance(query, row));
        }
        best.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_exact_neighbours() {
        let train = array![[0u8, 0], [0xff, 0], [1, 0], [3, 0]];
        let search = BruteForce::new(train.view());
        let q = array![0u8, 0];
        let found = search.knn(q.view(), 3);
        assert_eq!(found.iter().map(|n| n.index).collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(found.iter().map(|n| n.distance).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_tie_goes_to_lowest_index() {
        let train = array![[2.0f32, 0.0], [0.0, 2.0], [0.0, -2.0]];
        let search = BruteForce::new(train.view());
        let found = search.knn(array![0.0f32, 0.0].view(), 1);
        assert_eq!(found[0].index, 0);
    }

    #[test]
    fn test_fewer_rows_than_k() {
        let train = array![[1u8]];
        let found = BruteForce::new(train.view()).knn(array![1u8].view(), 2);
        assert_eq!(found.len(), 1);
    }
}
