//! Row distances and the k-best accumulator shared by every backend.

use ndarray::ArrayView1;

/// Element type of a descriptor row, tied to its distance metric
pub trait DescriptorElement: Copy + Send + Sync + 'static {
    fn distance(a: ArrayView1<'_, Self>, b: ArrayView1<'_, Self>) -> f32;
}

impl DescriptorElement for u8 {
    fn distance(a: ArrayView1<'_, u8>, b: ArrayView1<'_, u8>) -> f32 {
        hamming(a, b) as f32
    }
}

impl DescriptorElement for f32 {
    fn distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
        l2(a, b)
    }
}

/// Number of differing bits
pub fn hamming(a: ArrayView1<'_, u8>, b: ArrayView1<'_, u8>) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

pub fn l2_squared(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn l2(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    l2_squared(a, b).sqrt()
}

/// A train row and its distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

/// The `k` closest candidates seen so far, nearest first.
///
/// A candidate only displaces an entry it is strictly closer than, so
/// among equal distances the one offered first is kept ahead.
#[derive(Debug, Clone)]
pub struct KBest {
    k: usize,
    items: Vec<Neighbor>,
}

impl KBest {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            items: Vec::with_capacity(k + 1),
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.k
    }

    /// Distance a candidate has to beat to enter a full buffer
    pub fn worst(&self) -> f32 {
        if self.is_full() {
            self.items.last().map_or(f32::INFINITY, |n| n.distance)
        } else {
            f32::INFINITY
        }
    }

    pub fn offer(&mut self, index: usize, distance: f32) {
        if self.k == 0 || distance >= self.worst() {
            return;
        }
        let pos = self.items.partition_point(|n| n.distance <= distance);
        self.items.insert(pos, Neighbor { index, distance });
        self.items.truncate(self.k);
    }

    pub fn into_vec(self) -> Vec<Neighbor> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_hamming_counts_bits() {
        let a = arr1(&[0b1111_0000u8, 0xff, 0x00]);
        let b = arr1(&[0b0000_0000u8, 0xff, 0x01]);
        assert_eq!(hamming(a.view(), b.view()), 5);
        assert_eq!(hamming(a.view(), a.view()), 0);
        assert_eq!(u8::distance(a.view(), b.view()), 5.0);
    }

    #[test]
    fn test_l2() {
        let a = arr1(&[0.0f32, 0.0, 0.0]);
        let b = arr1(&[3.0f32, 4.0, 0.0]);
        assert_eq!(l2(a.view(), b.view()), 5.0);
        assert_eq!(l2_squared(a.view(), b.view()), 25.0);
    }

    #[test]
    fn test_kbest_keeps_nearest_in_order() {
        let mut best = KBest::new(2);
        best.offer(0, 5.0);
        best.offer(1, 3.0);
        best.offer(2, 4.0);
        best.offer(3, 9.0);
        let idx: Vec<usize> = best.into_vec().iter().map(|n| n.index).collect();
        assert_eq!(idx, vec![1, 2]);
    }

    #[test]
    fn test_kbest_ties_favour_first_offered() {
        let mut best = KBest::new(2);
        best.offer(4, 1.0);
        best.offer(2, 1.0);
        best.offer(7, 1.0);
        let idx: Vec<usize> = best.into_vec().iter().map(|n| n.index).collect();
        assert_eq!(idx, vec![4, 2]);
    }

    #[test]
    fn test_kbest_zero_capacity() {
        let mut best = KBest::new(0);
        best.offer(0, 1.0);
        assert!(best.into_vec().is_empty());
    }
}
