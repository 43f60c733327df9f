//! Multi-probe locality-sensitive hashing over bit-packed rows.
//!
//! Each table hashes a row by a fixed random subset of its bits. Queries
//! look up their own bucket plus every bucket whose key differs in at most
//! `probe_level` bits, then rank the collected candidates exactly.

use std::collections::HashMap;

use ndarray::{ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::distance::{hamming, KBest, Neighbor};
use crate::NeighborSearch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LshParams {
    pub tables: usize,
    pub key_bits: usize,
    pub probe_level: usize,
    pub seed: u64,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            tables: 12,
            key_bits: 20,
            probe_level: 2,
            seed: 0x5eed_0001,
        }
    }
}

struct HashTable {
    /// Bit positions feeding the key, most significant first
    bits: Vec<usize>,
    buckets: HashMap<u32, Vec<usize>>,
}

impl HashTable {
    fn key(&self, row: ArrayView1<'_, u8>) -> u32 {
        self.bits.iter().fold(0u32, |key, &bit| {
            let set = (row[bit / 8] >> (bit % 8)) & 1;
            (key << 1) | set as u32
        })
    }
}

pub struct LshIndex<'a> {
    train: ArrayView2<'a, u8>,
    tables: Vec<HashTable>,
    probes: Vec<u32>,
}

impl<'a> LshIndex<'a> {
    pub fn build(train: ArrayView2<'a, u8>, params: &LshParams) -> Self {
        let total_bits = train.ncols() * 8;
        let key_bits = params.key_bits.min(total_bits).min(32);
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        let tables = (0..params.tables)
            .map(|_| {
                let mut table = HashTable {
                    bits: sample(&mut rng, total_bits, key_bits).into_vec(),
                    buckets: HashMap::new(),
                };
                for (index, row) in train.outer_iter().enumerate() {
                    let key = table.key(row);
                    table.buckets.entry(key).or_default().push(index);
                }
                table
            })
            .collect();

        Self {
            train,
            tables,
            probes: probe_masks(key_bits, params.probe_level),
        }
    }

    /// Distinct train rows sharing a probed bucket with `query`, ascending
    pub fn candidates(&self, query: ArrayView1<'_, u8>) -> Vec<usize> {
        let mut seen = vec![false; self.train.nrows()];
        let mut out = Vec::new();
        for table in &self.tables {
            let key = table.key(query);
            for mask in &self.probes {
                if let Some(bucket) = table.buckets.get(&(key ^ mask)) {
                    for &index in bucket {
                        if !seen[index] {
                            seen[index] = true;
                            out.push(index);
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}

impl NeighborSearch<u8> for LshIndex<'_> {
    fn len(&self) -> usize {
        self.train.nrows()
    }

    fn knn(&self, query: ArrayView1<'_, u8>, k: usize) -> Vec<Neighbor> {
        let mut best = KBest::new(k);
        for index in self.candidates(query) {
            best.offer(index, hamming(query, self.train.row(index)) as f32);
        }
        best.into_vec()
    }
}

/// XOR masks of every key within `level` bit flips, the exact key first
fn probe_masks(key_bits: usize, level: usize) -> Vec<u32> {
    let mut masks = vec![0u32];
    let mut frontier = vec![(0u32, 0usize)];
    for _ in 0..level {
        let mut next = Vec::new();
        for &(mask, lowest) in &frontier {
            for bit in lowest..key_bits {
                let m = mask | (1 << bit);
                masks.push(m);
                next.push((m, bit + 1));
            }
        }
        frontier = next;
    }
    masks
}
