//! Descriptor matching.
//!
//! A [`Matcher`] pairs a search backend with a selection policy. The
//! backend answers k-nearest queries over the train rows with the metric
//! implied by the descriptor kind (Hamming for bit-packed rows, L2 for
//! floating-point rows); the policy turns those answers into matches.

use std::fmt;
use std::str::FromStr;

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use sweep_core::{DescriptorKind, Descriptors, Match, SweepError, SweepResult};

pub mod brute_force;
pub mod distance;
pub mod kdtree;
pub mod lsh;

pub use brute_force::BruteForce;
pub use distance::{DescriptorElement, Neighbor};
pub use kdtree::{KdForest, KdForestParams};
pub use lsh::{LshIndex, LshParams};

/// Default best / second-best distance ratio of the k-NN test
pub const DEFAULT_RATIO: f32 = 0.8;

/// Nearest-neighbour search over a fixed set of train rows
pub trait NeighborSearch<T> {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` train rows closest to `query`, nearest first
    fn knn(&self, query: ArrayView1<'_, T>, k: usize) -> Vec<Neighbor>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatcherBackend {
    #[serde(alias = "MAT_BF")]
    BruteForce,
    #[serde(alias = "MAT_FLANN")]
    ApproximateIndex,
}

impl fmt::Display for MatcherBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatcherBackend::BruteForce => f.write_str("brute-force"),
            MatcherBackend::ApproximateIndex => f.write_str("approximate-index"),
        }
    }
}

impl FromStr for MatcherBackend {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brute-force" | "bf" | "mat_bf" => Ok(MatcherBackend::BruteForce),
            "approximate-index" | "flann" | "mat_flann" => Ok(MatcherBackend::ApproximateIndex),
            other => Err(SweepError::InvalidConfig(format!("unknown matcher backend `{other}`"))),
        }
    }
}

/// Selection rule as named in configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionKind {
    #[serde(alias = "SEL_NN")]
    BestMatch,
    #[serde(alias = "SEL_KNN")]
    KnnRatio,
}

impl fmt::Display for SelectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionKind::BestMatch => f.write_str("best-match"),
            SelectionKind::KnnRatio => f.write_str("knn-ratio"),
        }
    }
}

impl FromStr for SelectionKind {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best-match" | "nn" | "sel_nn" => Ok(SelectionKind::BestMatch),
            "knn-ratio" | "knn" | "sel_knn" => Ok(SelectionKind::KnnRatio),
            other => Err(SweepError::InvalidConfig(format!("unknown selection policy `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Nearest train row for every query row
    BestMatch,
    /// Nearest train row, kept only when `best < ratio * second_best`
    KnnRatio { ratio: f32 },
}

impl SelectionPolicy {
    pub fn new(kind: SelectionKind, ratio: f32) -> Self {
        match kind {
            SelectionKind::BestMatch => SelectionPolicy::BestMatch,
            SelectionKind::KnnRatio => SelectionPolicy::KnnRatio { ratio },
        }
    }

    pub fn kind(&self) -> SelectionKind {
        match self {
            SelectionPolicy::BestMatch => SelectionKind::BestMatch,
            SelectionPolicy::KnnRatio { .. } => SelectionKind::KnnRatio,
        }
    }

    fn neighbours(&self) -> usize {
        match self {
            SelectionPolicy::BestMatch => 1,
            SelectionPolicy::KnnRatio { .. } => 2,
        }
    }

    fn select(&self, query_idx: usize, found: &[Neighbor]) -> Option<Match> {
        let best = found.first()?;
        match self {
            SelectionPolicy::BestMatch => Some(Match::new(query_idx, best.index, best.distance)),
            SelectionPolicy::KnnRatio { ratio } => {
                let second = found.get(1)?;
                (best.distance < ratio * second.distance)
                    .then(|| Match::new(query_idx, best.index, best.distance))
            }
        }
    }
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::KnnRatio {
            ratio: DEFAULT_RATIO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matcher {
    pub backend: MatcherBackend,
    pub selection: SelectionPolicy,
    pub lsh: LshParams,
    pub kd_forest: KdForestParams,
}

impl Matcher {
    pub fn new(backend: MatcherBackend, selection: SelectionPolicy) -> Self {
        Self {
            backend,
            selection,
            lsh: LshParams::default(),
            kd_forest: KdForestParams::default(),
        }
    }

    /// Matches every query row against the train rows.
    ///
    /// Both matrices must be of `kind` and equally wide. An empty matrix on
    /// either side yields no matches. Output follows query row order.
    pub fn match_descriptors(
        &self,
        query: &Descriptors,
        train: &Descriptors,
        kind: DescriptorKind,
    ) -> SweepResult<Vec<Match>> {
        for side in [query, train] {
            if side.kind() != kind {
                return Err(SweepError::DescriptorKindMismatch {
                    query: kind,
                    train: side.kind(),
                });
            }
        }
        if query.is_empty() || train.is_empty() {
            return Ok(Vec::new());
        }
        if query.width() != train.width() {
            return Err(SweepError::DescriptorWidthMismatch {
                query: query.width(),
                train: train.width(),
            });
        }

        let matches = match (query, train) {
            (Descriptors::Binary(q), Descriptors::Binary(t)) => match self.backend {
                MatcherBackend::BruteForce => self.run(q.view(), &BruteForce::new(t.view())),
                MatcherBackend::ApproximateIndex => {
                    self.run(q.view(), &LshIndex::build(t.view(), &self.lsh))
                }
            },
            (Descriptors::Float(q), Descriptors::Float(t)) => match self.backend {
                MatcherBackend::BruteForce => self.run(q.view(), &BruteForce::new(t.view())),
                MatcherBackend::ApproximateIndex => {
                    self.run(q.view(), &KdForest::build(t.view(), &self.kd_forest))
                }
            },
            _ => {
                return Err(SweepError::DescriptorKindMismatch {
                    query: query.kind(),
                    train: train.kind(),
                })
            }
        };
        log::debug!(
            "{} / {}: {} of {} query rows matched",
            self.backend,
            self.selection.kind(),
            matches.len(),
            query.rows()
        );
        Ok(matches)
    }

    fn run<T: DescriptorElement, S: NeighborSearch<T>>(&self, query: ArrayView2<'_, T>, search: &S) -> Vec<Match> {
        let k = self.selection.neighbours();
        query
            .outer_iter()
            .enumerate()
            .filter_map(|(i, row)| self.selection.select(i, &search.knn(row, k)))
            .collect()
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Matcher::new(MatcherBackend::ApproximateIndex, SelectionPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn all_matchers() -> Vec<Matcher> {
        let mut out = Vec::new();
        for backend in [MatcherBackend::BruteForce, MatcherBackend::ApproximateIndex] {
            for selection in [SelectionPolicy::BestMatch, SelectionPolicy::default()] {
                out.push(Matcher::new(backend, selection));
            }
        }
        out
    }

    #[test]
    fn test_empty_side_gives_no_matches() {
        let full = Descriptors::Binary(Array2::from_elem((4, 32), 7u8));
        let empty = Descriptors::empty(DescriptorKind::Binary, 32);
        for m in all_matchers() {
            assert_eq!(m.match_descriptors(&full, &empty, DescriptorKind::Binary), Ok(vec![]));
            assert_eq!(m.match_descriptors(&empty, &full, DescriptorKind::Binary), Ok(vec![]));
        }
    }

    #[test]
    fn test_equal_best_and_second_best_is_rejected() {
        // Train rows 0 and 1 are both one bit away from the query
        let query = Descriptors::Binary(array![[0b0000_0000u8, 0]]);
        let train = Descriptors::Binary(array![[0b0000_0001u8, 0], [0b0000_0010u8, 0]]);
        for backend in [MatcherBackend::BruteForce, MatcherBackend::ApproximateIndex] {
            let m = Matcher::new(backend, SelectionPolicy::default());
            assert_eq!(m.match_descriptors(&query, &train, DescriptorKind::Binary), Ok(vec![]));
        }
        let float_q = Descriptors::Float(array![[0.0f32, 0.0]]);
        let float_t = Descriptors::Float(array![[1.0f32, 0.0], [0.0, -1.0]]);
        for backend in [MatcherBackend::BruteForce, MatcherBackend::ApproximateIndex] {
            let m = Matcher::new(backend, SelectionPolicy::default());
            assert_eq!(
                m.match_descriptors(&float_q, &float_t, DescriptorKind::Gradient),
                Ok(vec![]),
                "{backend}"
            );
        }
    }

    #[test]
    fn test_ratio_is_strict() {
        let query = Descriptors::Float(array![[0.0f32]]);
        // 4 < 0.8 * 5 is false
        let train = Descriptors::Float(array![[4.0f32], [5.0]]);
        let m = Matcher::new(MatcherBackend::BruteForce, SelectionPolicy::default());
        assert_eq!(m.match_descriptors(&query, &train, DescriptorKind::Gradient), Ok(vec![]));

        let train = Descriptors::Float(array![[3.9f32], [5.0]]);
        let found = m.match_descriptors(&query, &train, DescriptorKind::Gradient).unwrap();
        assert_eq!(found, vec![Match::new(0, 0, 3.9)]);
    }

    #[test]
    fn test_single_candidate_fails_ratio_test() {
        let query = Descriptors::Binary(array![[1u8]]);
        let train = Descriptors::Binary(array![[1u8]]);
        let knn = Matcher::new(MatcherBackend::BruteForce, SelectionPolicy::default());
        assert_eq!(knn.match_descriptors(&query, &train, DescriptorKind::Binary), Ok(vec![]));
        let nn = Matcher::new(MatcherBackend::BruteForce, SelectionPolicy::BestMatch);
        assert_eq!(
            nn.match_descriptors(&query, &train, DescriptorKind::Binary),
            Ok(vec![Match::new(0, 0, 0.0)])
        );
    }

    #[test]
    fn test_kind_and_width_checks() {
        let binary = Descriptors::Binary(Array2::zeros((2, 32)));
        let float = Descriptors::Float(Array2::zeros((2, 128)));
        let m = Matcher::default();
        assert!(matches!(
            m.match_descriptors(&binary, &float, DescriptorKind::Binary),
            Err(SweepError::DescriptorKindMismatch { .. })
        ));
        let narrow = Descriptors::Binary(Array2::zeros((2, 16)));
        assert_eq!(
            m.match_descriptors(&binary, &narrow, DescriptorKind::Binary),
            Err(SweepError::DescriptorWidthMismatch { query: 32, train: 16 })
        );
    }

    #[test]
    fn test_names_and_aliases() {
        assert_eq!("MAT_BF".parse::<MatcherBackend>(), Ok(MatcherBackend::BruteForce));
        assert_eq!("approximate-index".parse::<MatcherBackend>(), Ok(MatcherBackend::ApproximateIndex));
        assert_eq!("SEL_KNN".parse::<SelectionKind>(), Ok(SelectionKind::KnnRatio));
        assert!("SEL_XYZ".parse::<SelectionKind>().is_err());
        assert_eq!(SelectionPolicy::new(SelectionKind::KnnRatio, 0.7), SelectionPolicy::KnnRatio { ratio: 0.7 });
    }

    fn random_binary(n: usize, seed: u64) -> Array2<u8> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((n, 32), |_| rng.gen())
    }

    #[test]
    fn test_identical_frames_match_themselves() {
        let rows = Descriptors::Binary(random_binary(60, 4));
        for m in all_matchers() {
            let found = m.match_descriptors(&rows, &rows, DescriptorKind::Binary).unwrap();
            assert!(found.iter().all(|mt| mt.query_idx == mt.train_idx && mt.distance == 0.0));
            // Hashing rarely buckets unrelated random rows together, so the
            // approximate ratio test often lacks a second candidate
            if m.backend == MatcherBackend::BruteForce || m.selection == SelectionPolicy::BestMatch {
                assert_eq!(found.len(), 60, "{:?}", m);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_best_match_covers_every_query(nq in 0usize..20, nt in 0usize..20, seed in any::<u64>()) {
            let q = Descriptors::Binary(random_binary(nq, seed));
            let t = Descriptors::Binary(random_binary(nt, seed.wrapping_add(1)));
            let m = Matcher::new(MatcherBackend::BruteForce, SelectionPolicy::BestMatch);
            let found = m.match_descriptors(&q, &t, DescriptorKind::Binary).unwrap();
            let expected = if nt == 0 { 0 } else { nq };
            prop_assert_eq!(found.len(), expected);
            prop_assert!(found.windows(2).all(|w| w[0].query_idx < w[1].query_idx));
        }

        #[test]
        fn prop_ratio_accepted_matches_are_strict(nq in 1usize..20, nt in 2usize..20, seed in any::<u64>()) {
            let q = random_binary(nq, seed);
            let t = random_binary(nt, seed ^ 0xabcd);
            let m = Matcher::new(MatcherBackend::BruteForce, SelectionPolicy::default());
            let found = m
                .match_descriptors(&Descriptors::Binary(q.clone()), &Descriptors::Binary(t.clone()), DescriptorKind::Binary)
                .unwrap();
            for mt in found {
                let mut dists: Vec<f32> = t
                    .outer_iter()
                    .map(|row| distance::hamming(q.row(mt.query_idx), row) as f32)
                    .collect();
                dists.sort_by(f32::total_cmp);
                prop_assert_eq!(mt.distance, dists[0]);
                prop_assert!(dists[0] < DEFAULT_RATIO * dists[1]);
            }
        }
    }
}
