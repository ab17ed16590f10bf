//! Train / validation / test partitioning of dataset indices.
//!
//! Sizes are fixed by the population: 70% train and 15% validation, each
//! rounded half-to-even. The test split takes whatever remains, so it can
//! differ from a nominal 15% by a sample or two. Only the choice of indices is
//! random.

use crate::error::MlError;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TRAIN_PERCENT: f64 = 70.0;
pub const VAL_PERCENT: f64 = 15.0;
pub const TEST_PERCENT: f64 = 15.0;

/// Name of one of the three subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitName {
    Train,
    Val,
    Test,
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitName::Train => write!(f, "train"),
            SplitName::Val => write!(f, "val"),
            SplitName::Test => write!(f, "test"),
        }
    }
}

/// Disjoint index lists covering `0..N`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    pub fn get(&self, name: SplitName) -> &[usize] {
        match name {
            SplitName::Train => &self.train,
            SplitName::Val => &self.val,
            SplitName::Test => &self.test,
        }
    }

    /// Total number of indices across all three subsets.
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the subsets are pairwise disjoint and together cover `0..n` exactly.
    pub fn is_partition_of(&self, n: usize) -> bool {
        if self.len() != n {
            return false;
        }
        let mut seen = vec![false; n];
        for &i in self.train.iter().chain(&self.val).chain(&self.test) {
            match seen.get_mut(i) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }
}

/// Subset sizes derived from the population size alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitSizes {
    pub train: usize,
    pub val: usize,
    /// Rounded 15% share. Reported only; the test split is the remainder.
    pub nominal_test: usize,
}

impl SplitSizes {
    pub fn for_population(n: usize) -> Self {
        Self {
            train: share(n, TRAIN_PERCENT),
            val: share(n, VAL_PERCENT),
            nominal_test: share(n, TEST_PERCENT),
        }
    }

    /// Size of the test split actually produced, if the draw is possible.
    pub fn remaining_test(&self, n: usize) -> Option<usize> {
        n.checked_sub(self.train + self.val)
    }
}

/// `round(n / 100 * percent)` with ties going to the even integer.
fn share(n: usize, percent: f64) -> usize {
    (n as f64 / 100.0 * percent).round_ties_even() as usize
}

/// Partition `0..n` into train, validation and test indices.
///
/// Train and validation indices are listed in draw order; test indices ascend.
pub fn build_split<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<Split, MlError> {
    split_with_sizes(n, SplitSizes::for_population(n), rng)
}

fn split_with_sizes<R: Rng + ?Sized>(
    n: usize,
    sizes: SplitSizes,
    rng: &mut R,
) -> Result<Split, MlError> {
    let requested = sizes.train + sizes.val;
    if requested > n {
        return Err(MlError::InsufficientPopulation {
            requested,
            population: n,
        });
    }

    let universe: Vec<usize> = (0..n).collect();
    let (train, pool) = draw(&universe, sizes.train, rng);
    let (val, test) = draw(&pool, sizes.val, rng);

    Ok(Split { train, val, test })
}

/// Build a split from a fixed seed, or from OS entropy when `seed` is `None`.
pub fn build_split_seeded(n: usize, seed: Option<u64>) -> Result<Split, MlError> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    build_split(n, &mut rng)
}

/// Sample `amount` entries of `pool` without replacement.
///
/// Returns the drawn entries and the untouched remainder in pool order.
fn draw<R: Rng + ?Sized>(pool: &[usize], amount: usize, rng: &mut R) -> (Vec<usize>, Vec<usize>) {
    let positions = index::sample(rng, pool.len(), amount).into_vec();
    let mut taken = vec![false; pool.len()];
    for &p in &positions {
        taken[p] = true;
    }

    let drawn = positions.iter().map(|&p| pool[p]).collect();
    let remaining = pool
        .iter()
        .zip(&taken)
        .filter(|&(_, &t)| !t)
        .map(|(&i, _)| i)
        .collect();
    (drawn, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hundred_samples() {
        let split = build_split_seeded(100, Some(7)).unwrap();
        assert_eq!(split.train.len(), 70);
        assert_eq!(split.val.len(), 15);
        assert_eq!(split.test.len(), 15);
        assert!(split.is_partition_of(100));
    }

    #[test]
    fn test_seven_samples() {
        let sizes = SplitSizes::for_population(7);
        assert_eq!(sizes.train, 5);
        assert_eq!(sizes.val, 1);
        assert_eq!(sizes.remaining_test(7), Some(1));

        let split = build_split_seeded(7, Some(1)).unwrap();
        assert_eq!(
            (split.train.len(), split.val.len(), split.test.len()),
            (5, 1, 1)
        );
        assert!(split.is_partition_of(7));
    }

    #[test]
    fn test_rounding_is_half_to_even() {
        // 5 / 100 * 70 = 3.5 -> 4; 15 / 100 * 70 = 10.5 -> 10
        assert_eq!(SplitSizes::for_population(5).train, 4);
        assert_eq!(SplitSizes::for_population(15).train, 10);
        assert_eq!(SplitSizes::for_population(10).val, 2);
    }

    #[test]
    fn test_test_split_absorbs_remainder() {
        // 23: train 16 (16.1), val 3 (3.45), nominal test 3, actual test 4
        let sizes = SplitSizes::for_population(23);
        assert_eq!(sizes.nominal_test, 3);
        assert_eq!(sizes.remaining_test(23), Some(4));
        let split = build_split_seeded(23, Some(3)).unwrap();
        assert_eq!(split.test.len(), 4);
    }

    #[test]
    fn test_oversized_request_is_an_error() {
        let sizes = SplitSizes {
            train: 3,
            val: 2,
            nominal_test: 0,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let result = split_with_sizes(4, sizes, &mut rng);
        assert!(matches!(
            result,
            Err(MlError::InsufficientPopulation {
                requested: 5,
                population: 4
            })
        ));
    }

    #[test]
    fn test_empty_population() {
        let split = build_split_seeded(0, Some(0)).unwrap();
        assert!(split.is_empty());
        assert!(split.is_partition_of(0));
    }

    #[test]
    fn test_seed_is_reproducible() {
        let a = build_split_seeded(40, Some(99)).unwrap();
        let b = build_split_seeded(40, Some(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_test_indices_ascend() {
        let split = build_split_seeded(60, Some(5)).unwrap();
        assert!(split.test.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_is_partition_of_detects_overlap() {
        let split = Split {
            train: vec![0, 1],
            val: vec![1],
            test: vec![2],
        };
        assert!(!split.is_partition_of(4));
        assert!(!split.is_partition_of(3));

        let out_of_range = Split {
            train: vec![0],
            val: vec![5],
            test: vec![],
        };
        assert!(!out_of_range.is_partition_of(2));
    }

    #[test]
    fn test_split_serializes_with_named_keys() {
        let split = Split {
            train: vec![2, 0],
            val: vec![1],
            test: vec![3],
        };
        let json = serde_json::to_string(&split).unwrap();
        assert_eq!(json, r#"{"train":[2,0],"val":[1],"test":[3]}"#);
        assert_eq!(split.get(SplitName::Val), &[1]);
        assert_eq!(SplitName::Test.to_string(), "test");
    }
}
