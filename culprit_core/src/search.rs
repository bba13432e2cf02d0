use crate::adaptive::AdaptiveSearch;
use crate::additive::AdditiveSearch;
use crate::component::{Component, ComponentSet};
use crate::ddmin::Ddmin;
use crate::imcs::ImcsSearch;
use crate::oracle::{Oracle, OracleError};
use crate::quickxplain::QuickXplain;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use thiserror::Error;

/// Errors that abort a conflict search.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The oracle's answers contradict monotonicity, so no sound result exists.
    /// Retrying is pointless: a deterministic oracle would answer the same way.
    #[error("Oracle contract violation in {algorithm}: {detail}")]
    ContractViolation {
        algorithm: &'static str,
        detail: String,
    },

    /// The oracle itself could not be evaluated.
    #[error("Oracle evaluation failed: {0}")]
    Oracle(#[from] OracleError),
}

/// A strategy that narrows a failing pool down to one minimal conflict set.
pub trait ConflictSearch<C: Component> {
    fn name(&self) -> &'static str;

    /// Searches `pool` for a minimal subset on which `oracle` fails.
    ///
    /// # Returns
    /// The conflict set, or an empty set if the pool does not fail at all.
    /// `SearchError::ContractViolation` is returned when the oracle turns out not
    /// to be monotone.
    fn find_conflict_set(
        &self,
        oracle: &mut dyn Oracle<C>,
        pool: &ComponentSet<C>,
    ) -> Result<ComponentSet<C>, SearchError>;
}

/// The index at which a sorted candidate slice is split into two halves.
/// For odd lengths the second half is the larger one.
pub fn split_point(len: usize) -> usize {
    len / 2
}

/// Evaluates `subset` and returns `true` if it fails.
pub(crate) fn fails<C: Component, O: Oracle<C> + ?Sized>(
    oracle: &mut O,
    subset: &ComponentSet<C>,
) -> Result<bool, SearchError> {
    Ok(oracle.evaluate(subset)?.is_fail())
}

/// The selectable single-conflict algorithms.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    Additive,
    #[default]
    Imcs,
    Ddmin,
    #[serde(rename = "quickxplain")]
    QuickXplain,
    Adaptive,
}

impl Algorithm {
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Additive,
        Algorithm::Imcs,
        Algorithm::Ddmin,
        Algorithm::QuickXplain,
        Algorithm::Adaptive,
    ];

    /// Instantiates the algorithm. `threshold` is only used by the adaptive hybrid.
    pub fn build<C: Component>(
        self,
        threshold: NonZeroUsize,
        precheck: bool,
    ) -> Box<dyn ConflictSearch<C>> {
        match self {
            Algorithm::Additive => Box::new(AdditiveSearch::new()),
            Algorithm::Imcs if precheck => Box::new(ImcsSearch::new()),
            Algorithm::Imcs => Box::new(ImcsSearch::without_precheck()),
            Algorithm::Ddmin => Box::new(Ddmin::new()),
            Algorithm::QuickXplain => Box::new(QuickXplain::new()),
            Algorithm::Adaptive => Box::new(AdaptiveSearch::new(threshold)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Additive => "additive",
            Algorithm::Imcs => "imcs",
            Algorithm::Ddmin => "ddmin",
            Algorithm::QuickXplain => "quickxplain",
            Algorithm::Adaptive => "adaptive",
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("unknown algorithm '{s}', expected one of additive, imcs, ddmin, quickxplain, adaptive")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::PlantedOracle;

    #[test]
    fn split_point_keeps_first_half_non_empty_for_pairs() {
        assert_eq!(split_point(2), 1);
        assert_eq!(split_point(5), 2);
        assert_eq!(split_point(16), 8);
    }

    #[test]
    fn algorithm_names_round_trip_through_from_str() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.as_str().parse::<Algorithm>(), Ok(algorithm));
        }
        assert!("bogus".parse::<Algorithm>().is_err());
    }

    #[test]
    fn every_built_algorithm_reports_its_own_name() {
        let threshold = NonZeroUsize::new(50).unwrap();
        let mut oracle = PlantedOracle::single([1u32]);
        let pool: ComponentSet<u32> = (0..4).collect();
        for algorithm in Algorithm::ALL {
            let search = algorithm.build::<u32>(threshold, true);
            assert_eq!(search.name(), algorithm.as_str());
            let found = search.find_conflict_set(&mut oracle, &pool).unwrap();
            assert_eq!(found, [1].into_iter().collect());
        }
    }
}
