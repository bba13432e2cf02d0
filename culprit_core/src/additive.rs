use crate::component::{Component, ComponentSet, snapshot, union_with};
use crate::oracle::Oracle;
use crate::search::{ConflictSearch, SearchError, fails, split_point};
use tracing::{debug, info, warn};

/// Binary-searches `pool` for the single component whose addition to
/// `background` flips the oracle to failing.
///
/// The first half of the remaining range is tested together with the background.
/// A failure confines the culprit to that half; otherwise the half is proven safe,
/// folded into the background and the search continues in the second half. This
/// costs `O(log n)` evaluations for `n = pool.len()`.
///
/// # Arguments
/// * `oracle`: the test being minimized against.
/// * `background`: components present in every evaluation of this search.
/// * `pool`: sorted candidates. The order determines how ranges are split.
///
/// # Returns
/// `Some(culprit)` if one exists, `None` if `background` plus the whole pool does
/// not fail.
pub fn find_one_culprit<C: Component, O: Oracle<C> + ?Sized>(
    oracle: &mut O,
    background: &ComponentSet<C>,
    pool: &[C],
) -> Result<Option<C>, SearchError> {
    debug_assert!(pool.windows(2).all(|w| w[0] < w[1]), "pool must be sorted");

    let mut background = background.clone();
    let mut candidates = pool;
    loop {
        match candidates {
            [] => return Ok(None),
            [only] => {
                let mut subset = background;
                subset.insert(only.clone());
                let found = fails(oracle, &subset)?.then(|| only.clone());
                return Ok(found);
            }
            _ => {
                let (first, second) = candidates.split_at(split_point(candidates.len()));
                let with_first = union_with(&background, first);
                if fails(oracle, &with_first)? {
                    // The failing test already proves a lone element guilty.
                    if let [culprit] = first {
                        return Ok(Some(culprit.clone()));
                    }
                    debug!(remaining = first.len(), "culprit confined to first half");
                    candidates = first;
                } else {
                    debug!(
                        safe = first.len(),
                        remaining = second.len(),
                        "first half safe, searching second half"
                    );
                    background = with_first;
                    candidates = second;
                }
            }
        }
    }
}

/// The plain iterative additive search: peel one culprit at a time until the
/// confirmed culprits fail on their own.
///
/// Unlike [`ImcsSearch`](crate::imcs::ImcsSearch) it checks the confirmed set
/// before every round, including the first, which costs one extra evaluation.
#[derive(Debug, Default, Clone)]
pub struct AdditiveSearch;

impl AdditiveSearch {
    pub fn new() -> Self {
        AdditiveSearch
    }
}

impl<C: Component> ConflictSearch<C> for AdditiveSearch {
    fn name(&self) -> &'static str {
        "additive"
    }

    fn find_conflict_set(
        &self,
        oracle: &mut dyn Oracle<C>,
        pool: &ComponentSet<C>,
    ) -> Result<ComponentSet<C>, SearchError> {
        if !fails(oracle, pool)? {
            return Ok(ComponentSet::new());
        }

        let mut confirmed = ComponentSet::new();
        let mut remaining = snapshot(pool);
        while !fails(oracle, &confirmed)? {
            let Some(culprit) = find_one_culprit(oracle, &confirmed, &remaining)? else {
                warn!(
                    confirmed = confirmed.len(),
                    "additive search ran out of culprits"
                );
                return Err(SearchError::ContractViolation {
                    algorithm: "additive",
                    detail: format!(
                        "no culprit among {} remaining candidates although the pool fails",
                        remaining.len()
                    ),
                });
            };
            info!(?culprit, "confirmed culprit");
            if let Ok(idx) = remaining.binary_search(&culprit) {
                remaining.remove(idx);
            }
            confirmed.insert(culprit);
        }
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{CountingOracle, FnOracle, PlantedOracle};

    fn pool(n: u32) -> Vec<u32> {
        (0..n).collect()
    }

    #[test]
    fn empty_pool_has_no_culprit() {
        let mut oracle = CountingOracle::new(PlantedOracle::single([1u32]));
        let found = find_one_culprit(&mut oracle, &ComponentSet::new(), &[0u32; 0]).unwrap();
        assert_eq!(found, None);
        assert_eq!(oracle.invocations(), 0);
    }

    #[test]
    fn single_candidate_is_tested_with_background() {
        let mut oracle = CountingOracle::new(PlantedOracle::single([1u32, 2]));
        let background: ComponentSet<u32> = [1].into_iter().collect();
        assert_eq!(
            find_one_culprit(&mut oracle, &background, &[2]).unwrap(),
            Some(2)
        );
        assert_eq!(find_one_culprit(&mut oracle, &background, &[3]).unwrap(), None);
        assert_eq!(oracle.invocations(), 2);
    }

    #[test]
    fn finds_single_fault_in_logarithmic_calls() {
        let mut oracle = CountingOracle::new(PlantedOracle::single([37u32]));
        let found = find_one_culprit(&mut oracle, &ComponentSet::new(), &pool(64)[..]).unwrap();
        assert_eq!(found, Some(37));
        assert!(
            oracle.invocations() <= 7,
            "64 candidates should need at most log2(64) + 1 calls, used {}",
            oracle.invocations()
        );
    }

    #[test]
    fn returns_highest_member_needed_to_complete_the_conflict() {
        // With {3, 9} planted the shortest failing prefix ends at 9.
        let mut oracle = PlantedOracle::single([3u32, 9]);
        let found = find_one_culprit(&mut oracle, &ComponentSet::new(), &pool(16)[..]).unwrap();
        assert_eq!(found, Some(9));
    }

    #[test]
    fn every_evaluated_subset_contains_the_background() {
        let background: ComponentSet<u32> = [100, 200].into_iter().collect();
        let expected = background.clone();
        let mut oracle = FnOracle::new(move |subset: &ComponentSet<u32>| {
            assert!(expected.is_subset(subset), "background missing from {subset:?}");
            subset.contains(&5) && subset.contains(&100)
        });
        let found = find_one_culprit(&mut oracle, &background, &pool(10)[..]).unwrap();
        assert_eq!(found, Some(5));
    }

    #[test]
    fn clean_pool_yields_none() {
        let mut oracle = PlantedOracle::single([99u32]);
        let found = find_one_culprit(&mut oracle, &ComponentSet::new(), &pool(20)[..]).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn additive_search_finds_planted_conflict() {
        let mut oracle = PlantedOracle::single([4u32, 11, 19]);
        let found = AdditiveSearch::new()
            .find_conflict_set(&mut oracle, &pool(24).into_iter().collect())
            .unwrap();
        assert_eq!(found, [4, 11, 19].into_iter().collect());
    }

    #[test]
    fn additive_search_returns_empty_for_clean_pool() {
        let mut oracle = PlantedOracle::single([99u32]);
        let found = AdditiveSearch::new()
            .find_conflict_set(&mut oracle, &pool(8).into_iter().collect())
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn additive_search_reports_non_monotone_oracle() {
        // Fails on the first evaluation only, then never again.
        let mut calls = 0;
        let mut oracle = FnOracle::new(move |_: &ComponentSet<u32>| {
            calls += 1;
            calls == 1
        });
        let result =
            AdditiveSearch::new().find_conflict_set(&mut oracle, &pool(8).into_iter().collect());
        match result {
            Err(SearchError::ContractViolation { algorithm, .. }) => {
                assert_eq!(algorithm, "additive")
            }
            other => panic!("Expected a contract violation, got {other:?}"),
        }
    }
}
