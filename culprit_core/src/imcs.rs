use crate::additive::find_one_culprit;
use crate::component::{Component, ComponentSet, snapshot};
use crate::oracle::Oracle;
use crate::search::{ConflictSearch, SearchError, fails};
use tracing::{debug, info, warn};

/// Iterative Minimal Conflict Search ("smart additive").
///
/// Each round binary-searches the remaining candidates for the next culprit,
/// using the culprits confirmed so far as the background, then checks whether
/// the confirmed culprits already fail on their own. The search stops at the
/// first such check that fails, so the remaining pool is never proven safe.
#[derive(Debug, Clone)]
pub struct ImcsSearch {
    precheck: bool,
}

impl Default for ImcsSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl ImcsSearch {
    /// IMCS that first checks whether the whole pool fails.
    pub fn new() -> Self {
        Self { precheck: true }
    }

    /// IMCS that starts bisecting immediately.
    ///
    /// A clean pool is still detected, by the first round failing to find a
    /// culprit, at the cost of one bisection instead of one evaluation.
    pub fn without_precheck() -> Self {
        Self { precheck: false }
    }

    pub fn precheck(&self) -> bool {
        self.precheck
    }
}

impl<C: Component> ConflictSearch<C> for ImcsSearch {
    fn name(&self) -> &'static str {
        "imcs"
    }

    fn find_conflict_set(
        &self,
        oracle: &mut dyn Oracle<C>,
        pool: &ComponentSet<C>,
    ) -> Result<ComponentSet<C>, SearchError> {
        if self.precheck && !fails(oracle, pool)? {
            debug!(pool = pool.len(), "pool does not fail, nothing to search");
            return Ok(ComponentSet::new());
        }

        let mut conflict = ComponentSet::new();
        let mut candidates = snapshot(pool);
        let mut iteration = 0usize;
        loop {
            iteration += 1;
            debug!(
                iteration,
                conflict = conflict.len(),
                candidates = candidates.len(),
                "searching for next conflict element"
            );

            let Some(element) = find_one_culprit(oracle, &conflict, &candidates)? else {
                if conflict.is_empty() && !self.precheck {
                    debug!("no conflict element found, pool is clean");
                    return Ok(conflict);
                }
                if conflict.is_empty() {
                    warn!(pool = pool.len(), "pool failed as a whole but no single culprit was found");
                    return Err(SearchError::ContractViolation {
                        algorithm: "imcs",
                        detail: format!(
                            "pool of {} failed the pre-check but no element makes it fail",
                            pool.len()
                        ),
                    });
                }
                warn!(
                    conflict = ?conflict,
                    "conflict set incomplete but no further element found"
                );
                return Err(SearchError::ContractViolation {
                    algorithm: "imcs",
                    detail: format!(
                        "{} confirmed elements do not fail on their own and none of the {} remaining candidates completes them",
                        conflict.len(),
                        candidates.len()
                    ),
                });
            };

            info!(?element, iteration, "found conflict element");
            if let Ok(idx) = candidates.binary_search(&element) {
                candidates.remove(idx);
            }
            conflict.insert(element);

            if fails(oracle, &conflict)? {
                info!(size = conflict.len(), "conflict set is complete");
                return Ok(conflict);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{CountingOracle, FnOracle, PlantedOracle};

    fn letters() -> ComponentSet<char> {
        ('a'..='p').collect()
    }

    #[test]
    fn finds_planted_letters() {
        let mut oracle = CountingOracle::new(PlantedOracle::single(['c', 'k', 'p']));
        let found = ImcsSearch::new()
            .find_conflict_set(&mut oracle, &letters())
            .unwrap();
        assert_eq!(found, ['c', 'k', 'p'].into_iter().collect());
        assert!(oracle.invocations() > 0);
    }

    #[test]
    fn clean_pool_short_circuits_with_precheck() {
        let mut oracle = CountingOracle::new(PlantedOracle::single(['z']));
        let found = ImcsSearch::new()
            .find_conflict_set(&mut oracle, &letters())
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(oracle.invocations(), 1, "Only the pre-check should run");
    }

    #[test]
    fn clean_pool_detected_without_precheck() {
        let mut oracle = PlantedOracle::single(['z']);
        let found = ImcsSearch::without_precheck()
            .find_conflict_set(&mut oracle, &letters())
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn without_precheck_saves_one_call_on_failing_pool() {
        let pool: ComponentSet<u32> = (0..5).collect();

        let mut with = CountingOracle::new(PlantedOracle::single([2u32]));
        let found = ImcsSearch::new().find_conflict_set(&mut with, &pool).unwrap();
        assert_eq!(found, [2].into_iter().collect());

        let mut without = CountingOracle::new(PlantedOracle::single([2u32]));
        let found = ImcsSearch::without_precheck()
            .find_conflict_set(&mut without, &pool)
            .unwrap();
        assert_eq!(found, [2].into_iter().collect());

        assert_eq!(with.invocations(), without.invocations() + 1);
        assert!(without.invocations() <= 3);
    }

    #[test]
    fn empty_pool_returns_empty_set() {
        let mut oracle = CountingOracle::new(PlantedOracle::single([1u32]));
        let found = ImcsSearch::new()
            .find_conflict_set(&mut oracle, &ComponentSet::new())
            .unwrap();
        assert!(found.is_empty());
        assert!(oracle.invocations() <= 1);
    }

    #[test]
    fn stops_once_conflict_fails_alone() {
        // Only the first of two disjoint conflicts is reported.
        let mut oracle = PlantedOracle::new(vec![
            [1u32, 2].into_iter().collect(),
            [6u32, 7].into_iter().collect(),
        ]);
        let found = ImcsSearch::new()
            .find_conflict_set(&mut oracle, &(0..10).collect())
            .unwrap();
        assert_eq!(found, [1, 2].into_iter().collect());
    }

    #[test]
    fn inconsistent_oracle_is_a_contract_violation() {
        // The pre-check fails, every later evaluation reports good.
        let mut calls = 0;
        let mut oracle = FnOracle::new(move |_: &ComponentSet<u32>| {
            calls += 1;
            calls == 1
        });
        match ImcsSearch::new().find_conflict_set(&mut oracle, &(0..8).collect()) {
            Err(SearchError::ContractViolation { algorithm, .. }) => assert_eq!(algorithm, "imcs"),
            other => panic!("A failing pool with no culprit must be rejected, got {other:?}"),
        }

        // Fails while 3 is present until 3 is confirmed, then never again.
        let mut confirmed_three = false;
        let mut oracle = FnOracle::new(move |subset: &ComponentSet<u32>| {
            if subset.len() == 1 && subset.contains(&3) {
                confirmed_three = true;
                return false;
            }
            !confirmed_three && subset.contains(&3)
        });
        match ImcsSearch::new().find_conflict_set(&mut oracle, &(0..8).collect()) {
            Err(SearchError::ContractViolation { algorithm, .. }) => assert_eq!(algorithm, "imcs"),
            other => panic!("Expected a contract violation, got {other:?}"),
        }
    }
}
