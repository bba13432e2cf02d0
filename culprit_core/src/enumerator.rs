use crate::cache::KnowledgeBase;
use crate::component::{Component, ComponentSet};
use crate::imcs::ImcsSearch;
use crate::oracle::{CountingOracle, Oracle};
use crate::search::{ConflictSearch, SearchError, fails};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How memoized verdicts are shared between the single-conflict searches of
/// one enumeration.
///
/// Whether a verdict may be reused across searches depends on the oracle:
/// `Shared` is only sound if the outcome is a pure function of membership,
/// independent of which tests ran before. `PerSearch` stays correct when the
/// outcome can depend on incidental call history within reason, at the cost of
/// repeating some real invocations. Which one matches a real-world oracle is
/// left to the embedder.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CacheScope {
    /// One knowledge base for the whole enumeration.
    Shared,
    /// A fresh knowledge base for every single-conflict search.
    #[default]
    PerSearch,
    /// Every evaluation reaches the oracle.
    Disabled,
}

/// Result of enumerating every conflict implied by an oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration<C: Component> {
    /// Conflict sets in discovery order.
    pub conflict_sets: Vec<ComponentSet<C>>,
    /// Real oracle invocations over the whole enumeration.
    pub invocations: u64,
}

/// Finds all mutually disjoint minimal conflicts by repeating IMCS over a
/// shrinking pool.
///
/// Assumes the oracle fails iff the tested subset contains at least one of
/// several disjoint minimal conflict sets.
#[derive(Debug, Clone, Default)]
pub struct Enumerator {
    cache_scope: CacheScope,
    check_remaining: bool,
}

impl Enumerator {
    pub fn new(cache_scope: CacheScope) -> Self {
        Self {
            cache_scope,
            check_remaining: false,
        }
    }

    /// After removing each conflict, test the remaining pool and stop early if it
    /// is clean. Saves a full bisection when the last conflict was found, costs one
    /// evaluation per conflict otherwise.
    pub fn with_check_remaining(mut self, check_remaining: bool) -> Self {
        self.check_remaining = check_remaining;
        self
    }

    pub fn cache_scope(&self) -> CacheScope {
        self.cache_scope
    }

    pub fn find_all_conflicts<C: Component, O: Oracle<C> + ?Sized>(
        &self,
        oracle: &mut O,
        universe: &ComponentSet<C>,
    ) -> Result<Enumeration<C>, SearchError> {
        let mut counting = CountingOracle::new(oracle);
        let conflict_sets = match self.cache_scope {
            CacheScope::Shared => {
                let mut knowledge = KnowledgeBase::new(&mut counting);
                self.run_searches(&mut knowledge, universe, false)?
            }
            CacheScope::PerSearch => self.run_searches(&mut counting, universe, true)?,
            CacheScope::Disabled => self.run_searches(&mut counting, universe, false)?,
        };

        let invocations = counting.invocations();
        info!(
            conflicts = conflict_sets.len(),
            invocations, "enumeration finished"
        );
        Ok(Enumeration {
            conflict_sets,
            invocations,
        })
    }

    fn run_searches<C: Component>(
        &self,
        oracle: &mut dyn Oracle<C>,
        universe: &ComponentSet<C>,
        fresh_cache_per_search: bool,
    ) -> Result<Vec<ComponentSet<C>>, SearchError> {
        let search = ImcsSearch::without_precheck();
        let mut pool = universe.clone();
        let mut found = Vec::new();

        while !pool.is_empty() {
            let conflict = if fresh_cache_per_search {
                let mut knowledge = KnowledgeBase::new(&mut *oracle);
                search.find_conflict_set(&mut knowledge, &pool)?
            } else {
                search.find_conflict_set(oracle, &pool)?
            };

            if conflict.is_empty() {
                debug!(remaining = pool.len(), "no further conflict in remaining pool");
                break;
            }

            info!(index = found.len(), conflict = ?conflict, "found conflict set");
            pool.retain(|component| !conflict.contains(component));
            found.push(conflict);

            if self.check_remaining && !pool.is_empty() && !fails(oracle, &pool)? {
                debug!(remaining = pool.len(), "remaining pool is clean");
                break;
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::PlantedOracle;

    fn set(items: &[u32]) -> ComponentSet<u32> {
        items.iter().copied().collect()
    }

    fn sorted(mut sets: Vec<ComponentSet<u32>>) -> Vec<ComponentSet<u32>> {
        sets.sort();
        sets
    }

    #[test]
    fn finds_every_disjoint_conflict() {
        let planted = vec![set(&[3, 90]), set(&[10, 11, 127]), set(&[64])];
        let universe: ComponentSet<u32> = (0..128).collect();
        for scope in [CacheScope::Shared, CacheScope::PerSearch, CacheScope::Disabled] {
            let mut oracle = PlantedOracle::new(planted.clone());
            let result = Enumerator::new(scope)
                .find_all_conflicts(&mut oracle, &universe)
                .unwrap();
            assert_eq!(
                sorted(result.conflict_sets),
                sorted(planted.clone()),
                "Scope {scope:?} must find all planted conflicts"
            );
            assert!(result.invocations > 0);
        }
    }

    #[test]
    fn shared_cache_never_costs_more_than_per_search() {
        let planted = vec![set(&[1, 2]), set(&[40, 41, 42])];
        let universe: ComponentSet<u32> = (0..64).collect();

        let count = |scope| {
            let mut oracle = PlantedOracle::new(planted.clone());
            Enumerator::new(scope)
                .find_all_conflicts(&mut oracle, &universe)
                .unwrap()
                .invocations
        };
        let shared = count(CacheScope::Shared);
        let per_search = count(CacheScope::PerSearch);
        let disabled = count(CacheScope::Disabled);
        assert!(shared <= per_search, "{shared} > {per_search}");
        assert!(per_search <= disabled, "{per_search} > {disabled}");
    }

    #[test]
    fn empty_universe_costs_nothing() {
        let mut oracle = PlantedOracle::single([1u32]);
        let result = Enumerator::default()
            .find_all_conflicts(&mut oracle, &ComponentSet::new())
            .unwrap();
        assert!(result.conflict_sets.is_empty());
        assert_eq!(result.invocations, 0);
    }

    #[test]
    fn clean_universe_yields_nothing() {
        let mut oracle = PlantedOracle::single([500u32]);
        let result = Enumerator::default()
            .find_all_conflicts(&mut oracle, &(0..32).collect())
            .unwrap();
        assert!(result.conflict_sets.is_empty());
    }

    #[test]
    fn check_remaining_stops_after_last_conflict() {
        let planted = vec![set(&[5, 6])];
        let universe: ComponentSet<u32> = (0..64).collect();

        let mut plain_oracle = PlantedOracle::new(planted.clone());
        let plain = Enumerator::new(CacheScope::Disabled)
            .find_all_conflicts(&mut plain_oracle, &universe)
            .unwrap();

        let mut checked_oracle = PlantedOracle::new(planted.clone());
        let checked = Enumerator::new(CacheScope::Disabled)
            .with_check_remaining(true)
            .find_all_conflicts(&mut checked_oracle, &universe)
            .unwrap();

        assert_eq!(plain.conflict_sets, checked.conflict_sets);
        assert!(checked.invocations < plain.invocations);
    }
}
