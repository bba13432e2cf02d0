use crate::cache::KnowledgeBase;
use crate::component::{Component, ComponentSet};
use crate::oracle::{CountingOracle, Oracle};
use crate::search::{ConflictSearch, SearchError};
use tracing::info;

/// What one single-conflict investigation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome<C: Component> {
    pub conflict_set: ComponentSet<C>,
    /// Evaluations that reached the real oracle.
    pub invocations: u64,
    /// Distinct subsets remembered by the knowledge base, zero without a cache.
    pub cache_entries: usize,
}

/// One investigation: a counter and an optional knowledge base around a borrowed
/// oracle, both dropped when the run returns.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    use_cache: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

impl Session {
    pub fn new(use_cache: bool) -> Self {
        Self { use_cache }
    }

    pub fn run<C: Component, O: Oracle<C> + ?Sized>(
        &self,
        search: &dyn ConflictSearch<C>,
        oracle: &mut O,
        universe: &ComponentSet<C>,
    ) -> Result<SearchOutcome<C>, SearchError> {
        info!(
            algorithm = search.name(),
            oracle = oracle.name(),
            universe = universe.len(),
            cache = self.use_cache,
            "starting search"
        );

        let mut counting = CountingOracle::new(oracle);
        let (conflict_set, cache_entries) = if self.use_cache {
            let mut knowledge = KnowledgeBase::new(&mut counting);
            let found = search.find_conflict_set(&mut knowledge, universe)?;
            (found, knowledge.len())
        } else {
            (search.find_conflict_set(&mut counting, universe)?, 0)
        };

        let invocations = counting.invocations();
        info!(
            size = conflict_set.len(),
            invocations, cache_entries, "search finished"
        );
        Ok(SearchOutcome {
            conflict_set,
            invocations,
            cache_entries,
        })
    }
}
