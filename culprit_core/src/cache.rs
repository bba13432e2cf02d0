use crate::component::{Component, ComponentSet};
use crate::oracle::{Oracle, OracleError, Verdict};
use std::collections::HashMap;
use tracing::trace;

/// A memoizing decorator that remembers every verdict it has observed.
///
/// Keys are normalized subsets, so the same membership asked twice reaches the
/// wrapped oracle once. Entries are never invalidated, which is only sound while
/// the wrapped oracle's answer depends on membership alone.
///
/// The knowledge base keeps no invocation counter; wrap the real oracle in a
/// [`CountingOracle`](crate::oracle::CountingOracle) to measure real calls.
#[derive(Debug)]
pub struct KnowledgeBase<C: Component, O> {
    inner: O,
    known: HashMap<ComponentSet<C>, Verdict>,
}

impl<C: Component, O: Oracle<C>> KnowledgeBase<C, O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            known: HashMap::new(),
        }
    }

    /// Returns the stored verdict for `subset` without consulting the oracle.
    pub fn lookup(&self, subset: &ComponentSet<C>) -> Option<Verdict> {
        self.known.get(subset).copied()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<C: Component, O: Oracle<C>> Oracle<C> for KnowledgeBase<C, O> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn evaluate(&mut self, subset: &ComponentSet<C>) -> Result<Verdict, OracleError> {
        if let Some(verdict) = self.known.get(subset) {
            trace!(size = subset.len(), %verdict, "knowledge base hit");
            return Ok(*verdict);
        }
        let verdict = self.inner.evaluate(subset)?;
        self.known.insert(subset.clone(), verdict);
        Ok(verdict)
    }
}
