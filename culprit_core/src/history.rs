use crate::component::Component;
use crate::engine::{SearchState, TestPlan};
use crate::oracle::Verdict;

/// A record of a test that was planned, carried out and answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTest<C: Component> {
    pub plan: TestPlan<C>,
    pub verdict: Verdict,
    /// The engine state the plan was derived from.
    pub state_before: SearchState<C>,
}

/// Linear history of every answered test, in submission order.
///
/// Undoing a step does not remove its entry: the log records what was actually
/// run, which is what a user reviewing a session wants to see.
#[derive(Debug, Clone)]
pub struct ExecutionLog<C: Component> {
    entries: Vec<CompletedTest<C>>,
}

impl<C: Component> Default for ExecutionLog<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Component> ExecutionLog<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn log(&mut self, test: CompletedTest<C>) {
        self.entries.push(test);
    }

    /// Appends every entry of `other`, e.g. a finished round being archived.
    pub fn append(&mut self, other: &ExecutionLog<C>) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn entries(&self) -> &[CompletedTest<C>] {
        &self.entries
    }

    pub fn last(&self) -> Option<&CompletedTest<C>> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Engine states saved before each applied result, most recent last.
#[derive(Debug, Clone)]
pub struct UndoStack<C: Component> {
    states: Vec<SearchState<C>>,
}

impl<C: Component> Default for UndoStack<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Component> UndoStack<C> {
    pub fn new() -> Self {
        Self { states: Vec::new() }
    }

    pub fn push(&mut self, state: SearchState<C>) {
        self.states.push(state);
    }

    /// Removes and returns the most recently saved state, `None` if nothing is left to undo.
    pub fn pop(&mut self) -> Option<SearchState<C>> {
        self.states.pop()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentSet;

    fn state(universe: &[u32]) -> SearchState<u32> {
        SearchState::initial(&universe.iter().copied().collect())
    }

    #[test]
    fn undo_stack_is_last_in_first_out() {
        let mut stack = UndoStack::new();
        stack.push(state(&[1]));
        stack.push(state(&[1, 2]));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), Some(state(&[1, 2])));
        assert_eq!(stack.pop(), Some(state(&[1])));
        assert_eq!(stack.pop(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn execution_log_keeps_submission_order() {
        let mut log = ExecutionLog::new();
        assert!(log.last().is_none());
        for verdict in [Verdict::Good, Verdict::Fail] {
            log.log(CompletedTest {
                plan: TestPlan::verification(ComponentSet::from([1u32])),
                verdict,
                state_before: state(&[1]),
            });
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].verdict, Verdict::Good);
        assert_eq!(log.last().map(|t| t.verdict), Some(Verdict::Fail));

        let mut archive = ExecutionLog::new();
        archive.append(&log);
        archive.append(&log);
        assert_eq!(archive.len(), 4);
        assert_eq!(archive.entries()[2], log.entries()[0]);

        log.clear();
        assert!(log.is_empty());
        assert_eq!(archive.len(), 4);
    }
}
