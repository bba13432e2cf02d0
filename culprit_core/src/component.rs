use std::collections::BTreeSet;
use std::fmt::Debug;
use std::hash::Hash;

/// An opaque identifier for one member of the search universe.
///
/// The ordering is only used to partition candidate pools deterministically;
/// any total order works as long as it is stable for the duration of a search.
pub trait Component: Clone + Ord + Hash + Debug + Send + Sync + 'static {}

impl<T> Component for T where T: Clone + Ord + Hash + Debug + Send + Sync + 'static {}

/// A membership-only set of components. Being ordered, two sets with the same
/// members always compare (and hash) equal regardless of insertion order.
pub type ComponentSet<C> = BTreeSet<C>;

/// Returns the members of `set` as a sorted snapshot suitable for index-range splitting.
pub fn snapshot<C: Component>(set: &ComponentSet<C>) -> Vec<C> {
    set.iter().cloned().collect()
}

/// Returns `base` extended with every element of `extra`.
pub fn union_with<C: Component>(base: &ComponentSet<C>, extra: &[C]) -> ComponentSet<C> {
    let mut combined = base.clone();
    combined.extend(extra.iter().cloned());
    combined
}
