//! Identity types shared across the runtime: actor handles and event groups.
//!
//! Neither type carries behavior of its own; both exist purely so the rest of
//! the crate has a stable, cheaply-cloneable handle to pass around instead of
//! threading raw indices through every API.

use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counter backing [`ActorId`] and [`EventGroup`] allocation.
///
/// A single counter is shared by both so that trace output never has to
/// disambiguate "id 3" from "group 3" — ids and groups are drawn from the
/// same namespace.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_index() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
struct ActorIdInner {
    name: String,
    index: u64,
}

/// A stable handle uniquely identifying one actor for its lifetime.
///
/// Equality is by identity (the underlying allocation), not by name or index
/// alone — two actors with the same declared name are distinct ids. An
/// `ActorId` is never reused after the actor it names has halted.
#[derive(Clone)]
pub struct ActorId(Arc<ActorIdInner>);

impl ActorId {
    /// Allocates a fresh id for an actor of the given declared name.
    pub fn new(name: impl Into<String>) -> Self {
        ActorId(Arc::new(ActorIdInner {
            name: name.into(),
            index: next_index(),
        }))
    }

    /// The declared name of the actor type/instance, as given at creation.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The numeric index distinguishing this instance from others of the
    /// same name.
    pub fn index(&self) -> u64 {
        self.0.index
    }
}

impl PartialEq for ActorId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ActorId {}

impl std::hash::Hash for ActorId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({}({}))", self.0.name, self.0.index)
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.0.name, self.0.index)
    }
}

/// An opaque causal tag propagated across sends for correlating a sequence
/// of operations — "the current operation" of a handler.
///
/// A fresh group is created with [`EventGroup::new`] or inherited from the
/// sender's current group (the default when a send doesn't override it).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EventGroup(u64);

impl EventGroup {
    /// Allocates a brand new, unrelated event group.
    pub fn new() -> Self {
        EventGroup(next_index())
    }

    /// The group used by operations that have no causal parent yet (e.g. the
    /// very first send in a test iteration).
    pub fn root() -> Self {
        EventGroup(0)
    }
}

impl Default for EventGroup {
    fn default() -> Self {
        EventGroup::root()
    }
}

impl Debug for EventGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventGroup({})", self.0)
    }
}

impl Display for EventGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_id_equality_is_by_identity_not_name() {
        let a = ActorId::new("Server");
        let b = ActorId::new("Server");
        assert_ne!(a, b);
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn actor_id_clone_is_same_identity() {
        let a = ActorId::new("Client");
        let cloned = a.clone();
        assert_eq!(a, cloned);
    }

    #[test]
    fn event_group_root_is_default() {
        assert_eq!(EventGroup::default(), EventGroup::root());
    }

    #[test]
    fn event_group_new_is_distinct_from_root() {
        assert_ne!(EventGroup::new(), EventGroup::root());
    }
}
