//! Thread-local construction scopes.
//!
//! Scopes give the construction API its implicit context: nodes created
//! while a [`GroupScope`] is active land in that group, and registers pick
//! up the [`ClockScope`] clock automatically. The stacks hold plain ids;
//! guards push on construction and pop on drop, enforcing LIFO discipline.

use crate::ids::{ClockId, GroupId};
use std::cell::RefCell;

thread_local! {
    static GROUP_STACK: RefCell<Vec<GroupId>> = const { RefCell::new(Vec::new()) };
    static CLOCK_STACK: RefCell<Vec<ClockId>> = const { RefCell::new(Vec::new()) };
}

/// RAII guard making a group the default placement target for new nodes.
#[must_use = "the scope ends when the guard is dropped"]
pub struct GroupScope {
    id: GroupId,
}

impl GroupScope {
    /// Enters the scope.
    pub fn enter(id: GroupId) -> Self {
        GROUP_STACK.with(|s| s.borrow_mut().push(id));
        Self { id }
    }

    /// The innermost active group, if any.
    pub fn current() -> Option<GroupId> {
        GROUP_STACK.with(|s| s.borrow().last().copied())
    }
}

impl Drop for GroupScope {
    fn drop(&mut self) {
        GROUP_STACK.with(|s| {
            let popped = s.borrow_mut().pop();
            debug_assert_eq!(popped, Some(self.id), "group scopes must nest");
        });
    }
}

/// RAII guard making a clock the default for new registers and write ports.
#[must_use = "the scope ends when the guard is dropped"]
pub struct ClockScope {
    id: ClockId,
}

impl ClockScope {
    /// Enters the scope.
    pub fn enter(id: ClockId) -> Self {
        CLOCK_STACK.with(|s| s.borrow_mut().push(id));
        Self { id }
    }

    /// The innermost active clock, if any.
    pub fn current() -> Option<ClockId> {
        CLOCK_STACK.with(|s| s.borrow().last().copied())
    }
}

impl Drop for ClockScope {
    fn drop(&mut self) {
        CLOCK_STACK.with(|s| {
            let popped = s.borrow_mut().pop();
            debug_assert_eq!(popped, Some(self.id), "clock scopes must nest");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::EntityId;

    #[test]
    fn group_scope_nests() {
        assert_eq!(GroupScope::current(), None);
        {
            let _outer = GroupScope::enter(GroupId::from_index(1));
            assert_eq!(GroupScope::current(), Some(GroupId::from_index(1)));
            {
                let _inner = GroupScope::enter(GroupId::from_index(2));
                assert_eq!(GroupScope::current(), Some(GroupId::from_index(2)));
            }
            assert_eq!(GroupScope::current(), Some(GroupId::from_index(1)));
        }
        assert_eq!(GroupScope::current(), None);
    }

    #[test]
    fn clock_scope_releases_on_drop() {
        {
            let _scope = ClockScope::enter(ClockId::from_index(0));
            assert_eq!(ClockScope::current(), Some(ClockId::from_index(0)));
        }
        assert_eq!(ClockScope::current(), None);
    }

    #[test]
    fn scopes_are_independent() {
        let _g = GroupScope::enter(GroupId::from_index(7));
        assert_eq!(ClockScope::current(), None);
        let _c = ClockScope::enter(ClockId::from_index(3));
        assert_eq!(GroupScope::current(), Some(GroupId::from_index(7)));
    }
}
