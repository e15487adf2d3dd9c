//! Typed indices into the circuit and the stores behind them.
//!
//! Nodes, clocks, and groups live in dense per-kind [`Registry`] stores
//! owned by the [`Circuit`](crate::circuit::Circuit). Entries are only ever
//! appended, so an id stays valid for as long as the circuit exists and the
//! numeric order of ids is exactly creation order — the program builder
//! relies on that for deterministic scheduling tie-breaks, and group/clock
//! references never dangle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed index into one of the circuit's stores.
///
/// Implementations are thin `u32` wrappers; `index` and `from_index` convert
/// to and from the slot number.
pub trait EntityId: Copy + fmt::Display {
    /// Builds the id addressing slot `index`.
    fn from_index(index: usize) -> Self;

    /// The slot this id addresses.
    fn index(self) -> usize;
}

/// Identifies a node. Numeric order is node creation order, which is also
/// the tie-break order of the simulator's topological schedule.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NodeId(u32);

/// Identifies a clock. Clocks are registered once and keep stable identity;
/// derived clocks refer to their parent through this id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ClockId(u32);

/// Identifies a node group in the hierarchy tree.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct GroupId(u32);

impl EntityId for NodeId {
    fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl EntityId for ClockId {
    fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl EntityId for GroupId {
    fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for ClockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clock#{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// Append-only storage addressed by one id kind.
///
/// The circuit graph is arbitrarily cyclic; keeping every entity in a flat
/// store and wiring the graph with ids sidesteps ownership cycles, and the
/// dense layout makes whole-circuit sweeps (allocation, scheduling,
/// verification) simple forward scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry<I, T> {
    entries: Vec<T>,
    #[serde(skip)]
    _id: PhantomData<fn() -> I>,
}

impl<I: EntityId, T> Registry<I, T> {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            _id: PhantomData,
        }
    }

    /// Appends an entry and returns its id. Slots are never reused.
    pub fn insert(&mut self, entry: T) -> I {
        self.entries.push(entry);
        I::from_index(self.entries.len() - 1)
    }

    /// Looks an entry up, or `None` for an id from another circuit.
    pub fn get(&self, id: I) -> Option<&T> {
        self.entries.get(id.index())
    }

    /// Mutable lookup, or `None` for an id from another circuit.
    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.entries.get_mut(id.index())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All ids, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = I> {
        (0..self.entries.len()).map(I::from_index)
    }

    /// `(id, entry)` pairs in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (I::from_index(index), entry))
    }
}

impl<I: EntityId, T> Default for Registry<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: EntityId, T> Index<I> for Registry<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        match self.entries.get(id.index()) {
            Some(entry) => entry,
            None => panic!("{id} does not belong to this circuit"),
        }
    }
}

impl<I: EntityId, T> IndexMut<I> for Registry<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        match self.entries.get_mut(id.index()) {
            Some(entry) => entry,
            None => panic!("{id} does not belong to this circuit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn insertion_order_is_id_order() {
        let mut names: Registry<NodeId, &str> = Registry::new();
        let a = names.insert("adder");
        let b = names.insert("register");
        assert!(a < b);
        let collected: Vec<(NodeId, &str)> =
            names.iter().map(|(id, &name)| (id, name)).collect();
        assert_eq!(collected, vec![(a, "adder"), (b, "register")]);
        assert_eq!(names.ids().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn lookup_and_update() {
        let mut widths: Registry<ClockId, u32> = Registry::new();
        let clk = widths.insert(100);
        assert_eq!(widths[clk], 100);
        *widths.get_mut(clk).unwrap() = 50;
        assert_eq!(widths.get(clk), Some(&50));
        assert_eq!(widths.len(), 1);
        assert!(!widths.is_empty());
    }

    #[test]
    fn foreign_id_lookup_is_none() {
        let groups: Registry<GroupId, &str> = Registry::new();
        assert_eq!(groups.get(GroupId::from_index(3)), None);
    }

    #[test]
    #[should_panic(expected = "node#7 does not belong to this circuit")]
    fn foreign_id_index_panics_with_id() {
        let nodes: Registry<NodeId, u8> = Registry::new();
        let _ = nodes[NodeId::from_index(7)];
    }

    #[test]
    fn display_forms() {
        assert_eq!(NodeId::from_index(12).to_string(), "node#12");
        assert_eq!(ClockId::from_index(0).to_string(), "clock#0");
        assert_eq!(GroupId::from_index(4).to_string(), "group#4");
    }

    #[test]
    fn ids_work_as_map_keys() {
        let mut fanout: HashMap<NodeId, usize> = HashMap::new();
        fanout.insert(NodeId::from_index(1), 3);
        fanout.insert(NodeId::from_index(2), 1);
        *fanout.entry(NodeId::from_index(1)).or_default() += 1;
        assert_eq!(fanout[&NodeId::from_index(1)], 4);
        assert_eq!(fanout.len(), 2);
    }

    #[test]
    fn registry_serde_keeps_order() {
        let mut names: Registry<GroupId, String> = Registry::new();
        names.insert("top".to_string());
        names.insert("datapath".to_string());
        let json = serde_json::to_string(&names).unwrap();
        let back: Registry<GroupId, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[GroupId::from_index(1)], "datapath");
    }

    #[test]
    fn id_serde_is_transparent_enough() {
        let id = NodeId::from_index(99);
        let json = serde_json::to_string(&id).unwrap();
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
        assert_eq!(back.index(), 99);
    }
}
