//! Hierarchical grouping of nodes.
//!
//! Groups form a tree rooted at the circuit's root group. Entity groups
//! become VHDL entities on export; `Area` and `Procedure` groups structure
//! the design without forcing an entity boundary.

use crate::attributes::VendorAttributes;
use crate::ids::{GroupId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The role of a node group.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum GroupKind {
    /// Becomes an entity (module) in the exported design.
    Entity,
    /// A structural region inside an entity.
    Area,
    /// A helper region that may be emitted as a procedure.
    Procedure,
}

/// A group of nodes within the hierarchy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeGroup {
    /// The role of this group.
    pub kind: GroupKind,
    /// User-facing name; entity groups use it for the entity name.
    pub name: String,
    /// The parent group, `None` only for the root.
    pub parent: Option<GroupId>,
    /// Child groups in creation order.
    pub children: Vec<GroupId>,
    /// Nodes placed in this group, in placement order.
    pub nodes: Vec<NodeId>,
    /// Marks the group as a partition boundary for downstream tools.
    pub partition: bool,
    /// Free-form meta information slot.
    pub meta: Option<String>,
    /// Property tree consumed by export backends.
    pub properties: BTreeMap<String, String>,
    /// Open vendor attribute map.
    pub vendor: VendorAttributes,
}

impl NodeGroup {
    /// Creates an empty group.
    pub fn new(kind: GroupKind, name: impl Into<String>, parent: Option<GroupId>) -> Self {
        Self {
            kind,
            name: name.into(),
            parent,
            children: Vec::new(),
            nodes: Vec::new(),
            partition: false,
            meta: None,
            properties: BTreeMap::new(),
            vendor: VendorAttributes::new(),
        }
    }
}
