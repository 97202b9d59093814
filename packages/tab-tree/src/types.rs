use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// IDS (host-assigned, stable only within the entity's lifetime)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub i64);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ContainerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// PERSISTED RECORDS
// ============================================================================

/// Persisted record for one host item with its tree overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item_id: ItemId,
    pub container_id: ContainerId,
    pub linear_index: usize,
    pub parent_id: Option<ItemId>,
    /// Sibling sort key, compared byte-wise.
    pub tree_order: String,
    pub collapsed: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub opener_id: Option<ItemId>,
}

impl Item {
    /// Root record with no metadata, mostly useful for building snapshots.
    pub fn new(
        item_id: impl Into<ItemId>,
        container_id: impl Into<ContainerId>,
        linear_index: usize,
        tree_order: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            container_id: container_id.into(),
            linear_index,
            parent_id: None,
            tree_order: tree_order.into(),
            collapsed: false,
            active: false,
            title: None,
            url: None,
            opener_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<ItemId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn collapsed(mut self) -> Self {
        self.collapsed = true;
        self
    }

    pub fn tree_fields(&self) -> TreeFields {
        TreeFields {
            parent_id: self.parent_id,
            tree_order: self.tree_order.clone(),
        }
    }

    /// Overwrite the tree overlay, returning true when anything changed.
    pub fn apply_fields(&mut self, fields: &TreeFields) -> bool {
        let changed = self.parent_id != fields.parent_id || self.tree_order != fields.tree_order;
        self.parent_id = fields.parent_id;
        self.tree_order = fields.tree_order.clone();
        changed
    }

    /// Build a fresh record from what the host reported, with the given tree fields.
    pub fn from_host(host: &HostItem, fields: TreeFields) -> Self {
        Self {
            item_id: host.item_id,
            container_id: host.container_id,
            linear_index: host.index,
            parent_id: fields.parent_id,
            tree_order: fields.tree_order,
            collapsed: false,
            active: host.active,
            title: host.title.clone(),
            url: host.url.clone(),
            opener_id: host.opener_id,
        }
    }
}

/// Persisted record for one host container (window).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub container_id: ContainerId,
    pub focused: bool,
    #[serde(default)]
    pub closing: bool,
}

impl Container {
    pub fn new(container_id: ContainerId) -> Self {
        Self {
            container_id,
            focused: false,
            closing: false,
        }
    }
}

/// The tree overlay of an item: where it sits among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeFields {
    pub parent_id: Option<ItemId>,
    pub tree_order: String,
}

impl TreeFields {
    pub fn new(parent_id: Option<ItemId>, tree_order: impl Into<String>) -> Self {
        Self {
            parent_id,
            tree_order: tree_order.into(),
        }
    }

    pub fn root(tree_order: impl Into<String>) -> Self {
        Self::new(None, tree_order)
    }
}

// ============================================================================
// LIVE HOST STATE
// ============================================================================

/// An item as the host reports it: linear position only, no tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostItem {
    pub item_id: ItemId,
    pub container_id: ContainerId,
    pub index: usize,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Item this one was opened from, when the host knows.
    #[serde(default)]
    pub opener_id: Option<ItemId>,
}

impl HostItem {
    pub fn new(item_id: impl Into<ItemId>, container_id: impl Into<ContainerId>, index: usize) -> Self {
        Self {
            item_id: item_id.into(),
            container_id: container_id.into(),
            index,
            active: false,
            title: None,
            url: None,
            opener_id: None,
        }
    }

    pub fn with_opener(mut self, opener_id: impl Into<ItemId>) -> Self {
        self.opener_id = Some(opener_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostContainer {
    pub container_id: ContainerId,
    #[serde(default)]
    pub focused: bool,
}

/// Where the host should put an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTarget {
    /// `None` keeps the item in its current container.
    pub container_id: Option<ContainerId>,
    pub index: usize,
}

impl MoveTarget {
    pub fn within(index: usize) -> Self {
        Self {
            container_id: None,
            index,
        }
    }

    pub fn into_container(container_id: ContainerId, index: usize) -> Self {
        Self {
            container_id: Some(container_id),
            index,
        }
    }
}

// ============================================================================
// UI-FACING INPUTS
// ============================================================================

/// Lifetime class of a registered move intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTtl {
    /// Synthesized by the core right after creating an item.
    Creation,
    /// Registered for an explicit user drag.
    Drag,
}

/// Where a UI drag drops an item, relative to the current tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "item_id", rename_all = "snake_case")]
pub enum DropTarget {
    /// Last child of the given item.
    ChildOf(ItemId),
    /// Sibling immediately before the given item.
    Before(ItemId),
    /// Sibling immediately after the given item (after its whole subtree).
    After(ItemId),
    /// Last root of the container.
    Root,
}

/// Which path produced the tree fields written by a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Inferred,
    Opener,
    OpenerRepositioned,
    MoveIntent,
    PendingChild,
    Managed,
    Ui,
}
