use crate::config::RemovalPolicy;
use crate::order_key;
use crate::tree::TreeIndex;
use crate::types::{Item, ItemId, TreeFields};

/// What happens to the subtree of a removed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveInference {
    /// Direct children move up into the removed item's slot.
    Promote { updates: Vec<(ItemId, TreeFields)> },
    /// Every descendant (depth-first) has to be removed from the host too.
    Cascade { descendants: Vec<ItemId> },
}

impl RemoveInference {
    pub fn is_noop(&self) -> bool {
        match self {
            Self::Promote { updates } => updates.is_empty(),
            Self::Cascade { descendants } => descendants.is_empty(),
        }
    }
}

/// Infer the fallout of removing `removed` from `items` (the container
/// snapshot, still holding the removed record).
pub fn infer_remove(items: &[Item], removed: ItemId, policy: RemovalPolicy) -> RemoveInference {
    let index = TreeIndex::new(items);
    let Some(item) = index.get(removed) else {
        return RemoveInference::Promote { updates: Vec::new() };
    };

    if item.collapsed && policy == RemovalPolicy::CascadeCollapsed {
        let descendants = index.descendants(removed);
        if !descendants.is_empty() {
            return RemoveInference::Cascade { descendants };
        }
    }

    RemoveInference::Promote {
        updates: promote_children(&index, removed),
    }
}

/// New fields for the direct children of `parent`, taking its sibling slot.
pub fn promote_children(index: &TreeIndex<'_>, parent: ItemId) -> Vec<(ItemId, TreeFields)> {
    let children = index.children_of(parent);
    if children.is_empty() {
        return Vec::new();
    }

    let grandparent = index.parent_of(parent);
    let siblings = index.siblings_under(grandparent);
    let slot = siblings.iter().position(|s| s.item_id == parent);
    let (low, high) = match slot {
        Some(slot) => (
            slot.checked_sub(1)
                .and_then(|i| siblings.get(i))
                .map(|s| s.tree_order.as_str()),
            siblings.get(slot + 1).map(|s| s.tree_order.as_str()),
        ),
        None => (None, None),
    };

    let keys = order_key::keys_between_lenient(low, high, children.len());
    children
        .iter()
        .zip(keys)
        .map(|(child, key)| (child.item_id, TreeFields::new(grandparent, key)))
        .collect()
}
