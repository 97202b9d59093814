//! Tree-edit inference from host-reported linear changes.
//!
//! Every routine here is a pure function of an explicitly passed snapshot
//! (the container's records with host positions already applied). Nothing
//! in this module talks to the host or the store; the reconciler gathers
//! the snapshot, calls in, and writes the result.
//!
//! # Neighbor scan
//!
//! Move, create-by-position and attach share one rule for "where does an
//! item landing between `prev` and `next` belong":
//!
//! | prev | next | parent |
//! |------|------|--------|
//! | P | child of P | P (inserted as an earlier child) |
//! | any | N | N's parent (sibling of N) |
//! | P | none | P's parent (break out one level) |
//! | none | none | root |
//!
//! The order key is then generated between the nearest preceding and the
//! nearest following item that share the chosen parent.

pub mod created;
pub mod moved;
pub mod removed;

pub use created::{infer_create, CreateInference, CreatePath};
pub use moved::{infer_move, MoveInference};
pub use removed::{infer_remove, RemoveInference};

use std::collections::HashSet;

use crate::order_key;
use crate::types::{Item, ItemId, TreeFields};

/// Parent and bounding sibling keys for an item inserted into a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement<'a> {
    pub parent_id: Option<ItemId>,
    pub low: Option<&'a str>,
    pub high: Option<&'a str>,
}

impl<'a> Placement<'a> {
    /// Compute the placement of an item inserted at `pos` in `others`.
    ///
    /// `others` is the linear sequence with the subject (and anything that
    /// travels with it) removed. Parent links pointing outside `others` are
    /// read as roots.
    pub fn at(others: &[&'a Item], pos: usize) -> Self {
        let pos = pos.min(others.len());
        let present: HashSet<ItemId> = others.iter().map(|i| i.item_id).collect();
        let parent_of = |item: &Item| present_parent(item, &present);

        let prev = pos.checked_sub(1).and_then(|i| others.get(i)).copied();
        let next = others.get(pos).copied();

        let parent_id = match (prev, next) {
            (Some(prev), Some(next)) if parent_of(next) == Some(prev.item_id) => Some(prev.item_id),
            (_, Some(next)) => parent_of(next),
            (Some(prev), None) => parent_of(prev),
            (None, None) => None,
        };

        let low = others[..pos]
            .iter()
            .rev()
            .copied()
            .find(|i| present_parent(i, &present) == parent_id)
            .map(|i| i.tree_order.as_str());
        let high = others[pos..]
            .iter()
            .copied()
            .find(|i| present_parent(i, &present) == parent_id)
            .map(|i| i.tree_order.as_str());

        Self {
            parent_id,
            low,
            high,
        }
    }

    /// A fresh key inside the bounds.
    pub fn new_key(&self) -> String {
        order_key::key_between_lenient(self.low, self.high)
    }

    /// Fields for the placed item, keeping `current` when it already fits.
    pub fn fields_for(&self, current: Option<&TreeFields>) -> TreeFields {
        if let Some(current) = current {
            if current.parent_id == self.parent_id
                && order_key::is_between(&current.tree_order, self.low, self.high)
            {
                return current.clone();
            }
        }
        TreeFields::new(self.parent_id, self.new_key())
    }
}

/// Parent link, provided the parent is part of the sequence.
fn present_parent(item: &Item, present: &HashSet<ItemId>) -> Option<ItemId> {
    item.parent_id.filter(|p| present.contains(p))
}
