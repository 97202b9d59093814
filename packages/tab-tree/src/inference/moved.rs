use std::collections::{BTreeMap, HashSet};

use crate::inference::Placement;
use crate::order_key;
use crate::tree::{linear_sequence, TreeIndex};
use crate::types::{Item, ItemId, TreeFields};

/// Tree edits implied by a single host-reported move.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveInference {
    /// New tree fields, only for items whose fields actually change.
    pub updates: BTreeMap<ItemId, TreeFields>,
    /// Descendants that ended up before the moved item, in host order. They
    /// become siblings immediately preceding it.
    pub flattened: Vec<ItemId>,
    /// The container's linear order after the move.
    pub post_sequence: Vec<ItemId>,
}

impl MoveInference {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Infer tree edits for `moved` landing at `to_index`.
///
/// `items` is the container's pre-move snapshot; `linear_index` gives the
/// pre-move order. Returns `None` when `moved` is not part of the snapshot.
pub fn infer_move(items: &[Item], moved: ItemId, to_index: usize) -> Option<MoveInference> {
    let seq = linear_sequence(items);
    let moved_item = seq.iter().copied().find(|i| i.item_id == moved)?;

    let mut post: Vec<&Item> = seq.into_iter().filter(|i| i.item_id != moved).collect();
    let target = to_index.min(post.len());
    post.insert(target, moved_item);

    let index = TreeIndex::new(items);
    let subtree: HashSet<ItemId> = index.descendants(moved).into_iter().collect();

    // A parent must precede its whole subtree.
    let flattened: Vec<ItemId> = post[..target]
        .iter()
        .filter(|i| subtree.contains(&i.item_id))
        .map(|i| i.item_id)
        .collect();

    // Neighbors are read with the moved subtree lifted out: descendants that
    // stay behind the item travel with it, flattened ones are re-placed.
    let others: Vec<&Item> = post
        .iter()
        .copied()
        .filter(|i| i.item_id != moved && !subtree.contains(&i.item_id))
        .collect();
    let pos = post[..target]
        .iter()
        .filter(|i| !subtree.contains(&i.item_id))
        .count();
    let placement = Placement::at(&others, pos);

    let current = moved_item.tree_fields();
    let fields = placement.fields_for(Some(&current));

    let mut updates = BTreeMap::new();
    if !flattened.is_empty() {
        let keys = order_key::keys_between_lenient(
            placement.low,
            Some(&fields.tree_order),
            flattened.len(),
        );
        for (id, key) in flattened.iter().zip(keys) {
            updates.insert(*id, TreeFields::new(placement.parent_id, key));
        }
    }
    if fields != current {
        updates.insert(moved, fields);
    }

    Some(MoveInference {
        updates,
        flattened,
        post_sequence: post.iter().map(|i| i.item_id).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(items: &[Item], inference: &MoveInference) -> Vec<Item> {
        let positions: std::collections::HashMap<ItemId, usize> = inference
            .post_sequence
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();
        items
            .iter()
            .cloned()
            .map(|mut item| {
                if let Some(fields) = inference.updates.get(&item.item_id) {
                    item.apply_fields(fields);
                }
                item.linear_index = positions[&item.item_id];
                item
            })
            .collect()
    }

    fn get(items: &[Item], id: i64) -> &Item {
        items.iter().find(|i| i.item_id == ItemId(id)).unwrap()
    }

    #[test]
    fn test_move_between_parent_and_child_becomes_first_child() {
        // a, b, b1, c  -> move c to index 2 (between b and b1)
        let items = vec![
            Item::new(1, 1, 0, "G"),
            Item::new(2, 1, 1, "V"),
            Item::new(3, 1, 2, "V").with_parent(2),
            Item::new(4, 1, 3, "l"),
        ];
        let inference = infer_move(&items, ItemId(4), 2).unwrap();
        let fields = &inference.updates[&ItemId(4)];
        assert_eq!(fields.parent_id, Some(ItemId(2)));
        assert!(fields.tree_order.as_str() < "V");
        assert!(inference.flattened.is_empty());
    }

    #[test]
    fn test_move_to_end_breaks_out_to_previous_parent() {
        // a, a1, b -> move b to the end is a no-op; move a1 to the end
        let items = vec![
            Item::new(1, 1, 0, "G"),
            Item::new(2, 1, 1, "V").with_parent(1),
            Item::new(3, 1, 2, "V"),
        ];
        let inference = infer_move(&items, ItemId(2), 2).unwrap();
        let fields = &inference.updates[&ItemId(2)];
        // prev is b (a root), so a1 becomes a root after b
        assert_eq!(fields.parent_id, None);
        assert!(fields.tree_order.as_str() > "V");
    }

    #[test]
    fn test_parent_moved_past_child_flattens_child() {
        // a, b, c flat; c is a child of b; move b after c
        let items = vec![
            Item::new(1, 1, 0, "G"),
            Item::new(2, 1, 1, "V"),
            Item::new(3, 1, 2, "V").with_parent(2),
        ];
        let inference = infer_move(&items, ItemId(2), 2).unwrap();
        assert_eq!(inference.flattened, vec![ItemId(3)]);
        assert_eq!(
            inference.post_sequence,
            vec![ItemId(1), ItemId(3), ItemId(2)]
        );

        let after = apply(&items, &inference);
        let b = get(&after, 2);
        let c = get(&after, 3);
        assert_eq!(c.parent_id, None);
        assert_eq!(b.parent_id, None);
        assert!(c.tree_order < b.tree_order);
        assert!(c.tree_order.as_str() > "G");
        // b kept its key: it still sorts after a
        assert!(!inference.updates.contains_key(&ItemId(2)));
    }

    #[test]
    fn test_flattened_descendants_keep_relative_order() {
        // p, x, y (children of p), z; move p to the end
        let items = vec![
            Item::new(1, 1, 0, "V"),
            Item::new(2, 1, 1, "G").with_parent(1),
            Item::new(3, 1, 2, "V").with_parent(1),
            Item::new(4, 1, 3, "l"),
        ];
        let inference = infer_move(&items, ItemId(1), 3).unwrap();
        assert_eq!(inference.flattened, vec![ItemId(2), ItemId(3)]);
        let x = &inference.updates[&ItemId(2)];
        let y = &inference.updates[&ItemId(3)];
        let p = &inference.updates[&ItemId(1)];
        assert_eq!(x.parent_id, None);
        assert_eq!(y.parent_id, None);
        assert!("l" < x.tree_order.as_str());
        assert!(x.tree_order < y.tree_order);
        assert!(y.tree_order < p.tree_order);
    }

    #[test]
    fn test_descendants_after_target_travel_with_item() {
        // a, p, p1, b; move p (with p1) to index 0
        let items = vec![
            Item::new(1, 1, 0, "G"),
            Item::new(2, 1, 1, "V"),
            Item::new(3, 1, 2, "V").with_parent(2),
            Item::new(4, 1, 3, "l"),
        ];
        let inference = infer_move(&items, ItemId(2), 0).unwrap();
        assert!(inference.flattened.is_empty());
        assert!(!inference.updates.contains_key(&ItemId(3)));
        let p = &inference.updates[&ItemId(2)];
        assert_eq!(p.parent_id, None);
        assert!(p.tree_order.as_str() < "G");
    }

    #[test]
    fn test_reapplying_same_move_is_idempotent() {
        let items = vec![
            Item::new(1, 1, 0, "G"),
            Item::new(2, 1, 1, "V"),
            Item::new(3, 1, 2, "V").with_parent(2),
            Item::new(4, 1, 3, "l"),
        ];
        let first = infer_move(&items, ItemId(4), 2).unwrap();
        let after = apply(&items, &first);
        let second = infer_move(&after, ItemId(4), 2).unwrap();
        assert!(second.is_noop(), "{:?}", second.updates);
    }

    #[test]
    fn test_target_index_is_clamped() {
        let items = vec![Item::new(1, 1, 0, "G"), Item::new(2, 1, 1, "V")];
        let inference = infer_move(&items, ItemId(1), 99).unwrap();
        assert_eq!(inference.post_sequence, vec![ItemId(2), ItemId(1)]);
    }

    #[test]
    fn test_unknown_item_yields_none() {
        let items = vec![Item::new(1, 1, 0, "G")];
        assert!(infer_move(&items, ItemId(9), 0).is_none());
    }

    /// Random forest whose host order already matches its flattening.
    fn random_forest(rng: &mut fastrand::Rng, n: usize) -> Vec<Item> {
        let mut last_key: std::collections::HashMap<Option<ItemId>, String> = Default::default();
        let mut items: Vec<Item> = Vec::with_capacity(n);
        for id in 1..=n as i64 {
            let parent = (!items.is_empty() && rng.bool())
                .then(|| items[rng.usize(..items.len())].item_id);
            let key = order_key::key_between_lenient(last_key.get(&parent).map(String::as_str), None);
            last_key.insert(parent, key.clone());
            let mut item = Item::new(id, 1, 0, key);
            item.parent_id = parent;
            items.push(item);
        }
        let order = crate::tree::expected_linear_order(&items);
        for item in &mut items {
            item.linear_index = order[&item.item_id];
        }
        items
    }

    #[test]
    fn test_no_parent_follows_its_unflattened_descendants() {
        let mut rng = fastrand::Rng::with_seed(0x7ab7);
        for _ in 0..500 {
            let n = rng.usize(1..9);
            let items = random_forest(&mut rng, n);
            let moved = ItemId(rng.i64(1..=n as i64));
            let to_index = rng.usize(..n);

            let inference = infer_move(&items, moved, to_index).unwrap();
            let after = apply(&items, &inference);
            let index = TreeIndex::new(&after);

            for item in &after {
                if inference.flattened.contains(&item.item_id) {
                    continue;
                }
                if let Some(parent) = index.parent_of(item.item_id) {
                    assert!(
                        get(&after, parent.0).linear_index < item.linear_index,
                        "{parent} after its child {} moving {moved} to {to_index}: {items:?}",
                        item.item_id
                    );
                }
            }
            let position = get(&after, moved.0).linear_index;
            for descendant in index.descendants(moved) {
                assert!(get(&after, descendant.0).linear_index > position);
            }
        }
    }
}
