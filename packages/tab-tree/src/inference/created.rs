use crate::config::OpenerPlacement;
use crate::inference::Placement;
use crate::order_key;
use crate::tree::{linear_sequence, TreeIndex};
use crate::types::{FieldSource, Item, ItemId, TreeFields};

/// Which rule placed a newly created item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatePath {
    /// Child of its opener, already where the tree expects it.
    Opener,
    /// Child of its opener, but the host put it elsewhere and needs a corrective move.
    OpenerRepositioned,
    /// No usable opener; placed by neighbor scan.
    Position,
}

impl From<CreatePath> for FieldSource {
    fn from(path: CreatePath) -> Self {
        match path {
            CreatePath::Opener => FieldSource::Opener,
            CreatePath::OpenerRepositioned => FieldSource::OpenerRepositioned,
            CreatePath::Position => FieldSource::Inferred,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInference {
    pub fields: TreeFields,
    /// Host index the new item should be moved to, when the host put it
    /// somewhere the tree cannot explain.
    pub reposition_to: Option<usize>,
    pub path: CreatePath,
}

/// Infer tree fields for an item the host just created at `new_index`.
///
/// `existing` holds the container's other records with live host indices
/// (the new item already occupies `new_index`, so items after it are
/// shifted by one).
pub fn infer_create(
    existing: &[Item],
    new_index: usize,
    opener: Option<ItemId>,
    placement: OpenerPlacement,
) -> CreateInference {
    let seq = linear_sequence(existing);
    let pos = seq.iter().filter(|i| i.linear_index < new_index).count();

    if let Some(inference) = opener.and_then(|o| by_opener(existing, &seq, pos, new_index, o, placement)) {
        return inference;
    }

    CreateInference {
        fields: Placement::at(&seq, pos).fields_for(None),
        reposition_to: None,
        path: CreatePath::Position,
    }
}

fn by_opener(
    existing: &[Item],
    seq: &[&Item],
    pos: usize,
    new_index: usize,
    opener: ItemId,
    placement: OpenerPlacement,
) -> Option<CreateInference> {
    let index = TreeIndex::new(existing);
    let opener_item = index.get(opener)?;
    let opener_pos = seq.iter().position(|i| i.item_id == opener)?;

    // The opener's subtree as it currently sits in host order.
    let block_end = opener_pos
        + 1
        + seq[opener_pos + 1..]
            .iter()
            .take_while(|i| index.is_descendant(i.item_id, opener))
            .count();

    let children = index.children_of(opener);
    let first_child = children.first().map(|c| c.tree_order.as_str());
    let last_child = children.last().map(|c| c.tree_order.as_str());

    if pos == opener_pos + 1 && block_end > pos {
        // Directly after the opener, ahead of its existing children.
        return Some(CreateInference {
            fields: TreeFields::new(Some(opener), order_key::key_between_lenient(None, first_child)),
            reposition_to: None,
            path: CreatePath::Opener,
        });
    }

    let fields = TreeFields::new(Some(opener), order_key::key_between_lenient(last_child, None));
    if pos == block_end {
        return Some(CreateInference {
            fields,
            reposition_to: None,
            path: CreatePath::Opener,
        });
    }

    match placement {
        OpenerPlacement::PositionOnly => None,
        OpenerPlacement::Reposition => {
            let last = seq[block_end - 1].linear_index.max(opener_item.linear_index);
            let target = if new_index < last { last } else { last + 1 };
            Some(CreateInference {
                fields,
                reposition_to: Some(target),
                path: CreatePath::OpenerRepositioned,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// a(0) with children a1(1), a2(2); b(3) at root; new item index given per test.
    fn family(shift_from: usize) -> Vec<Item> {
        let bump = |index: usize| if index >= shift_from { index + 1 } else { index };
        vec![
            Item::new(1, 1, bump(0), "G"),
            Item::new(2, 1, bump(1), "G").with_parent(1),
            Item::new(3, 1, bump(2), "V").with_parent(1),
            Item::new(4, 1, bump(3), "V"),
        ]
    }

    #[test]
    fn test_opener_child_appended_after_last_child() {
        let existing = family(3);
        let inference = infer_create(&existing, 3, Some(ItemId(1)), OpenerPlacement::Reposition);
        assert_eq!(inference.path, CreatePath::Opener);
        assert_eq!(inference.fields.parent_id, Some(ItemId(1)));
        assert!(inference.fields.tree_order.as_str() > "V");
        assert_eq!(inference.reposition_to, None);
    }

    #[test]
    fn test_opener_child_directly_after_opener_is_first_child() {
        let existing = family(1);
        let inference = infer_create(&existing, 1, Some(ItemId(1)), OpenerPlacement::Reposition);
        assert_eq!(inference.path, CreatePath::Opener);
        assert_eq!(inference.fields.parent_id, Some(ItemId(1)));
        assert!(inference.fields.tree_order.as_str() < "G");
    }

    #[test]
    fn test_opener_child_at_container_end_is_repositioned() {
        let existing = family(4);
        let inference = infer_create(&existing, 4, Some(ItemId(1)), OpenerPlacement::Reposition);
        assert_eq!(inference.path, CreatePath::OpenerRepositioned);
        assert_eq!(inference.fields.parent_id, Some(ItemId(1)));
        assert!(inference.fields.tree_order.as_str() > "V");
        // right after a2, which sits at index 2
        assert_eq!(inference.reposition_to, Some(3));
    }

    #[test]
    fn test_opener_child_before_opener_moves_forward() {
        // new item at index 0, everything else shifted
        let existing = family(0);
        let inference = infer_create(&existing, 0, Some(ItemId(1)), OpenerPlacement::Reposition);
        assert_eq!(inference.path, CreatePath::OpenerRepositioned);
        // a2 sits at 3 now; removing the new item puts it at 2, so land on 3
        assert_eq!(inference.reposition_to, Some(3));
    }

    #[test]
    fn test_position_only_falls_back_to_neighbor_scan() {
        let existing = family(4);
        let inference = infer_create(&existing, 4, Some(ItemId(1)), OpenerPlacement::PositionOnly);
        assert_eq!(inference.path, CreatePath::Position);
        assert_eq!(inference.fields.parent_id, None);
        assert!(inference.fields.tree_order.as_str() > "V");
    }

    #[test]
    fn test_unknown_opener_uses_position() {
        let existing = family(2);
        let inference = infer_create(&existing, 2, Some(ItemId(42)), OpenerPlacement::Reposition);
        assert_eq!(inference.path, CreatePath::Position);
        // between a1 and a2: sibling of a2
        assert_eq!(inference.fields.parent_id, Some(ItemId(1)));
        assert!("G" < inference.fields.tree_order.as_str());
        assert!(inference.fields.tree_order.as_str() < "V");
    }

    #[test]
    fn test_first_item_in_empty_container() {
        let inference = infer_create(&[], 0, None, OpenerPlacement::Reposition);
        assert_eq!(inference.fields, TreeFields::root("V"));
        assert_eq!(inference.path, CreatePath::Position);
    }
}
