//! Tree/flat conversion.
//!
//! The persisted records only carry `parent_id` + `tree_order`. This module
//! turns a record set into a forest, flattens it depth-first (the order the
//! host is expected to show) and answers structural questions (children,
//! descendants, ancestors) for the inference layer.
//!
//! Parent links that point outside the record set, at the item itself, or
//! into a cycle are treated as roots so every item shows up exactly once.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::types::{Item, ItemId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub item: Item,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn id(&self) -> ItemId {
        self.item.item_id
    }
}

/// Sibling order: `tree_order` byte-wise, then host position, then id.
pub fn sibling_cmp(a: &Item, b: &Item) -> Ordering {
    a.tree_order
        .as_bytes()
        .cmp(b.tree_order.as_bytes())
        .then(a.linear_index.cmp(&b.linear_index))
        .then(a.item_id.cmp(&b.item_id))
}

/// Build a forest from flat records.
pub fn build_tree(items: &[Item]) -> Vec<TreeNode> {
    let index = TreeIndex::new(items);
    let mut visited = HashSet::new();
    let mut roots: Vec<TreeNode> = index
        .roots()
        .iter()
        .copied()
        .filter_map(|item| index.build_node(item, &mut visited))
        .collect();

    // Anything still unvisited hangs off a cycle; surface it as a root.
    let mut stranded: Vec<&Item> = items
        .iter()
        .filter(|item| !visited.contains(&item.item_id))
        .collect();
    stranded.sort_by(|a, b| sibling_cmp(a, b));
    for item in stranded {
        if let Some(node) = index.build_node(item, &mut visited) {
            roots.push(node);
        }
    }
    roots
}

/// Depth-first pre-order: a parent, then its whole subtree, then its next sibling.
pub fn flatten_tree(roots: &[TreeNode]) -> Vec<ItemId> {
    fn walk(node: &TreeNode, out: &mut Vec<ItemId>) {
        out.push(node.id());
        for child in &node.children {
            walk(child, out);
        }
    }

    let mut out = Vec::new();
    for root in roots {
        walk(root, &mut out);
    }
    out
}

/// Position of every item under `flatten_tree(build_tree(items))`.
///
/// This is the order the host *should* show. It is only ever compared
/// against the host's reported positions, never written back.
pub fn expected_linear_order(items: &[Item]) -> HashMap<ItemId, usize> {
    flatten_tree(&build_tree(items))
        .into_iter()
        .enumerate()
        .map(|(position, id)| (id, position))
        .collect()
}

/// Items sorted by their current host position.
pub fn linear_sequence(items: &[Item]) -> Vec<&Item> {
    let mut seq: Vec<&Item> = items.iter().collect();
    seq.sort_by(|a, b| {
        a.linear_index
            .cmp(&b.linear_index)
            .then(a.item_id.cmp(&b.item_id))
    });
    seq
}

/// Lookup structure over a borrowed record set.
pub struct TreeIndex<'a> {
    by_id: HashMap<ItemId, &'a Item>,
    children: HashMap<ItemId, Vec<&'a Item>>,
    roots: Vec<&'a Item>,
}

impl<'a> TreeIndex<'a> {
    pub fn new(items: &'a [Item]) -> Self {
        let by_id: HashMap<ItemId, &Item> = items.iter().map(|i| (i.item_id, i)).collect();
        let mut children: HashMap<ItemId, Vec<&Item>> = HashMap::new();
        let mut roots = Vec::new();

        for item in items {
            match effective_parent(item, &by_id) {
                Some(parent) => children.entry(parent).or_default().push(item),
                None => roots.push(item),
            }
        }
        for group in children.values_mut() {
            group.sort_by(|a, b| sibling_cmp(a, b));
        }
        roots.sort_by(|a, b| sibling_cmp(a, b));

        Self {
            by_id,
            children,
            roots,
        }
    }

    pub fn get(&self, id: ItemId) -> Option<&'a Item> {
        self.by_id.get(&id).copied()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn roots(&self) -> &[&'a Item] {
        &self.roots
    }

    /// Parent as far as this record set is concerned.
    pub fn parent_of(&self, id: ItemId) -> Option<ItemId> {
        self.get(id).and_then(|item| effective_parent(item, &self.by_id))
    }

    /// Direct children in sibling order.
    pub fn children_of(&self, id: ItemId) -> &[&'a Item] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Items sharing `parent` (roots for `None`), in sibling order.
    pub fn siblings_under(&self, parent: Option<ItemId>) -> &[&'a Item] {
        match parent {
            Some(parent) => self.children_of(parent),
            None => &self.roots,
        }
    }

    /// Every descendant of `id` in depth-first pre-order, excluding `id`.
    pub fn descendants(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut stack: Vec<&Item> = self.children_of(id).iter().rev().copied().collect();
        while let Some(item) = stack.pop() {
            if !visited.insert(item.item_id) {
                continue;
            }
            out.push(item.item_id);
            stack.extend(self.children_of(item.item_id).iter().rev().copied());
        }
        out
    }

    /// Parent, grandparent, … up to the root.
    pub fn ancestors(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            out.push(parent);
            current = self.parent_of(parent);
        }
        out
    }

    pub fn depth(&self, id: ItemId) -> usize {
        self.ancestors(id).len()
    }

    pub fn is_descendant(&self, id: ItemId, of: ItemId) -> bool {
        self.ancestors(id).contains(&of)
    }

    fn build_node(&self, item: &'a Item, visited: &mut HashSet<ItemId>) -> Option<TreeNode> {
        if !visited.insert(item.item_id) {
            return None;
        }
        let children = self
            .children_of(item.item_id)
            .iter()
            .copied()
            .filter_map(|child| self.build_node(child, visited))
            .collect();
        Some(TreeNode {
            item: item.clone(),
            children,
        })
    }
}

fn effective_parent(item: &Item, by_id: &HashMap<ItemId, &Item>) -> Option<ItemId> {
    item.parent_id
        .filter(|parent| *parent != item.item_id && by_id.contains_key(parent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, index: usize, order: &str) -> Item {
        Item::new(id, 1, index, order)
    }

    #[test]
    fn test_build_tree_nests_and_sorts_siblings() {
        let items = vec![
            item(1, 0, "V"),
            item(2, 1, "l").with_parent(1),
            item(3, 2, "G").with_parent(1),
            item(4, 3, "a"),
        ];
        let roots = build_tree(&items);
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].id(), ItemId(1));
        let child_ids: Vec<_> = roots[0].children.iter().map(TreeNode::id).collect();
        assert_eq!(child_ids, vec![ItemId(3), ItemId(2)]);
    }

    #[test]
    fn test_flatten_is_depth_first_pre_order() {
        let items = vec![
            item(1, 0, "A"),
            item(2, 1, "B"),
            item(3, 2, "V").with_parent(1),
            item(4, 3, "V").with_parent(3),
        ];
        let flat = flatten_tree(&build_tree(&items));
        assert_eq!(flat, vec![ItemId(1), ItemId(3), ItemId(4), ItemId(2)]);

        let expected = expected_linear_order(&items);
        assert_eq!(expected[&ItemId(4)], 2);
        assert_eq!(expected[&ItemId(2)], 3);
    }

    #[test]
    fn test_tree_order_compares_bytes() {
        // 'Z' (0x5A) sorts before 'a' (0x61) byte-wise.
        let items = vec![item(1, 0, "a"), item(2, 1, "Z")];
        let flat = flatten_tree(&build_tree(&items));
        assert_eq!(flat, vec![ItemId(2), ItemId(1)]);
    }

    #[test]
    fn test_orphans_and_cycles_become_roots() {
        let items = vec![
            item(1, 0, "A").with_parent(99),
            item(2, 1, "B").with_parent(3),
            item(3, 2, "C").with_parent(2),
            item(4, 3, "D").with_parent(4),
        ];
        let flat = flatten_tree(&build_tree(&items));
        assert_eq!(flat.len(), 4);
        let unique: HashSet<_> = flat.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_index_descendants_and_ancestors() {
        let items = vec![
            item(1, 0, "V"),
            item(2, 1, "V").with_parent(1),
            item(3, 2, "V").with_parent(2),
            item(4, 3, "l").with_parent(1),
            item(5, 4, "l"),
        ];
        let index = TreeIndex::new(&items);
        assert_eq!(
            index.descendants(ItemId(1)),
            vec![ItemId(2), ItemId(3), ItemId(4)]
        );
        assert_eq!(index.ancestors(ItemId(3)), vec![ItemId(2), ItemId(1)]);
        assert_eq!(index.depth(ItemId(3)), 2);
        assert!(index.is_descendant(ItemId(3), ItemId(1)));
        assert!(!index.is_descendant(ItemId(5), ItemId(1)));
        assert_eq!(index.siblings_under(None).len(), 2);
    }
}
