use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, warn};

use super::snapshot::Working;
use super::{Plan, Reconciler};
use crate::commands::HostCommand;
use crate::config::OpenerPlacement;
use crate::error::{ReconcileError, Result};
use crate::inference::{infer_create, Placement};
use crate::order_key;
use crate::tree::{build_tree, flatten_tree, linear_sequence, TreeIndex};
use crate::types::{
    Container, ContainerId, DropTarget, FieldSource, IntentTtl, Item, ItemId, MoveTarget, TreeFields,
};

impl Reconciler {
    pub(super) fn set_collapsed(&mut self, work: &mut Working, item_id: ItemId, collapsed: bool) -> Result<Plan> {
        let item = work.item_mut(item_id).ok_or(ReconcileError::UnknownItem(item_id))?;
        item.collapsed = collapsed;
        debug!(item_id = %item_id, collapsed, "collapse toggled");
        Ok(Plan::from_source(FieldSource::Ui))
    }

    /// Commit a tree move chosen in the UI and bring the host's order in line.
    pub(super) async fn drag_item(&mut self, work: &mut Working, item_id: ItemId, target: DropTarget) -> Result<Plan> {
        let container_id = work
            .item(item_id)
            .map(|i| i.container_id)
            .ok_or(ReconcileError::UnknownItem(item_id))?;
        work.refresh(self.host.as_ref(), container_id).await;

        let items = work.container_items(container_id);
        let index = TreeIndex::new(&items);
        let subtree: Vec<ItemId> = std::iter::once(item_id)
            .chain(index.descendants(item_id))
            .collect();
        let fields = drop_fields(&index, item_id, &subtree, target)?;
        let current_order: Vec<ItemId> = linear_sequence(&items).iter().map(|i| i.item_id).collect();

        if let Some(item) = work.item_mut(item_id) {
            item.apply_fields(&fields);
        }

        // Where the host has to show things once the drop is applied.
        let desired = flatten_tree(&build_tree(&work.container_items(container_id)));
        let moves = plan_block_moves(&current_order, &desired, &subtree);

        let mut commands = Vec::with_capacity(moves.len());
        for (member, to) in moves {
            if let Some(member_fields) = work.item(member).map(Item::tree_fields) {
                self.intents.register_move_intent(
                    member,
                    member_fields.parent_id,
                    member_fields.tree_order,
                    IntentTtl::Drag,
                )?;
            }
            commands.push(HostCommand::MoveItem {
                item_id: member,
                target: MoveTarget::within(to),
            });
        }

        info!(
            item_id = %item_id,
            ?target,
            parent_id = ?fields.parent_id,
            moves = commands.len(),
            "drop committed"
        );
        Ok(Plan {
            commands,
            source: Some(FieldSource::Ui),
            flattened: Vec::new(),
        })
    }

    /// Move an item with its whole subtree into another container.
    pub(super) async fn relocate_subtree(
        &mut self,
        work: &mut Working,
        item_id: ItemId,
        container_id: ContainerId,
        index: Option<usize>,
    ) -> Result<Plan> {
        let source_id = work
            .item(item_id)
            .map(|i| i.container_id)
            .ok_or(ReconcileError::UnknownItem(item_id))?;
        if source_id == container_id {
            return Err(ReconcileError::InvalidDrop(format!(
                "item {item_id} is already in container {container_id}"
            )));
        }

        let live = work.refresh(self.host.as_ref(), container_id).await;
        if live.is_none() && !work.containers.contains_key(&container_id) {
            return Err(ReconcileError::UnknownContainer(container_id));
        }
        work.ensure_container(container_id);
        work.refresh(self.host.as_ref(), source_id).await;

        let source_items = work.container_items(source_id);
        let subtree: Vec<ItemId> = {
            let tree = TreeIndex::new(&source_items);
            std::iter::once(item_id).chain(tree.descendants(item_id)).collect()
        };

        let target_items = work.container_items(container_id);
        let others: Vec<&Item> = target_items.iter().collect();
        let (base, root_fields) = match index {
            Some(index) => {
                let pos = others.iter().filter(|o| o.linear_index < index).count();
                (index.min(others.len()), Placement::at(&others, pos).fields_for(None))
            }
            None => {
                let tree = TreeIndex::new(&target_items);
                let last_root = tree.roots().last().map(|r| r.tree_order.as_str());
                (
                    others.len(),
                    TreeFields::root(order_key::key_between_lenient(last_root, None)),
                )
            }
        };

        // Final records go in first; the host catches up command by command.
        let mut commands = Vec::with_capacity(subtree.len());
        for (offset, member) in subtree.iter().enumerate() {
            if let Some(item) = work.item_mut(*member) {
                item.container_id = container_id;
                item.linear_index = base + offset;
                if *member == item_id {
                    item.apply_fields(&root_fields);
                }
            }
            commands.push(HostCommand::MoveItem {
                item_id: *member,
                target: MoveTarget::into_container(container_id, base + offset),
            });
        }
        self.managed.begin(subtree.iter().copied());

        info!(
            item_id = %item_id,
            from = %source_id,
            to = %container_id,
            items = subtree.len(),
            "relocating subtree"
        );
        Ok(Plan {
            commands,
            source: Some(FieldSource::Managed),
            flattened: Vec::new(),
        })
    }

    /// Rebuild records from the host's current state.
    pub(super) async fn initial_sync(&mut self, work: &mut Working) -> Result<Plan> {
        let containers = self
            .host
            .query_containers()
            .await
            .map_err(|e| ReconcileError::HostQuery(e.to_string()))?;
        let listed: HashSet<ContainerId> = containers.iter().map(|c| c.container_id).collect();
        let mut synced = HashSet::new();
        let mut seen = HashSet::new();

        for host_container in &containers {
            let container_id = host_container.container_id;
            let mut live = match self.host.query_items(container_id).await {
                Ok(live) => live,
                Err(e) => {
                    warn!(container_id = %container_id, error = %e, "skipping container during sync");
                    continue;
                }
            };
            live.sort_by_key(|h| h.index);
            synced.insert(container_id);
            work.containers.insert(
                container_id,
                Container {
                    container_id,
                    focused: host_container.focused,
                    closing: false,
                },
            );

            let live_ids: HashSet<ItemId> = live.iter().map(|h| h.item_id).collect();
            seen.extend(live_ids.iter().copied());

            let mut placed = Vec::new();
            let mut unknown = Vec::new();
            for host_item in &live {
                match work.item_mut(host_item.item_id) {
                    Some(item) => {
                        item.container_id = container_id;
                        item.linear_index = host_item.index;
                        item.active = host_item.active;
                        item.title = host_item.title.clone();
                        item.url = host_item.url.clone();
                        item.opener_id = host_item.opener_id;
                        if item
                            .parent_id
                            .is_some_and(|p| p == item.item_id || !live_ids.contains(&p))
                        {
                            debug!(item_id = %item.item_id, "parent outside container, now a root");
                            item.parent_id = None;
                        }
                        placed.push(item.clone());
                    }
                    None => unknown.push(host_item),
                }
            }

            if placed.is_empty() {
                let keys = order_key::keys_between(None, None, unknown.len())?;
                for (host_item, key) in unknown.iter().zip(keys) {
                    let item = Item::from_host(host_item, TreeFields::root(key));
                    work.items.insert(item.item_id, item);
                }
            } else {
                for host_item in &unknown {
                    let inference = infer_create(
                        &placed,
                        host_item.index,
                        host_item.opener_id,
                        OpenerPlacement::PositionOnly,
                    );
                    let item = Item::from_host(host_item, inference.fields);
                    placed.push(item.clone());
                    work.items.insert(item.item_id, item);
                }
            }
            debug!(container_id = %container_id, items = live.len(), new = unknown.len(), "container synced");
        }

        let stale: BTreeSet<ItemId> = work
            .items
            .values()
            .filter(|i| !seen.contains(&i.item_id))
            .filter(|i| synced.contains(&i.container_id) || !listed.contains(&i.container_id))
            .map(|i| i.item_id)
            .collect();
        for id in &stale {
            work.items.remove(id);
        }
        work.containers.retain(|id, _| listed.contains(id));

        info!(
            containers = synced.len(),
            items = seen.len(),
            stale = stale.len(),
            "initial sync complete"
        );
        Ok(Plan::default())
    }
}

/// Tree fields for `item_id` dropped at `target`.
fn drop_fields(index: &TreeIndex<'_>, item_id: ItemId, subtree: &[ItemId], target: DropTarget) -> Result<TreeFields> {
    let anchor = match target {
        DropTarget::ChildOf(id) | DropTarget::Before(id) | DropTarget::After(id) => Some(id),
        DropTarget::Root => None,
    };
    if let Some(anchor) = anchor {
        if !index.contains(anchor) {
            return Err(ReconcileError::InvalidDrop(format!(
                "target {anchor} is not in the item's container"
            )));
        }
        if subtree.contains(&anchor) {
            return Err(ReconcileError::InvalidDrop(format!(
                "cannot drop {item_id} relative to its own subtree"
            )));
        }
    }

    let fields = match target {
        DropTarget::ChildOf(parent) => {
            let children = siblings_except(index, Some(parent), item_id);
            let last = children.last().map(|c| c.tree_order.as_str());
            TreeFields::new(Some(parent), order_key::key_between_lenient(last, None))
        }
        DropTarget::Root => {
            let roots = siblings_except(index, None, item_id);
            let last = roots.last().map(|r| r.tree_order.as_str());
            TreeFields::root(order_key::key_between_lenient(last, None))
        }
        DropTarget::Before(sibling) | DropTarget::After(sibling) => {
            let parent = index.parent_of(sibling);
            let siblings = siblings_except(index, parent, item_id);
            let slot = siblings.iter().position(|s| s.item_id == sibling).unwrap_or(0);
            let key_at = |i: usize| siblings.get(i).map(|s| s.tree_order.as_str());
            let (low, high) = match target {
                DropTarget::Before(_) => (slot.checked_sub(1).and_then(key_at), key_at(slot)),
                _ => (key_at(slot), key_at(slot + 1)),
            };
            TreeFields::new(parent, order_key::key_between_lenient(low, high))
        }
    };
    Ok(fields)
}

/// Siblings under `parent` in sibling order, leaving out `skip`.
fn siblings_except<'a>(index: &TreeIndex<'a>, parent: Option<ItemId>, skip: ItemId) -> Vec<&'a Item> {
    index
        .siblings_under(parent)
        .iter()
        .copied()
        .filter(|s| s.item_id != skip)
        .collect()
}

/// Host moves that turn `current` into an order where the `block` members
/// sit where `desired` puts them.
///
/// Members are placed in desired order, each right after its desired
/// predecessor, against a simulated copy of the host's list; a member that
/// already sits there costs no command. Returns `(item, final index)`.
fn plan_block_moves(current: &[ItemId], desired: &[ItemId], block: &[ItemId]) -> Vec<(ItemId, usize)> {
    let members: HashSet<ItemId> = block.iter().copied().collect();
    let mut simulated = current.to_vec();
    let mut moves = Vec::new();

    for (position, member) in desired.iter().enumerate() {
        if !members.contains(member) {
            continue;
        }
        let Some(from) = simulated.iter().position(|id| id == member) else {
            continue;
        };
        simulated.remove(from);
        let to = match position.checked_sub(1).map(|p| desired[p]) {
            Some(predecessor) => simulated
                .iter()
                .position(|id| *id == predecessor)
                .map_or(simulated.len(), |p| p + 1),
            None => 0,
        };
        simulated.insert(to, *member);
        if to != from {
            moves.push((*member, to));
        }
    }
    moves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[i64]) -> Vec<ItemId> {
        raw.iter().copied().map(ItemId).collect()
    }

    #[test]
    fn test_block_moves_skip_items_already_in_place() {
        let current = ids(&[1, 2, 3]);
        assert!(plan_block_moves(&current, &current, &ids(&[3])).is_empty());
    }

    #[test]
    fn test_block_moves_follow_predecessors() {
        // move block [3, 4] in front of 1
        let current = ids(&[1, 2, 3, 4]);
        let desired = ids(&[3, 4, 1, 2]);
        let moves = plan_block_moves(&current, &desired, &ids(&[3, 4]));
        assert_eq!(moves, vec![(ItemId(3), 0), (ItemId(4), 1)]);
    }

    #[test]
    fn test_block_moves_forward() {
        // move block [1, 2] after 4
        let current = ids(&[1, 2, 3, 4]);
        let desired = ids(&[3, 4, 1, 2]);
        let moves = plan_block_moves(&current, &desired, &ids(&[1, 2]));
        assert_eq!(moves, vec![(ItemId(1), 3), (ItemId(2), 3)]);

        // replay against a plain list to check the final order
        let mut list = current.clone();
        for (id, to) in moves {
            let from = list.iter().position(|x| *x == id).unwrap();
            list.remove(from);
            list.insert(to, id);
        }
        assert_eq!(list, desired);
    }

    #[test]
    fn test_drop_fields_before_and_after() {
        let items = vec![
            Item::new(1, 1, 0, "G"),
            Item::new(2, 1, 1, "V"),
            Item::new(3, 1, 2, "l"),
        ];
        let index = TreeIndex::new(&items);

        let before = drop_fields(&index, ItemId(3), &ids(&[3]), DropTarget::Before(ItemId(2))).unwrap();
        assert_eq!(before.parent_id, None);
        assert!("G" < before.tree_order.as_str() && before.tree_order.as_str() < "V");

        let after = drop_fields(&index, ItemId(1), &ids(&[1]), DropTarget::After(ItemId(3))).unwrap();
        assert!(after.tree_order.as_str() > "l");

        let child = drop_fields(&index, ItemId(3), &ids(&[3]), DropTarget::ChildOf(ItemId(2))).unwrap();
        assert_eq!(child, TreeFields::new(Some(ItemId(2)), "V"));
    }

    #[test]
    fn test_drop_into_own_subtree_is_rejected() {
        let items = vec![Item::new(1, 1, 0, "V"), Item::new(2, 1, 1, "V").with_parent(1)];
        let index = TreeIndex::new(&items);
        let err = drop_fields(&index, ItemId(1), &ids(&[1, 2]), DropTarget::ChildOf(ItemId(2))).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidDrop(_)));

        let err = drop_fields(&index, ItemId(1), &ids(&[1, 2]), DropTarget::After(ItemId(9))).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidDrop(_)));
    }
}
