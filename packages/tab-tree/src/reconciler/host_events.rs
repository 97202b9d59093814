use tracing::{debug, info};

use super::snapshot::Working;
use super::{Plan, Reconciler};
use crate::commands::HostCommand;
use crate::error::{ReconcileError, Result};
use crate::events::ItemChanges;
use crate::inference::{infer_create, infer_move, infer_remove, removed, Placement, RemoveInference};
use crate::tree::{linear_sequence, TreeIndex};
use crate::types::{ContainerId, FieldSource, HostItem, IntentTtl, Item, ItemId, MoveTarget};

impl Reconciler {
    pub(super) async fn on_created(&mut self, work: &mut Working, host_item: HostItem) -> Result<Plan> {
        let item_id = host_item.item_id;
        let container_id = host_item.container_id;
        work.ensure_container(container_id);

        if work.item(item_id).is_some() {
            debug!(item_id = %item_id, "item already known, refreshing positions");
            work.refresh(self.host.as_ref(), container_id).await;
            return Ok(Plan::default());
        }

        let live = work.refresh(self.host.as_ref(), container_id).await;
        let index = live
            .as_ref()
            .and_then(|live| live.iter().find(|h| h.item_id == item_id))
            .map_or(host_item.index, |h| h.index);
        if live.is_none() {
            work.open_gap(container_id, index, item_id);
        }

        let mut commands = Vec::new();
        let (fields, source) = match self.intents.take_pending_child(container_id, index) {
            Some(fields) => (fields, FieldSource::PendingChild),
            None => {
                let existing = work.container_items(container_id);
                let opener = host_item.opener_id.filter(|o| *o != item_id);
                let inference = infer_create(&existing, index, opener, self.config.opener_placement);
                if let Some(target) = inference.reposition_to {
                    // Our own corrective move must not be re-inferred when it echoes back.
                    self.intents.register_move_intent(
                        item_id,
                        inference.fields.parent_id,
                        inference.fields.tree_order.clone(),
                        IntentTtl::Creation,
                    )?;
                    commands.push(HostCommand::MoveItem {
                        item_id,
                        target: MoveTarget::within(target),
                    });
                }
                (inference.fields, inference.path.into())
            }
        };

        info!(
            item_id = %item_id,
            container_id = %container_id,
            index,
            parent_id = ?fields.parent_id,
            ?source,
            "item created"
        );
        let mut item = Item::from_host(&host_item, fields);
        item.linear_index = index;
        work.items.insert(item_id, item);

        Ok(Plan {
            commands,
            source: Some(source),
            flattened: Vec::new(),
        })
    }

    pub(super) fn on_updated(&mut self, work: &mut Working, item_id: ItemId, changes: ItemChanges) -> Result<Plan> {
        let item = work.item_mut(item_id).ok_or(ReconcileError::UnknownItem(item_id))?;
        if let Some(title) = changes.title {
            item.title = Some(title);
        }
        if let Some(url) = changes.url {
            item.url = Some(url);
        }
        Ok(Plan::default())
    }

    pub(super) async fn on_moved(
        &mut self,
        work: &mut Working,
        item_id: ItemId,
        container_id: ContainerId,
        from_index: usize,
        to_index: usize,
    ) -> Result<Plan> {
        let item = work.item_mut(item_id).ok_or(ReconcileError::UnknownItem(item_id))?;
        item.container_id = container_id;
        work.ensure_container(container_id);

        let live = work.refresh(self.host.as_ref(), container_id).await;

        if let Some(fields) = self.intents.take_move_intent(item_id) {
            debug!(item_id = %item_id, "applying registered move intent");
            if live.is_none() {
                replay_move_positions(work, item_id, container_id, to_index);
            }
            if let Some(item) = work.item_mut(item_id) {
                item.apply_fields(&fields);
            }
            return Ok(Plan::from_source(FieldSource::MoveIntent));
        }

        let items = work.container_items(container_id);
        // With live positions the records are already in post-move order;
        // otherwise they are still in pre-move order and `to_index` applies.
        let target = match &live {
            Some(live) if live.iter().any(|h| h.item_id == item_id) => items
                .iter()
                .position(|i| i.item_id == item_id)
                .unwrap_or(to_index),
            _ => to_index,
        };
        let inference = infer_move(&items, item_id, target).ok_or(ReconcileError::UnknownItem(item_id))?;

        for (id, fields) in &inference.updates {
            if let Some(item) = work.item_mut(*id) {
                item.apply_fields(fields);
            }
        }
        if live.is_none() {
            set_positions(work, &inference.post_sequence);
        }

        info!(
            item_id = %item_id,
            from_index,
            to_index,
            updated = inference.updates.len(),
            flattened = inference.flattened.len(),
            "move reconciled"
        );
        Ok(Plan {
            commands: Vec::new(),
            source: (!inference.is_noop()).then_some(FieldSource::Inferred),
            flattened: inference.flattened,
        })
    }

    pub(super) async fn on_removed(
        &mut self,
        work: &mut Working,
        item_id: ItemId,
        container_id: ContainerId,
        is_container_closing: bool,
    ) -> Plan {
        self.intents.discard(item_id);
        self.managed.forget(item_id);
        let cascaded = self.cascading.remove(&item_id);
        let mut plan = Plan::default();

        let Some(item) = work.item(item_id).cloned() else {
            debug!(item_id = %item_id, "removed item was never recorded");
            if is_container_closing {
                work.mark_closing(container_id);
                work.drop_container_if_done(container_id);
            }
            return plan;
        };

        if is_container_closing {
            work.mark_closing(container_id);
            work.items.remove(&item_id);
            work.drop_container_if_done(container_id);
            return plan;
        }

        if !cascaded {
            let items = work.container_items(item.container_id);
            match infer_remove(&items, item_id, self.config.removal_policy) {
                RemoveInference::Promote { updates } => {
                    if !updates.is_empty() {
                        info!(item_id = %item_id, promoted = updates.len(), "children promoted");
                        plan.source = Some(FieldSource::Inferred);
                    }
                    for (id, fields) in updates {
                        if let Some(child) = work.item_mut(id) {
                            child.apply_fields(&fields);
                        }
                    }
                }
                RemoveInference::Cascade { descendants } => {
                    info!(item_id = %item_id, descendants = descendants.len(), "closing collapsed subtree");
                    self.cascading.extend(descendants.iter().copied());
                    plan.commands = descendants
                        .into_iter()
                        .map(|item_id| HostCommand::RemoveItem { item_id })
                        .collect();
                }
            }
        }

        work.items.remove(&item_id);
        work.refresh(self.host.as_ref(), item.container_id).await;
        work.drop_container_if_done(item.container_id);
        plan
    }

    pub(super) fn on_activated(&mut self, work: &mut Working, item_id: ItemId, container_id: ContainerId) -> Result<Plan> {
        if work.item(item_id).is_none() {
            return Err(ReconcileError::UnknownItem(item_id));
        }

        for item in work.items.values_mut().filter(|i| i.container_id == container_id) {
            item.active = item.item_id == item_id;
        }
        if let Some(item) = work.item_mut(item_id) {
            item.active = true;
        }

        if self.config.expand_on_activate {
            let items = work.container_items(container_id);
            let hidden_under: Vec<ItemId> = {
                let index = TreeIndex::new(&items);
                index
                    .ancestors(item_id)
                    .into_iter()
                    .filter(|id| index.get(*id).is_some_and(|a| a.collapsed))
                    .collect()
            };
            for id in &hidden_under {
                if let Some(ancestor) = work.item_mut(*id) {
                    ancestor.collapsed = false;
                }
            }
            if !hidden_under.is_empty() {
                debug!(item_id = %item_id, expanded = hidden_under.len(), "expanded ancestors of active item");
            }
        }
        Ok(Plan::default())
    }

    pub(super) async fn on_detached(
        &mut self,
        work: &mut Working,
        item_id: ItemId,
        old_container_id: ContainerId,
        old_index: usize,
    ) -> Result<Plan> {
        let item = work.item(item_id).cloned().ok_or(ReconcileError::UnknownItem(item_id))?;

        if self.managed.is_managed(item_id) {
            // The subtree leaves together; its records were written up front.
            work.refresh(self.host.as_ref(), old_container_id).await;
            return Ok(Plan::from_source(FieldSource::Managed));
        }

        let mut plan = Plan::default();
        if item.container_id == old_container_id {
            let items = work.container_items(old_container_id);
            let updates = removed::promote_children(&TreeIndex::new(&items), item_id);
            if !updates.is_empty() {
                info!(item_id = %item_id, promoted = updates.len(), "children promoted on detach");
                plan.source = Some(FieldSource::Inferred);
            }
            for (id, fields) in updates {
                if let Some(child) = work.item_mut(id) {
                    child.apply_fields(&fields);
                }
            }
        }

        let live = work.refresh(self.host.as_ref(), old_container_id).await;
        if item.container_id == old_container_id {
            if live.is_none() {
                work.close_gap(old_container_id, item.linear_index, item_id);
            }
            // Parked past the remaining items until the attach arrives.
            let remaining = work
                .items
                .values()
                .filter(|i| i.container_id == old_container_id && i.item_id != item_id)
                .count();
            if let Some(detached) = work.item_mut(item_id) {
                detached.linear_index = remaining;
            }
        }
        if let Some(detached) = work.item_mut(item_id) {
            detached.parent_id = None;
        }

        debug!(item_id = %item_id, old_container_id = %old_container_id, old_index, "item detached");
        Ok(plan)
    }

    pub(super) async fn on_attached(
        &mut self,
        work: &mut Working,
        item_id: ItemId,
        new_container_id: ContainerId,
        new_index: usize,
    ) -> Result<Plan> {
        work.ensure_container(new_container_id);
        let item = work.item_mut(item_id).ok_or(ReconcileError::UnknownItem(item_id))?;
        item.container_id = new_container_id;
        item.linear_index = new_index;

        if self.managed.complete(item_id) {
            work.refresh(self.host.as_ref(), new_container_id).await;
            debug!(item_id = %item_id, "managed item arrived");
            return Ok(Plan::from_source(FieldSource::Managed));
        }

        let live = work.refresh(self.host.as_ref(), new_container_id).await;
        if live.is_none() {
            work.open_gap(new_container_id, new_index, item_id);
        }

        if let Some(fields) = self.intents.take_move_intent(item_id) {
            if let Some(item) = work.item_mut(item_id) {
                item.apply_fields(&fields);
            }
            return Ok(Plan::from_source(FieldSource::MoveIntent));
        }

        let items = work.container_items(new_container_id);
        let seq = linear_sequence(&items);
        let pos = seq.iter().position(|i| i.item_id == item_id).unwrap_or(seq.len());
        let others: Vec<&Item> = seq.iter().copied().filter(|i| i.item_id != item_id).collect();
        let fields = Placement::at(&others, pos).fields_for(None);

        info!(
            item_id = %item_id,
            container_id = %new_container_id,
            parent_id = ?fields.parent_id,
            "attached item placed"
        );
        if let Some(item) = work.item_mut(item_id) {
            item.apply_fields(&fields);
        }
        Ok(Plan::from_source(FieldSource::Inferred))
    }
}

/// Rewrite stored positions to follow `sequence`.
fn set_positions(work: &mut Working, sequence: &[ItemId]) {
    for (position, id) in sequence.iter().enumerate() {
        if let Some(item) = work.item_mut(*id) {
            item.linear_index = position;
        }
    }
}

/// Apply a reported move to stored positions when the host cannot be queried.
fn replay_move_positions(work: &mut Working, item_id: ItemId, container_id: ContainerId, to_index: usize) {
    let items = work.container_items(container_id);
    if let Some(inference) = infer_move(&items, item_id, to_index) {
        set_positions(work, &inference.post_sequence);
    }
}
