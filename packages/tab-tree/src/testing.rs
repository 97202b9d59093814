//! Test doubles: a simulated host and a hand-driven clock.
//!
//! Only available with the `testing` feature (and in this crate's own tests):
//!
//! ```toml
//! [dev-dependencies]
//! tab-tree = { path = "../tab-tree", features = ["testing"] }
//! ```
//!
//! [`SimHost`] keeps a flat item list per container, the way a real host
//! does. User-side actions (`open`, `native_move`, `close`, ...) mutate it and
//! return the notification the host would deliver. Commands issued by the
//! reconciler are recorded and their echoes are queued; tests drain them
//! with [`SimHost::take_echoes`] and feed them back in.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::commands::HostCommand;
use crate::events::HostEvent;
use crate::traits::HostPort;
use crate::types::{ContainerId, HostContainer, HostItem, ItemId, MoveTarget};

// =============================================================================
// Manual clock
// =============================================================================

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// =============================================================================
// Simulated host
// =============================================================================

#[derive(Default)]
struct HostState {
    containers: Vec<(ContainerId, Vec<HostItem>)>,
    focused: Option<ContainerId>,
    next_id: i64,
}

impl HostState {
    fn list(&self, container_id: ContainerId) -> Option<&Vec<HostItem>> {
        self.containers
            .iter()
            .find(|(id, _)| *id == container_id)
            .map(|(_, items)| items)
    }

    fn list_mut(&mut self, container_id: ContainerId) -> Option<&mut Vec<HostItem>> {
        self.containers
            .iter_mut()
            .find(|(id, _)| *id == container_id)
            .map(|(_, items)| items)
    }

    /// (container, position) of an item.
    fn locate(&self, item_id: ItemId) -> Option<(ContainerId, usize)> {
        self.containers.iter().find_map(|(cid, items)| {
            items
                .iter()
                .position(|i| i.item_id == item_id)
                .map(|pos| (*cid, pos))
        })
    }

    fn take(&mut self, item_id: ItemId) -> Option<(ContainerId, usize, HostItem)> {
        let (cid, pos) = self.locate(item_id)?;
        let list = self.list_mut(cid)?;
        let item = list.remove(pos);
        reindex(list);
        Some((cid, pos, item))
    }

    fn put(&mut self, container_id: ContainerId, index: usize, mut item: HostItem) -> usize {
        if self.list(container_id).is_none() {
            self.containers.push((container_id, Vec::new()));
        }
        item.container_id = container_id;
        let Some(list) = self.list_mut(container_id) else {
            return 0;
        };
        let index = index.min(list.len());
        list.insert(index, item);
        reindex(list);
        index
    }
}

fn reindex(items: &mut [HostItem]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.index = index;
    }
}

/// In-memory host with flat per-container order.
pub struct SimHost {
    state: Mutex<HostState>,
    commands: Mutex<Vec<HostCommand>>,
    echoes: Mutex<VecDeque<HostEvent>>,
    fail_commands: AtomicBool,
    fail_queries: AtomicBool,
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                next_id: 1,
                ..Default::default()
            }),
            commands: Mutex::new(Vec::new()),
            echoes: Mutex::new(VecDeque::new()),
            fail_commands: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
        }
    }

    pub fn add_container(&self, container_id: ContainerId) {
        let mut state = self.state.lock().unwrap();
        if state.list(container_id).is_none() {
            state.containers.push((container_id, Vec::new()));
        }
        state.focused.get_or_insert(container_id);
    }

    /// Create an item; `index: None` appends. Returns the `Created` notification.
    pub fn open(&self, container_id: ContainerId, index: Option<usize>, opener: Option<ItemId>) -> HostEvent {
        let mut state = self.state.lock().unwrap();
        let item_id = ItemId(state.next_id);
        state.next_id += 1;
        let mut item = HostItem::new(item_id, container_id, 0);
        item.opener_id = opener;
        item.index = state.put(container_id, index.unwrap_or(usize::MAX), item.clone());
        HostEvent::Created { item }
    }

    /// Add items without notifications, as if they existed before startup.
    pub fn preload(&self, container_id: ContainerId, count: usize) -> Vec<ItemId> {
        (0..count)
            .map(|_| match self.open(container_id, None, None) {
                HostEvent::Created { item } => item.item_id,
                other => other.item_id(),
            })
            .collect()
    }

    /// User drags an item within its container.
    pub fn native_move(&self, item_id: ItemId, to_index: usize) -> Option<HostEvent> {
        let mut state = self.state.lock().unwrap();
        let (container_id, from_index, item) = state.take(item_id)?;
        let to_index = state.put(container_id, to_index, item);
        Some(HostEvent::Moved {
            item_id,
            container_id,
            from_index,
            to_index,
        })
    }

    /// User drags an item into another container.
    pub fn native_transfer(&self, item_id: ItemId, container_id: ContainerId, index: usize) -> Vec<HostEvent> {
        let mut state = self.state.lock().unwrap();
        let Some((old_container_id, old_index, item)) = state.take(item_id) else {
            return Vec::new();
        };
        let new_index = state.put(container_id, index, item);
        vec![
            HostEvent::Detached {
                item_id,
                old_container_id,
                old_index,
            },
            HostEvent::Attached {
                item_id,
                new_container_id: container_id,
                new_index,
            },
        ]
    }

    pub fn close(&self, item_id: ItemId) -> Option<HostEvent> {
        let mut state = self.state.lock().unwrap();
        let (container_id, _, _) = state.take(item_id)?;
        Some(HostEvent::Removed {
            item_id,
            container_id,
            is_container_closing: false,
        })
    }

    /// Close a whole container, one `Removed` per item.
    pub fn close_container(&self, container_id: ContainerId) -> Vec<HostEvent> {
        let mut state = self.state.lock().unwrap();
        let Some(pos) = state.containers.iter().position(|(id, _)| *id == container_id) else {
            return Vec::new();
        };
        let (_, items) = state.containers.remove(pos);
        items
            .into_iter()
            .map(|item| HostEvent::Removed {
                item_id: item.item_id,
                container_id,
                is_container_closing: true,
            })
            .collect()
    }

    pub fn activate(&self, item_id: ItemId) -> Option<HostEvent> {
        let mut state = self.state.lock().unwrap();
        let (container_id, _) = state.locate(item_id)?;
        let list = state.list_mut(container_id)?;
        for item in list.iter_mut() {
            item.active = item.item_id == item_id;
        }
        Some(HostEvent::Activated {
            item_id,
            container_id,
        })
    }

    /// Current linear order of a container.
    pub fn order(&self, container_id: ContainerId) -> Vec<ItemId> {
        let state = self.state.lock().unwrap();
        state
            .list(container_id)
            .map(|items| items.iter().map(|i| i.item_id).collect())
            .unwrap_or_default()
    }

    /// Every command received, including rejected ones.
    pub fn commands(&self) -> Vec<HostCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.lock().unwrap().clear();
    }

    /// Drain the notifications caused by executed commands.
    pub fn take_echoes(&self) -> Vec<HostEvent> {
        self.echoes.lock().unwrap().drain(..).collect()
    }

    pub fn set_fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    fn record(&self, command: HostCommand) -> Result<()> {
        self.commands.lock().unwrap().push(command.clone());
        if self.fail_commands.load(Ordering::SeqCst) {
            bail!("host rejected {command}");
        }
        Ok(())
    }

    fn echo(&self, events: impl IntoIterator<Item = HostEvent>) {
        self.echoes.lock().unwrap().extend(events);
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostPort for SimHost {
    async fn move_item(&self, item_id: ItemId, target: MoveTarget) -> Result<()> {
        self.record(HostCommand::MoveItem { item_id, target })?;
        let current = self
            .state
            .lock()
            .unwrap()
            .locate(item_id)
            .map(|(cid, _)| cid)
            .ok_or_else(|| anyhow!("no item {item_id}"))?;

        match target.container_id {
            Some(container_id) if container_id != current => {
                let events = self.native_transfer(item_id, container_id, target.index);
                self.echo(events);
            }
            _ => {
                if let Some(event) = self.native_move(item_id, target.index) {
                    self.echo([event]);
                }
            }
        }
        Ok(())
    }

    async fn remove_item(&self, item_id: ItemId) -> Result<()> {
        self.record(HostCommand::RemoveItem { item_id })?;
        let event = self.close(item_id).ok_or_else(|| anyhow!("no item {item_id}"))?;
        self.echo([event]);
        Ok(())
    }

    async fn query_items(&self, container_id: ContainerId) -> Result<Vec<HostItem>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            bail!("host query failed");
        }
        let state = self.state.lock().unwrap();
        state
            .list(container_id)
            .cloned()
            .ok_or_else(|| anyhow!("no container {container_id}"))
    }

    async fn query_containers(&self) -> Result<Vec<HostContainer>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            bail!("host query failed");
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .map(|(container_id, _)| HostContainer {
                container_id: *container_id,
                focused: state.focused == Some(*container_id),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sim_host_moves_and_echoes() {
        let host = SimHost::new();
        let ids = host.preload(ContainerId(1), 3);
        assert_eq!(host.order(ContainerId(1)), ids);

        host.move_item(ids[0], MoveTarget::within(2)).await.unwrap();
        assert_eq!(host.order(ContainerId(1)), vec![ids[1], ids[2], ids[0]]);
        assert_eq!(
            host.take_echoes(),
            vec![HostEvent::Moved {
                item_id: ids[0],
                container_id: ContainerId(1),
                from_index: 0,
                to_index: 2,
            }]
        );

        host.move_item(ids[1], MoveTarget::into_container(ContainerId(2), 0))
            .await
            .unwrap();
        let echoes = host.take_echoes();
        assert_eq!(echoes.len(), 2);
        assert_eq!(echoes[0].kind(), "detached");
        assert_eq!(echoes[1].kind(), "attached");
        assert_eq!(host.order(ContainerId(2)), vec![ids[1]]);
    }

    #[tokio::test]
    async fn test_sim_host_failure_injection() {
        let host = SimHost::new();
        let ids = host.preload(ContainerId(1), 1);
        host.set_fail_commands(true);
        assert!(host.remove_item(ids[0]).await.is_err());
        assert_eq!(host.commands().len(), 1);
        assert_eq!(host.order(ContainerId(1)), ids);

        host.set_fail_queries(true);
        assert!(host.query_items(ContainerId(1)).await.is_err());
    }
}
