use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::traits::{RecordStore, StoreChange, WriteBatch};
use crate::types::{Container, ContainerId, Item, ItemId};

const CHANGE_CAPACITY: usize = 256;

#[derive(Default)]
struct Records {
    items: BTreeMap<ItemId, Item>,
    containers: BTreeMap<ContainerId, Container>,
}

/// In-process record store with change fan-out.
pub struct MemoryStore {
    records: RwLock<Records>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            records: RwLock::new(Records::default()),
            changes,
        }
    }

    /// Seed records without notifying observers.
    pub async fn seed(&self, items: Vec<Item>, containers: Vec<Container>) {
        let mut records = self.records.write().await;
        records.items.extend(items.into_iter().map(|i| (i.item_id, i)));
        records
            .containers
            .extend(containers.into_iter().map(|c| (c.container_id, c)));
    }

    pub async fn item(&self, item_id: ItemId) -> Option<Item> {
        self.records.read().await.items.get(&item_id).cloned()
    }

    pub async fn container(&self, container_id: ContainerId) -> Option<Container> {
        self.records.read().await.containers.get(&container_id).cloned()
    }

    /// Items of one container, in stored linear order.
    pub async fn container_items(&self, container_id: ContainerId) -> Vec<Item> {
        let records = self.records.read().await;
        let mut items: Vec<Item> = records
            .items
            .values()
            .filter(|i| i.container_id == container_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.linear_index, i.item_id));
        items
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_all_items(&self) -> anyhow::Result<Vec<Item>> {
        Ok(self.records.read().await.items.values().cloned().collect())
    }

    async fn get_all_containers(&self) -> anyhow::Result<Vec<Container>> {
        Ok(self.records.read().await.containers.values().cloned().collect())
    }

    async fn commit(&self, batch: WriteBatch) -> anyhow::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let change = StoreChange::from(&batch);
        {
            let mut records = self.records.write().await;
            for item in batch.put_items {
                records.items.insert(item.item_id, item);
            }
            for container in batch.put_containers {
                records.containers.insert(container.container_id, container);
            }
            for id in &batch.delete_items {
                records.items.remove(id);
            }
            for id in &batch.delete_containers {
                records.containers.remove(id);
            }
        }
        debug!(
            items_put = change.items_put.len(),
            items_deleted = change.items_deleted.len(),
            "batch committed"
        );
        // No receivers is fine
        let _ = self.changes.send(change);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_applies_puts_then_deletes() {
        let store = MemoryStore::new();
        store
            .seed(vec![Item::new(1, 1, 0, "V"), Item::new(2, 1, 1, "l")], vec![])
            .await;

        let mut rx = store.subscribe();
        store
            .commit(WriteBatch {
                put_items: vec![Item::new(3, 1, 2, "t")],
                delete_items: vec![ItemId(1)],
                put_containers: vec![Container::new(ContainerId(1))],
                ..Default::default()
            })
            .await
            .unwrap();

        let ids: Vec<_> = store
            .get_all_items()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.item_id)
            .collect();
        assert_eq!(ids, vec![ItemId(2), ItemId(3)]);
        assert!(store.container(ContainerId(1)).await.is_some());

        let change = rx.recv().await.unwrap();
        assert_eq!(change.items_put, vec![ItemId(3)]);
        assert_eq!(change.items_deleted, vec![ItemId(1)]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_broadcast() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        store.commit(WriteBatch::default()).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
