use std::collections::BTreeMap;

use tracing::warn;

use crate::error::Result;
use crate::traits::{HostPort, RecordStore, WriteBatch};
use crate::types::{Container, ContainerId, HostItem, Item, ItemId};

/// Records loaded at the start of a step plus the step's edits.
///
/// Handlers mutate `items`/`containers` freely; [`Working::into_batch`]
/// diffs against what was loaded so the step writes one batch holding
/// exactly the records that changed.
pub(crate) struct Working {
    loaded_items: BTreeMap<ItemId, Item>,
    loaded_containers: BTreeMap<ContainerId, Container>,
    pub items: BTreeMap<ItemId, Item>,
    pub containers: BTreeMap<ContainerId, Container>,
}

impl Working {
    pub async fn load(store: &dyn RecordStore) -> Result<Self> {
        let items: BTreeMap<ItemId, Item> = store
            .get_all_items()
            .await?
            .into_iter()
            .map(|i| (i.item_id, i))
            .collect();
        let containers: BTreeMap<ContainerId, Container> = store
            .get_all_containers()
            .await?
            .into_iter()
            .map(|c| (c.container_id, c))
            .collect();
        Ok(Self {
            loaded_items: items.clone(),
            loaded_containers: containers.clone(),
            items,
            containers,
        })
    }

    pub fn item(&self, item_id: ItemId) -> Option<&Item> {
        self.items.get(&item_id)
    }

    pub fn item_mut(&mut self, item_id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&item_id)
    }

    /// Records of one container, ordered by host position.
    pub fn container_items(&self, container_id: ContainerId) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .items
            .values()
            .filter(|i| i.container_id == container_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.linear_index, i.item_id));
        items
    }

    pub fn ensure_container(&mut self, container_id: ContainerId) {
        self.containers
            .entry(container_id)
            .or_insert_with(|| Container::new(container_id));
    }

    pub fn mark_closing(&mut self, container_id: ContainerId) {
        self.ensure_container(container_id);
        if let Some(container) = self.containers.get_mut(&container_id) {
            container.closing = true;
        }
    }

    /// Drop a closing container once nothing is left in it.
    pub fn drop_container_if_done(&mut self, container_id: ContainerId) {
        let closing = self
            .containers
            .get(&container_id)
            .is_some_and(|c| c.closing);
        let empty = !self.items.values().any(|i| i.container_id == container_id);
        if closing && empty {
            self.containers.remove(&container_id);
        }
    }

    /// Shift stored positions to make room at `index`, used when the host
    /// cannot be queried.
    pub fn open_gap(&mut self, container_id: ContainerId, index: usize, except: ItemId) {
        for item in self.items.values_mut() {
            if item.container_id == container_id && item.item_id != except && item.linear_index >= index {
                item.linear_index += 1;
            }
        }
    }

    /// Close the hole left at `index` by an item leaving the container.
    pub fn close_gap(&mut self, container_id: ContainerId, index: usize, except: ItemId) {
        for item in self.items.values_mut() {
            if item.container_id == container_id && item.item_id != except && item.linear_index > index {
                item.linear_index -= 1;
            }
        }
    }

    /// Refresh `linear_index` of the container's records from the host.
    ///
    /// Only records already assigned to `container_id` are touched. Returns
    /// `None` (and leaves stored positions alone) when the query fails.
    pub async fn refresh(&mut self, host: &dyn HostPort, container_id: ContainerId) -> Option<Vec<HostItem>> {
        let live = match host.query_items(container_id).await {
            Ok(live) => live,
            Err(e) => {
                warn!(container_id = %container_id, error = %e, "live query failed, using stored positions");
                return None;
            }
        };
        for host_item in &live {
            if let Some(item) = self.items.get_mut(&host_item.item_id) {
                if item.container_id == container_id {
                    item.linear_index = host_item.index;
                }
            }
        }
        Some(live)
    }

    pub fn into_batch(self) -> WriteBatch {
        let Working {
            loaded_items,
            loaded_containers,
            items,
            containers,
        } = self;

        WriteBatch {
            delete_items: loaded_items
                .keys()
                .filter(|id| !items.contains_key(id))
                .copied()
                .collect(),
            delete_containers: loaded_containers
                .keys()
                .filter(|id| !containers.contains_key(id))
                .copied()
                .collect(),
            put_items: items
                .into_iter()
                .filter(|(id, item)| loaded_items.get(id) != Some(item))
                .map(|(_, item)| item)
                .collect(),
            put_containers: containers
                .into_iter()
                .filter(|(id, container)| loaded_containers.get(id) != Some(container))
                .map(|(_, container)| container)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_batch_holds_only_changes() {
        let store = MemoryStore::new();
        store
            .seed(
                vec![Item::new(1, 1, 0, "V"), Item::new(2, 1, 1, "l"), Item::new(3, 1, 2, "t")],
                vec![Container::new(ContainerId(1))],
            )
            .await;

        let mut work = Working::load(&store).await.unwrap();
        work.item_mut(ItemId(2)).unwrap().parent_id = Some(ItemId(1));
        work.items.remove(&ItemId(3));
        work.ensure_container(ContainerId(2));
        work.ensure_container(ContainerId(1));

        let batch = work.into_batch();
        assert_eq!(batch.put_items.len(), 1);
        assert_eq!(batch.put_items[0].item_id, ItemId(2));
        assert_eq!(batch.delete_items, vec![ItemId(3)]);
        assert_eq!(batch.put_containers, vec![Container::new(ContainerId(2))]);
        assert!(batch.delete_containers.is_empty());
    }

    #[tokio::test]
    async fn test_closing_container_dropped_when_empty() {
        let store = MemoryStore::new();
        store
            .seed(vec![Item::new(1, 1, 0, "V")], vec![Container::new(ContainerId(1))])
            .await;
        let mut work = Working::load(&store).await.unwrap();
        work.mark_closing(ContainerId(1));
        work.drop_container_if_done(ContainerId(1));
        assert!(work.containers.contains_key(&ContainerId(1)));

        work.items.remove(&ItemId(1));
        work.drop_container_if_done(ContainerId(1));
        assert_eq!(work.into_batch().delete_containers, vec![ContainerId(1)]);
    }
}
