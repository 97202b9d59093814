use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::types::{Container, ContainerId, HostContainer, HostItem, Item, ItemId, MoveTarget};

// ============================================================================
// HOST: the linear-order system being mirrored
// ============================================================================

#[async_trait]
pub trait HostPort: Send + Sync {
    async fn move_item(&self, item_id: ItemId, target: MoveTarget) -> anyhow::Result<()>;

    async fn remove_item(&self, item_id: ItemId) -> anyhow::Result<()>;

    /// Live items of one container.
    async fn query_items(&self, container_id: ContainerId) -> anyhow::Result<Vec<HostItem>>;

    async fn query_containers(&self) -> anyhow::Result<Vec<HostContainer>>;
}

// ============================================================================
// STORAGE: persisted item/container records
// ============================================================================

/// One reconciliation step's writes, committed as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub put_items: Vec<Item>,
    pub delete_items: Vec<ItemId>,
    pub put_containers: Vec<Container>,
    pub delete_containers: Vec<ContainerId>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.put_items.is_empty()
            && self.delete_items.is_empty()
            && self.put_containers.is_empty()
            && self.delete_containers.is_empty()
    }
}

/// Summary of a committed batch, fanned out to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreChange {
    pub items_put: Vec<ItemId>,
    pub items_deleted: Vec<ItemId>,
    pub containers_put: Vec<ContainerId>,
    pub containers_deleted: Vec<ContainerId>,
}

impl From<&WriteBatch> for StoreChange {
    fn from(batch: &WriteBatch) -> Self {
        Self {
            items_put: batch.put_items.iter().map(|i| i.item_id).collect(),
            items_deleted: batch.delete_items.clone(),
            containers_put: batch.put_containers.iter().map(|c| c.container_id).collect(),
            containers_deleted: batch.delete_containers.clone(),
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_all_items(&self) -> anyhow::Result<Vec<Item>>;

    async fn get_all_containers(&self) -> anyhow::Result<Vec<Container>>;

    /// Apply puts, then deletes, atomically.
    async fn commit(&self, batch: WriteBatch) -> anyhow::Result<()>;

    /// Observe committed batches.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}
