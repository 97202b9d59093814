//! Items taking part in a UI-orchestrated subtree relocation.
//!
//! While an id is managed its detach does not promote children and its
//! attach trusts the pre-written tree fields. Ids leave the set one by one
//! as their attach arrives, all at once on [`ManagedMoveSet::end`], or when
//! the timeout runs out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::types::ItemId;

pub struct ManagedMoveSet {
    /// Managed id -> deadline.
    ids: DashMap<ItemId, DateTime<Utc>>,
    timeout: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl ManagedMoveSet {
    pub fn new(timeout: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ids: DashMap::new(),
            timeout,
            clock,
        }
    }

    pub fn begin(&self, ids: impl IntoIterator<Item = ItemId>) {
        let deadline = self.clock.now() + self.timeout;
        let mut count = 0;
        for id in ids {
            self.ids.insert(id, deadline);
            count += 1;
        }
        info!(count, "managed move started");
    }

    pub fn end(&self) {
        if !self.ids.is_empty() {
            info!(remaining = self.ids.len(), "managed move ended");
        }
        self.ids.clear();
    }

    pub fn is_managed(&self, id: ItemId) -> bool {
        let Some(deadline) = self.ids.get(&id).map(|d| *d) else {
            return false;
        };
        if self.clock.now() > deadline {
            self.ids.remove(&id);
            debug!(item_id = %id, "managed move timed out");
            return false;
        }
        true
    }

    /// Record that the host delivered `id`; returns whether it was managed.
    pub fn complete(&self, id: ItemId) -> bool {
        let managed = self.is_managed(id);
        if managed {
            self.ids.remove(&id);
            if self.ids.is_empty() {
                debug!("managed move complete");
            }
        }
        managed
    }

    pub fn forget(&self, id: ItemId) {
        self.ids.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
