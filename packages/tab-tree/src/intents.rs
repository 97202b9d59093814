//! Short-lived records of tree positions the core already committed.
//!
//! The UI registers an intent right before it asks the host to move or
//! create something. When the host's echo comes back, the reconciler takes
//! the matching intent and applies it verbatim instead of re-inferring a
//! position from the host's linear order.
//!
//! Registration may run concurrently with a draining reconciliation step;
//! every other access happens inside a step. Expired entries are dropped
//! lazily on access and by [`IntentRegistry::purge_expired`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::clock::Clock;
use crate::config::ReconcilerConfig;
use crate::error::Result;
use crate::order_key::{self, OrderKeyError};
use crate::types::{ContainerId, IntentTtl, ItemId, TreeFields};

/// A committed tree position waiting for the host's confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiMoveIntent {
    pub item_id: ItemId,
    pub fields: TreeFields,
    pub created_at: DateTime<Utc>,
    pub ttl: IntentTtl,
}

/// "Whatever the host creates at this slot belongs here."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChildIntent {
    pub container_id: ContainerId,
    pub index: usize,
    pub fields: TreeFields,
    pub created_at: DateTime<Utc>,
}

pub struct IntentRegistry {
    moves: DashMap<ItemId, UiMoveIntent>,
    pending_children: DashMap<(ContainerId, usize), PendingChildIntent>,
    config: ReconcilerConfig,
    clock: Arc<dyn Clock>,
}

impl IntentRegistry {
    pub fn new(config: ReconcilerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            moves: DashMap::new(),
            pending_children: DashMap::new(),
            config,
            clock,
        }
    }

    /// Register (or replace) the intended tree position for `item_id`.
    pub fn register_move_intent(
        &self,
        item_id: ItemId,
        parent_id: Option<ItemId>,
        tree_order: impl Into<String>,
        ttl: IntentTtl,
    ) -> Result<()> {
        let fields = TreeFields::new(parent_id, tree_order);
        check_key(&fields.tree_order)?;
        debug!(item_id = %item_id, parent_id = ?parent_id, ?ttl, "move intent registered");
        self.moves.insert(
            item_id,
            UiMoveIntent {
                item_id,
                fields,
                created_at: self.clock.now(),
                ttl,
            },
        );
        Ok(())
    }

    /// Register the position of an item the host has yet to create.
    pub fn register_pending_child_intent(
        &self,
        container_id: ContainerId,
        index: usize,
        parent_id: Option<ItemId>,
        tree_order: impl Into<String>,
    ) -> Result<()> {
        let fields = TreeFields::new(parent_id, tree_order);
        check_key(&fields.tree_order)?;
        debug!(container_id = %container_id, index, parent_id = ?parent_id, "pending child registered");
        self.pending_children.insert(
            (container_id, index),
            PendingChildIntent {
                container_id,
                index,
                fields,
                created_at: self.clock.now(),
            },
        );
        Ok(())
    }

    /// Consume a fresh move intent for `item_id`. Stale intents are dropped.
    pub fn take_move_intent(&self, item_id: ItemId) -> Option<TreeFields> {
        let (_, intent) = self.moves.remove(&item_id)?;
        let age = self.clock.now() - intent.created_at;
        if age > self.config.intent_ttl(intent.ttl) {
            debug!(item_id = %item_id, age_ms = age.num_milliseconds(), "move intent expired");
            return None;
        }
        Some(intent.fields)
    }

    /// Consume a fresh pending-child intent for the slot.
    pub fn take_pending_child(&self, container_id: ContainerId, index: usize) -> Option<TreeFields> {
        let (_, intent) = self.pending_children.remove(&(container_id, index))?;
        let age = self.clock.now() - intent.created_at;
        if age > self.config.pending_child_ttl() {
            debug!(container_id = %container_id, index, "pending child intent expired");
            return None;
        }
        Some(intent.fields)
    }

    pub fn has_move_intent(&self, item_id: ItemId) -> bool {
        self.moves.contains_key(&item_id)
    }

    /// Forget anything registered for an item that no longer exists.
    pub fn discard(&self, item_id: ItemId) {
        self.moves.remove(&item_id);
    }

    /// Drop every expired entry; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        // Counted per entry: registrations may land while retain runs.
        let mut dropped = 0;
        self.moves.retain(|_, intent| {
            let keep = now - intent.created_at <= self.config.intent_ttl(intent.ttl);
            if !keep {
                dropped += 1;
            }
            keep
        });
        let pending_ttl = self.config.pending_child_ttl();
        self.pending_children.retain(|_, intent| {
            let keep = now - intent.created_at <= pending_ttl;
            if !keep {
                dropped += 1;
            }
            keep
        });
        if dropped > 0 {
            debug!(dropped, "expired intents purged");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.moves.len() + self.pending_children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_key(key: &str) -> Result<()> {
    if order_key::is_valid_key(key) {
        Ok(())
    } else {
        Err(OrderKeyError::InvalidKey(key.to_string()).into())
    }
}
