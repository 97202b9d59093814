use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ItemId, MoveTarget};

/// Corrective instructions the reconciler sends back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    MoveItem { item_id: ItemId, target: MoveTarget },
    RemoveItem { item_id: ItemId },
}

impl HostCommand {
    pub fn item_id(&self) -> ItemId {
        match self {
            Self::MoveItem { item_id, .. } | Self::RemoveItem { item_id } => *item_id,
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MoveItem { item_id, target } => match target.container_id {
                Some(container) => write!(f, "move {item_id} -> {container}:{}", target.index),
                None => write!(f, "move {item_id} -> {}", target.index),
            },
            Self::RemoveItem { item_id } => write!(f, "remove {item_id}"),
        }
    }
}
