use serde::{Deserialize, Serialize};

use crate::types::{ContainerId, DropTarget, HostItem, ItemId};

/// Fields the host reports as changed on an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ItemChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none()
    }
}

/// Notifications delivered by the host (facts about what already happened)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    // ============================================================================
    // Lifecycle
    // ============================================================================
    Created {
        item: HostItem,
    },

    Updated {
        item_id: ItemId,
        #[serde(default)]
        changes: ItemChanges,
    },

    Removed {
        item_id: ItemId,
        container_id: ContainerId,
        #[serde(default)]
        is_container_closing: bool,
    },

    // ============================================================================
    // Linear order
    // ============================================================================
    Moved {
        item_id: ItemId,
        container_id: ContainerId,
        from_index: usize,
        to_index: usize,
    },

    Activated {
        item_id: ItemId,
        container_id: ContainerId,
    },

    // ============================================================================
    // Container transfer
    // ============================================================================
    Detached {
        item_id: ItemId,
        old_container_id: ContainerId,
        old_index: usize,
    },

    Attached {
        item_id: ItemId,
        new_container_id: ContainerId,
        new_index: usize,
    },
}

impl HostEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Removed { .. } => "removed",
            Self::Moved { .. } => "moved",
            Self::Activated { .. } => "activated",
            Self::Detached { .. } => "detached",
            Self::Attached { .. } => "attached",
        }
    }

    pub fn item_id(&self) -> ItemId {
        match self {
            Self::Created { item } => item.item_id,
            Self::Updated { item_id, .. }
            | Self::Removed { item_id, .. }
            | Self::Moved { item_id, .. }
            | Self::Activated { item_id, .. }
            | Self::Detached { item_id, .. }
            | Self::Attached { item_id, .. } => *item_id,
        }
    }
}

/// Structural edits requested by the UI and serialized through the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiRequest {
    DragItem {
        item_id: ItemId,
        target: DropTarget,
    },

    RelocateSubtree {
        item_id: ItemId,
        container_id: ContainerId,
        #[serde(default)]
        index: Option<usize>,
    },

    SetCollapsed {
        item_id: ItemId,
        collapsed: bool,
    },

    InitialSync,
}

impl UiRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DragItem { .. } => "drag_item",
            Self::RelocateSubtree { .. } => "relocate_subtree",
            Self::SetCollapsed { .. } => "set_collapsed",
            Self::InitialSync => "initial_sync",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_event_wire_format() {
        let event: HostEvent = serde_json::from_str(
            r#"{"type":"moved","item_id":3,"container_id":1,"from_index":2,"to_index":0}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            HostEvent::Moved {
                item_id: ItemId(3),
                container_id: ContainerId(1),
                from_index: 2,
                to_index: 0,
            }
        );
        assert_eq!(event.kind(), "moved");
        assert_eq!(event.item_id(), ItemId(3));
    }

    #[test]
    fn test_created_carries_host_item() {
        let event: HostEvent = serde_json::from_str(
            r#"{"type":"created","item":{"itemId":7,"containerId":1,"index":4,"openerId":2}}"#,
        )
        .unwrap();
        let HostEvent::Created { item } = event else {
            panic!("expected created");
        };
        assert_eq!(item.opener_id, Some(ItemId(2)));
        assert_eq!(item.index, 4);
    }

    #[test]
    fn test_drop_target_wire_format() {
        let request: UiRequest = serde_json::from_str(
            r#"{"type":"drag_item","item_id":3,"target":{"type":"child_of","item_id":2}}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            UiRequest::DragItem {
                item_id: ItemId(3),
                target: DropTarget::ChildOf(ItemId(2)),
            }
        );
    }
}
