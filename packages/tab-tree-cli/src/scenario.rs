//! Scripted host/UI sessions replayed against the simulated host.
//!
//! Items are referred to by label; the simulated host assigns the real ids
//! as items are opened.
//!
//! ```json
//! {
//!   "containers": [1],
//!   "steps": [
//!     { "op": "open", "label": "a" },
//!     { "op": "open", "label": "b" },
//!     { "op": "drag", "item": "b", "target": { "type": "child_of", "item": "a" } },
//!     { "op": "move", "item": "a", "to": 1 }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tab_tree::testing::SimHost;
use tab_tree::tree::{build_tree, TreeNode};
use tab_tree::{
    ContainerId, DropTarget, HostEvent, Item, ItemId, MemoryStore, ReconcilerHandle, StepReport,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_containers")]
    pub containers: Vec<ContainerId>,
    pub steps: Vec<Step>,
}

fn default_containers() -> Vec<ContainerId> {
    vec![ContainerId(1)]
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid scenario {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Target {
    ChildOf { item: String },
    Before { item: String },
    After { item: String },
    Root,
}

/// One user action, on the host side or in the tree view.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Open {
        label: String,
        #[serde(default)]
        container: Option<ContainerId>,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        opener: Option<String>,
    },
    Move {
        item: String,
        to: usize,
    },
    Transfer {
        item: String,
        container: ContainerId,
        index: usize,
    },
    Close {
        item: String,
    },
    CloseContainer {
        container: ContainerId,
    },
    Activate {
        item: String,
    },
    Drag {
        item: String,
        target: Target,
    },
    Relocate {
        item: String,
        container: ContainerId,
        #[serde(default)]
        index: Option<usize>,
    },
    Collapse {
        item: String,
        #[serde(default = "yes")]
        collapsed: bool,
    },
    PendingChild {
        container: ContainerId,
        index: usize,
        #[serde(default)]
        parent: Option<String>,
        tree_order: String,
    },
    Sync,
}

fn yes() -> bool {
    true
}

impl Step {
    pub fn describe(&self) -> String {
        match self {
            Step::Open { label, opener, .. } => match opener {
                Some(opener) => format!("open {label} from {opener}"),
                None => format!("open {label}"),
            },
            Step::Move { item, to } => format!("move {item} to {to}"),
            Step::Transfer { item, container, index } => format!("transfer {item} to {container}:{index}"),
            Step::Close { item } => format!("close {item}"),
            Step::CloseContainer { container } => format!("close container {container}"),
            Step::Activate { item } => format!("activate {item}"),
            Step::Drag { item, target } => format!("drag {item} {target:?}"),
            Step::Relocate { item, container, .. } => format!("relocate {item} to container {container}"),
            Step::Collapse { item, collapsed } => format!("collapse {item} = {collapsed}"),
            Step::PendingChild { container, index, .. } => format!("pending child at {container}:{index}"),
            Step::Sync => "initial sync".to_string(),
        }
    }
}

/// Final state of one container after a replay.
#[derive(Debug, Serialize)]
pub struct ContainerSnapshot {
    pub container_id: ContainerId,
    pub host_order: Vec<String>,
    pub tree_order: Vec<String>,
    pub in_sync: bool,
    pub items: Vec<Item>,
}

pub struct Replay {
    host: Arc<SimHost>,
    store: Arc<MemoryStore>,
    handle: ReconcilerHandle,
    labels: HashMap<String, ItemId>,
    names: HashMap<ItemId, String>,
}

impl Replay {
    pub fn new(host: Arc<SimHost>, store: Arc<MemoryStore>, handle: ReconcilerHandle) -> Self {
        Self {
            host,
            store,
            handle,
            labels: HashMap::new(),
            names: HashMap::new(),
        }
    }

    fn id(&self, label: &str) -> Result<ItemId> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| anyhow!("unknown item label {label:?}"))
    }

    pub fn name(&self, item_id: ItemId) -> String {
        self.names
            .get(&item_id)
            .cloned()
            .unwrap_or_else(|| item_id.to_string())
    }

    /// Run one step and every host echo it causes.
    pub async fn run(&mut self, step: &Step) -> Result<Option<StepReport>> {
        let mut report = None;
        match step {
            Step::Open {
                label,
                container,
                index,
                opener,
            } => {
                let opener = opener.as_deref().map(|o| self.id(o)).transpose()?;
                let event = self
                    .host
                    .open(container.unwrap_or(ContainerId(1)), *index, opener);
                let item_id = event.item_id();
                self.labels.insert(label.clone(), item_id);
                self.names.insert(item_id, label.clone());
                report = Some(self.handle.emit_and_await(event).await?);
            }
            Step::Move { item, to } => {
                let event = self
                    .host
                    .native_move(self.id(item)?, *to)
                    .ok_or_else(|| anyhow!("{item} is not open"))?;
                report = Some(self.handle.emit_and_await(event).await?);
            }
            Step::Transfer {
                item,
                container,
                index,
            } => {
                self.host.add_container(*container);
                for event in self.host.native_transfer(self.id(item)?, *container, *index) {
                    report = Some(self.handle.emit_and_await(event).await?);
                }
            }
            Step::Close { item } => {
                let event = self
                    .host
                    .close(self.id(item)?)
                    .ok_or_else(|| anyhow!("{item} is not open"))?;
                report = Some(self.handle.emit_and_await(event).await?);
            }
            Step::CloseContainer { container } => {
                for event in self.host.close_container(*container) {
                    report = Some(self.handle.emit_and_await(event).await?);
                }
            }
            Step::Activate { item } => {
                let event = self
                    .host
                    .activate(self.id(item)?)
                    .ok_or_else(|| anyhow!("{item} is not open"))?;
                report = Some(self.handle.emit_and_await(event).await?);
            }
            Step::Drag { item, target } => {
                let target = match target {
                    Target::ChildOf { item: anchor } => DropTarget::ChildOf(self.id(anchor)?),
                    Target::Before { item: anchor } => DropTarget::Before(self.id(anchor)?),
                    Target::After { item: anchor } => DropTarget::After(self.id(anchor)?),
                    Target::Root => DropTarget::Root,
                };
                report = Some(self.handle.drag_item(self.id(item)?, target).await?);
            }
            Step::Relocate {
                item,
                container,
                index,
            } => {
                self.host.add_container(*container);
                report = Some(
                    self.handle
                        .relocate_subtree(self.id(item)?, *container, *index)
                        .await?,
                );
            }
            Step::Collapse { item, collapsed } => {
                report = Some(self.handle.set_collapsed(self.id(item)?, *collapsed).await?);
            }
            Step::PendingChild {
                container,
                index,
                parent,
                tree_order,
            } => {
                let parent = parent.as_deref().map(|p| self.id(p)).transpose()?;
                self.handle
                    .register_pending_child_intent(*container, *index, parent, tree_order.clone())?;
            }
            Step::Sync => {
                report = Some(self.handle.initial_sync().await?);
            }
        }
        self.drain_echoes().await?;
        Ok(report)
    }

    async fn drain_echoes(&self) -> Result<()> {
        for _ in 0..64 {
            let echoes: Vec<HostEvent> = self.host.take_echoes();
            if echoes.is_empty() {
                return Ok(());
            }
            for echo in echoes {
                self.handle.emit(echo)?;
            }
            self.handle.flush().await?;
        }
        bail!("host kept echoing after 64 rounds")
    }

    pub async fn snapshot(&self, container_id: ContainerId) -> ContainerSnapshot {
        let items = self.store.container_items(container_id).await;
        let host_order: Vec<String> = self
            .host
            .order(container_id)
            .into_iter()
            .map(|id| self.name(id))
            .collect();
        let tree_order: Vec<String> = tab_tree::flatten_tree(&build_tree(&items))
            .into_iter()
            .map(|id| self.name(id))
            .collect();
        ContainerSnapshot {
            container_id,
            in_sync: host_order == tree_order,
            host_order,
            tree_order,
            items,
        }
    }

    /// Indented rendering of a container's tree.
    pub async fn render(&self, container_id: ContainerId) -> Vec<String> {
        fn walk(replay: &Replay, node: &TreeNode, depth: usize, out: &mut Vec<String>) {
            let item = &node.item;
            let mut line = format!(
                "{}{} [{}] @{}",
                "  ".repeat(depth),
                replay.name(item.item_id),
                item.tree_order,
                item.linear_index
            );
            if item.collapsed {
                line.push_str(" (collapsed)");
            }
            if item.active {
                line.push_str(" *");
            }
            out.push(line);
            for child in &node.children {
                walk(replay, child, depth + 1, out);
            }
        }

        let items = self.store.container_items(container_id).await;
        let mut out = Vec::new();
        for root in build_tree(&items) {
            walk(self, &root, 0, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tab_tree::{runtime, Reconciler, ReconcilerConfig};

    async fn replay(raw: &str) -> (Replay, Scenario) {
        let scenario: Scenario = serde_json::from_str(raw).unwrap();
        let host = Arc::new(SimHost::new());
        for container_id in &scenario.containers {
            host.add_container(*container_id);
        }
        let store = Arc::new(MemoryStore::new());
        let (handle, _worker) = runtime::spawn(Reconciler::new(
            host.clone(),
            store.clone(),
            ReconcilerConfig::default(),
        ));
        let mut replay = Replay::new(host, store, handle);
        for step in &scenario.steps {
            replay.run(step).await.unwrap();
        }
        (replay, scenario)
    }

    #[tokio::test]
    async fn test_flatten_scenario_ends_in_sync() {
        let (replay, _) = replay(include_str!("../scenarios/flatten.json")).await;
        let snapshot = replay.snapshot(ContainerId(1)).await;
        assert!(snapshot.in_sync);
        assert_eq!(snapshot.host_order, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_unknown_label_is_an_error() {
        let (mut replay, _) = replay(r#"{ "steps": [] }"#).await;
        let step: Step = serde_json::from_str(r#"{ "op": "close", "item": "nope" }"#).unwrap();
        assert!(replay.run(&step).await.is_err());
    }

    #[test]
    fn test_step_wire_format() {
        let step: Step = serde_json::from_str(
            r#"{ "op": "drag", "item": "b", "target": { "type": "after", "item": "a" } }"#,
        )
        .unwrap();
        assert_eq!(step.describe(), r#"drag b After { item: "a" }"#);
    }
}
