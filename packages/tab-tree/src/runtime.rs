//! The reconciliation queue.
//!
//! One spawned worker owns the [`Reconciler`] and drains an unbounded FIFO,
//! so at most one step is ever in flight. [`ReconcilerHandle`] is the cheap,
//! cloneable front door: host notifications and structural UI requests go
//! through the queue, while intent registration and managed-move marking
//! write straight into the shared registries.
//!
//! ```ignore
//! let (handle, worker) = runtime::spawn(Reconciler::new(host, store, config));
//! handle.initial_sync().await?;
//!
//! // host callback
//! handle.emit(HostEvent::Moved { item_id, container_id, from_index, to_index })?;
//!
//! // UI drag
//! handle.drag_item(item_id, DropTarget::ChildOf(parent)).await?;
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, Result};
use crate::events::{HostEvent, UiRequest};
use crate::intents::IntentRegistry;
use crate::managed::ManagedMoveSet;
use crate::reconciler::{Reconciler, StepReport};
use crate::types::{ContainerId, DropTarget, IntentTtl, ItemId};

type Reply = oneshot::Sender<Result<StepReport>>;

enum Task {
    Host { event: HostEvent, reply: Option<Reply> },
    Ui { request: UiRequest, reply: Reply },
    Flush(oneshot::Sender<()>),
}

/// Start the worker. It stops once every handle is dropped.
pub fn spawn(reconciler: Reconciler) -> (ReconcilerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ReconcilerHandle {
        tx,
        intents: reconciler.intents(),
        managed: reconciler.managed(),
    };
    let worker = tokio::spawn(run(reconciler, rx));
    (handle, worker)
}

async fn run(mut reconciler: Reconciler, mut rx: mpsc::UnboundedReceiver<Task>) {
    info!("reconciler started");
    while let Some(task) = rx.recv().await {
        match task {
            Task::Host { event, reply } => {
                let kind = event.kind();
                let item_id = event.item_id();
                let result = reconciler.handle(event).await;
                if let Err(e) = &result {
                    warn!(event = kind, item_id = %item_id, error = %e, "reconciliation step failed");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Task::Ui { request, reply } => {
                let kind = request.kind();
                let result = reconciler.apply(request).await;
                if let Err(e) = &result {
                    warn!(request = kind, error = %e, "ui request failed");
                }
                let _ = reply.send(result);
            }
            Task::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    info!("reconciler queue closed, worker stopping");
}

#[derive(Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::UnboundedSender<Task>,
    intents: Arc<IntentRegistry>,
    managed: Arc<ManagedMoveSet>,
}

impl ReconcilerHandle {
    // =========================================================================
    // Host notifications
    // =========================================================================

    /// Enqueue a host notification (fire-and-forget).
    pub fn emit(&self, event: HostEvent) -> Result<()> {
        debug!(event = event.kind(), item_id = %event.item_id(), "host event queued");
        self.send(Task::Host { event, reply: None })
    }

    /// Enqueue a host notification and wait for its step to finish.
    pub async fn emit_and_await(&self, event: HostEvent) -> Result<StepReport> {
        let (reply, rx) = oneshot::channel();
        self.send(Task::Host {
            event,
            reply: Some(reply),
        })?;
        rx.await.map_err(|_| ReconcileError::QueueClosed)?
    }

    // =========================================================================
    // Structural UI requests (serialized with host notifications)
    // =========================================================================

    pub async fn request(&self, request: UiRequest) -> Result<StepReport> {
        let (reply, rx) = oneshot::channel();
        self.send(Task::Ui { request, reply })?;
        rx.await.map_err(|_| ReconcileError::QueueClosed)?
    }

    pub async fn drag_item(&self, item_id: ItemId, target: DropTarget) -> Result<StepReport> {
        self.request(UiRequest::DragItem { item_id, target }).await
    }

    pub async fn relocate_subtree(
        &self,
        item_id: ItemId,
        container_id: ContainerId,
        index: Option<usize>,
    ) -> Result<StepReport> {
        self.request(UiRequest::RelocateSubtree {
            item_id,
            container_id,
            index,
        })
        .await
    }

    pub async fn set_collapsed(&self, item_id: ItemId, collapsed: bool) -> Result<StepReport> {
        self.request(UiRequest::SetCollapsed { item_id, collapsed }).await
    }

    pub async fn initial_sync(&self) -> Result<StepReport> {
        self.request(UiRequest::InitialSync).await
    }

    /// Resolves once everything queued before it has been processed.
    pub async fn flush(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.send(Task::Flush(done))?;
        rx.await.map_err(|_| ReconcileError::QueueClosed)
    }

    // =========================================================================
    // Registries (written directly, may race a draining step)
    // =========================================================================

    pub fn register_move_intent(
        &self,
        item_id: ItemId,
        parent_id: Option<ItemId>,
        tree_order: impl Into<String>,
        ttl: IntentTtl,
    ) -> Result<()> {
        self.intents.register_move_intent(item_id, parent_id, tree_order, ttl)
    }

    pub fn register_pending_child_intent(
        &self,
        container_id: ContainerId,
        index: usize,
        parent_id: Option<ItemId>,
        tree_order: impl Into<String>,
    ) -> Result<()> {
        self.intents
            .register_pending_child_intent(container_id, index, parent_id, tree_order)
    }

    pub fn begin_managed_move(&self, item_ids: impl IntoIterator<Item = ItemId>) {
        self.managed.begin(item_ids);
    }

    pub fn end_managed_move(&self) {
        self.managed.end();
    }

    fn send(&self, task: Task) -> Result<()> {
        self.tx.send(task).map_err(|_| ReconcileError::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcilerConfig;
    use crate::store::MemoryStore;
    use crate::testing::SimHost;
    use crate::types::{ContainerId, TreeFields};

    const C: ContainerId = ContainerId(1);

    fn start() -> (Arc<SimHost>, Arc<MemoryStore>, ReconcilerHandle, JoinHandle<()>) {
        let host = Arc::new(SimHost::new());
        host.add_container(C);
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(host.clone(), store.clone(), ReconcilerConfig::default());
        let (handle, worker) = spawn(reconciler);
        (host, store, handle, worker)
    }

    #[tokio::test]
    async fn test_events_are_processed_in_order() {
        let (host, store, handle, _worker) = start();
        for _ in 0..3 {
            handle.emit(host.open(C, None, None)).unwrap();
        }
        handle.flush().await.unwrap();

        let keys: Vec<String> = store
            .container_items(C)
            .await
            .into_iter()
            .map(|i| i.tree_order)
            .collect();
        assert_eq!(keys, vec!["V", "l", "t"]);
    }

    #[tokio::test]
    async fn test_ui_request_waits_for_queued_events() {
        let (host, store, handle, _worker) = start();
        let opened = [host.open(C, None, None), host.open(C, None, None)];
        let (a, b) = (opened[0].item_id(), opened[1].item_id());
        for event in opened {
            handle.emit(event).unwrap();
        }

        let report = handle.drag_item(b, DropTarget::ChildOf(a)).await.unwrap();
        assert_eq!(report.kind, "drag_item");
        assert_eq!(
            store.item(b).await.unwrap().tree_fields(),
            TreeFields::new(Some(a), "V")
        );
    }

    #[tokio::test]
    async fn test_step_errors_reach_the_caller_and_worker_survives() {
        let (host, _store, handle, _worker) = start();
        let err = handle.set_collapsed(ItemId(404), true).await.unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownItem(ItemId(404))));

        let report = handle.emit_and_await(host.open(C, None, None)).await.unwrap();
        assert_eq!(report.kind, "created");
    }

    #[tokio::test]
    async fn test_registries_are_shared_with_the_worker() {
        let (_host, _store, handle, _worker) = start();
        handle
            .register_move_intent(ItemId(1), None, "V", IntentTtl::Drag)
            .unwrap();
        handle.begin_managed_move([ItemId(1), ItemId(2)]);

        assert!(handle.intents.has_move_intent(ItemId(1)));
        assert_eq!(handle.managed.len(), 2);
        handle.end_managed_move();
        assert!(handle.managed.is_empty());

        let err = handle
            .register_move_intent(ItemId(1), None, "bad key!", IntentTtl::Drag)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::OrderKey(_)));
    }

    #[tokio::test]
    async fn test_closed_queue_is_reported() {
        let (host, _store, handle, worker) = start();
        worker.abort();
        let _ = worker.await;

        let err = handle.emit(host.open(C, None, None)).unwrap_err();
        assert!(matches!(err, ReconcileError::QueueClosed));
        assert!(matches!(handle.flush().await, Err(ReconcileError::QueueClosed)));
    }
}
