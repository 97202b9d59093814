//! The single writer of item/container records.
//!
//! Every host notification and every structural UI request ends up in
//! exactly one reconciliation step: load records, refresh positions from
//! the host where needed, run the pure inference routines, commit one
//! write batch, then execute any corrective host commands. Steps never
//! overlap; the queue in [`crate::runtime`] feeds them one at a time.

mod host_events;
mod snapshot;
mod ui;


use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::commands::HostCommand;
use crate::config::ReconcilerConfig;
use crate::effects::{execute_commands, CommandFailure};
use crate::error::Result;
use crate::events::{HostEvent, UiRequest};
use crate::intents::IntentRegistry;
use crate::managed::ManagedMoveSet;
use crate::traits::{HostPort, RecordStore, StoreChange};
use crate::types::{FieldSource, ItemId};

use snapshot::Working;

/// What a step decided beyond its record edits.
#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub commands: Vec<HostCommand>,
    pub source: Option<FieldSource>,
    pub flattened: Vec<ItemId>,
}

impl Plan {
    fn from_source(source: FieldSource) -> Self {
        Self {
            source: Some(source),
            ..Default::default()
        }
    }
}

/// Outcome of one reconciliation step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub kind: &'static str,
    pub item_id: Option<ItemId>,
    /// Which rule produced the subject's tree fields, if any were written.
    pub source: Option<FieldSource>,
    pub change: StoreChange,
    pub commands: Vec<HostCommand>,
    pub failures: Vec<CommandFailure>,
    pub flattened: Vec<ItemId>,
}

pub struct Reconciler {
    host: Arc<dyn HostPort>,
    store: Arc<dyn RecordStore>,
    intents: Arc<IntentRegistry>,
    managed: Arc<ManagedMoveSet>,
    config: ReconcilerConfig,
    /// Descendants we asked the host to remove; their own removal skips promotion.
    cascading: HashSet<ItemId>,
}

impl Reconciler {
    pub fn new(host: Arc<dyn HostPort>, store: Arc<dyn RecordStore>, config: ReconcilerConfig) -> Self {
        Self::with_clock(host, store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        host: Arc<dyn HostPort>,
        store: Arc<dyn RecordStore>,
        config: ReconcilerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            intents: Arc::new(IntentRegistry::new(config.clone(), clock.clone())),
            managed: Arc::new(ManagedMoveSet::new(config.managed_move_timeout(), clock)),
            host,
            store,
            config,
            cascading: HashSet::new(),
        }
    }

    pub fn intents(&self) -> Arc<IntentRegistry> {
        self.intents.clone()
    }

    pub fn managed(&self) -> Arc<ManagedMoveSet> {
        self.managed.clone()
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Reconcile one host notification.
    #[instrument(skip(self, event), fields(event = event.kind(), item_id = %event.item_id()))]
    pub async fn handle(&mut self, event: HostEvent) -> Result<StepReport> {
        let kind = event.kind();
        let item_id = event.item_id();
        self.intents.purge_expired();

        let mut work = Working::load(self.store.as_ref()).await?;
        let plan = match event {
            HostEvent::Created { item } => self.on_created(&mut work, item).await?,
            HostEvent::Updated { item_id, changes } => self.on_updated(&mut work, item_id, changes)?,
            HostEvent::Moved {
                item_id,
                container_id,
                from_index,
                to_index,
            } => {
                self.on_moved(&mut work, item_id, container_id, from_index, to_index)
                    .await?
            }
            HostEvent::Removed {
                item_id,
                container_id,
                is_container_closing,
            } => {
                self.on_removed(&mut work, item_id, container_id, is_container_closing)
                    .await
            }
            HostEvent::Activated {
                item_id,
                container_id,
            } => self.on_activated(&mut work, item_id, container_id)?,
            HostEvent::Detached {
                item_id,
                old_container_id,
                old_index,
            } => {
                self.on_detached(&mut work, item_id, old_container_id, old_index)
                    .await?
            }
            HostEvent::Attached {
                item_id,
                new_container_id,
                new_index,
            } => {
                self.on_attached(&mut work, item_id, new_container_id, new_index)
                    .await?
            }
        };

        self.finish(kind, Some(item_id), work, plan).await
    }

    /// Apply one structural request from the UI.
    #[instrument(skip(self, request), fields(request = request.kind()))]
    pub async fn apply(&mut self, request: UiRequest) -> Result<StepReport> {
        let kind = request.kind();
        self.intents.purge_expired();

        let mut work = Working::load(self.store.as_ref()).await?;
        let (item_id, plan) = match request {
            UiRequest::DragItem { item_id, target } => {
                (Some(item_id), self.drag_item(&mut work, item_id, target).await?)
            }
            UiRequest::RelocateSubtree {
                item_id,
                container_id,
                index,
            } => (
                Some(item_id),
                self.relocate_subtree(&mut work, item_id, container_id, index)
                    .await?,
            ),
            UiRequest::SetCollapsed { item_id, collapsed } => {
                (Some(item_id), self.set_collapsed(&mut work, item_id, collapsed)?)
            }
            UiRequest::InitialSync => (None, self.initial_sync(&mut work).await?),
        };

        self.finish(kind, item_id, work, plan).await
    }

    /// Commit the step's batch, then run its commands.
    async fn finish(
        &mut self,
        kind: &'static str,
        item_id: Option<ItemId>,
        work: Working,
        plan: Plan,
    ) -> Result<StepReport> {
        let batch = work.into_batch();
        let change = StoreChange::from(&batch);
        self.store.commit(batch).await?;

        let failures = execute_commands(self.host.as_ref(), &plan.commands).await;
        for failure in &failures {
            // Nothing will come back for these.
            match &failure.command {
                HostCommand::RemoveItem { item_id } => {
                    self.cascading.remove(item_id);
                }
                HostCommand::MoveItem { item_id, .. } => {
                    self.intents.discard(*item_id);
                    self.managed.forget(*item_id);
                }
            }
        }

        info!(
            event = kind,
            items_put = change.items_put.len(),
            items_deleted = change.items_deleted.len(),
            commands = plan.commands.len(),
            failed = failures.len(),
            source = ?plan.source,
            "reconciled"
        );

        Ok(StepReport {
            kind,
            item_id,
            source: plan.source,
            change,
            commands: plan.commands,
            failures,
            flattened: plan.flattened,
        })
    }
}
