//! # Tab Tree
//!
//! Keeps a parent/child tree of items consistent with a host that only knows
//! a flat order per container (tabs in windows).
//!
//! ## Core Concepts
//!
//! The host is the authority on **linear order**; the records are the
//! authority on **tree structure**:
//! - [`Item`] = one host item plus its tree overlay (`parent_id`, `tree_order`)
//! - [`HostEvent`] = facts the host reports (created, moved, removed, ...)
//! - [`UiRequest`] = structural changes asked for by the tree view
//! - [`HostCommand`] = corrective instructions sent back to the host
//!
//! ## Architecture
//!
//! ```text
//! Host callbacks        Tree view
//!     │                     │
//!     ▼ emit()              ▼ drag_item() / relocate_subtree()
//! ReconcilerHandle ── FIFO queue ──► worker
//!     │                                │
//!     │ register_*_intent()            ▼
//!     └──► IntentRegistry ◄──── Reconciler step
//!          ManagedMoveSet              │
//!                                      ├─► load records, refresh positions
//!                                      ├─► inference (pure)
//!                                      ├─► RecordStore::commit(batch)
//!                                      └─► HostPort commands
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One writer** - Only reconciliation steps write records, one at a time
//! 2. **Flattened pre-order** - Depth-first pre-order of the tree matches host order
//! 3. **One batch per step** - Each step commits its record edits atomically
//! 4. **Commands after commit** - Host commands run only after the batch lands

pub mod clock;
pub mod commands;
pub mod config;
pub mod effects;
pub mod error;
pub mod events;
pub mod inference;
pub mod intents;
pub mod managed;
pub mod order_key;
pub mod reconciler;
pub mod runtime;
pub mod store;
pub mod traits;
pub mod tree;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use commands::HostCommand;
pub use config::{OpenerPlacement, ReconcilerConfig, RemovalPolicy};
pub use effects::CommandFailure;
pub use error::{ReconcileError, Result};
pub use events::{HostEvent, ItemChanges, UiRequest};
pub use inference::{infer_create, infer_move, infer_remove, CreateInference, MoveInference, RemoveInference};
pub use intents::IntentRegistry;
pub use managed::ManagedMoveSet;
pub use order_key::{key_between, keys_between, OrderKeyError};
pub use reconciler::{Reconciler, StepReport};
pub use runtime::{spawn, ReconcilerHandle};
pub use store::MemoryStore;
pub use traits::{HostPort, RecordStore, StoreChange, WriteBatch};
pub use tree::{build_tree, expected_linear_order, flatten_tree, TreeIndex, TreeNode};
pub use types::*;
