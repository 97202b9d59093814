use thiserror::Error;

use crate::order_key::OrderKeyError;
use crate::types::{ContainerId, ItemId};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store failure: {0}")]
    Store(#[from] anyhow::Error),

    #[error("host query failed: {0}")]
    HostQuery(String),

    #[error("reconciler queue closed")]
    QueueClosed,

    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    #[error("unknown container {0}")]
    UnknownContainer(ContainerId),

    #[error("invalid drop: {0}")]
    InvalidDrop(String),

    #[error(transparent)]
    OrderKey(#[from] OrderKeyError),
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
