//! Execution of corrective host commands.
//!
//! Commands run after the step's batch is committed. A rejected command is
//! logged and swallowed: the records stay as written and the next host
//! notification for the item re-triggers reconciliation.

use tracing::{debug, warn};

use crate::commands::HostCommand;
use crate::traits::HostPort;

/// A command the host rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub command: HostCommand,
    pub error: String,
}

/// Run `commands` in order, continuing past failures.
pub async fn execute_commands(host: &dyn HostPort, commands: &[HostCommand]) -> Vec<CommandFailure> {
    let mut failures = Vec::new();
    for command in commands {
        let result = match command {
            HostCommand::MoveItem { item_id, target } => host.move_item(*item_id, *target).await,
            HostCommand::RemoveItem { item_id } => host.remove_item(*item_id).await,
        };
        match result {
            Ok(()) => debug!(%command, "host command executed"),
            Err(e) => {
                warn!(%command, error = %e, "host command failed");
                failures.push(CommandFailure {
                    command: command.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    failures
}
