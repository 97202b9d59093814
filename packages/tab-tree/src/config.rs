use std::env;

use anyhow::{Context, Result};
use chrono::Duration;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};

use crate::types::IntentTtl;

/// What removing an item does to its subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Collapsed subtrees are closed with their root; expanded ones are promoted.
    #[default]
    CascadeCollapsed,
    /// Children are always promoted.
    AlwaysPromote,
}

/// What to do when the host places an opener-created item away from its opener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenerPlacement {
    /// Keep it under the opener and move it next to the opener's subtree.
    #[default]
    Reposition,
    /// Trust the host's position and place the item by its neighbors.
    PositionOnly,
}

/// Reconciler policies and timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub creation_intent_ttl_ms: u64,
    pub drag_intent_ttl_ms: u64,
    pub pending_child_ttl_ms: u64,
    pub managed_move_timeout_ms: u64,
    pub removal_policy: RemovalPolicy,
    pub opener_placement: OpenerPlacement,
    /// Expand collapsed ancestors of an item when it becomes active.
    pub expand_on_activate: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            creation_intent_ttl_ms: 500,
            drag_intent_ttl_ms: 5_000,
            pending_child_ttl_ms: 5_000,
            managed_move_timeout_ms: 10_000,
            removal_policy: RemovalPolicy::default(),
            opener_placement: OpenerPlacement::default(),
            expand_on_activate: true,
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from `TABTREE_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Self::default();
        Ok(Self {
            creation_intent_ttl_ms: parse_var("TABTREE_CREATION_INTENT_TTL_MS")?
                .unwrap_or(defaults.creation_intent_ttl_ms),
            drag_intent_ttl_ms: parse_var("TABTREE_DRAG_INTENT_TTL_MS")?
                .unwrap_or(defaults.drag_intent_ttl_ms),
            pending_child_ttl_ms: parse_var("TABTREE_PENDING_CHILD_TTL_MS")?
                .unwrap_or(defaults.pending_child_ttl_ms),
            managed_move_timeout_ms: parse_var("TABTREE_MANAGED_MOVE_TIMEOUT_MS")?
                .unwrap_or(defaults.managed_move_timeout_ms),
            removal_policy: match env::var("TABTREE_REMOVAL_POLICY").ok().as_deref() {
                None => defaults.removal_policy,
                Some("cascade_collapsed") => RemovalPolicy::CascadeCollapsed,
                Some("always_promote") => RemovalPolicy::AlwaysPromote,
                Some(other) => anyhow::bail!("TABTREE_REMOVAL_POLICY: unknown policy {other:?}"),
            },
            opener_placement: match env::var("TABTREE_OPENER_PLACEMENT").ok().as_deref() {
                None => defaults.opener_placement,
                Some("reposition") => OpenerPlacement::Reposition,
                Some("position_only") => OpenerPlacement::PositionOnly,
                Some(other) => anyhow::bail!("TABTREE_OPENER_PLACEMENT: unknown placement {other:?}"),
            },
            expand_on_activate: parse_var("TABTREE_EXPAND_ON_ACTIVATE")?
                .unwrap_or(defaults.expand_on_activate),
        })
    }

    pub fn with_intent_ttls(mut self, creation_ms: u64, drag_ms: u64) -> Self {
        self.creation_intent_ttl_ms = creation_ms;
        self.drag_intent_ttl_ms = drag_ms;
        self
    }

    pub fn with_pending_child_ttl(mut self, ttl_ms: u64) -> Self {
        self.pending_child_ttl_ms = ttl_ms;
        self
    }

    pub fn with_managed_move_timeout(mut self, timeout_ms: u64) -> Self {
        self.managed_move_timeout_ms = timeout_ms;
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = policy;
        self
    }

    pub fn with_opener_placement(mut self, placement: OpenerPlacement) -> Self {
        self.opener_placement = placement;
        self
    }

    pub fn with_expand_on_activate(mut self, expand: bool) -> Self {
        self.expand_on_activate = expand;
        self
    }

    pub fn intent_ttl(&self, kind: IntentTtl) -> Duration {
        match kind {
            IntentTtl::Creation => millis(self.creation_intent_ttl_ms),
            IntentTtl::Drag => millis(self.drag_intent_ttl_ms),
        }
    }

    pub fn pending_child_ttl(&self) -> Duration {
        millis(self.pending_child_ttl_ms)
    }

    pub fn managed_move_timeout(&self) -> Duration {
        millis(self.managed_move_timeout_ms)
    }
}

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX / 1_000))
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a valid value, got {raw:?}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_timings() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.intent_ttl(IntentTtl::Creation), Duration::milliseconds(500));
        assert_eq!(config.intent_ttl(IntentTtl::Drag), Duration::seconds(5));
        assert_eq!(config.removal_policy, RemovalPolicy::CascadeCollapsed);
        assert_eq!(config.opener_placement, OpenerPlacement::Reposition);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ReconcilerConfig =
            serde_json::from_str(r#"{"removal_policy":"always_promote","drag_intent_ttl_ms":100}"#)
                .unwrap();
        assert_eq!(config.removal_policy, RemovalPolicy::AlwaysPromote);
        assert_eq!(config.drag_intent_ttl_ms, 100);
        assert_eq!(config.creation_intent_ttl_ms, 500);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ReconcilerConfig::default()
            .with_intent_ttls(10, 20)
            .with_opener_placement(OpenerPlacement::PositionOnly)
            .with_expand_on_activate(false);
        assert_eq!(config.intent_ttl(IntentTtl::Creation), Duration::milliseconds(10));
        assert_eq!(config.intent_ttl(IntentTtl::Drag), Duration::milliseconds(20));
        assert!(!config.expand_on_activate);
    }
}
