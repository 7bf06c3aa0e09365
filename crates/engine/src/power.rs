//! Wake lock guard bounding a batch's execution window.

use crate::traits::PowerOps;
use crate::types::ScheduleId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard ceiling for one acquisition, whatever the batch size.
pub const WAKE_LOCK_CEILING: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeLockPolicy {
    #[serde(default = "true_default")]
    pub enabled: bool,
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn true_default() -> bool {
    true
}

fn default_timeout_minutes() -> u64 {
    60
}

fn default_tag() -> String {
    "schedctl:scheduled-backup".to_string()
}

impl Default for WakeLockPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_minutes: default_timeout_minutes(),
            tag: default_tag(),
        }
    }
}

impl WakeLockPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60)).min(WAKE_LOCK_CEILING)
    }

    /// Lock name for one run. Kernel wake locks are keyed by name, so
    /// concurrent runs must never share one.
    pub fn run_tag(&self, schedule_id: ScheduleId, run_id: &str) -> String {
        format!("{}:{}:{}", self.tag, schedule_id, run_id)
    }
}

/// Held wake lock. Released exactly once, on drop.
pub struct WakeGuard<'a> {
    power: &'a dyn PowerOps,
    tag: String,
}

impl<'a> WakeGuard<'a> {
    /// Acquire `tag` according to `policy`. Returns `None` when the policy
    /// is disabled or the acquisition failed; a run proceeds either way.
    pub fn acquire(power: &'a dyn PowerOps, policy: &WakeLockPolicy, tag: String) -> Option<Self> {
        if !policy.enabled {
            tracing::debug!("wake lock disabled by policy");
            return None;
        }
        match power.acquire_partial(&tag, policy.timeout()) {
            Ok(()) => {
                tracing::info!(tag = %tag, timeout_s = policy.timeout().as_secs(), "wake lock acquired");
                Some(Self { power, tag })
            }
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "wake lock acquisition failed");
                None
            }
        }
    }
}

impl Drop for WakeGuard<'_> {
    fn drop(&mut self) {
        match self.power.release(&self.tag) {
            Ok(()) => tracing::info!(tag = %self.tag, "wake lock released"),
            Err(e) => tracing::warn!(tag = %self.tag, error = %e, "wake lock release failed"),
        }
    }
}
