// src/backend/services/scheduler.rs
// Periodic re-evaluation of time-based conditions, driven by an interval
// timer or by the admin on demand.

use crate::{
    error::VaultError,
    metrics,
    models::common::{PrincipalId, Timestamp},
    services::policy_service::refresh_policy,
    storage,
};
use candid::CandidType;
use serde::{Deserialize, Serialize};

#[derive(CandidType, Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evaluated: u64,
    pub newly_disclosed: u64,
    pub failed: u64,
}

/// Re-evaluates every policy that has conditions and does not disclose yet.
/// A policy that fails to persist is logged and skipped.
pub fn run_condition_sweep(actor: PrincipalId, now: Timestamp) -> Result<SweepReport, VaultError> {
    crate::log_info!("Condition sweep started at {}", now);
    let pending = storage::policies::find_policies(|p| !p.conditions_status && !p.conditions.is_empty());

    let mut report = SweepReport::default();
    for policy in pending {
        let id = policy.id;
        report.evaluated += 1;
        match refresh_policy(policy, actor, now) {
            Ok(refreshed) if refreshed.conditions_status => report.newly_disclosed += 1,
            Ok(_) => {}
            Err(e) => {
                report.failed += 1;
                crate::log_error!("Sweep failed to refresh policy {}: {}", id, e);
            }
        }
    }

    metrics::record_sweep(now)?;
    crate::log_info!(
        "Condition sweep finished: evaluated={}, newly_disclosed={}, failed={}",
        report.evaluated,
        report.newly_disclosed,
        report.failed
    );
    Ok(report)
}
