// src/backend/services/condition_engine.rs
//! Evaluation and caching of condition status.
//!
//! Every condition caches its own status, and a policy caches the aggregate
//! over its conditions. Condition status only ever moves from pending to
//! satisfied. The aggregate is recomputed by explicit evaluation, never on a
//! plain read.

use crate::error::VaultError;
use crate::models::common::{ConditionId, PrincipalId, Timestamp, NANOS_PER_DAY};
use crate::models::condition::{Condition, ConditionArgs, LogicalOperator, Vote};
use crate::models::policy::Policy;
use std::collections::BTreeSet;

/// Inputs that time-based conditions are evaluated against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvaluationContext {
    pub now: Timestamp,
    pub owner_last_login: Timestamp,
}

/// Result of evaluating one policy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvaluationOutcome {
    pub newly_satisfied: Vec<ConditionId>,
    pub status_before: bool,
    pub status_after: bool,
}

impl EvaluationOutcome {
    pub fn changed(&self) -> bool {
        !self.newly_satisfied.is_empty() || self.status_before != self.status_after
    }
}

/// Re-evaluates a single condition. Returns true when it moved to satisfied.
pub fn evaluate_condition(condition: &mut Condition, ctx: &EvaluationContext) -> bool {
    if condition.is_satisfied() {
        return false;
    }
    let satisfied = match condition {
        Condition::LastLogin(c) => {
            let threshold = c.number_of_days_since_last_login.saturating_mul(NANOS_PER_DAY);
            ctx.now.saturating_sub(ctx.owner_last_login) >= threshold
        }
        Condition::FixedDateTime(c) => ctx.now >= c.datetime,
        Condition::XOutOfY(c) => c.confirmations() >= c.quorum as usize,
    };
    if satisfied {
        condition.mark_satisfied();
    }
    satisfied
}

/// Combines cached condition statuses into the policy-level flag.
///
/// No conditions never discloses. A single condition is its own aggregate. A
/// missing operator over several conditions is rejected on write; should one
/// reach here it aggregates as `And`.
pub fn aggregate(conditions: &[Condition], operator: Option<LogicalOperator>) -> bool {
    match conditions {
        [] => false,
        [single] => single.is_satisfied(),
        _ => match operator.unwrap_or(LogicalOperator::And) {
            LogicalOperator::And => conditions.iter().all(Condition::is_satisfied),
            LogicalOperator::Or => conditions.iter().any(Condition::is_satisfied),
        },
    }
}

/// Re-evaluates every condition of `policy` and refreshes its cached aggregate.
pub fn evaluate_policy(policy: &mut Policy, ctx: &EvaluationContext) -> EvaluationOutcome {
    let status_before = policy.conditions_status;
    let newly_satisfied = policy
        .conditions
        .iter_mut()
        .filter_map(|condition| evaluate_condition(condition, ctx).then(|| condition.id()))
        .collect();
    policy.conditions_status = aggregate(&policy.conditions, policy.conditions_logical_operator);
    EvaluationOutcome {
        newly_satisfied,
        status_before,
        status_after: policy.conditions_status,
    }
}

/// Checks a condition set submitted for `owner`'s policy.
pub fn validate_conditions(
    conditions: &[ConditionArgs],
    operator: Option<LogicalOperator>,
    owner: &PrincipalId,
) -> Result<(), VaultError> {
    if operator.is_some() && conditions.len() < 2 {
        return Err(VaultError::LogicalOperatorWithLessThanTwoConditions);
    }
    if operator.is_none() && conditions.len() >= 2 {
        return Err(VaultError::InvalidCondition(
            "a logical operator is required for two or more conditions".to_string(),
        ));
    }

    for condition in conditions {
        if let ConditionArgs::XOutOfY { quorum, validators } = condition {
            if *quorum == 0 {
                return Err(VaultError::InvalidCondition("quorum must be at least 1".to_string()));
            }
            if *quorum as usize > validators.len() {
                return Err(VaultError::InvalidCondition(format!(
                    "quorum {} exceeds validator count {}",
                    quorum,
                    validators.len()
                )));
            }
            let mut seen = BTreeSet::new();
            for validator in validators {
                if validator == owner {
                    return Err(VaultError::InvalidCondition(
                        "the policy owner cannot be a validator".to_string(),
                    ));
                }
                if *validator == PrincipalId::anonymous() {
                    return Err(VaultError::InvalidCondition(
                        "the anonymous principal cannot be a validator".to_string(),
                    ));
                }
                if !seen.insert(*validator) {
                    return Err(VaultError::InvalidCondition(format!(
                        "validator {} listed twice",
                        validator
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Records `validator`'s vote on every XOutOfY condition naming them and
/// re-evaluates those conditions. Returns the ids that became satisfied.
///
/// Votes keep changing after quorum, but a satisfied condition stays so.
pub fn cast_vote(
    policy: &mut Policy,
    validator: &PrincipalId,
    vote: Vote,
) -> Result<Vec<ConditionId>, VaultError> {
    if vote == Vote::Unset {
        return Err(VaultError::InvalidInput("a vote must confirm or decline".to_string()));
    }

    let mut touched = false;
    let mut newly_satisfied = Vec::new();
    for condition in policy.conditions.iter_mut() {
        let Some(x_out_of_y) = condition.as_x_out_of_y_mut() else {
            continue;
        };
        let Some(slot) = x_out_of_y.validators.iter_mut().find(|v| v.id == *validator) else {
            continue;
        };
        slot.vote = vote;
        touched = true;
        if !x_out_of_y.condition_status && x_out_of_y.confirmations() >= x_out_of_y.quorum as usize {
            x_out_of_y.condition_status = true;
            newly_satisfied.push(x_out_of_y.id);
        }
    }

    if !touched {
        return Err(VaultError::NotAuthorized(
            "caller is not a validator of this policy".to_string(),
        ));
    }
    policy.conditions_status = aggregate(&policy.conditions, policy.conditions_logical_operator);
    Ok(newly_satisfied)
}

/// Folds the stored copy of a policy into one about to be written:
/// a condition satisfied in `stored` stays satisfied in `incoming`.
/// Conditions are matched by id, so a wholesale replacement is unaffected.
pub fn merge_status(stored: &Policy, incoming: &mut Policy) {
    let satisfied: BTreeSet<ConditionId> = stored
        .conditions
        .iter()
        .filter(|c| c.is_satisfied())
        .map(Condition::id)
        .collect();
    if satisfied.is_empty() {
        return;
    }
    for condition in incoming.conditions.iter_mut() {
        if satisfied.contains(&condition.id()) {
            condition.mark_satisfied();
        }
    }
    incoming.conditions_status = aggregate(&incoming.conditions, incoming.conditions_logical_operator);
}
