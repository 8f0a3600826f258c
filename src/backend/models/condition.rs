// src/backend/models/condition.rs
use crate::models::common::{ConditionId, PrincipalId, Timestamp};
use candid::CandidType;
use serde::{Deserialize, Serialize};

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Copy)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Copy, Default)]
pub enum Vote {
    #[default]
    Unset,
    Confirmed,
    Declined,
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Validator {
    pub id: PrincipalId,
    pub vote: Vote,
}

/// Satisfied once the owner has not logged in for the given number of days.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct LastLogin {
    pub id: ConditionId,
    pub number_of_days_since_last_login: u64,
    pub condition_status: bool,
}

/// Satisfied once the given instant has passed.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FixedDateTime {
    pub id: ConditionId,
    pub datetime: Timestamp,
    pub condition_status: bool,
}

/// Satisfied once `quorum` validators have confirmed.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct XOutOfY {
    pub id: ConditionId,
    pub quorum: u32,
    pub validators: Vec<Validator>,
    pub condition_status: bool,
}

impl XOutOfY {
    pub fn confirmations(&self) -> usize {
        self.validators
            .iter()
            .filter(|v| v.vote == Vote::Confirmed)
            .count()
    }

    pub fn has_validator(&self, principal: &PrincipalId) -> bool {
        self.validators.iter().any(|v| v.id == *principal)
    }
}

#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    LastLogin(LastLogin),
    FixedDateTime(FixedDateTime),
    XOutOfY(XOutOfY),
}

impl Condition {
    pub fn id(&self) -> ConditionId {
        match self {
            Condition::LastLogin(c) => c.id,
            Condition::FixedDateTime(c) => c.id,
            Condition::XOutOfY(c) => c.id,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        match self {
            Condition::LastLogin(c) => c.condition_status,
            Condition::FixedDateTime(c) => c.condition_status,
            Condition::XOutOfY(c) => c.condition_status,
        }
    }

    /// Sets the cached status to satisfied. Status never moves back to pending.
    pub fn mark_satisfied(&mut self) {
        match self {
            Condition::LastLogin(c) => c.condition_status = true,
            Condition::FixedDateTime(c) => c.condition_status = true,
            Condition::XOutOfY(c) => c.condition_status = true,
        }
    }

    pub fn as_x_out_of_y(&self) -> Option<&XOutOfY> {
        match self {
            Condition::XOutOfY(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_x_out_of_y_mut(&mut self) -> Option<&mut XOutOfY> {
        match self {
            Condition::XOutOfY(c) => Some(c),
            _ => None,
        }
    }
}

/// Condition as submitted by the owner on policy update. Ids and cached
/// status are assigned by the backend.
#[derive(CandidType, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub enum ConditionArgs {
    LastLogin { number_of_days_since_last_login: u64 },
    FixedDateTime { datetime: Timestamp },
    XOutOfY { quorum: u32, validators: Vec<PrincipalId> },
}

impl ConditionArgs {
    pub fn into_condition(self, id: ConditionId) -> Condition {
        match self {
            ConditionArgs::LastLogin { number_of_days_since_last_login } => Condition::LastLogin(LastLogin {
                id,
                number_of_days_since_last_login,
                condition_status: false,
            }),
            ConditionArgs::FixedDateTime { datetime } => Condition::FixedDateTime(FixedDateTime {
                id,
                datetime,
                condition_status: false,
            }),
            ConditionArgs::XOutOfY { quorum, validators } => Condition::XOutOfY(XOutOfY {
                id,
                quorum,
                validators: validators
                    .into_iter()
                    .map(|id| Validator { id, vote: Vote::Unset })
                    .collect(),
                condition_status: false,
            }),
        }
    }
}
