use crate::model::{RunState, TransferState};
use splitledger_domain::{
    ExpenseId, ExpenseValidationError, GroupId, MemberId, Money, RunId, SettlementFingerprint,
    SettlementRecord, SimplificationError,
};
use thiserror::Error;

/// Failures reported by store and registry adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("group {0} does not exist")]
    GroupNotFound(GroupId),
    #[error("group {0} already exists")]
    GroupExists(GroupId),
    #[error("group {group_id} is at version {actual}, expected {expected}")]
    VersionConflict {
        group_id: GroupId,
        expected: u64,
        actual: u64,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error(transparent)]
    InvalidExpense(#[from] ExpenseValidationError),
    #[error("group {group_id} has no active members")]
    InsufficientData { group_id: GroupId },
    #[error("member {actor} is not part of group {group_id}")]
    UnknownActor { group_id: GroupId, actor: MemberId },
    #[error(
        "group {group_id} changed since version {captured_version} (now {current_version}); refresh and retry"
    )]
    StaleSnapshot {
        group_id: GroupId,
        captured_version: u64,
        current_version: u64,
    },
    #[error("settlement already recorded as expense {}", .0.expense().id)]
    AlreadyRecorded(Box<SettlementRecord>),
    #[error(transparent)]
    Simplification(#[from] SimplificationError),
    #[error(transparent)]
    Store(StoreError),
    #[error("idempotency key {supplied} does not match the settlement fingerprint {expected}")]
    FingerprintMismatch {
        expected: SettlementFingerprint,
        supplied: SettlementFingerprint,
    },
    #[error("transfer of {amount} from {from} to {to} cannot be recorded")]
    InvalidTransfer {
        from: MemberId,
        to: MemberId,
        amount: Money,
    },
    #[error("run {run_id} has no transfer #{index}")]
    UnknownTransfer { run_id: RunId, index: usize },
    #[error("transfer #{index} of run {run_id} is {state:?}, not pending")]
    TransferNotPending {
        run_id: RunId,
        index: usize,
        state: TransferState,
    },
    #[error("run {run_id} is {state:?}, not presented")]
    RunNotPresented { run_id: RunId, state: RunState },
    #[error("expense {expense_id} not found in group {group_id}")]
    ExpenseNotFound {
        group_id: GroupId,
        expense_id: ExpenseId,
    },
    #[error("expense {expense_id} was already corrected by {correction}")]
    AlreadyCorrected {
        expense_id: ExpenseId,
        correction: ExpenseId,
    },
    #[error("expense {expense_id} is itself a correction")]
    CannotCorrectCorrection { expense_id: ExpenseId },
}

impl LedgerError {
    /// Only a stale snapshot is resolved by recomputing and trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StaleSnapshot { .. })
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict {
                group_id,
                expected,
                actual,
            } => LedgerError::StaleSnapshot {
                group_id,
                captured_version: expected,
                current_version: actual,
            },
            other => LedgerError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn version_conflict_becomes_stale_snapshot() {
        let err = LedgerError::from(StoreError::VersionConflict {
            group_id: GroupId(7),
            expected: 3,
            actual: 5,
        });
        assert_eq!(
            err,
            LedgerError::StaleSnapshot {
                group_id: GroupId(7),
                captured_version: 3,
                current_version: 5,
            }
        );
        assert!(err.is_retryable());
    }

    #[rstest]
    #[case::missing_group(LedgerError::from(StoreError::GroupNotFound(GroupId(1))))]
    #[case::insufficient(LedgerError::InsufficientData { group_id: GroupId(1) })]
    #[case::imbalanced(LedgerError::Simplification(SimplificationError::ImbalancedTotal(1)))]
    #[case::validation(LedgerError::from(ExpenseValidationError::NoParticipants))]
    fn other_errors_are_not_retryable(#[case] err: LedgerError) {
        assert!(!err.is_retryable());
    }

    #[test]
    fn stale_snapshot_message_asks_for_refresh() {
        let err = LedgerError::StaleSnapshot {
            group_id: GroupId(7),
            captured_version: 3,
            current_version: 4,
        };
        assert_eq!(
            err.to_string(),
            "group 7 changed since version 3 (now 4); refresh and retry"
        );
    }
}
