use crate::model::{CurrencyCode, ExpenseId, GroupId, MemberId, Money};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid currency code '{0}' (expected three upper-case letters)")]
pub struct CurrencyCodeError(pub String);

/// Rejections raised while building, validating or folding expenses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpenseValidationError {
    #[error("expense {expense_id}: splits sum to {split_sum} but the total is {total}")]
    ImbalancedSplit {
        expense_id: ExpenseId,
        total: Money,
        split_sum: i128,
    },
    #[error("expense {expense_id} is in {found} but the group uses {expected}")]
    CurrencyMismatch {
        expense_id: ExpenseId,
        expected: CurrencyCode,
        found: CurrencyCode,
    },
    #[error("expense {expense_id} belongs to group {found}, not group {expected}")]
    WrongGroup {
        expense_id: ExpenseId,
        expected: GroupId,
        found: GroupId,
    },
    #[error("expense {expense_id}: member {member} is not part of the group")]
    UnknownMember {
        expense_id: ExpenseId,
        member: MemberId,
    },
    #[error("expense {expense_id} has no splits")]
    EmptySplits { expense_id: ExpenseId },
    #[error("expense {expense_id}: amount out of range")]
    AmountOverflow { expense_id: ExpenseId },
    #[error("balance of member {member} does not fit in a signed 64-bit amount")]
    BalanceOutOfRange { member: MemberId },
    #[error("a split needs at least one participant")]
    NoParticipants,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimplificationError {
    #[error("balances must sum to zero (found {0})")]
    ImbalancedTotal(i128),
    #[error("balance magnitude out of range")]
    Overflow,
}
