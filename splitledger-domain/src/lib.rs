#![warn(clippy::uninlined_format_args)]

pub mod error;
pub mod model;
pub mod services;

pub use error::{CurrencyCodeError, ExpenseValidationError, SimplificationError};
pub use model::{
    CurrencyCode, Expense, ExpenseId, ExpenseKind, ExpenseSplit, Group, GroupId, MemberBalances,
    MemberId, Money, RunId, SettlementOrigin, SettlementRecord, Transfer,
};
pub use services::{
    BalanceAccumulator, BalanceAggregator, DebtSimplifier, SettlementFingerprint, SplitBuilder,
};
