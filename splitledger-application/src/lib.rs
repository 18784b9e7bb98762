#![warn(clippy::uninlined_format_args)]

pub mod config;
pub mod error;
pub mod ledger_service;
pub mod model;
pub mod ports;
pub mod settlement_recorder;

pub use config::LedgerServiceConfig;
pub use error::{LedgerError, StoreError};
pub use ledger_service::LedgerService;
pub use model::{
    BalanceLine, BalanceSheet, ExpenseDraft, GroupBalances, Member, ProposedTransfer,
    RequestContext, RunState, SettlementOutcome, SimplificationRun, SplitRule, TransferPlan,
    TransferState,
};
pub use ports::{AppendOutcome, Clock, ExpenseStore, LedgerSnapshot, MemberRegistry};
pub use settlement_recorder::{RecordedSettlement, SettlementRecorder};
