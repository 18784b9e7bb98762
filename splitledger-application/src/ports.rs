use crate::{error::StoreError, model::Member};
use chrono::{DateTime, Utc};
use splitledger_domain::{Expense, ExpenseId, Group, GroupId, SettlementFingerprint};

/// Group metadata and its full expense history read at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub group: Group,
    pub expenses: Vec<Expense>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended { version: u64 },
    /// A settlement with the same fingerprint is already in the ledger;
    /// nothing was written.
    Duplicate(Box<Expense>),
}

pub trait ExpenseStore: Send + Sync {
    fn load_snapshot(&self, group_id: GroupId) -> Result<LedgerSnapshot, StoreError>;

    fn find_by_fingerprint(
        &self,
        group_id: GroupId,
        fingerprint: &SettlementFingerprint,
    ) -> Result<Option<Expense>, StoreError>;

    fn find_expense(
        &self,
        group_id: GroupId,
        expense_id: ExpenseId,
    ) -> Result<Option<Expense>, StoreError>;

    /// Appends `expense` if the group is still at `expected_version`.
    ///
    /// Implementations must run the fingerprint lookup, the version check,
    /// the push and the version increment as one atomic step. A version
    /// mismatch is reported as [`StoreError::VersionConflict`].
    fn append(
        &self,
        group_id: GroupId,
        expected_version: u64,
        expense: Expense,
    ) -> Result<AppendOutcome, StoreError>;
}

pub trait MemberRegistry: Send + Sync {
    fn list_members(&self, group_id: GroupId) -> Result<Vec<Member>, StoreError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
