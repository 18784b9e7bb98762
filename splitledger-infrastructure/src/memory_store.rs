use dashmap::{DashMap, mapref::entry::Entry};
use fxhash::FxHashMap;
use splitledger_application::{AppendOutcome, ExpenseStore, LedgerSnapshot, StoreError};
use splitledger_domain::{
    CurrencyCode, Expense, ExpenseId, Group, GroupId, MemberId, SettlementFingerprint,
};

#[derive(Debug)]
struct GroupLedger {
    group: Group,
    expenses: Vec<Expense>,
    /// Settlement fingerprint -> position in `expenses`.
    fingerprints: FxHashMap<SettlementFingerprint, usize>,
}

impl GroupLedger {
    fn new(group: Group) -> Self {
        Self {
            group,
            expenses: Vec::new(),
            fingerprints: FxHashMap::default(),
        }
    }

    fn settlement(&self, fingerprint: &SettlementFingerprint) -> Option<&Expense> {
        self.fingerprints
            .get(fingerprint)
            .and_then(|&position| self.expenses.get(position))
    }

    fn bump_version(&mut self) -> u64 {
        self.group.version += 1;
        self.group.version
    }
}

/// Process-local ledger. Every group lives behind its own map shard lock, so
/// an append is atomic with respect to other calls on the same group.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    groups: DashMap<GroupId, GroupLedger>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_group(&self, group_id: GroupId, currency: CurrencyCode) -> Result<(), StoreError> {
        match self.groups.entry(group_id) {
            Entry::Occupied(_) => Err(StoreError::GroupExists(group_id)),
            Entry::Vacant(entry) => {
                entry.insert(GroupLedger::new(Group::new(group_id, currency, [])));
                tracing::info!(group_id = %group_id, currency = %currency, "Group created");
                Ok(())
            }
        }
    }

    /// Adds (or re-activates) a member. Returns the group version afterwards.
    pub fn add_member(&self, group_id: GroupId, member: MemberId) -> Result<u64, StoreError> {
        self.with_group_mut(group_id, |ledger| {
            ledger.group.former_members.remove(&member);
            if ledger.group.members.insert(member) {
                let version = ledger.bump_version();
                tracing::debug!(group_id = %group_id, member = %member, version, "Member added");
            }
            Ok(ledger.group.version)
        })
    }

    /// Moves a member to the former-member set; their history stays valid.
    pub fn remove_member(&self, group_id: GroupId, member: MemberId) -> Result<u64, StoreError> {
        self.with_group_mut(group_id, |ledger| {
            if ledger.group.members.remove(&member) {
                ledger.group.former_members.insert(member);
                let version = ledger.bump_version();
                tracing::debug!(group_id = %group_id, member = %member, version, "Member removed");
            }
            Ok(ledger.group.version)
        })
    }

    pub fn expense_count(&self, group_id: GroupId) -> Result<usize, StoreError> {
        self.with_group(group_id, |ledger| ledger.expenses.len())
    }

    fn with_group<T>(
        &self,
        group_id: GroupId,
        f: impl FnOnce(&GroupLedger) -> T,
    ) -> Result<T, StoreError> {
        self.groups
            .get(&group_id)
            .map(|ledger| f(&ledger))
            .ok_or(StoreError::GroupNotFound(group_id))
    }

    fn with_group_mut<T>(
        &self,
        group_id: GroupId,
        f: impl FnOnce(&mut GroupLedger) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut ledger = self
            .groups
            .get_mut(&group_id)
            .ok_or(StoreError::GroupNotFound(group_id))?;
        f(&mut ledger)
    }
}

impl ExpenseStore for InMemoryLedgerStore {
    fn load_snapshot(&self, group_id: GroupId) -> Result<LedgerSnapshot, StoreError> {
        self.with_group(group_id, |ledger| LedgerSnapshot {
            group: ledger.group.clone(),
            expenses: ledger.expenses.clone(),
        })
    }

    fn find_by_fingerprint(
        &self,
        group_id: GroupId,
        fingerprint: &SettlementFingerprint,
    ) -> Result<Option<Expense>, StoreError> {
        self.with_group(group_id, |ledger| ledger.settlement(fingerprint).cloned())
    }

    fn find_expense(
        &self,
        group_id: GroupId,
        expense_id: ExpenseId,
    ) -> Result<Option<Expense>, StoreError> {
        self.with_group(group_id, |ledger| {
            ledger
                .expenses
                .iter()
                .find(|expense| expense.id == expense_id)
                .cloned()
        })
    }

    fn append(
        &self,
        group_id: GroupId,
        expected_version: u64,
        expense: Expense,
    ) -> Result<AppendOutcome, StoreError> {
        self.with_group_mut(group_id, |ledger| {
            let fingerprint = expense.settlement.map(|origin| origin.fingerprint);
            if let Some(existing) = fingerprint.and_then(|fp| ledger.settlement(&fp)) {
                return Ok(AppendOutcome::Duplicate(Box::new(existing.clone())));
            }

            if ledger.group.version != expected_version {
                return Err(StoreError::VersionConflict {
                    group_id,
                    expected: expected_version,
                    actual: ledger.group.version,
                });
            }

            if let Some(fingerprint) = fingerprint {
                ledger.fingerprints.insert(fingerprint, ledger.expenses.len());
            }
            ledger.expenses.push(expense);
            let version = ledger.bump_version();
            Ok(AppendOutcome::Appended { version })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rstest::{fixture, rstest};
    use splitledger_domain::{
        ExpenseKind, ExpenseSplit, Money, RunId, SettlementOrigin, Transfer,
    };

    const GROUP: GroupId = GroupId(7);
    const A: MemberId = MemberId(1);
    const B: MemberId = MemberId(2);

    #[fixture]
    fn store() -> InMemoryLedgerStore {
        let store = InMemoryLedgerStore::new();
        store.create_group(GROUP, CurrencyCode::INR).expect("create group");
        store.add_member(GROUP, A).expect("add A");
        store.add_member(GROUP, B).expect("add B");
        store
    }

    fn expense(amount: i64) -> Expense {
        Expense {
            id: ExpenseId::new_v4(),
            group_id: GROUP,
            kind: ExpenseKind::Expense,
            payer: A,
            total: Money::from_i64(amount),
            currency: CurrencyCode::INR,
            splits: vec![ExpenseSplit::new(B, Money::from_i64(amount))],
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            recorded_by: A,
            corrects: None,
            settlement: None,
        }
    }

    fn settlement(run_id: RunId, amount: i64) -> Expense {
        let transfer = Transfer {
            from: B,
            to: A,
            amount: Money::from_i64(amount),
        };
        Expense {
            kind: ExpenseKind::Settlement,
            payer: B,
            splits: vec![ExpenseSplit::new(A, transfer.amount)],
            settlement: Some(SettlementOrigin {
                run_id,
                fingerprint: SettlementFingerprint::compute(GROUP, run_id, &transfer),
            }),
            ..expense(amount)
        }
    }

    #[rstest]
    fn roster_changes_bump_version(store: InMemoryLedgerStore) {
        assert_eq!(store.load_snapshot(GROUP).map(|s| s.group.version), Ok(2));
        assert_eq!(store.add_member(GROUP, A), Ok(2));
        assert_eq!(store.remove_member(GROUP, B), Ok(3));

        let group = store.load_snapshot(GROUP).expect("snapshot").group;
        assert!(!group.is_active_member(B));
        assert!(group.is_known_member(B));
    }

    #[rstest]
    fn append_checks_version(store: InMemoryLedgerStore) {
        assert_eq!(
            store.append(GROUP, 2, expense(100)),
            Ok(AppendOutcome::Appended { version: 3 })
        );
        assert_eq!(
            store.append(GROUP, 2, expense(50)),
            Err(StoreError::VersionConflict {
                group_id: GROUP,
                expected: 2,
                actual: 3,
            })
        );
        assert_eq!(store.expense_count(GROUP), Ok(1));
    }

    #[rstest]
    fn duplicate_fingerprint_wins_over_version(store: InMemoryLedgerStore) {
        let run_id = RunId::new_v4();
        let first = settlement(run_id, 100);
        store.append(GROUP, 2, first.clone()).expect("append");

        assert_eq!(
            store.append(GROUP, 2, settlement(run_id, 100)),
            Ok(AppendOutcome::Duplicate(Box::new(first.clone())))
        );
        assert_eq!(store.expense_count(GROUP), Ok(1));

        let fingerprint = first.settlement.map(|origin| origin.fingerprint).expect("origin");
        assert_eq!(store.find_by_fingerprint(GROUP, &fingerprint), Ok(Some(first.clone())));
        assert_eq!(store.find_expense(GROUP, first.id), Ok(Some(first)));
    }

    #[rstest]
    fn unknown_group_is_reported(store: InMemoryLedgerStore) {
        assert_eq!(
            store.load_snapshot(GroupId(99)),
            Err(StoreError::GroupNotFound(GroupId(99)))
        );
        assert_eq!(
            store.create_group(GROUP, CurrencyCode::INR),
            Err(StoreError::GroupExists(GROUP))
        );
    }

    #[rstest]
    fn concurrent_duplicates_append_once(store: InMemoryLedgerStore) {
        let run_id = RunId::new_v4();
        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| store.append(GROUP, 2, settlement(run_id, 100))))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread"))
                .collect()
        });

        let appended = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Ok(AppendOutcome::Appended { .. })))
            .count();
        assert_eq!(appended, 1);
        assert!(
            outcomes
                .iter()
                .all(|outcome| matches!(outcome, Ok(_)))
        );
        assert_eq!(store.expense_count(GROUP), Ok(1));
    }
}
