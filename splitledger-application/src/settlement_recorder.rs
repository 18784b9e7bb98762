use crate::{
    error::{LedgerError, StoreError},
    model::RequestContext,
    ports::{AppendOutcome, Clock, ExpenseStore, LedgerSnapshot},
};
use splitledger_domain::{
    BalanceAggregator, CurrencyCode, Expense, ExpenseId, ExpenseKind, ExpenseSplit, GroupId,
    RunId, SettlementFingerprint, SettlementOrigin, SettlementRecord, Transfer,
};

/// A settlement this call appended, with the group version its append produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSettlement {
    pub record: SettlementRecord,
    pub version: u64,
}

/// Turns a confirmed transfer into a ledger entry, at most once per
/// fingerprint.
#[derive(Clone, Copy)]
pub struct SettlementRecorder<'a> {
    store: &'a dyn ExpenseStore,
    clock: &'a dyn Clock,
}

impl<'a> SettlementRecorder<'a> {
    pub fn new(store: &'a dyn ExpenseStore, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Appends the settlement for `transfer`, denominated in `currency`,
    /// against `captured_version`.
    ///
    /// Errors, in the order they are checked: `FingerprintMismatch` when
    /// `idempotency_key` is not the transfer's fingerprint, `AlreadyRecorded`
    /// when the fingerprint is already in the ledger, `StaleSnapshot` when the
    /// group moved past `captured_version`, then actor, transfer and expense
    /// validation (`CurrencyMismatch` when `currency` is not the group's).
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        ctx: &RequestContext,
        group_id: GroupId,
        run_id: RunId,
        captured_version: u64,
        transfer: &Transfer,
        currency: CurrencyCode,
        idempotency_key: &SettlementFingerprint,
    ) -> Result<RecordedSettlement, LedgerError> {
        let fingerprint = SettlementFingerprint::compute(group_id, run_id, transfer);
        if fingerprint != *idempotency_key {
            return Err(LedgerError::FingerprintMismatch {
                expected: fingerprint,
                supplied: *idempotency_key,
            });
        }

        if let Some(existing) = self.store.find_by_fingerprint(group_id, &fingerprint)? {
            return Err(already_recorded(existing, &fingerprint));
        }

        let LedgerSnapshot { group, expenses } = self.store.load_snapshot(group_id)?;
        if group.version != captured_version {
            return Err(LedgerError::StaleSnapshot {
                group_id,
                captured_version,
                current_version: group.version,
            });
        }

        ctx.ensure_member_of(&group)?;
        if !transfer.amount.is_positive() || transfer.from == transfer.to {
            return Err(LedgerError::InvalidTransfer {
                from: transfer.from,
                to: transfer.to,
                amount: transfer.amount,
            });
        }

        let origin = SettlementOrigin {
            run_id,
            fingerprint,
        };
        let expense = Expense {
            id: ExpenseId::new_v4(),
            group_id,
            kind: ExpenseKind::Settlement,
            payer: transfer.from,
            total: transfer.amount,
            currency,
            splits: vec![ExpenseSplit::new(transfer.to, transfer.amount)],
            created_at: self.clock.now(),
            recorded_by: ctx.actor,
            corrects: None,
            settlement: Some(origin),
        };
        expense.validate_against(&group)?;
        BalanceAggregator.ensure_appendable(&expenses, &expense)?;

        match self
            .store
            .append(group_id, captured_version, expense.clone())?
        {
            AppendOutcome::Appended { version } => {
                tracing::info!(
                    group_id = %group_id,
                    run_id = %run_id,
                    expense_id = %expense.id,
                    from = %transfer.from,
                    to = %transfer.to,
                    amount = %transfer.amount,
                    actor = %ctx.actor,
                    version,
                    "Settlement recorded"
                );
                let record = SettlementRecord::from_expense(expense).ok_or_else(|| {
                    LedgerError::Store(StoreError::Unavailable(
                        "settlement entry lost its origin".to_owned(),
                    ))
                })?;
                Ok(RecordedSettlement { record, version })
            }
            AppendOutcome::Duplicate(existing) => Err(already_recorded(*existing, &fingerprint)),
        }
    }
}

fn already_recorded(existing: Expense, fingerprint: &SettlementFingerprint) -> LedgerError {
    tracing::debug!(
        expense_id = %existing.id,
        fingerprint = %fingerprint,
        "Settlement fingerprint already in ledger"
    );
    match SettlementRecord::from_expense(existing) {
        Some(record) => LedgerError::AlreadyRecorded(Box::new(record)),
        None => LedgerError::Store(StoreError::Unavailable(format!(
            "fingerprint {fingerprint} indexes a non-settlement entry"
        ))),
    }
}
