use crate::{
    config::LedgerServiceConfig,
    error::LedgerError,
    model::{
        BalanceLine, BalanceSheet, ExpenseDraft, GroupBalances, Member, RequestContext,
        SettlementOutcome, SimplificationRun, TransferPlan,
    },
    ports::{AppendOutcome, Clock, ExpenseStore, LedgerSnapshot, MemberRegistry},
    settlement_recorder::SettlementRecorder,
};
use splitledger_domain::{
    BalanceAggregator, CurrencyCode, DebtSimplifier, Expense, ExpenseId, ExpenseKind, Group,
    GroupId, MemberBalances, RunId, SettlementFingerprint, Transfer,
};
use std::collections::HashMap;

/// Caller-facing entry point over the ledger ports.
///
/// Balances and transfer plans are always rederived from the stored history.
#[derive(Clone, Copy)]
pub struct LedgerService<'a> {
    store: &'a dyn ExpenseStore,
    registry: &'a dyn MemberRegistry,
    clock: &'a dyn Clock,
    config: LedgerServiceConfig,
}

impl<'a> LedgerService<'a> {
    pub fn new(
        store: &'a dyn ExpenseStore,
        registry: &'a dyn MemberRegistry,
        clock: &'a dyn Clock,
        config: LedgerServiceConfig,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            config,
        }
    }

    /// Net balance of every current member and of anyone who appears in the
    /// history.
    pub fn compute_balances(&self, group_id: GroupId) -> Result<GroupBalances, LedgerError> {
        let (group, balances) = self.balances_at(group_id)?;
        Ok(GroupBalances {
            currency: group.currency,
            balances,
        })
    }

    pub fn simplify_debts(&self, balances: &GroupBalances) -> Result<TransferPlan, LedgerError> {
        Ok(TransferPlan {
            currency: balances.currency,
            transfers: DebtSimplifier.simplify(&balances.balances)?,
        })
    }

    /// Computes a fresh run against the current group version.
    pub fn start_run(&self, group_id: GroupId) -> Result<SimplificationRun, LedgerError> {
        let (group, balances) = self.balances_at(group_id)?;
        let transfers = DebtSimplifier.simplify(&balances)?;
        let run = SimplificationRun::new(
            RunId::new_v4(),
            group_id,
            group.currency,
            group.version,
            balances,
            transfers,
        );

        tracing::debug!(
            group_id = %group_id,
            run_id = %run.run_id(),
            version = group.version,
            transfer_count = run.transfers().len(),
            "Simplification run computed"
        );

        Ok(run)
    }

    /// Records one settlement of `transfer`, denominated in `currency`. A
    /// repeated call with the same run and transfer returns the original
    /// record and writes nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn record_settlement(
        &self,
        ctx: &RequestContext,
        group_id: GroupId,
        run_id: RunId,
        captured_version: u64,
        transfer: &Transfer,
        currency: CurrencyCode,
        idempotency_key: &SettlementFingerprint,
    ) -> Result<SettlementOutcome, LedgerError> {
        let recorder = SettlementRecorder::new(self.store, self.clock);
        match recorder.record(
            ctx,
            group_id,
            run_id,
            captured_version,
            transfer,
            currency,
            idempotency_key,
        ) {
            Ok(recorded) => Ok(SettlementOutcome::Recorded {
                record: recorded.record,
                version: recorded.version,
            }),
            Err(LedgerError::AlreadyRecorded(original)) => {
                tracing::info!(
                    group_id = %group_id,
                    run_id = %run_id,
                    expense_id = %original.expense().id,
                    "Duplicate settlement confirmation treated as no-op"
                );
                Ok(SettlementOutcome::AlreadyRecorded(*original))
            }
            Err(err) => Err(err),
        }
    }

    /// Confirms the pending transfer at `index` of a presented run.
    pub fn confirm_transfer(
        &self,
        ctx: &RequestContext,
        run: &mut SimplificationRun,
        index: usize,
    ) -> Result<SettlementOutcome, LedgerError> {
        let proposed = run.confirmable(index)?;
        let outcome = self.record_settlement(
            ctx,
            run.group_id(),
            run.run_id(),
            run.captured_version(),
            &proposed.transfer,
            run.currency(),
            &proposed.fingerprint,
        )?;

        match &outcome {
            SettlementOutcome::Recorded { record, version } => {
                run.mark_confirmed(index, record.expense().id, Some(*version));
            }
            SettlementOutcome::AlreadyRecorded(record) => {
                run.mark_confirmed(index, record.expense().id, None);
            }
        }

        Ok(outcome)
    }

    /// Like [`confirm_transfer`](Self::confirm_transfer), but a stale snapshot
    /// triggers a recompute. The run is moved onto the fresh snapshot only if
    /// the recomputed plan still proposes the same transfer; otherwise the
    /// stale snapshot error is returned.
    pub fn confirm_transfer_with_retry(
        &self,
        ctx: &RequestContext,
        run: &mut SimplificationRun,
        index: usize,
    ) -> Result<SettlementOutcome, LedgerError> {
        let mut attempt = 0;
        loop {
            let err = match self.confirm_transfer(ctx, run, index) {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt < self.config.max_stale_retries => err,
                Err(err) => return Err(err),
            };
            attempt += 1;

            let target = run.confirmable(index)?.transfer;
            let (group, balances) = self.balances_at(run.group_id())?;
            let plan = DebtSimplifier.simplify(&balances)?;

            if !plan.contains(&target) {
                tracing::warn!(
                    group_id = %run.group_id(),
                    run_id = %run.run_id(),
                    version = group.version,
                    "Recomputed plan no longer proposes the transfer"
                );
                return Err(err);
            }

            tracing::warn!(
                group_id = %run.group_id(),
                run_id = %run.run_id(),
                attempt,
                captured_version = run.captured_version(),
                version = group.version,
                "Stale snapshot, retrying confirmation"
            );
            run.rebase(group.version, balances, &plan);
        }
    }

    pub fn cancel_transfer(
        &self,
        run: &mut SimplificationRun,
        index: usize,
    ) -> Result<Transfer, LedgerError> {
        let transfer = run.cancel_transfer(index)?;
        tracing::debug!(
            run_id = %run.run_id(),
            index,
            "Transfer cancelled"
        );
        Ok(transfer)
    }

    pub fn cancel_run(&self, run: &mut SimplificationRun) {
        let cancelled = run.cancel();
        tracing::debug!(run_id = %run.run_id(), cancelled, "Run cancelled");
    }

    /// Materializes, validates and appends a new expense.
    pub fn add_expense(
        &self,
        ctx: &RequestContext,
        group_id: GroupId,
        draft: &ExpenseDraft,
    ) -> Result<Expense, LedgerError> {
        let splits = draft.split.build(draft.total)?;
        let expense = Expense {
            id: ExpenseId::new_v4(),
            group_id,
            kind: ExpenseKind::Expense,
            payer: draft.payer,
            total: draft.total,
            currency: draft.currency,
            splits,
            created_at: self.clock.now(),
            recorded_by: ctx.actor,
            corrects: None,
            settlement: None,
        };

        self.append_with_retry(ctx, group_id, expense, |group| {
            if !group.has_active_members() {
                return Err(LedgerError::InsufficientData { group_id });
            }
            Ok(())
        })
    }

    /// Appends the offsetting entry for `expense_id`.
    pub fn add_correction(
        &self,
        ctx: &RequestContext,
        group_id: GroupId,
        expense_id: ExpenseId,
    ) -> Result<Expense, LedgerError> {
        let original = self
            .store
            .find_expense(group_id, expense_id)?
            .ok_or(LedgerError::ExpenseNotFound {
                group_id,
                expense_id,
            })?;
        if original.is_correction() {
            return Err(LedgerError::CannotCorrectCorrection { expense_id });
        }

        let offset = original.offsetting(ExpenseId::new_v4(), ctx.actor, self.clock.now())?;

        let mut attempt = 0;
        loop {
            let snapshot = self.store.load_snapshot(group_id)?;
            if let Some(existing) = snapshot
                .expenses
                .iter()
                .find(|expense| expense.corrects == Some(expense_id))
            {
                return Err(LedgerError::AlreadyCorrected {
                    expense_id,
                    correction: existing.id,
                });
            }
            offset.validate_against(&snapshot.group)?;
            ctx.ensure_member_of(&snapshot.group)?;
            BalanceAggregator.ensure_appendable(&snapshot.expenses, &offset)?;

            match self.append_once(&snapshot.group, offset.clone()) {
                Err(err) if err.is_retryable() && attempt < self.config.max_stale_retries => {
                    attempt += 1;
                    tracing::warn!(
                        group_id = %group_id,
                        attempt,
                        "Version conflict, retrying correction"
                    );
                }
                result => return result,
            }
        }
    }

    /// Balances joined with registry display names, ascending by member id.
    pub fn balance_sheet(&self, group_id: GroupId) -> Result<BalanceSheet, LedgerError> {
        let GroupBalances { currency, balances } = self.compute_balances(group_id)?;
        let names: HashMap<_, _> = self
            .registry
            .list_members(group_id)?
            .into_iter()
            .map(|Member { id, display_name }| (id, display_name))
            .collect();

        let lines = balances
            .into_iter()
            .map(|(member_id, balance)| BalanceLine {
                member_id,
                display_name: names.get(&member_id).cloned(),
                balance,
            })
            .collect();
        Ok(BalanceSheet { currency, lines })
    }

    fn balances_at(&self, group_id: GroupId) -> Result<(Group, MemberBalances), LedgerError> {
        let snapshot = self.store.load_snapshot(group_id)?;
        let balances = BalanceAggregator.compute_with_members(
            snapshot.group.members.iter().copied(),
            &snapshot.expenses,
        )?;
        Ok((snapshot.group, balances))
    }

    fn append_with_retry<F>(
        &self,
        ctx: &RequestContext,
        group_id: GroupId,
        expense: Expense,
        precondition: F,
    ) -> Result<Expense, LedgerError>
    where
        F: Fn(&Group) -> Result<(), LedgerError>,
    {
        let mut attempt = 0;
        loop {
            let LedgerSnapshot { group, expenses } = self.store.load_snapshot(group_id)?;
            precondition(&group)?;
            expense.validate_against(&group)?;
            ctx.ensure_member_of(&group)?;
            BalanceAggregator.ensure_appendable(&expenses, &expense)?;

            match self.append_once(&group, expense.clone()) {
                Err(err) if err.is_retryable() && attempt < self.config.max_stale_retries => {
                    attempt += 1;
                    tracing::warn!(
                        group_id = %group_id,
                        attempt,
                        "Version conflict, retrying append"
                    );
                }
                result => return result,
            }
        }
    }

    fn append_once(&self, group: &Group, expense: Expense) -> Result<Expense, LedgerError> {
        match self.store.append(group.id, group.version, expense.clone())? {
            AppendOutcome::Appended { version } => {
                tracing::info!(
                    group_id = %group.id,
                    expense_id = %expense.id,
                    payer = %expense.payer,
                    total = %expense.total,
                    corrects = ?expense.corrects,
                    version,
                    "Expense appended"
                );
                Ok(expense)
            }
            AppendOutcome::Duplicate(existing) => Ok(*existing),
        }
    }
}
