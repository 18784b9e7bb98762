use crate::error::LedgerError;
use splitledger_domain::{
    CurrencyCode, ExpenseId, ExpenseSplit, ExpenseValidationError, Group, GroupId, MemberBalances,
    MemberId, Money, RunId, SettlementFingerprint, SettlementRecord, SplitBuilder, Transfer,
};

/// Identity of whoever issues a mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: MemberId,
}

impl RequestContext {
    pub fn new(actor: MemberId) -> Self {
        Self { actor }
    }

    /// The actor must be a current or former member of `group`.
    pub fn ensure_member_of(&self, group: &Group) -> Result<(), LedgerError> {
        if group.is_known_member(self.actor) {
            Ok(())
        } else {
            Err(LedgerError::UnknownActor {
                group_id: group.id,
                actor: self.actor,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitRule {
    Equal(Vec<MemberId>),
    Shares(Vec<(MemberId, u32)>),
    Exact(Vec<(MemberId, Money)>),
}

impl SplitRule {
    pub fn build(&self, total: Money) -> Result<Vec<ExpenseSplit>, ExpenseValidationError> {
        match self {
            SplitRule::Equal(participants) => SplitBuilder::equal(total, participants),
            SplitRule::Shares(weights) => SplitBuilder::shares(total, weights),
            SplitRule::Exact(shares) => Ok(SplitBuilder::exact(shares.iter().copied())),
        }
    }
}

/// An expense as submitted, before splits are materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDraft {
    pub payer: MemberId,
    pub total: Money,
    pub currency: CurrencyCode,
    pub split: SplitRule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceLine {
    pub member_id: MemberId,
    pub display_name: Option<String>,
    pub balance: Money,
}

/// Net balances of one group, in that group's currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBalances {
    pub currency: CurrencyCode,
    pub balances: MemberBalances,
}

/// Transfers that settle a [`GroupBalances`], in the same currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub currency: CurrencyCode,
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSheet {
    pub currency: CurrencyCode,
    pub lines: Vec<BalanceLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Recorded {
        record: SettlementRecord,
        version: u64,
    },
    /// The transfer had been recorded before; carries the original entry.
    AlreadyRecorded(SettlementRecord),
}

impl SettlementOutcome {
    pub fn record(&self) -> &SettlementRecord {
        match self {
            SettlementOutcome::Recorded { record, .. } => record,
            SettlementOutcome::AlreadyRecorded(record) => record,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, SettlementOutcome::AlreadyRecorded(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Computed,
    Presented,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    Confirmed(ExpenseId),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedTransfer {
    pub transfer: Transfer,
    pub fingerprint: SettlementFingerprint,
    pub state: TransferState,
}

/// One advisory simplification result and the confirmation state of each of
/// its transfers.
///
/// `Computed -> Presented -> Closed`; the run closes once no transfer is
/// pending. Nothing here touches the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplificationRun {
    run_id: RunId,
    group_id: GroupId,
    currency: CurrencyCode,
    captured_version: u64,
    balances: MemberBalances,
    transfers: Vec<ProposedTransfer>,
    state: RunState,
}

impl SimplificationRun {
    pub fn new(
        run_id: RunId,
        group_id: GroupId,
        currency: CurrencyCode,
        captured_version: u64,
        balances: MemberBalances,
        transfers: Vec<Transfer>,
    ) -> Self {
        let transfers = transfers
            .into_iter()
            .map(|transfer| ProposedTransfer {
                fingerprint: SettlementFingerprint::compute(group_id, run_id, &transfer),
                transfer,
                state: TransferState::Pending,
            })
            .collect();

        Self {
            run_id,
            group_id,
            currency,
            captured_version,
            balances,
            transfers,
            state: RunState::Computed,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn currency(&self) -> CurrencyCode {
        self.currency
    }

    pub fn captured_version(&self) -> u64 {
        self.captured_version
    }

    pub fn balances(&self) -> &MemberBalances {
        &self.balances
    }

    pub fn transfers(&self) -> &[ProposedTransfer] {
        &self.transfers
    }

    pub fn transfer(&self, index: usize) -> Option<&ProposedTransfer> {
        self.transfers.get(index)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn pending_count(&self) -> usize {
        self.transfers
            .iter()
            .filter(|proposed| proposed.state == TransferState::Pending)
            .count()
    }

    /// Marks the run as shown to the user. A run without pending transfers
    /// closes immediately.
    pub fn present(&mut self) {
        if self.state == RunState::Computed {
            self.state = RunState::Presented;
            self.close_if_settled();
        }
    }

    /// The pending transfer at `index`, if the run accepts confirmations.
    pub fn confirmable(&self, index: usize) -> Result<&ProposedTransfer, LedgerError> {
        if self.state != RunState::Presented {
            return Err(LedgerError::RunNotPresented {
                run_id: self.run_id,
                state: self.state,
            });
        }
        self.pending(index)
    }

    pub fn cancel_transfer(&mut self, index: usize) -> Result<Transfer, LedgerError> {
        let transfer = self.pending(index)?.transfer;
        self.transfers[index].state = TransferState::Cancelled;
        self.close_if_settled();
        Ok(transfer)
    }

    /// Cancels every pending transfer and closes the run. Returns how many
    /// transfers were cancelled.
    pub fn cancel(&mut self) -> usize {
        let mut cancelled = 0;
        for proposed in &mut self.transfers {
            if proposed.state == TransferState::Pending {
                proposed.state = TransferState::Cancelled;
                cancelled += 1;
            }
        }
        self.state = RunState::Closed;
        cancelled
    }

    /// Records a confirmation. `version` is the group version produced by the
    /// run's own append, if it wrote one.
    pub(crate) fn mark_confirmed(
        &mut self,
        index: usize,
        expense_id: ExpenseId,
        version: Option<u64>,
    ) {
        if let Some(proposed) = self.transfers.get_mut(index) {
            proposed.state = TransferState::Confirmed(expense_id);
        }
        if let Some(version) = version {
            self.captured_version = version;
        }
        self.close_if_settled();
    }

    /// Moves the run onto a newer snapshot. Pending transfers the fresh plan
    /// no longer proposes are cancelled.
    pub(crate) fn rebase(&mut self, version: u64, balances: MemberBalances, plan: &[Transfer]) {
        self.captured_version = version;
        self.balances = balances;
        for proposed in &mut self.transfers {
            if proposed.state == TransferState::Pending && !plan.contains(&proposed.transfer) {
                proposed.state = TransferState::Cancelled;
            }
        }
        self.close_if_settled();
    }

    fn pending(&self, index: usize) -> Result<&ProposedTransfer, LedgerError> {
        let proposed = self
            .transfers
            .get(index)
            .ok_or(LedgerError::UnknownTransfer {
                run_id: self.run_id,
                index,
            })?;
        if proposed.state != TransferState::Pending {
            return Err(LedgerError::TransferNotPending {
                run_id: self.run_id,
                index,
                state: proposed.state,
            });
        }
        Ok(proposed)
    }

    fn close_if_settled(&mut self) {
        if self.state == RunState::Presented && self.pending_count() == 0 {
            self.state = RunState::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn transfer(from: u64, to: u64, amount: i64) -> Transfer {
        Transfer {
            from: MemberId(from),
            to: MemberId(to),
            amount: Money::from_i64(amount),
        }
    }

    #[fixture]
    fn run() -> SimplificationRun {
        SimplificationRun::new(
            RunId::new_v4(),
            GroupId(7),
            CurrencyCode::INR,
            4,
            MemberBalances::new(),
            vec![transfer(3, 1, 100), transfer(4, 2, 100)],
        )
    }

    #[rstest]
    fn confirmation_requires_presentation(run: SimplificationRun) {
        assert!(matches!(
            run.confirmable(0),
            Err(LedgerError::RunNotPresented {
                state: RunState::Computed,
                ..
            })
        ));
    }

    #[rstest]
    fn fingerprints_are_bound_to_the_run(run: SimplificationRun) {
        let first = &run.transfers()[0];
        assert_eq!(
            first.fingerprint,
            SettlementFingerprint::compute(GroupId(7), run.run_id(), &transfer(3, 1, 100))
        );
        assert_ne!(run.transfers()[0].fingerprint, run.transfers()[1].fingerprint);
    }

    #[rstest]
    fn confirming_advances_version_and_closes(mut run: SimplificationRun) {
        run.present();
        run.mark_confirmed(0, ExpenseId::new_v4(), Some(5));
        assert_eq!(run.captured_version(), 5);
        assert_eq!(run.state(), RunState::Presented);

        run.mark_confirmed(1, ExpenseId::new_v4(), None);
        assert_eq!(run.captured_version(), 5);
        assert_eq!(run.state(), RunState::Closed);
    }

    #[rstest]
    fn cancelled_transfer_cannot_be_confirmed(mut run: SimplificationRun) {
        run.present();
        assert_eq!(run.cancel_transfer(1), Ok(transfer(4, 2, 100)));
        assert!(matches!(
            run.confirmable(1),
            Err(LedgerError::TransferNotPending {
                index: 1,
                state: TransferState::Cancelled,
                ..
            })
        ));
        assert!(matches!(
            run.confirmable(9),
            Err(LedgerError::UnknownTransfer { index: 9, .. })
        ));
    }

    #[rstest]
    fn cancelling_the_run_closes_it(mut run: SimplificationRun) {
        run.present();
        run.mark_confirmed(0, ExpenseId::new_v4(), Some(5));
        assert_eq!(run.cancel(), 1);
        assert_eq!(run.state(), RunState::Closed);
        assert!(matches!(run.transfers()[0].state, TransferState::Confirmed(_)));
        assert_eq!(run.transfers()[1].state, TransferState::Cancelled);
    }

    #[test]
    fn empty_run_closes_when_presented() {
        let mut run = SimplificationRun::new(
            RunId::new_v4(),
            GroupId(7),
            CurrencyCode::INR,
            0,
            MemberBalances::new(),
            Vec::new(),
        );
        run.present();
        assert_eq!(run.state(), RunState::Closed);
    }

    #[rstest]
    fn rebase_cancels_transfers_missing_from_fresh_plan(mut run: SimplificationRun) {
        run.present();
        run.rebase(9, MemberBalances::new(), &[transfer(3, 1, 100)]);
        assert_eq!(run.captured_version(), 9);
        assert_eq!(run.transfers()[0].state, TransferState::Pending);
        assert_eq!(run.transfers()[1].state, TransferState::Cancelled);
    }

    #[rstest]
    #[case::equal(SplitRule::Equal(vec![MemberId(2), MemberId(1)]), &[(1, 50), (2, 50)])]
    #[case::shares(
        SplitRule::Shares(vec![(MemberId(1), 1), (MemberId(2), 3)]),
        &[(1, 25), (2, 75)],
    )]
    #[case::exact(
        SplitRule::Exact(vec![(MemberId(2), Money::from_i64(60)), (MemberId(1), Money::from_i64(40))]),
        &[(2, 60), (1, 40)],
    )]
    fn split_rules_build_splits(#[case] rule: SplitRule, #[case] expected: &[(u64, i64)]) {
        let splits = rule.build(Money::from_i64(100)).expect("split");
        let actual: Vec<(u64, i64)> = splits
            .iter()
            .map(|split| (split.member_id.0, split.share.amount()))
            .collect();
        assert_eq!(actual, expected);
    }
}
