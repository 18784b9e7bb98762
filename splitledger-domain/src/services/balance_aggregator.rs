use crate::{
    error::ExpenseValidationError,
    model::{Expense, MemberBalances, MemberId, Money},
};
use std::collections::BTreeMap;

/// Folds expenses into net balances.
///
/// Sums are kept in `i128` until [`BalanceAccumulator::into_balances`], so the
/// result (and any range error) does not depend on the order expenses were
/// applied or shards were merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceAccumulator {
    balances: BTreeMap<MemberId, i128>,
}

impl BalanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a zero balance for every given member.
    pub fn with_members<I>(members: I) -> Self
    where
        I: IntoIterator<Item = MemberId>,
    {
        Self {
            balances: members.into_iter().map(|member| (member, 0)).collect(),
        }
    }

    /// Credits the payer with the total and debits every split member.
    ///
    /// The expense is re-checked first; nothing is applied if it is imbalanced.
    pub fn apply(&mut self, expense: &Expense) -> Result<(), ExpenseValidationError> {
        if let Err(err) = expense.ensure_balanced() {
            tracing::error!(
                expense_id = %expense.id,
                group_id = %expense.group_id,
                total = %expense.total,
                split_sum = expense.split_sum(),
                "Imbalanced expense reached the balance aggregator"
            );
            return Err(err);
        }

        *self.balances.entry(expense.payer).or_insert(0) += i128::from(expense.total.amount());
        for split in &expense.splits {
            *self.balances.entry(split.member_id).or_insert(0) -= i128::from(split.share.amount());
        }
        Ok(())
    }

    /// Combines a shard folded elsewhere into this one.
    pub fn merge(&mut self, other: BalanceAccumulator) {
        for (member, balance) in other.balances {
            *self.balances.entry(member).or_insert(0) += balance;
        }
    }

    pub fn member_count(&self) -> usize {
        self.balances.len()
    }

    pub fn into_balances(self) -> Result<MemberBalances, ExpenseValidationError> {
        self.balances
            .into_iter()
            .map(|(member, balance)| {
                i64::try_from(balance)
                    .map(|value| (member, Money::from_i64(value)))
                    .map_err(|_| ExpenseValidationError::BalanceOutOfRange { member })
            })
            .collect()
    }
}

/// Pure fold over a ledger snapshot.
pub struct BalanceAggregator;

impl BalanceAggregator {
    /// Net balance of every member that appears in `expenses`.
    pub fn compute(&self, expenses: &[Expense]) -> Result<MemberBalances, ExpenseValidationError> {
        self.compute_with_members(std::iter::empty(), expenses)
    }

    /// Like [`compute`](Self::compute), but every member of `roster` is present
    /// in the result even with a zero balance.
    pub fn compute_with_members<I>(
        &self,
        roster: I,
        expenses: &[Expense],
    ) -> Result<MemberBalances, ExpenseValidationError>
    where
        I: IntoIterator<Item = MemberId>,
    {
        let mut accumulator = BalanceAccumulator::with_members(roster);
        for expense in expenses {
            accumulator.apply(expense)?;
        }

        tracing::debug!(
            expense_count = expenses.len(),
            member_count = accumulator.member_count(),
            "Balances computed"
        );

        accumulator.into_balances()
    }

    /// Rejects `candidate` if folding it onto `expenses` would leave some
    /// balance outside the `i64` range.
    pub fn ensure_appendable(
        &self,
        expenses: &[Expense],
        candidate: &Expense,
    ) -> Result<(), ExpenseValidationError> {
        let mut accumulator = BalanceAccumulator::new();
        for expense in expenses.iter().chain(std::iter::once(candidate)) {
            accumulator.apply(expense)?;
        }

        match accumulator.into_balances() {
            Ok(_) => Ok(()),
            Err(ExpenseValidationError::BalanceOutOfRange { member }) => {
                tracing::warn!(
                    expense_id = %candidate.id,
                    group_id = %candidate.group_id,
                    member = %member,
                    "Expense would push a balance out of range"
                );
                Err(ExpenseValidationError::AmountOverflow {
                    expense_id: candidate.id,
                })
            }
            Err(err) => Err(err),
        }
    }
}
