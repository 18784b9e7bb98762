#![warn(clippy::uninlined_format_args)]

//! Greedy largest-magnitude matching ("min-cash-flow") over zero-sum balances.
//!
//! Finding the exact minimum number of transfers is a subset-partition problem
//! and NP-hard in general. This crate settles for the greedy heuristic: always
//! match the largest remaining creditor with the largest remaining debtor. The
//! result has at most `n - 1` payments for `n` non-zero balances and is fully
//! deterministic, with ties broken by ascending member id on both sides.

mod model;

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BinaryHeap},
};
use thiserror::Error;

pub use model::{Payment, PersonBalance};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("Sum of balances must be zero (found {0})")]
    ImbalancedTotal(i128),
    #[error("Balance magnitude does not fit in a signed 64-bit amount")]
    Overflow,
}

/// Heap entry ordered by descending magnitude, then ascending member id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Outstanding<MemberId> {
    magnitude: u64,
    id: MemberId,
}

impl<MemberId: Ord> Ord for Outstanding<MemberId> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest element: larger magnitude wins, and on
        // equal magnitude the *smaller* id must win, hence the reversed id order.
        self.magnitude
            .cmp(&other.magnitude)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl<MemberId: Ord> PartialOrd for Outstanding<MemberId> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Collapses a zero-sum balance vector into settlement payments.
///
/// Entries sharing an id are summed before matching. Zero balances are ignored.
///
/// # Errors
/// * [`SettlementError::ImbalancedTotal`] if the balances do not sum to zero.
/// * [`SettlementError::Overflow`] if a merged balance leaves the `i64` range.
pub fn minimize_cash_flow<MemberId>(
    people: impl IntoIterator<Item = PersonBalance<MemberId>>,
) -> Result<Vec<Payment<MemberId>>, SettlementError>
where
    MemberId: Copy + Ord,
{
    let mut merged: BTreeMap<MemberId, i128> = BTreeMap::new();
    for person in people {
        *merged.entry(person.id).or_insert(0) += i128::from(person.balance);
    }

    let total: i128 = merged.values().sum();
    if total != 0 {
        return Err(SettlementError::ImbalancedTotal(total));
    }

    let mut creditors = BinaryHeap::new();
    let mut debtors = BinaryHeap::new();
    for (&id, &balance) in &merged {
        let balance = i64::try_from(balance).map_err(|_| SettlementError::Overflow)?;
        match balance.cmp(&0) {
            Ordering::Greater => creditors.push(Outstanding {
                magnitude: balance.unsigned_abs(),
                id,
            }),
            Ordering::Less => debtors.push(Outstanding {
                magnitude: balance.unsigned_abs(),
                id,
            }),
            Ordering::Equal => {}
        }
    }

    let nonzero = creditors.len() + debtors.len();
    let mut payments = Vec::with_capacity(nonzero.saturating_sub(1));

    while let (Some(creditor), Some(debtor)) = (creditors.pop(), debtors.pop()) {
        let settled = creditor.magnitude.min(debtor.magnitude);
        // A creditor magnitude never exceeds i64::MAX, so neither does `settled`.
        let amount = i64::try_from(settled).map_err(|_| SettlementError::Overflow)?;
        payments.push(Payment {
            from: debtor.id,
            to: creditor.id,
            amount,
        });

        if creditor.magnitude > settled {
            creditors.push(Outstanding {
                magnitude: creditor.magnitude - settled,
                id: creditor.id,
            });
        }
        if debtor.magnitude > settled {
            debtors.push(Outstanding {
                magnitude: debtor.magnitude - settled,
                id: debtor.id,
            });
        }
    }

    debug_assert!(creditors.is_empty() && debtors.is_empty());
    debug_assert!(payments.len() <= nonzero.saturating_sub(1));

    Ok(payments)
}

/// Applies payments to the given balances and returns what is left per member.
///
/// A debtor paying `amount` moves their balance up by `amount`; the receiving
/// creditor moves down by the same amount.
pub fn residual_balances<MemberId>(
    people: &[PersonBalance<MemberId>],
    payments: &[Payment<MemberId>],
) -> BTreeMap<MemberId, i128>
where
    MemberId: Copy + Ord,
{
    let mut balances: BTreeMap<MemberId, i128> = BTreeMap::new();
    for person in people {
        *balances.entry(person.id).or_insert(0) += i128::from(person.balance);
    }
    for payment in payments {
        *balances.entry(payment.from).or_insert(0) += i128::from(payment.amount);
        *balances.entry(payment.to).or_insert(0) -= i128::from(payment.amount);
    }
    balances
}
