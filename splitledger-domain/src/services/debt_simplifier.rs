use crate::{
    error::SimplificationError,
    model::{MemberBalances, Money, Transfer},
};
use splitledger_transfer_construction::{PersonBalance, SettlementError, minimize_cash_flow};

/// Debt simplification service.
///
/// Greedy largest-creditor/largest-debtor matching. This is a deliberate
/// approximation of the minimum-transfer problem, not an exact minimizer.
pub struct DebtSimplifier;

impl DebtSimplifier {
    /// Proposes transfers that bring every balance to zero.
    ///
    /// For identical input the output, including its order, is identical.
    pub fn simplify(&self, balances: &MemberBalances) -> Result<Vec<Transfer>, SimplificationError> {
        // `MemberBalances` is a BTreeMap, so the input order handed to the
        // heap is already ascending by member id.
        let people = balances.iter().map(|(member, balance)| PersonBalance {
            id: *member,
            balance: balance.amount(),
        });

        let payments = minimize_cash_flow(people).map_err(SimplificationError::from)?;

        let transfers: Vec<Transfer> = payments
            .into_iter()
            .map(|payment| Transfer {
                from: payment.from,
                to: payment.to,
                amount: Money::from_i64(payment.amount),
            })
            .collect();

        tracing::debug!(
            member_count = balances.len(),
            nonzero_count = balances.values().filter(|b| !b.is_zero()).count(),
            transfer_count = transfers.len(),
            "Debts simplified"
        );

        Ok(transfers)
    }
}

/// Balances left after every transfer is paid.
pub fn apply_transfers(
    balances: &MemberBalances,
    transfers: &[Transfer],
) -> Result<MemberBalances, SimplificationError> {
    let mut residual = balances.clone();
    for transfer in transfers {
        let from = residual.entry(transfer.from).or_insert(Money::ZERO);
        *from = from
            .checked_add(transfer.amount)
            .ok_or(SimplificationError::Overflow)?;
        let to = residual.entry(transfer.to).or_insert(Money::ZERO);
        *to = to
            .checked_sub(transfer.amount)
            .ok_or(SimplificationError::Overflow)?;
    }
    Ok(residual)
}

impl From<SettlementError> for SimplificationError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::ImbalancedTotal(total) => SimplificationError::ImbalancedTotal(total),
            SettlementError::Overflow => SimplificationError::Overflow,
        }
    }
}
