use crate::{
    error::ExpenseValidationError,
    model::{ExpenseSplit, MemberId, Money},
};
use std::collections::BTreeMap;

/// Builds split lists at the ingestion boundary so that shares always sum
/// exactly to the total.
///
/// Leftover minor units are handed out one at a time, in the direction of the
/// total's sign, to members in ascending member-id order.
pub struct SplitBuilder;

impl SplitBuilder {
    /// Equal split among `participants` (duplicates ignored).
    pub fn equal(
        total: Money,
        participants: &[MemberId],
    ) -> Result<Vec<ExpenseSplit>, ExpenseValidationError> {
        let mut members = participants.to_vec();
        members.sort_unstable();
        members.dedup();
        if members.is_empty() {
            return Err(ExpenseValidationError::NoParticipants);
        }

        let member_count = members.len() as i64;
        let total_amount = total.amount();
        let base = total_amount / member_count;
        let remainder = (total_amount % member_count).unsigned_abs() as usize;
        let step = total_amount.signum();

        Ok(members
            .into_iter()
            .enumerate()
            .map(|(idx, member)| {
                let mut share = base;
                if idx < remainder {
                    share += step;
                }
                ExpenseSplit::new(member, Money::from_i64(share))
            })
            .collect())
    }

    /// Split proportional to integer weights. Repeated members have their
    /// weights added; zero-weight members get a zero share.
    pub fn shares(
        total: Money,
        weights: &[(MemberId, u32)],
    ) -> Result<Vec<ExpenseSplit>, ExpenseValidationError> {
        let mut merged: BTreeMap<MemberId, u64> = BTreeMap::new();
        for &(member, weight) in weights {
            *merged.entry(member).or_insert(0) += u64::from(weight);
        }
        let weight_sum: u64 = merged.values().sum();
        if weight_sum == 0 {
            return Err(ExpenseValidationError::NoParticipants);
        }

        let total_amount = i128::from(total.amount());
        let mut shares: Vec<(MemberId, u64, i128)> = merged
            .into_iter()
            .map(|(member, weight)| {
                let share = total_amount * i128::from(weight) / i128::from(weight_sum);
                (member, weight, share)
            })
            .collect();

        let distributed: i128 = shares.iter().map(|(_, _, share)| share).sum();
        let step = total_amount.signum();
        let mut remainder = (total_amount - distributed).unsigned_abs();
        for (_, weight, share) in shares.iter_mut() {
            if remainder == 0 {
                break;
            }
            if *weight == 0 {
                continue;
            }
            *share += step;
            remainder -= 1;
        }
        debug_assert_eq!(remainder, 0);

        // Every share lies between zero and the total, so it fits the total's range.
        Ok(shares
            .into_iter()
            .map(|(member, _, share)| ExpenseSplit::new(member, Money::from_i64(share as i64)))
            .collect())
    }

    /// Explicit shares, taken verbatim; validation happens on the expense.
    pub fn exact<I>(shares: I) -> Vec<ExpenseSplit>
    where
        I: IntoIterator<Item = (MemberId, Money)>,
    {
        shares
            .into_iter()
            .map(|(member, share)| ExpenseSplit::new(member, share))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn shares_of(splits: &[ExpenseSplit]) -> Vec<(u64, i64)> {
        splits
            .iter()
            .map(|split| (split.member_id.0, split.share.amount()))
            .collect()
    }

    fn ids(raw: &[u64]) -> Vec<MemberId> {
        raw.iter().copied().map(MemberId).collect()
    }

    #[rstest]
    #[case::even(300, &[1, 2, 3], &[(1, 100), (2, 100), (3, 100)])]
    #[case::remainder_to_lowest_ids(100, &[3, 1, 2], &[(1, 34), (2, 33), (3, 33)])]
    #[case::remainder_four(10, &[1, 2, 3, 4], &[(1, 3), (2, 3), (3, 2), (4, 2)])]
    #[case::duplicates_ignored(90, &[2, 2, 3], &[(2, 45), (3, 45)])]
    #[case::negative_total(-301, &[1, 2, 3], &[(1, -101), (2, -100), (3, -100)])]
    #[case::smaller_than_member_count(2, &[1, 2, 3], &[(1, 1), (2, 1), (3, 0)])]
    #[case::zero_total(0, &[1, 2], &[(1, 0), (2, 0)])]
    fn equal_split_distribution(
        #[case] total: i64,
        #[case] participants: &[u64],
        #[case] expected: &[(u64, i64)],
    ) {
        let splits =
            SplitBuilder::equal(Money::from_i64(total), &ids(participants)).expect("split");
        assert_eq!(shares_of(&splits), expected);
    }

    #[test]
    fn equal_split_without_participants_fails() {
        assert_eq!(
            SplitBuilder::equal(Money::from_i64(100), &[]),
            Err(ExpenseValidationError::NoParticipants)
        );
    }

    #[rstest]
    #[case::one_to_two(90, &[(1, 1), (2, 2)], &[(1, 30), (2, 60)])]
    #[case::remainder_ascending(100, &[(1, 1), (2, 1), (3, 1)], &[(1, 34), (2, 33), (3, 33)])]
    #[case::zero_weight_gets_nothing(
        10,
        &[(1, 0), (2, 1), (3, 2)],
        &[(1, 0), (2, 4), (3, 6)],
    )]
    #[case::repeated_member_merges(100, &[(1, 1), (1, 1), (2, 2)], &[(1, 50), (2, 50)])]
    #[case::negative_total(-10, &[(1, 1), (2, 2)], &[(1, -4), (2, -6)])]
    fn weighted_split_distribution(
        #[case] total: i64,
        #[case] weights: &[(u64, u32)],
        #[case] expected: &[(u64, i64)],
    ) {
        let weights: Vec<(MemberId, u32)> = weights
            .iter()
            .map(|&(id, weight)| (MemberId(id), weight))
            .collect();
        let splits = SplitBuilder::shares(Money::from_i64(total), &weights).expect("split");
        assert_eq!(shares_of(&splits), expected);
    }

    #[test]
    fn weighted_split_with_only_zero_weights_fails() {
        assert_eq!(
            SplitBuilder::shares(Money::from_i64(10), &[(MemberId(1), 0)]),
            Err(ExpenseValidationError::NoParticipants)
        );
    }

    proptest! {
        #[test]
        fn equal_split_sums_to_total(
            total in -1_000_000i64..=1_000_000,
            participants in prop::collection::vec(1u64..=20, 1..=10),
        ) {
            let splits = SplitBuilder::equal(Money::from_i64(total), &ids(&participants))
                .expect("split");
            let sum: i64 = splits.iter().map(|split| split.share.amount()).sum();
            prop_assert_eq!(sum, total);

            let max = splits.iter().map(|s| s.share.amount()).max().unwrap_or(0);
            let min = splits.iter().map(|s| s.share.amount()).min().unwrap_or(0);
            prop_assert!(max - min <= 1);
        }

        #[test]
        fn weighted_split_sums_to_total(
            total in -1_000_000i64..=1_000_000,
            weights in prop::collection::vec((1u64..=10, 1u32..=50), 1..=8),
        ) {
            let weights: Vec<(MemberId, u32)> =
                weights.into_iter().map(|(id, w)| (MemberId(id), w)).collect();
            let splits = SplitBuilder::shares(Money::from_i64(total), &weights).expect("split");
            let sum: i64 = splits.iter().map(|split| split.share.amount()).sum();
            prop_assert_eq!(sum, total);
        }
    }
}
