/// Net balance of each person in minor units
/// (positive: is owed money, negative: owes money)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonBalance<MemberId = u64> {
    pub id: MemberId,
    pub balance: i64,
}

/// A single transfer from a debtor to a creditor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payment<MemberId = u64> {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: i64,
}
