use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};
use uuid::Uuid;

use crate::{
    error::{CurrencyCodeError, ExpenseValidationError},
    services::SettlementFingerprint,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpenseId(pub Uuid);

impl ExpenseId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one simplification run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO-4217 shaped currency code: exactly three upper-case ASCII letters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub const INR: Self = Self(*b"INR");

    pub fn new(code: &str) -> Result<Self, CurrencyCodeError> {
        let bytes: [u8; 3] = code
            .as_bytes()
            .try_into()
            .map_err(|_| CurrencyCodeError(code.to_owned()))?;
        if !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(CurrencyCodeError(code.to_owned()));
        }
        Ok(Self(bytes))
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII upper-case bytes are ever stored.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for CurrencyCode {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed amount in the group currency's minor unit (e.g. paise).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub fn from_i64(value: i64) -> Self {
        Self(value)
    }

    pub fn amount(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_neg(self) -> Option<Self> {
        self.0.checked_neg().map(Self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Net balance per member; iteration order is ascending member id.
pub type MemberBalances = BTreeMap<MemberId, Money>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExpenseKind {
    Expense,
    Settlement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpenseSplit {
    pub member_id: MemberId,
    pub share: Money,
}

impl ExpenseSplit {
    pub fn new(member_id: MemberId, share: Money) -> Self {
        Self { member_id, share }
    }
}

/// Where a settlement entry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettlementOrigin {
    pub run_id: RunId,
    pub fingerprint: SettlementFingerprint,
}

/// One immutable ledger entry. Corrections are new entries, never edits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    pub kind: ExpenseKind,
    pub payer: MemberId,
    pub total: Money,
    pub currency: CurrencyCode,
    pub splits: Vec<ExpenseSplit>,
    pub created_at: DateTime<Utc>,
    pub recorded_by: MemberId,
    pub corrects: Option<ExpenseId>,
    pub settlement: Option<SettlementOrigin>,
}

impl Expense {
    /// Exact sum of all split shares.
    pub fn split_sum(&self) -> i128 {
        self.splits
            .iter()
            .map(|split| i128::from(split.share.amount()))
            .sum()
    }

    pub fn ensure_balanced(&self) -> Result<(), ExpenseValidationError> {
        let split_sum = self.split_sum();
        if split_sum != i128::from(self.total.amount()) {
            return Err(ExpenseValidationError::ImbalancedSplit {
                expense_id: self.id,
                total: self.total,
                split_sum,
            });
        }
        Ok(())
    }

    /// Full ingestion check against the group this expense is appended to.
    pub fn validate_against(&self, group: &Group) -> Result<(), ExpenseValidationError> {
        if self.group_id != group.id {
            return Err(ExpenseValidationError::WrongGroup {
                expense_id: self.id,
                expected: group.id,
                found: self.group_id,
            });
        }
        if self.currency != group.currency {
            return Err(ExpenseValidationError::CurrencyMismatch {
                expense_id: self.id,
                expected: group.currency,
                found: self.currency,
            });
        }
        if self.splits.is_empty() {
            return Err(ExpenseValidationError::EmptySplits {
                expense_id: self.id,
            });
        }
        for member in std::iter::once(self.payer).chain(self.splits.iter().map(|s| s.member_id)) {
            if !group.is_known_member(member) {
                return Err(ExpenseValidationError::UnknownMember {
                    expense_id: self.id,
                    member,
                });
            }
        }
        self.ensure_balanced()
    }

    pub fn is_correction(&self) -> bool {
        self.corrects.is_some()
    }

    /// Builds the entry that cancels this one out when both are folded.
    pub fn offsetting(
        &self,
        id: ExpenseId,
        recorded_by: MemberId,
        created_at: DateTime<Utc>,
    ) -> Result<Expense, ExpenseValidationError> {
        let overflow = || ExpenseValidationError::AmountOverflow { expense_id: self.id };
        let total = self.total.checked_neg().ok_or_else(overflow)?;
        let splits = self
            .splits
            .iter()
            .map(|split| {
                split
                    .share
                    .checked_neg()
                    .map(|share| ExpenseSplit::new(split.member_id, share))
                    .ok_or_else(overflow)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Expense {
            id,
            group_id: self.group_id,
            kind: self.kind,
            payer: self.payer,
            total,
            currency: self.currency,
            splits,
            created_at,
            recorded_by,
            corrects: Some(self.id),
            settlement: None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub currency: CurrencyCode,
    pub members: BTreeSet<MemberId>,
    pub former_members: BTreeSet<MemberId>,
    /// Incremented on every ledger mutation.
    pub version: u64,
}

impl Group {
    pub fn new<I>(id: GroupId, currency: CurrencyCode, members: I) -> Self
    where
        I: IntoIterator<Item = MemberId>,
    {
        Self {
            id,
            currency,
            members: members.into_iter().collect(),
            former_members: BTreeSet::new(),
            version: 0,
        }
    }

    pub fn is_active_member(&self, member: MemberId) -> bool {
        self.members.contains(&member)
    }

    /// Current or historical member.
    pub fn is_known_member(&self, member: MemberId) -> bool {
        self.members.contains(&member) || self.former_members.contains(&member)
    }

    pub fn has_active_members(&self) -> bool {
        !self.members.is_empty()
    }
}

/// A proposed payment; not a ledger entry until recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Transfer {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Money,
}

/// A settlement that has been materialized as a ledger entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettlementRecord {
    expense: Expense,
    origin: SettlementOrigin,
}

impl SettlementRecord {
    /// Accepts only settlement-kind entries carrying their origin.
    pub fn from_expense(expense: Expense) -> Option<Self> {
        if expense.kind != ExpenseKind::Settlement {
            return None;
        }
        let origin = expense.settlement?;
        Some(Self { expense, origin })
    }

    pub fn expense(&self) -> &Expense {
        &self.expense
    }

    pub fn run_id(&self) -> RunId {
        self.origin.run_id
    }

    pub fn fingerprint(&self) -> SettlementFingerprint {
        self.origin.fingerprint
    }

    pub fn transfer(&self) -> Option<Transfer> {
        let [split] = self.expense.splits.as_slice() else {
            return None;
        };
        Some(Transfer {
            from: self.expense.payer,
            to: split.member_id,
            amount: self.expense.total,
        })
    }
}
