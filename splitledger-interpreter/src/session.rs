use splitledger_application::{
    ExpenseDraft, LedgerError, LedgerService, RequestContext, SplitRule, StoreError,
};
use splitledger_domain::{
    CurrencyCode, CurrencyCodeError, ExpenseId, GroupId, MemberId, Money, Transfer,
};
use splitledger_infrastructure::{InMemoryLedgerStore, InMemoryMemberRegistry};
use splitledger_parser::{Command, ExpenseLine, SplitSpec, Statement, StatementWithLine};
use std::fmt::Write as _;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("line {line}: `group` must come before any other statement")]
    MissingGroup { line: usize },
    #[error("line {line}: the group is already declared")]
    DuplicateGroup { line: usize },
    #[error("line {line}: {source}")]
    InvalidCurrency {
        line: usize,
        source: CurrencyCodeError,
    },
    #[error("line {line}: there is no expense #{index} to undo")]
    UndoOutOfRange { line: usize, index: usize },
    #[error("line {line}: {source}")]
    Store { line: usize, source: StoreError },
    #[error("line {line}: {source}")]
    Ledger { line: usize, source: LedgerError },
}

/// Executes script statements against one group.
pub struct ScriptSession<'a> {
    store: &'a InMemoryLedgerStore,
    registry: &'a InMemoryMemberRegistry,
    service: LedgerService<'a>,
    confirmed_by: Option<MemberId>,
    group: Option<(GroupId, CurrencyCode)>,
    /// Expense ids and payers in script order, for `!undo`.
    expenses: Vec<(ExpenseId, MemberId)>,
}

impl<'a> ScriptSession<'a> {
    pub fn new(
        store: &'a InMemoryLedgerStore,
        registry: &'a InMemoryMemberRegistry,
        service: LedgerService<'a>,
        confirmed_by: Option<MemberId>,
    ) -> Self {
        Self {
            store,
            registry,
            service,
            confirmed_by,
            group: None,
            expenses: Vec::new(),
        }
    }

    /// Runs one statement. Commands return the text to print.
    pub fn execute(
        &mut self,
        statement: &StatementWithLine<'_>,
    ) -> Result<Option<String>, SessionError> {
        let line = statement.line;
        match &statement.statement {
            Statement::Group { id, currency } => {
                self.declare_group(line, GroupId(*id), currency)?;
                Ok(None)
            }
            other => {
                let (group_id, currency) = self.group.ok_or(SessionError::MissingGroup { line })?;
                self.execute_in_group(line, group_id, currency, other)
            }
        }
    }

    fn declare_group(
        &mut self,
        line: usize,
        group_id: GroupId,
        currency: &str,
    ) -> Result<(), SessionError> {
        if self.group.is_some() {
            return Err(SessionError::DuplicateGroup { line });
        }
        let currency = CurrencyCode::new(currency)
            .map_err(|source| SessionError::InvalidCurrency { line, source })?;
        self.store
            .create_group(group_id, currency)
            .map_err(|source| SessionError::Store { line, source })?;
        self.group = Some((group_id, currency));
        Ok(())
    }

    fn execute_in_group(
        &mut self,
        line: usize,
        group_id: GroupId,
        currency: CurrencyCode,
        statement: &Statement<'_>,
    ) -> Result<Option<String>, SessionError> {
        let ledger = |source: LedgerError| SessionError::Ledger { line, source };

        match statement {
            Statement::Group { .. } => Err(SessionError::DuplicateGroup { line }),
            Statement::Member { id, name } => {
                let member = MemberId(*id);
                self.store
                    .add_member(group_id, member)
                    .map_err(|source| SessionError::Store { line, source })?;
                self.registry.register(group_id, member, *name);
                Ok(None)
            }
            Statement::Expense(expense) => {
                let draft = draft_from_line(expense, currency);
                let ctx = RequestContext::new(draft.payer);
                let recorded = self
                    .service
                    .add_expense(&ctx, group_id, &draft)
                    .map_err(ledger)?;
                self.expenses.push((recorded.id, recorded.payer));
                Ok(None)
            }
            Statement::Command(Command::Undo(index)) => {
                let (expense_id, payer) = index
                    .checked_sub(1)
                    .and_then(|position| self.expenses.get(position))
                    .copied()
                    .ok_or(SessionError::UndoOutOfRange {
                        line,
                        index: *index,
                    })?;
                let ctx = RequestContext::new(self.confirmed_by.unwrap_or(payer));
                self.service
                    .add_correction(&ctx, group_id, expense_id)
                    .map_err(ledger)?;
                Ok(None)
            }
            Statement::Command(Command::Balances) => self
                .format_balances(group_id)
                .map(Some)
                .map_err(ledger),
            Statement::Command(Command::Simplify) => self
                .format_transfers(group_id)
                .map(Some)
                .map_err(ledger),
            Statement::Command(Command::SettleUp) => self
                .settle_up(group_id)
                .map(Some)
                .map_err(ledger),
        }
    }

    /// Balances followed by the proposed transfers, if a group was declared.
    pub fn summary(&self) -> Result<Option<String>, LedgerError> {
        let Some((group_id, _)) = self.group else {
            return Ok(None);
        };
        let mut out = self.format_balances(group_id)?;
        out.push('\n');
        out.push_str(&self.format_transfers(group_id)?);
        Ok(Some(out))
    }

    fn format_balances(&self, group_id: GroupId) -> Result<String, LedgerError> {
        let sheet = self.service.balance_sheet(group_id)?;
        let mut out = format!("Balances ({}):", sheet.currency);
        if sheet.lines.is_empty() {
            out.push_str("\n  (no members)");
        }
        for line in sheet.lines {
            let name = line
                .display_name
                .unwrap_or_else(|| mention(line.member_id));
            let _ = write!(out, "\n  {name}: {}", signed(line.balance));
        }
        Ok(out)
    }

    fn format_transfers(&self, group_id: GroupId) -> Result<String, LedgerError> {
        let balances = self.service.compute_balances(group_id)?;
        let plan = self.service.simplify_debts(&balances)?;
        let mut out = format!("Transfers ({}):", plan.currency);
        if plan.transfers.is_empty() {
            out.push_str("\n  (all settled)");
        }
        for transfer in &plan.transfers {
            let _ = write!(out, "\n  {}", self.describe(group_id, transfer));
        }
        Ok(out)
    }

    fn settle_up(&self, group_id: GroupId) -> Result<String, LedgerError> {
        let mut run = self.service.start_run(group_id)?;
        run.present();

        let mut out = format!("Settlements ({}):", run.currency());
        if run.transfers().is_empty() {
            out.push_str("\n  (nothing to settle)");
        }
        for index in 0..run.transfers().len() {
            let transfer = run.transfers()[index].transfer;
            let actor = self.confirmed_by.unwrap_or(transfer.from);
            let outcome =
                self.service
                    .confirm_transfer_with_retry(&RequestContext::new(actor), &mut run, index)?;
            let status = if outcome.is_duplicate() {
                "already recorded"
            } else {
                "recorded"
            };
            let _ = write!(out, "\n  {} [{status}]", self.describe(group_id, &transfer));
        }
        Ok(out)
    }

    fn describe(&self, group_id: GroupId, transfer: &Transfer) -> String {
        format!(
            "{} -> {}: {}",
            self.name(group_id, transfer.from),
            self.name(group_id, transfer.to),
            transfer.amount
        )
    }

    fn name(&self, group_id: GroupId, member: MemberId) -> String {
        self.registry
            .display_name(group_id, member)
            .unwrap_or_else(|| mention(member))
    }
}

fn mention(member: MemberId) -> String {
    format!("<@{member}>")
}

fn signed(amount: Money) -> String {
    if amount.is_positive() {
        format!("+{amount}")
    } else {
        amount.to_string()
    }
}

fn draft_from_line(line: &ExpenseLine, currency: CurrencyCode) -> ExpenseDraft {
    let split = match &line.split {
        SplitSpec::Equal(ids) => SplitRule::Equal(ids.iter().copied().map(MemberId).collect()),
        SplitSpec::Exact(shares) => SplitRule::Exact(
            shares
                .iter()
                .map(|&(id, share)| (MemberId(id), Money::from_i64(share)))
                .collect(),
        ),
        SplitSpec::Shares(weights) => SplitRule::Shares(
            weights
                .iter()
                .map(|&(id, weight)| (MemberId(id), weight))
                .collect(),
        ),
    };

    ExpenseDraft {
        payer: MemberId(line.payer),
        total: Money::from_i64(line.amount),
        currency,
        split,
    }
}
