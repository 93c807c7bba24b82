use std::fmt;

use chrono::NaiveDate;
use getset::{CopyGetters, Getters};
use rust_decimal::Decimal;

/// Category the bank uses for interest it pays into the account.
pub const INTEREST_KIND: &str = "Interest added";

/// Converts an amount in pence into pounds, e.g. `-12345` into `-123.45`.
pub fn decimalise(pence: i64) -> Decimal {
    Decimal::new(pence, 2)
}

/// One ledger entry. Amounts and balances are in pence; credits are positive.
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Transaction {
    #[getset(get_copy = "pub")]
    date: NaiveDate,
    #[getset(get_copy = "pub")]
    amount: i64,
    #[getset(get = "pub")]
    kind: String,
    #[getset(get = "pub")]
    description: String,
    #[getset(get_copy = "pub")]
    closing_balance: i64,
}

impl Transaction {
    pub fn new(
        date: NaiveDate,
        amount: i64,
        kind: impl Into<String>,
        description: impl Into<String>,
        closing_balance: i64,
    ) -> Transaction {
        Transaction {
            date,
            amount,
            kind: kind.into(),
            description: description.into(),
            closing_balance,
        }
    }

    /// Copy of this transaction posted on a different date.
    pub fn redate(&self, date: NaiveDate) -> Transaction {
        Transaction {
            date,
            ..self.clone()
        }
    }

    pub fn is_interest(&self) -> bool {
        self.amount > 0 && self.kind == INTEREST_KIND
    }

    /// Same financial effect at the same point in time. Kind and description
    /// are ignored because sources word identical entries differently.
    pub fn is_equivalent(&self, other: &Transaction) -> bool {
        self.date == other.date && self.amount == other.amount && self.closing_balance == other.closing_balance
    }

    /// True if this transaction can directly follow `previous` in the ledger.
    /// A balance that would overflow never follows.
    pub fn succeeds(&self, previous: &Transaction) -> bool {
        self.date >= previous.date && previous.closing_balance.checked_add(self.amount) == Some(self.closing_balance)
    }

    /// Balance immediately before this transaction was applied.
    pub fn opening_balance(&self) -> i64 {
        self.closing_balance - self.amount
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preposition = if self.amount < 0 { "to" } else { "from" };
        let magnitude = self.amount.unsigned_abs();

        if magnitude < 100 {
            write!(f, "{}p", magnitude)?;
        } else {
            write!(f, "£{}.{:02}", magnitude / 100, magnitude % 100)?;
        }

        write!(f, " {} {} on {}", preposition, self.description, self.date)
    }
}
