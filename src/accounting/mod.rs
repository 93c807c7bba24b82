use enum_dispatch::enum_dispatch;
use regex::Regex;
use thiserror::Error;

pub mod account;
pub mod formats;
pub mod ledger;
pub mod statement;
pub mod transactions;


use formats::{Midata, NationwideStatement, StatementFormat, TransactionOrder};
use transactions::Transaction;

/// Failure to turn a single tabular row into a [`Transaction`].
#[derive(Debug, PartialEq, Error)]
pub enum RowError {
    #[error("expected {expected} fields but received {found} instead")]
    FieldCount { expected: usize, found: usize },
    #[error("malformed {field} {value:?}")]
    MalformedField { field: &'static str, value: String },
    #[error("could not tokenize row: {0}")]
    Tokenize(String),
}

/// Every reason a statement can be rejected. A rejected statement never
/// yields a partial transaction list.
#[derive(Debug, PartialEq, Error)]
pub enum StatementParseError {
    #[error("statement is empty")]
    EmptyFile,
    #[error("could not detect a statement format")]
    UnknownFormat,
    #[error("could not detect start of transaction data for {format} statement")]
    MissingHeader { format: &'static str },
    #[error("row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: RowError,
    },
    #[error("encountered out of order interest transaction {next} while handling {pending}")]
    InterestAlreadyPending { pending: Transaction, next: Transaction },
    #[error("out of order interest transaction {0} could not be inserted into expected gap")]
    GapInsertionFailed(Transaction),
    #[error("encountered inconsistent transaction {next} while handling {open}")]
    GapAlreadyOpen { open: Transaction, next: Transaction },
    #[error("inconsistent interest transaction {interest} could not be placed before {next}")]
    InterestBridgeFailed { interest: Transaction, next: Transaction },
    #[error("could not reconcile inconsistent transaction {0}")]
    UnresolvedGap(Transaction),
    #[error("could not reconcile inconsistent interest transaction {0}")]
    UnplacedInterest(Transaction),
}

/// Two sources disagree about the same point in an account's history, or a
/// stored history breaks the date or balance chain.
#[derive(Debug, PartialEq, Error)]
pub enum InconsistentTransactionsError {
    #[error("new transaction {new} conflicts with {existing}")]
    Conflict { new: Transaction, existing: Transaction },
    #[error("transaction {next} does not follow {previous}")]
    Discontinuity { previous: Transaction, next: Transaction },
}

/// Per-format column layout and row parsing.
#[enum_dispatch]
pub trait RowParser {
    fn name(&self) -> &'static str;

    /// Literal column-header line that precedes the transaction rows.
    fn header(&self) -> &'static str;

    /// Pattern matched against the banner line; group 1 is the account identifier.
    fn account_pattern(&self) -> &'static Regex;

    fn transaction_order(&self) -> TransactionOrder;

    /// Parses a row whose arity has already been checked.
    fn parse_fields(&self, fields: &[&str]) -> Result<Transaction, RowError>;
}
