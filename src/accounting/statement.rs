use std::mem;

use log::{debug, warn};

use super::formats::StatementFormat;
use super::transactions::Transaction;
use super::{RowError, RowParser, StatementParseError};

/// Reads the lines of an exported statement into the account identifier and
/// its transactions in calendar order.
///
/// The first line must be a banner recognised by one of the known formats.
/// Lines up to the format's column header are skipped, then rows are read
/// until the first empty row or the end of input. Rows that break the
/// balance chain are repaired where the break is explained by a single
/// misplaced interest payment, otherwise the whole statement is rejected.
pub fn read_statement<I>(lines: I) -> Result<(String, Vec<Transaction>), StatementParseError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut state = State::SeekingFormat;

    for (index, line) in lines.into_iter().enumerate() {
        state = state.next(index + 1, line.as_ref())?;
        if matches!(state, State::Done { .. }) {
            break;
        }
    }

    state.finish()
}

enum State {
    SeekingFormat,
    SeekingDataHeader { format: StatementFormat, account: String },
    ReadingRows { account: String, reconciler: Reconciler },
    Done { account: String, reconciler: Reconciler },
}

impl State {
    fn next(self, line_number: usize, line: &str) -> Result<State, StatementParseError> {
        match self {
            State::SeekingFormat => {
                let (format, account) = StatementFormat::detect(line).ok_or(StatementParseError::UnknownFormat)?;
                debug!("detected format {} for account {}", format, account);

                Ok(State::SeekingDataHeader { format, account })
            },
            State::SeekingDataHeader { format, account } => {
                if line.trim() == format.header() {
                    debug!("detected start of transaction data on line {}", line_number);
                    Ok(State::ReadingRows {
                        account,
                        reconciler: Reconciler::new(format),
                    })
                } else {
                    Ok(State::SeekingDataHeader { format, account })
                }
            },
            State::ReadingRows { account, mut reconciler } => {
                let fields = split_row(line).map_err(|source| StatementParseError::Row {
                    row: line_number,
                    source,
                })?;

                if fields.is_empty() {
                    debug!("reached end of transaction data on line {}", line_number);
                    return Ok(State::Done { account, reconciler });
                }

                let transaction = reconciler
                    .format
                    .parse_transaction(fields.as_slice())
                    .map_err(|source| StatementParseError::Row {
                        row: line_number,
                        source,
                    })?;
                debug!("parsed transaction: {}", transaction);

                reconciler.push(transaction)?;
                Ok(State::ReadingRows { account, reconciler })
            },
            done @ State::Done { .. } => Ok(done),
        }
    }

    fn finish(self) -> Result<(String, Vec<Transaction>), StatementParseError> {
        match self {
            State::SeekingFormat => Err(StatementParseError::EmptyFile),
            State::SeekingDataHeader { format, .. } => Err(StatementParseError::MissingHeader {
                format: format.name(),
            }),
            State::ReadingRows { account, reconciler } | State::Done { account, reconciler } => {
                Ok((account, reconciler.finish()?))
            },
        }
    }
}

/// Tokenizes one comma-separated, double-quoted row. An empty line has no
/// fields; a line of only whitespace is a single field.
fn split_row(line: &str) -> Result<Vec<String>, RowError> {
    if line.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => Ok(record.iter().map(str::to_owned).collect()),
        Some(Err(err)) => Err(RowError::Tokenize(err.to_string())),
        None => Ok(Vec::new()),
    }
}

/// Outstanding repair while reading rows. A statement may hold at most one
/// anomaly at a time.
#[derive(Debug, Default)]
enum Repair {
    #[default]
    Consistent,
    /// A transaction was accepted at this index despite breaking the chain;
    /// a misplaced interest payment is expected to belong just before it.
    Gap(usize),
    /// An interest payment that broke the chain and has not been placed yet.
    PendingInterest(Transaction),
}

/// Accepts transactions in file order, keeping the balance chain intact.
struct Reconciler {
    format: StatementFormat,
    transactions: Vec<Transaction>,
    repair: Repair,
}

impl Reconciler {
    fn new(format: StatementFormat) -> Reconciler {
        Reconciler {
            format,
            transactions: Vec::new(),
            repair: Repair::Consistent,
        }
    }

    fn push(&mut self, transaction: Transaction) -> Result<(), StatementParseError> {
        let transaction = match self.try_append(transaction) {
            Ok(()) => return Ok(()),
            Err(transaction) => transaction,
        };

        if transaction.is_interest() {
            debug!("found an out of order interest transaction");

            match mem::take(&mut self.repair) {
                Repair::PendingInterest(pending) => Err(StatementParseError::InterestAlreadyPending {
                    pending,
                    next: transaction,
                }),
                Repair::Gap(index) => {
                    self.insert(index, transaction).map_err(StatementParseError::GapInsertionFailed)?;
                    debug!("inserted out of order interest transaction into gap at {}", index);
                    Ok(())
                },
                Repair::Consistent => {
                    debug!("saved interest transaction {} to be placed later", transaction);
                    self.repair = Repair::PendingInterest(transaction);
                    Ok(())
                },
            }
        } else {
            debug!("found an inconsistent transaction");

            match mem::take(&mut self.repair) {
                Repair::Gap(index) => Err(StatementParseError::GapAlreadyOpen {
                    open: self.transactions[index].clone(),
                    next: transaction,
                }),
                Repair::PendingInterest(pending) => self.bridge(pending, transaction),
                Repair::Consistent => {
                    self.repair = Repair::Gap(self.transactions.len());
                    self.transactions.push(transaction);
                    debug!("saved a gap for an upcoming out of order interest transaction");
                    Ok(())
                },
            }
        }
    }

    /// Appends `transaction` if it follows the last accepted one, redating an
    /// interest payment on either side when that is enough to restore the
    /// chain. Hands the transaction back if it cannot be appended.
    fn try_append(&mut self, transaction: Transaction) -> Result<(), Transaction> {
        let format = self.format;
        let Some(previous) = self.transactions.last() else {
            self.transactions.push(transaction);
            return Ok(());
        };

        if format.validate(previous, &transaction) {
            self.transactions.push(transaction);
            return Ok(());
        }

        if transaction.is_interest() {
            let redated = transaction.redate(previous.date());
            if format.validate(previous, &redated) {
                debug!(
                    "appended {} after redating it from {}",
                    redated,
                    transaction.date()
                );
                self.transactions.push(redated);
                return Ok(());
            }
        } else if previous.is_interest() {
            let redated_previous = previous.redate(transaction.date());
            let last = self.transactions.len() - 1;
            let fits_before = last == 0 || format.validate(&self.transactions[last - 1], &redated_previous);

            if fits_before && format.validate(&redated_previous, &transaction) {
                debug!(
                    "appended {} after redating prior interest transaction from {}",
                    transaction,
                    previous.date()
                );
                self.transactions[last] = redated_previous;
                self.transactions.push(transaction);
                return Ok(());
            }
        }

        Err(transaction)
    }

    /// Splices an interest payment into the gap reserved at `index`.
    fn insert(&mut self, index: usize, transaction: Transaction) -> Result<(), Transaction> {
        let format = self.format;
        let len = self.transactions.len();

        if index == 0 || index > len {
            warn!("attempted to insert a transaction at invalid index {} of {}", index, len);
            return Err(transaction);
        }

        if index == len {
            return self.try_append(transaction);
        }

        let before = &self.transactions[index - 1];
        let after = &self.transactions[index];

        let candidate = if format.date_ordering_is_valid(before, &transaction)
            && format.date_ordering_is_valid(&transaction, after)
        {
            transaction.clone()
        } else {
            let redated = transaction.redate(before.date().min(after.date()));
            debug!("redating transaction to {} before attempting insertion", redated.date());
            redated
        };

        if format.validate(before, &candidate) && format.validate(&candidate, after) {
            self.transactions.insert(index, candidate);
            Ok(())
        } else {
            Err(transaction)
        }
    }

    /// Places a pending interest payment between the last accepted transaction
    /// and `next`.
    fn bridge(&mut self, interest: Transaction, next: Transaction) -> Result<(), StatementParseError> {
        let format = self.format;
        let Some(previous) = self.transactions.last() else {
            return Err(StatementParseError::InterestBridgeFailed { interest, next });
        };

        let candidate = if format.date_ordering_is_valid(previous, &interest) {
            interest
        } else {
            interest.redate(previous.date().min(next.date()))
        };

        if format.validate(previous, &candidate) && format.validate(&candidate, &next) {
            debug!("placed saved interest transaction {} before {}", candidate, next);
            self.transactions.push(candidate);
            self.transactions.push(next);
            Ok(())
        } else {
            Err(StatementParseError::InterestBridgeFailed {
                interest: candidate,
                next,
            })
        }
    }

    fn finish(mut self) -> Result<Vec<Transaction>, StatementParseError> {
        match mem::take(&mut self.repair) {
            Repair::Gap(index) => {
                return Err(StatementParseError::UnresolvedGap(self.transactions[index].clone()))
            },
            Repair::PendingInterest(pending) => {
                self.try_append(pending).map_err(StatementParseError::UnplacedInterest)?;
            },
            Repair::Consistent => {},
        }

        Ok(self.format.order(self.transactions))
    }
}
