use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::accounting::account::Account;
use crate::accounting::ledger::Ledger;
use crate::accounting::statement::read_statement;
use crate::accounting::transactions::{decimalise, Transaction};
use crate::accounting::StatementParseError;

#[derive(Debug, Error)]
pub enum StatementFileError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: StatementParseError,
    },
}

#[derive(Debug, Serialize)]
pub struct TransactionRecord<'a> {
    pub account: &'a str,
    pub date: String,
    pub kind: &'a str,
    pub description: &'a str,
    pub amount: Decimal,
    pub balance: Decimal,
}

impl<'a> TransactionRecord<'a> {
    fn new(account: &'a str, transaction: &'a Transaction) -> Self {
        TransactionRecord {
            account,
            date: transaction.date().to_string(),
            kind: transaction.kind(),
            description: transaction.description(),
            amount: decimalise(transaction.amount()),
            balance: decimalise(transaction.closing_balance()),
        }
    }
}

/// Statements are exported as ISO-8859-1, where every byte is the code point
/// of the same value.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

pub fn read_statement_file(path: &Path) -> Result<(String, Vec<Transaction>), StatementFileError> {
    debug!("reading file {}", path.display());

    let bytes = fs::read(path).map_err(|source| StatementFileError::Io {
        path: path.to_owned(),
        source,
    })?;

    read_statement(decode_latin1(&bytes).lines()).map_err(|source| StatementFileError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Expands directories one level deep into the files they contain, in name order.
pub fn collect_statement_paths(inputs: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut entries = fs::read_dir(input)?
                .map(|entry| entry.map(|entry| entry.path()))
                .collect::<io::Result<Vec<_>>>()?;
            entries.retain(|path| !path.is_dir());
            entries.sort();
            paths.extend(entries);
        } else if input.is_file() {
            paths.push(input.clone());
        } else {
            warn!("{} is not a file", input.display());
        }
    }

    Ok(paths)
}

/// Reads every statement into the ledger and returns how many were read
/// successfully. Unreadable statements and conflicting merges are logged and
/// skipped; only I/O failures abort the batch.
pub fn process_statements(paths: &[PathBuf], ledger: &mut Ledger) -> Result<usize, StatementFileError> {
    let mut successful_reads = 0;

    for path in paths {
        match read_statement_file(path) {
            Ok((account_name, transactions)) => {
                successful_reads += 1;
                info!("read {} transactions for account {}", transactions.len(), account_name);

                if let Err(err) = ledger.add_statement(&account_name, transactions) {
                    debug!("discarded {}: {}", path.display(), err);
                }
            },
            Err(err @ StatementFileError::Parse { .. }) => warn!("{}", err),
            Err(err) => return Err(err),
        }
    }

    Ok(successful_reads)
}

fn beancount_account(account: &Account) -> String {
    format!("Assets:{}", account.name().trim_start_matches('*'))
}

fn write_beancount_account<W: Write>(writer: &mut W, account: &Account) -> io::Result<()> {
    let (Some(first), Some(last)) = (account.transactions().first(), account.transactions().last()) else {
        return Ok(());
    };
    let name = beancount_account(account);

    writeln!(writer, "2000-01-01 open {}", name)?;

    let opening_balance = first.opening_balance();
    if opening_balance != 0 {
        writeln!(writer, "2000-01-01 pad {} Equity:Opening-Balances", name)?;
        writeln!(writer, "{} balance {} {} GBP", first.date(), name, decimalise(opening_balance))?;
    }

    for transaction in account.transactions() {
        let counterpart = if transaction.amount() < 0 {
            "Expenses:Unknown"
        } else {
            "Income:Unknown"
        };

        writeln!(writer)?;
        writeln!(
            writer,
            "{} * \"{}\"",
            transaction.date(),
            transaction.description().replace('"', "\\\"")
        )?;
        writeln!(writer, "  kind: \"{}\"", transaction.kind().replace('"', "\\\""))?;
        writeln!(writer, "  {}  {} GBP", name, decimalise(transaction.amount()))?;
        writeln!(writer, "  {}", counterpart)?;
    }

    let closing_date = last.date().succ_opt().unwrap_or(last.date());
    writeln!(writer)?;
    writeln!(
        writer,
        "{} balance {} {} GBP",
        closing_date,
        name,
        decimalise(last.closing_balance())
    )?;
    writeln!(writer)?;

    Ok(())
}

pub fn export_beancount<W: Write>(ledger: &Ledger, mut writer: W) -> Result<()> {
    writeln!(writer, "option \"operating_currency\" \"GBP\"")?;
    writeln!(writer)?;
    writeln!(writer, "2000-01-01 open Income:Unknown")?;
    writeln!(writer, "2000-01-01 open Expenses:Unknown")?;
    writeln!(writer, "2000-01-01 open Equity:Opening-Balances")?;
    writeln!(writer)?;

    for (_name, account) in ledger.accounts_iter() {
        write_beancount_account(&mut writer, account)?;
    }

    writer.flush()?;

    Ok(())
}

pub fn export_csv<W: Write>(ledger: &Ledger, writer: W) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    for (name, account) in ledger.accounts_iter() {
        for transaction in account.transactions() {
            csv_writer.serialize(TransactionRecord::new(name, transaction))?;
        }
    }

    csv_writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    /// A Nationwide statement as exported: ISO-8859-1 with CRLF line endings.
    fn nationwide_bytes(rows: &[&str]) -> Vec<u8> {
        let mut lines = vec![
            r#""Account Name:","FlexDirect ****12345""#,
            r#""Account Balance:","£805.00""#,
            "",
            r#""Date","Transaction type","Description","Paid out","Paid in","Balance""#,
        ];
        lines.extend(rows);

        lines.join("\r\n").chars().map(|c| c as u8).collect()
    }

    fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    const FEBRUARY: [&str; 2] = [
        r#""01 Feb 2025","Transfer from","OPENING","","£1000.00","£1000.00""#,
        r#""10 Feb 2025","Payment to","SHOP","£200.00","","£800.00""#,
    ];

    const MARCH: [&str; 2] = [
        r#""10 Feb 2025","Payment to","SHOP","£200.00","","£800.00""#,
        r#""01 Mar 2025","Interest added","INTEREST","","£5.00","£805.00""#,
    ];

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode_latin1(b"\xa3100.00"), "£100.00");
    }

    #[test]
    fn test_read_statement_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_file(&dir, "statement.csv", &nationwide_bytes(&FEBRUARY));

        let (account, transactions) = read_statement_file(&path)?;

        assert_eq!(account, "****12345");
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[1].closing_balance(), 80000);

        Ok(())
    }

    #[test]
    fn test_read_missing_file() {
        match read_statement_file(Path::new("nonexistent_statement.csv")) {
            Err(StatementFileError::Io { .. }) => {},
            other => panic!("missing file should be an I/O error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_random_file() -> Result<()> {
        let dir = TempDir::new()?;
        let path = write_file(&dir, "random-file.txt", b"just some text\r\nnothing else\r\n");

        if let Err(StatementFileError::Parse { source, .. }) = read_statement_file(&path) {
            assert_eq!(source, StatementParseError::UnknownFormat);
        } else {
            bail!("random file should not parse as a statement");
        }

        Ok(())
    }

    #[test]
    fn test_collect_statement_paths() -> Result<()> {
        let dir = TempDir::new()?;
        let b = write_file(&dir, "b.csv", b"");
        let a = write_file(&dir, "a.csv", b"");
        fs::create_dir(dir.path().join("nested"))?;

        let paths = collect_statement_paths(&[dir.path().to_owned(), dir.path().join("missing.csv")])?;

        assert_eq!(paths, vec![a, b]);

        Ok(())
    }

    #[test]
    fn test_process_statements_skips_bad_files() -> Result<()> {
        let dir = TempDir::new()?;
        let paths = vec![
            write_file(&dir, "february.csv", &nationwide_bytes(&FEBRUARY)),
            write_file(&dir, "empty.csv", b""),
            write_file(&dir, "march.csv", &nationwide_bytes(&MARCH)),
        ];

        let mut ledger = Ledger::new();
        assert_eq!(process_statements(&paths, &mut ledger)?, 2);

        let account = &ledger.accounts["****12345"];
        assert_eq!(account.transactions().len(), 3);
        assert_eq!(account.all_transactions_are_continuous(), Ok(()));

        Ok(())
    }

    #[test]
    fn test_export_beancount() -> Result<()> {
        let dir = TempDir::new()?;
        let paths = vec![write_file(&dir, "march.csv", &nationwide_bytes(&MARCH))];
        let mut ledger = Ledger::new();
        process_statements(&paths, &mut ledger)?;

        let mut output = Vec::new();
        export_beancount(&ledger, &mut output)?;

        let expected = r#"option "operating_currency" "GBP"

2000-01-01 open Income:Unknown
2000-01-01 open Expenses:Unknown
2000-01-01 open Equity:Opening-Balances

2000-01-01 open Assets:12345
2000-01-01 pad Assets:12345 Equity:Opening-Balances
2025-02-10 balance Assets:12345 1000.00 GBP

2025-02-10 * "SHOP"
  kind: "Payment to"
  Assets:12345  -200.00 GBP
  Expenses:Unknown

2025-03-01 * "INTEREST"
  kind: "Interest added"
  Assets:12345  5.00 GBP
  Income:Unknown

2025-03-02 balance Assets:12345 805.00 GBP

"#;
        assert_eq!(String::from_utf8(output)?, expected);

        Ok(())
    }

    #[test]
    fn test_export_csv() -> Result<()> {
        let dir = TempDir::new()?;
        let paths = vec![write_file(&dir, "february.csv", &nationwide_bytes(&FEBRUARY))];
        let mut ledger = Ledger::new();
        process_statements(&paths, &mut ledger)?;

        let mut output = Vec::new();
        export_csv(&ledger, &mut output)?;

        assert_eq!(
            String::from_utf8(output)?,
            "account,date,kind,description,amount,balance\n\
             ****12345,2025-02-01,Transfer from,OPENING,1000.00,1000.00\n\
             ****12345,2025-02-10,Payment to,SHOP,-200.00,800.00\n"
        );

        Ok(())
    }
}
