use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use enum_dispatch::enum_dispatch;
use once_cell::sync::OnceCell;
use regex::Regex;
use rust_decimal::Decimal;

use super::transactions::Transaction;
use super::{RowError, RowParser};

/// Order in which a format lists its transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOrder {
    Chronological,
    ReverseChronological,
}

/// Midata export: newest first, one signed amount column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Midata;

/// Nationwide statement export: oldest first, separate paid out/paid in columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NationwideStatement;

#[enum_dispatch(RowParser)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementFormat {
    Midata,
    NationwideStatement,
}

impl StatementFormat {
    /// Known formats, in detection order.
    pub const ALL: [StatementFormat; 2] = [
        StatementFormat::Midata(Midata),
        StatementFormat::NationwideStatement(NationwideStatement),
    ];

    /// Finds the first format whose banner pattern matches `line`, along with
    /// the account identifier it captured.
    pub fn detect(line: &str) -> Option<(StatementFormat, String)> {
        Self::ALL
            .iter()
            .find_map(|format| format.get_account_description(line).map(|account| (*format, account)))
    }

    pub fn get_account_description(&self, line: &str) -> Option<String> {
        self.account_pattern()
            .captures(line)
            .and_then(|captures| captures.get(1))
            .map(|account| account.as_str().to_owned())
    }

    pub fn field_count(&self) -> usize {
        self.header().matches(',').count() + 1
    }

    pub fn parse_transaction<S: AsRef<str>>(&self, fields: &[S]) -> Result<Transaction, RowError> {
        let expected = self.field_count();
        if fields.len() != expected {
            return Err(RowError::FieldCount {
                expected,
                found: fields.len(),
            });
        }

        let fields: Vec<&str> = fields.iter().map(AsRef::as_ref).collect();
        self.parse_fields(&fields)
    }

    /// Whether `next` may follow `previous` when both are read in file order.
    pub fn validate(&self, previous: &Transaction, next: &Transaction) -> bool {
        match self.transaction_order() {
            TransactionOrder::Chronological => next.succeeds(previous),
            TransactionOrder::ReverseChronological => previous.succeeds(next),
        }
    }

    /// Date-only version of [`StatementFormat::validate`].
    pub fn date_ordering_is_valid(&self, previous: &Transaction, next: &Transaction) -> bool {
        match self.transaction_order() {
            TransactionOrder::Chronological => next.date() >= previous.date(),
            TransactionOrder::ReverseChronological => next.date() <= previous.date(),
        }
    }

    /// Puts transactions read in file order into calendar order.
    pub fn order(&self, mut transactions: Vec<Transaction>) -> Vec<Transaction> {
        if self.transaction_order() == TransactionOrder::ReverseChronological {
            transactions.reverse();
        }
        transactions
    }
}

impl fmt::Display for StatementFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl RowParser for Midata {
    fn name(&self) -> &'static str {
        "Midata"
    }

    fn header(&self) -> &'static str {
        r#""Date","Type","Merchant/Description","Debit/Credit","Balance""#
    }

    fn account_pattern(&self) -> &'static Regex {
        static PATTERN: OnceCell<Regex> = OnceCell::new();
        PATTERN.get_or_init(|| Regex::new(r#""Account Number:","([^"]+)""#).expect("valid account pattern"))
    }

    fn transaction_order(&self) -> TransactionOrder {
        TransactionOrder::ReverseChronological
    }

    fn parse_fields(&self, fields: &[&str]) -> Result<Transaction, RowError> {
        let date = parse_date("date", fields[0], "%d/%m/%Y")?;
        let amount = parse_money("debit/credit", fields[3])?;
        let closing_balance = parse_money("balance", fields[4])?;

        Ok(Transaction::new(date, amount, fields[1], fields[2], closing_balance))
    }
}

impl RowParser for NationwideStatement {
    fn name(&self) -> &'static str {
        "Nationwide statement"
    }

    fn header(&self) -> &'static str {
        r#""Date","Transaction type","Description","Paid out","Paid in","Balance""#
    }

    fn account_pattern(&self) -> &'static Regex {
        static PATTERN: OnceCell<Regex> = OnceCell::new();
        PATTERN.get_or_init(|| Regex::new(r#""Account Name:","[^"*]*(\*+\d+)""#).expect("valid account pattern"))
    }

    fn transaction_order(&self) -> TransactionOrder {
        TransactionOrder::Chronological
    }

    fn parse_fields(&self, fields: &[&str]) -> Result<Transaction, RowError> {
        let date = parse_date("date", fields[0], "%d %b %Y")?;
        let closing_balance = parse_money("balance", fields[5])?;

        // exactly one of paid out/paid in is populated
        let amount = match (fields[3], fields[4]) {
            (paid_out, "") if !paid_out.is_empty() => -parse_money("paid out", paid_out)?,
            ("", paid_in) if !paid_in.is_empty() => parse_money("paid in", paid_in)?,
            (paid_out, paid_in) => {
                return Err(RowError::MalformedField {
                    field: "paid out/paid in",
                    value: format!("{}/{}", paid_out, paid_in),
                })
            },
        };

        Ok(Transaction::new(date, amount, fields[1], fields[2], closing_balance))
    }
}

fn parse_date(field: &'static str, value: &str, format: &str) -> Result<NaiveDate, RowError> {
    NaiveDate::parse_from_str(value, format).map_err(|_| RowError::MalformedField {
        field,
        value: value.to_owned(),
    })
}

/// Largest magnitude in pence accepted for any money field. A balance plus or
/// minus an amount always fits in an `i64`.
const MAX_PENCE: i64 = i64::MAX / 2;

/// Parses `£12.34`, `+£12.34` or `-£12.34` into pence.
fn parse_money(field: &'static str, value: &str) -> Result<i64, RowError> {
    let malformed = || RowError::MalformedField {
        field,
        value: value.to_owned(),
    };

    let (sign, magnitude) = if let Some(rest) = value.strip_prefix('£') {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix("+£") {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix("-£") {
        (-1, rest)
    } else {
        return Err(malformed());
    };

    if !magnitude.starts_with(|c: char| c.is_ascii_digit())
        || !magnitude.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return Err(malformed());
    }

    let magnitude = Decimal::from_str(magnitude).map_err(|_| malformed())?;
    if magnitude.scale() != 2 {
        return Err(malformed());
    }

    let pence = i64::try_from(magnitude.mantissa()).map_err(|_| malformed())?;
    if pence > MAX_PENCE {
        return Err(malformed());
    }

    Ok(sign * pence)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const MIDATA: StatementFormat = StatementFormat::Midata(Midata);
    const NATIONWIDE: StatementFormat = StatementFormat::NationwideStatement(NationwideStatement);

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("amount", "£12.34"), Ok(1234));
        assert_eq!(parse_money("amount", "+£0.05"), Ok(5));
        assert_eq!(parse_money("amount", "-£100.00"), Ok(-10000));
        assert_eq!(parse_money("amount", "£0.50"), Ok(50));
        assert_eq!(parse_money("amount", "-£46116860184273879.03"), Ok(-MAX_PENCE));
    }

    #[test]
    fn test_parse_money_rejects_malformed_values() {
        for value in [
            "12.34",
            "£12.3",
            "£12",
            "£-12.34",
            "£1,000.00",
            "$12.34",
            "",
            "£",
            "£.50",
            "+£.50",
            "£92233720368547758.07",
        ] {
            assert_eq!(
                parse_money("amount", value),
                Err(RowError::MalformedField {
                    field: "amount",
                    value: value.to_owned()
                }),
                "{value:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_detect_midata() {
        let (format, account) = StatementFormat::detect(r#""Account Number:","****12345""#).unwrap();

        assert_eq!(format, MIDATA);
        assert_eq!(account, "****12345");
        assert_eq!(format.to_string(), "Midata");
    }

    #[test]
    fn test_detect_nationwide() {
        let (format, account) = StatementFormat::detect(r#""Account Name:","FlexDirect ****12345""#).unwrap();

        assert_eq!(format, NATIONWIDE);
        assert_eq!(account, "****12345");
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(StatementFormat::detect("hello world"), None);
        assert_eq!(StatementFormat::detect(r#""Account Name:","FlexDirect""#), None);
        assert_eq!(MIDATA.get_account_description(r#""Account Name:","****12345""#), None);
    }

    #[test]
    fn test_field_count() {
        assert_eq!(MIDATA.field_count(), 5);
        assert_eq!(NATIONWIDE.field_count(), 6);
    }

    #[test]
    fn test_parse_midata_row() {
        let transaction = MIDATA
            .parse_transaction(&["13/06/2025", "Contactless Payment", "SHOP", "-£4.50", "£95.50"])
            .unwrap();

        assert_eq!(transaction, Transaction::new(day(13), -450, "Contactless Payment", "SHOP", 9550));
    }

    #[test]
    fn test_parse_nationwide_rows() {
        let paid_out = NATIONWIDE
            .parse_transaction(&["13 Jun 2025", "Payment to", "SHOP", "£4.50", "", "£95.50"])
            .unwrap();
        let paid_in = NATIONWIDE
            .parse_transaction(&["14 Jun 2025", "Transfer from", "SAVINGS", "", "£4.50", "£100.00"])
            .unwrap();

        assert_eq!(paid_out, Transaction::new(day(13), -450, "Payment to", "SHOP", 9550));
        assert_eq!(paid_in, Transaction::new(day(14), 450, "Transfer from", "SAVINGS", 10000));
    }

    #[test]
    fn test_parse_nationwide_requires_exactly_one_amount() {
        for (paid_out, paid_in) in [("", ""), ("£1.00", "£1.00")] {
            let result = NATIONWIDE.parse_transaction(&["14 Jun 2025", "Transfer", "X", paid_out, paid_in, "£1.00"]);
            assert!(
                matches!(result, Err(RowError::MalformedField { field: "paid out/paid in", .. })),
                "{paid_out:?}/{paid_in:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_wrong_field_count() {
        assert_eq!(
            NATIONWIDE.parse_transaction(&["14 Jun 2025", "Transfer", "X", "", "£1.00"]),
            Err(RowError::FieldCount { expected: 6, found: 5 })
        );
    }

    #[test]
    fn test_parse_malformed_dates() {
        assert_eq!(
            MIDATA.parse_transaction(&["2025-06-13", "Payment", "SHOP", "-£4.50", "£95.50"]),
            Err(RowError::MalformedField {
                field: "date",
                value: "2025-06-13".to_owned()
            })
        );
        assert!(NATIONWIDE
            .parse_transaction(&["13 Foo 2025", "Payment", "SHOP", "£4.50", "", "£95.50"])
            .is_err());
    }

    #[test]
    fn test_validate_follows_file_order() {
        let earlier = Transaction::new(day(1), 100, "Transfer", "", 100);
        let later = Transaction::new(day(2), -40, "Payment", "", 60);

        assert!(NATIONWIDE.validate(&earlier, &later));
        assert!(!NATIONWIDE.validate(&later, &earlier));
        assert!(MIDATA.validate(&later, &earlier));
        assert!(!MIDATA.validate(&earlier, &later));

        assert!(NATIONWIDE.date_ordering_is_valid(&earlier, &later));
        assert!(MIDATA.date_ordering_is_valid(&later, &earlier));
        assert!(!MIDATA.date_ordering_is_valid(&earlier, &later));
    }

    #[test]
    fn test_order() {
        let transactions = vec![
            Transaction::new(day(2), -40, "Payment", "", 60),
            Transaction::new(day(1), 100, "Transfer", "", 100),
        ];

        assert_eq!(NATIONWIDE.order(transactions.clone()), transactions);
        assert_eq!(
            MIDATA.order(transactions.clone()),
            vec![transactions[1].clone(), transactions[0].clone()]
        );
    }
}
