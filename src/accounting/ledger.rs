use std::collections::btree_map::Iter;
use std::collections::BTreeMap;

use log::warn;

use super::account::Account;
use super::transactions::Transaction;
use super::InconsistentTransactionsError;

/// Every account seen so far, keyed by account identifier.
#[derive(Default)]
pub struct Ledger {
    pub accounts: BTreeMap<String, Account>,
}

impl Ledger {
    pub fn new() -> Ledger {
        Ledger {
            accounts: BTreeMap::new(),
        }
    }

    /// Merges a statement's transactions into the named account, creating the
    /// account the first time it is seen. A conflicting statement is dropped
    /// and the account keeps its previous history.
    pub fn add_statement(
        &mut self,
        name: &str,
        transactions: Vec<Transaction>,
    ) -> Result<usize, InconsistentTransactionsError> {
        let account = self
            .accounts
            .entry(name.to_owned())
            .or_insert_with(|| Account::new(name));

        account.merge_unique(transactions).inspect_err(|err| {
            warn!("skipping statement for account {}: {}", name, err);
        })
    }

    pub fn accounts_iter(&self) -> Iter<'_, String, Account> {
        self.accounts.iter()
    }
}
