use chrono::NaiveDate;
use getset::Getters;
use log::{debug, info};

use super::transactions::Transaction;
use super::InconsistentTransactionsError;

/// Where the next entry of a merged history comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Existing,
    Incoming,
    /// Both sides hold equivalent entries; the existing one is kept.
    Duplicate,
}

/// An account's transactions, kept in date order.
#[derive(Debug, Clone, Default, Getters)]
#[getset(get = "pub")]
pub struct Account {
    name: String,
    transactions: Vec<Transaction>,
}

impl Account {
    pub fn new(name: impl Into<String>) -> Account {
        Account {
            name: name.into(),
            transactions: Vec::new(),
        }
    }

    pub fn with_transactions(name: impl Into<String>, transactions: Vec<Transaction>) -> Account {
        Account {
            name: name.into(),
            transactions,
        }
    }

    /// First and last dates covered, if the account has any transactions.
    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.transactions.first()?.date(), self.transactions.last()?.date()))
    }

    /// Merges a window of transactions into the account, returning how many
    /// were inserted. Entries already present are skipped, entries dated before
    /// an existing one fill gaps. Any other disagreement aborts the merge and
    /// leaves the account untouched.
    pub fn merge_unique(&mut self, new_transactions: Vec<Transaction>) -> Result<usize, InconsistentTransactionsError> {
        let (Some(first), Some(last)) = (new_transactions.first(), new_transactions.last()) else {
            debug!("no new transactions for {}; nothing to do", self.name);
            return Ok(0);
        };
        info!("new transactions window: {} -> {}", first.date(), last.date());

        if self.transactions.is_empty() {
            info!("initialising {} with {} new transactions", self.name, new_transactions.len());
            self.transactions = new_transactions;
            return Ok(self.transactions.len());
        }

        let plan = self.plan_merge(&new_transactions)?;
        let inserted = plan.iter().filter(|step| **step == Step::Incoming).count();

        let mut existing = std::mem::take(&mut self.transactions).into_iter();
        let mut incoming = new_transactions.into_iter();
        let mut merged = Vec::with_capacity(plan.len());

        for step in plan {
            match step {
                Step::Existing => merged.extend(existing.next()),
                Step::Incoming => merged.extend(incoming.next()),
                Step::Duplicate => {
                    merged.extend(existing.next());
                    incoming.next();
                },
            }
        }

        self.transactions = merged;
        info!("merged {} transactions into account {}", inserted, self.name);

        Ok(inserted)
    }

    /// Works out the merged order without touching the account.
    fn plan_merge(&self, new: &[Transaction]) -> Result<Vec<Step>, InconsistentTransactionsError> {
        let old = &self.transactions;
        let mut plan = Vec::with_capacity(old.len() + new.len());
        let (mut old_i, mut new_i) = (0, 0);

        // skip through the history that only one side covers
        let (old_start, new_start) = (old[0].date(), new[0].date());
        if old_start < new_start {
            while old_i < old.len() && old[old_i].date() < new_start {
                plan.push(Step::Existing);
                old_i += 1;
            }
            debug!("skipped over {} earlier old transactions", old_i);
        } else if new_start < old_start {
            while new_i < new.len() && new[new_i].date() < old_start {
                plan.push(Step::Incoming);
                new_i += 1;
            }
            debug!("marked {} earlier new transactions for insertion", new_i);
        }

        while old_i < old.len() && new_i < new.len() {
            if new[new_i].is_equivalent(&old[old_i]) {
                plan.push(Step::Duplicate);
                old_i += 1;
                new_i += 1;
            } else if new[new_i].date() < old[old_i].date() {
                // fills a gap in the existing history
                plan.push(Step::Incoming);
                new_i += 1;
            } else {
                return Err(InconsistentTransactionsError::Conflict {
                    new: new[new_i].clone(),
                    existing: old[old_i].clone(),
                });
            }
        }

        plan.extend((old_i..old.len()).map(|_| Step::Existing));
        plan.extend((new_i..new.len()).map(|_| Step::Incoming));

        Ok(plan)
    }

    /// Checks that every adjacent pair is in date order and keeps the balance
    /// chain intact.
    pub fn all_transactions_are_continuous(&self) -> Result<(), InconsistentTransactionsError> {
        match self.transactions.windows(2).find(|pair| !pair[1].succeeds(&pair[0])) {
            Some(pair) => Err(InconsistentTransactionsError::Discontinuity {
                previous: pair[0].clone(),
                next: pair[1].clone(),
            }),
            None => Ok(()),
        }
    }
}
