//! Recording ledger entries outside of statement imports

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation::*;

/// Records entries and keeps the balances of the accounts they touch in step
pub struct EntryRecorder<S: LedgerStorage> {
    storage: S,
    config: EngineConfig,
}

impl<S: LedgerStorage> EntryRecorder<S> {
    pub fn new(storage: S, config: EngineConfig) -> Self {
        Self { storage, config }
    }

    /// Validate an entry, store it and move the balances it implies
    ///
    /// Pending entries (future installments) are stored without touching
    /// balances.
    pub async fn record_entry(&mut self, entry: LedgerEntry) -> LedgerResult<LedgerEntry> {
        validate_positive_amount(&entry.amount)?;
        let (source, destination) = self.referenced_accounts(&entry).await?;

        self.storage.begin(self.config.default_timeout()).await?;
        match self.record_in_unit(&entry, source, destination).await {
            Ok(()) => {
                self.storage.commit().await?;
                info!(
                    entry_id = %entry.id,
                    kind = ?entry.kind,
                    amount = %entry.amount,
                    "Entry recorded"
                );
                Ok(entry)
            }
            Err(e) => {
                self.storage.rollback().await?;
                Err(e)
            }
        }
    }

    /// Record several entries, typically one installment plan, as one unit
    pub async fn record_entries(
        &mut self,
        entries: Vec<LedgerEntry>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let mut resolved = Vec::with_capacity(entries.len());
        for entry in &entries {
            validate_positive_amount(&entry.amount)?;
            resolved.push(self.referenced_accounts(entry).await?);
        }

        self.storage.begin(self.config.default_timeout()).await?;
        let mut outcome = Ok(());
        for (entry, (source, destination)) in entries.iter().zip(resolved) {
            // Re-read so consecutive entries on one account accumulate.
            let source = self.refreshed(source).await;
            let destination = self.refreshed(destination).await;
            outcome = match (source, destination) {
                (Ok(s), Ok(d)) => self.record_in_unit(entry, s, d).await,
                (Err(e), _) | (_, Err(e)) => Err(e),
            };
            if outcome.is_err() {
                break;
            }
        }
        match outcome {
            Ok(()) => {
                self.storage.commit().await?;
                debug!(count = entries.len(), "Entries recorded");
                Ok(entries)
            }
            Err(e) => {
                self.storage.rollback().await?;
                Err(e)
            }
        }
    }

    /// Get an entry by ID, returning an error if not found
    pub async fn get_entry_required(&self, entry_id: &str) -> LedgerResult<LedgerEntry> {
        self.storage
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| LedgerError::EntryNotFound(entry_id.to_string()))
    }

    /// Entries touching an account, optionally limited to a date range
    pub async fn account_entries(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        self.storage
            .get_account_entries(account_id, start_date, end_date)
            .await
    }

    /// Delete an entry and undo its balance effect
    pub async fn delete_entry(&mut self, entry_id: &str) -> LedgerResult<()> {
        let entry = self.get_entry_required(entry_id).await?;
        let (source, destination) = self.referenced_accounts(&entry).await?;

        self.storage.begin(self.config.default_timeout()).await?;
        match self.delete_in_unit(&entry, source, destination).await {
            Ok(()) => {
                self.storage.commit().await?;
                info!(entry_id, "Entry deleted");
                Ok(())
            }
            Err(e) => {
                self.storage.rollback().await?;
                Err(e)
            }
        }
    }

    async fn referenced_accounts(
        &self,
        entry: &LedgerEntry,
    ) -> LedgerResult<(Option<Account>, Option<Account>)> {
        let source = match &entry.source_account_id {
            Some(id) => Some(self.account_required(id).await?),
            None => None,
        };
        let destination = match &entry.destination_account_id {
            Some(id) => Some(self.account_required(id).await?),
            None => None,
        };

        match entry.kind {
            EntryKind::Expense if source.is_none() => {
                return Err(LedgerError::Validation(
                    "An expense needs a source account".to_string(),
                ))
            }
            EntryKind::Income if destination.is_none() => {
                return Err(LedgerError::Validation(
                    "An income needs a destination account".to_string(),
                ))
            }
            EntryKind::Transfer if source.is_none() || destination.is_none() => {
                return Err(LedgerError::Validation(
                    "A transfer needs both a source and a destination account".to_string(),
                ))
            }
            _ => {}
        }

        for account in source.iter().chain(destination.iter()) {
            if !account.currency.eq_ignore_ascii_case(&entry.currency) {
                return Err(LedgerError::Validation(format!(
                    "Entry currency {} does not match account '{}' ({})",
                    entry.currency, account.id, account.currency
                )));
            }
        }
        Ok((source, destination))
    }

    async fn account_required(&self, account_id: &str) -> LedgerResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    async fn refreshed(&self, account: Option<Account>) -> LedgerResult<Option<Account>> {
        match account {
            Some(a) => Ok(Some(self.account_required(&a.id).await?)),
            None => Ok(None),
        }
    }

    async fn record_in_unit(
        &mut self,
        entry: &LedgerEntry,
        source: Option<Account>,
        destination: Option<Account>,
    ) -> LedgerResult<()> {
        self.storage.save_entry(entry).await?;
        if entry.status == EntryStatus::Completed {
            self.move_balances(&entry.amount, source, destination).await?;
        }
        Ok(())
    }

    async fn delete_in_unit(
        &mut self,
        entry: &LedgerEntry,
        source: Option<Account>,
        destination: Option<Account>,
    ) -> LedgerResult<()> {
        self.storage.delete_entry(&entry.id).await?;
        if entry.status == EntryStatus::Completed {
            self.move_balances(&-entry.amount.clone(), source, destination)
                .await?;
        }
        Ok(())
    }

    async fn move_balances(
        &mut self,
        amount: &BigDecimal,
        source: Option<Account>,
        destination: Option<Account>,
    ) -> LedgerResult<()> {
        if let Some(mut account) = source {
            account.adjust_balance(&-amount.clone());
            self.storage.update_account(&account).await?;
        }
        if let Some(mut account) = destination {
            account.adjust_balance(amount);
            self.storage.update_account(&account).await?;
        }
        Ok(())
    }
}

/// Common entry shapes for card and cash bookkeeping
pub mod patterns {
    use super::*;
    use crate::billing::calendar;

    /// A one-off purchase charged to a card or paid from a liquid account
    pub fn purchase(
        account_id: &str,
        amount: BigDecimal,
        currency: &str,
        date: NaiveDate,
        description: &str,
    ) -> LedgerEntry {
        LedgerEntry::expense(
            account_id,
            amount,
            currency.to_string(),
            date,
            description.to_string(),
        )
    }

    /// A purchase financed in `count` monthly installments
    ///
    /// The first installment is completed on `date`, the rest are pending and
    /// dated one month apart. Installments are rounded to the cent and the
    /// last one takes the remainder.
    pub fn installment_purchase(
        card_id: &str,
        total: &BigDecimal,
        count: u32,
        currency: &str,
        date: NaiveDate,
        description: &str,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        validate_positive_amount(total)?;
        if count < 2 {
            return Err(LedgerError::Validation(
                "An installment plan needs at least 2 installments".to_string(),
            ));
        }

        let share = (total / BigDecimal::from(count)).round(2);
        let group_id = uuid::Uuid::new_v4().to_string();
        let mut allotted = BigDecimal::from(0);
        Ok((1..=count)
            .map(|position| {
                let amount = if position == count {
                    total - &allotted
                } else {
                    share.clone()
                };
                allotted += &amount;
                let status = if position == 1 {
                    EntryStatus::Completed
                } else {
                    EntryStatus::Pending
                };
                LedgerEntry::expense(
                    card_id,
                    amount,
                    currency.to_string(),
                    calendar::shift_date(date, position as i32 - 1),
                    format!("{} ({}/{})", description, position, count),
                )
                .with_installment(group_id.clone(), position, count)
                .with_status(status)
            })
            .collect())
    }

    /// Money leaving `from` and arriving in `to`
    pub fn transfer(
        from: &str,
        to: &str,
        amount: BigDecimal,
        currency: &str,
        date: NaiveDate,
        description: &str,
    ) -> LedgerEntry {
        LedgerEntry::transfer(
            from,
            to,
            amount,
            currency.to_string(),
            date,
            description.to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemoryStorage;
    use std::str::FromStr;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    async fn recorder() -> (MemoryStorage, EntryRecorder<MemoryStorage>) {
        let mut storage = MemoryStorage::new();
        storage
            .save_account(&Account::credit_card(
                "card".to_string(),
                "Visa".to_string(),
                "USD".to_string(),
                15,
                5,
            ))
            .await
            .unwrap();
        storage
            .save_account(
                &Account::new(
                    "bank".to_string(),
                    "Checking".to_string(),
                    AccountKind::Bank,
                    "USD".to_string(),
                )
                .with_balance(BigDecimal::from(1000)),
            )
            .await
            .unwrap();
        let recorder = EntryRecorder::new(storage.clone(), EngineConfig::default());
        (storage, recorder)
    }

    #[tokio::test]
    async fn test_purchase_moves_card_balance() {
        let (storage, mut recorder) = recorder().await;
        let entry = patterns::purchase("card", BigDecimal::from(40), "USD", date(5, 1), "Books");
        recorder.record_entry(entry.clone()).await.unwrap();

        let card = storage.get_account("card").await.unwrap().unwrap();
        assert_eq!(card.balance, BigDecimal::from(-40));

        recorder.delete_entry(&entry.id).await.unwrap();
        let card = storage.get_account("card").await.unwrap().unwrap();
        assert_eq!(card.balance, BigDecimal::from(0));
    }

    #[tokio::test]
    async fn test_record_rejects_bad_entries() {
        let (storage, mut recorder) = recorder().await;
        let zero = patterns::purchase("card", BigDecimal::from(0), "USD", date(5, 1), "Nothing");
        assert_eq!(
            recorder.record_entry(zero).await.unwrap_err().kind(),
            ErrorKind::Validation
        );

        let euro = patterns::purchase("card", BigDecimal::from(5), "EUR", date(5, 1), "Croissant");
        assert_eq!(
            recorder.record_entry(euro).await.unwrap_err().kind(),
            ErrorKind::Validation
        );

        let ghost = patterns::purchase("ghost", BigDecimal::from(5), "USD", date(5, 1), "Ghost");
        assert_eq!(
            recorder.record_entry(ghost).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(storage.entry_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_installment_plan_only_charges_first() {
        let (storage, mut recorder) = recorder().await;
        let plan = patterns::installment_purchase(
            "card",
            &BigDecimal::from(100),
            3,
            "USD",
            date(1, 31),
            "Headphones",
        )
        .unwrap();
        assert_eq!(plan[1].date, date(2, 29));
        assert_eq!(plan[2].amount, BigDecimal::from_str("33.34").unwrap());

        recorder.record_entries(plan).await.unwrap();
        let card = storage.get_account("card").await.unwrap().unwrap();
        assert_eq!(card.balance, -BigDecimal::from_str("33.33").unwrap());
        assert_eq!(storage.entry_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_transfer_between_accounts() {
        let (storage, mut recorder) = recorder().await;
        let entry = patterns::transfer(
            "bank",
            "card",
            BigDecimal::from(250),
            "USD",
            date(5, 3),
            "Top up",
        );
        recorder.record_entry(entry).await.unwrap();

        let bank = storage.get_account("bank").await.unwrap().unwrap();
        let card = storage.get_account("card").await.unwrap().unwrap();
        assert_eq!(bank.balance, BigDecimal::from(750));
        assert_eq!(card.balance, BigDecimal::from(250));
    }
}
