//! Account management functionality

use tracing::info;

use crate::traits::*;
use crate::types::*;
use crate::utils::validation::*;

/// Account manager for creating and looking up accounts
pub struct AccountManager<S: LedgerStorage> {
    pub(crate) storage: S,
}

impl<S: LedgerStorage> AccountManager<S> {
    /// Create a new account manager
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Validate and store a new account
    ///
    /// Credit cards must carry a billing cycle with valid days; every other
    /// kind must not.
    pub async fn create_account(&mut self, account: Account) -> LedgerResult<Account> {
        validate_account(&account)?;

        if self.storage.get_account(&account.id).await?.is_some() {
            return Err(LedgerError::Validation(format!(
                "Account with ID '{}' already exists",
                account.id
            )));
        }

        self.storage.save_account(&account).await?;
        info!(account_id = %account.id, kind = ?account.kind, "Account created");
        Ok(account)
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.storage.get_account(account_id).await
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account_required(&self, account_id: &str) -> LedgerResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    /// Change the closing and due day a card is projected with
    pub async fn set_billing_cycle(
        &mut self,
        account_id: &str,
        cycle: BillingCycle,
    ) -> LedgerResult<Account> {
        let mut account = self.get_account_required(account_id).await?;
        validate_credit_card(&account)?;
        validate_day_of_month(cycle.closing_day, "Closing day")?;
        validate_day_of_month(cycle.due_day, "Due day")?;

        account.billing_cycle = Some(cycle);
        account.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_account(&account).await?;
        Ok(account)
    }
}

fn validate_account(account: &Account) -> LedgerResult<()> {
    validate_account_id(&account.id)?;
    if account.name.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account name cannot be empty".to_string(),
        ));
    }
    if account.currency.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account currency cannot be empty".to_string(),
        ));
    }
    if account.kind.owns_billing_periods() {
        validate_credit_card(account)?;
    } else if account.billing_cycle.is_some() {
        return Err(LedgerError::Validation(format!(
            "Only credit cards carry a billing cycle, '{}' is {:?}",
            account.id, account.kind
        )));
    }
    Ok(())
}
