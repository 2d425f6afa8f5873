//! Main ledger orchestration layer
//!
//! This module ties together storage, the writer actor and metrics into the
//! narrow API the web and CLI collaborators call: add operation, get
//! balances, get history, compact.
//!
//! # Example
//!
//! ```no_run
//! use rust_decimal::Decimal;
//! use tab_ledger::{Config, Ledger, OperationKind};
//!
//! #[tokio::main]
//! async fn main() -> tab_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     ledger.append_operation("Maria", Decimal::new(10000, 2), OperationKind::Debt).await?;
//!     for balance in ledger.get_balances().await? {
//!         println!("{}: {}", balance.client, balance.amount);
//!     }
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    balances::to_balances,
    compaction::CompactionToken,
    history::History,
    metrics::Metrics,
    types::{Balance, BalanceStatus, ClientName, CompactionKind, OperationKind},
    Config, Error, Result, Storage,
};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for all storage access
    handle: LedgerHandle,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// Balances are rebuilt from the log before this returns.
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Storage::open(&config)?;
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to register metrics: {}", e)))?;

        let handle = spawn_ledger_actor(storage, &config, metrics.clone())?;

        tracing::info!(
            service = %config.service_name,
            data_dir = ?config.data_dir,
            "Ledger opened"
        );

        Ok(Self {
            handle,
            metrics,
            config,
        })
    }

    /// Record a debt or payment
    ///
    /// The name is normalized and the amount's sign is set from `kind`.
    /// Zero amounts and blank names are rejected before anything is written.
    pub async fn append_operation(
        &self,
        name: &str,
        amount: Decimal,
        kind: OperationKind,
    ) -> Result<()> {
        let client = ClientName::new(name)?;
        let amount = validate_amount(amount)?;
        self.handle.append_operation(client, amount, kind).await
    }

    /// Record a debt
    pub async fn record_debt(&self, name: &str, amount: Decimal) -> Result<()> {
        self.append_operation(name, amount, OperationKind::Debt).await
    }

    /// Record a payment
    pub async fn record_payment(&self, name: &str, amount: Decimal) -> Result<()> {
        self.append_operation(name, amount, OperationKind::Payment)
            .await
    }

    /// Recompute, then return every nonzero balance ordered by name
    pub async fn get_balances(&self) -> Result<Vec<Balance>> {
        let table = self.handle.recompute().await?;
        Ok(to_balances(&table))
    }

    /// Materialized balance of one client
    pub async fn get_individual_balance(&self, name: &str) -> Result<BalanceStatus> {
        self.handle.get_balance(ClientName::new(name)?).await
    }

    /// Every client that ever appeared in the log, alphabetically
    pub async fn list_clients(&self) -> Result<Vec<ClientName>> {
        self.handle.list_clients().await
    }

    /// Newest-first history and current balance
    ///
    /// Unknown clients get an empty history and a settled balance.
    pub async fn get_history(&self, name: &str) -> Result<History> {
        self.handle.get_history(ClientName::new(name)?).await
    }

    /// Issue the single-use confirmation a compaction requires
    pub async fn authorize_compaction(&self, kind: CompactionKind) -> Result<CompactionToken> {
        self.handle.authorize_compaction(kind).await
    }

    /// Collapse every settled client into a zero marker
    ///
    /// Returns whether any client was rewritten.
    pub async fn partial_compaction(&self, token: CompactionToken) -> Result<bool> {
        let outcome = self.handle.compact(CompactionKind::Partial, token).await?;
        Ok(outcome.changed())
    }

    /// Partial compaction, then collapse every client into its balance
    ///
    /// Returns whether any client was rewritten.
    pub async fn total_compaction(&self, token: CompactionToken) -> Result<bool> {
        let outcome = self.handle.compact(CompactionKind::Total, token).await?;
        Ok(outcome.changed())
    }

    /// Check that the stored balances match a fresh scan of the log
    pub async fn verify_balances(&self) -> Result<bool> {
        self.handle.verify_balances().await
    }

    /// Check the administrative credential
    pub async fn check_credentials(&self, username: &str, password: &str) -> Result<bool> {
        self.handle
            .check_credentials(username.to_string(), password.to_string())
            .await
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

/// Parse a user-typed amount
///
/// Surrounding whitespace and minus signs are ignored; the operation kind
/// decides the sign. Non-numeric and zero input is rejected.
pub fn parse_amount(input: &str) -> Result<Decimal> {
    let cleaned = input.trim().trim_matches('-').trim();
    if cleaned.is_empty() {
        return Err(Error::Validation("Amount is empty".to_string()));
    }
    let amount = Decimal::from_str(cleaned)
        .map_err(|e| Error::Validation(format!("Invalid amount {:?}: {}", input, e)))?;
    validate_amount(amount)
}

fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount.is_zero() {
        return Err(Error::Validation("Amount must not be zero".to_string()));
    }
    Ok(amount.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        (Ledger::open(config).await.unwrap(), temp_dir)
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 40.50 ").unwrap(), Decimal::new(4050, 2));
        assert_eq!(parse_amount("-100").unwrap(), Decimal::new(100, 0));
        assert!(parse_amount("abc").unwrap_err().is_validation());
        assert!(parse_amount("0.00").unwrap_err().is_validation());
        assert!(parse_amount("  ").unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let (ledger, _temp) = create_test_ledger().await;
        assert!(ledger.get_balances().await.unwrap().is_empty());
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_maria_settles_and_compacts() {
        let (ledger, _temp) = create_test_ledger().await;

        ledger.record_debt("Maria", Decimal::new(100, 0)).await.unwrap();
        ledger.record_payment("Maria", Decimal::new(40, 0)).await.unwrap();
        assert_eq!(
            ledger.get_individual_balance("maria").await.unwrap(),
            BalanceStatus::Outstanding(Decimal::new(-60, 0))
        );

        ledger.record_payment("Maria", Decimal::new(60, 0)).await.unwrap();
        assert_eq!(
            ledger.get_individual_balance("maria").await.unwrap(),
            BalanceStatus::Settled
        );
        assert!(ledger.get_balances().await.unwrap().is_empty());

        let token = ledger
            .authorize_compaction(CompactionKind::Partial)
            .await
            .unwrap();
        assert!(ledger.partial_compaction(token).await.unwrap());

        let history = ledger.get_history("maria").await.unwrap();
        assert!(history.is_empty());
        assert!(history.is_known());
        assert_eq!(history.balance, BalanceStatus::Settled);

        let clients = ledger.list_clients().await.unwrap();
        assert_eq!(clients, vec![ClientName::new("maria").unwrap()]);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_ana_history_newest_first() {
        let (ledger, _temp) = create_test_ledger().await;

        ledger.record_debt("Ana", Decimal::new(50, 0)).await.unwrap();
        ledger.record_payment("Ana", Decimal::new(20, 0)).await.unwrap();

        let history = ledger.get_history("ana").await.unwrap();
        assert_eq!(history.entries.len(), 2);
        assert_eq!(history.entries[0].kind, OperationKind::Payment);
        assert_eq!(history.entries[0].amount, Decimal::new(20, 0));
        assert_eq!(history.entries[1].kind, OperationKind::Debt);
        assert_eq!(history.entries[1].amount, Decimal::new(50, 0));
        assert!(history.entries[0].timestamp_nanos > history.entries[1].timestamp_nanos);
        assert_eq!(history.balance, BalanceStatus::Outstanding(Decimal::new(-30, 0)));
        assert_eq!(
            history.balance,
            ledger.get_individual_balance("ana").await.unwrap()
        );

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let (ledger, _temp) = create_test_ledger().await;

        let result = ledger.record_debt("Ana", Decimal::ZERO).await;
        assert!(result.unwrap_err().is_validation());

        let result = ledger.record_debt("   ", Decimal::ONE).await;
        assert!(result.unwrap_err().is_validation());

        assert!(ledger.list_clients().await.unwrap().is_empty());
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_client_is_settled() {
        let (ledger, _temp) = create_test_ledger().await;

        let history = ledger.get_history("nobody").await.unwrap();
        assert!(!history.is_known());
        assert_eq!(history.balance, BalanceStatus::Settled);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_credentials() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.admin.username = "Owner".to_string();
        config.admin.password = "fiado".to_string();

        let ledger = Ledger::open(config).await.unwrap();
        assert!(ledger.check_credentials("owner", "fiado").await.unwrap());
        assert!(!ledger.check_credentials("owner", "wrong").await.unwrap());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let (ledger, _temp) = create_test_ledger().await;

        ledger.record_debt("Ana", Decimal::new(50, 0)).await.unwrap();
        ledger.record_debt("Bea", Decimal::new(10, 0)).await.unwrap();

        let metrics = ledger.metrics();
        assert_eq!(metrics.operations_total.with_label_values(&["debt"]).get(), 2);
        assert_eq!(metrics.outstanding_clients.get(), 2);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_error_reaches_caller() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let ledger = Ledger::open(config.clone()).await.unwrap();
        ledger.record_debt("Ana", Decimal::new(5, 0)).await.unwrap();

        // RocksDB holds an exclusive lock on the data directory
        let err = Ledger::open(config).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)), "unexpected error: {}", err);

        assert_eq!(
            ledger.get_individual_balance("ana").await.unwrap(),
            BalanceStatus::Outstanding(Decimal::new(-5, 0))
        );
        ledger.shutdown().await.unwrap();
    }
}
