//! Actor-based concurrency for the ledger
//!
//! Every read, append, recompute and compaction runs on one writer task:
//! - One logical writer eliminates races between appends and compactions
//! - Each message runs inside its own storage transaction
//! - Async message passing with backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Web / CLI collaborators (Ledger)            │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   scan log → materialize → one WriteBatch → commit   │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{
    balances::{self, materialize},
    clock::Clock,
    compaction::{self, CompactionOutcome, CompactionToken},
    credentials::Credential,
    history::{self, History},
    metrics::Metrics,
    storage::{BalanceTable, Storage},
    types::{BalanceStatus, ClientName, CompactionKind, Operation, OperationKind},
    Config, Error, Result,
};
use chrono::FixedOffset;
use rust_decimal::Decimal;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Append an operation and rebuild balances
    AppendOperation {
        client: ClientName,
        amount: Decimal,
        kind: OperationKind,
        response: oneshot::Sender<Result<()>>,
    },

    /// Rebuild the balance table from the log
    Recompute {
        response: oneshot::Sender<Result<BalanceTable>>,
    },

    /// Look up one materialized balance
    GetBalance {
        client: ClientName,
        response: oneshot::Sender<Result<BalanceStatus>>,
    },

    /// Distinct client names
    ListClients {
        response: oneshot::Sender<Result<Vec<ClientName>>>,
    },

    /// Client history
    GetHistory {
        client: ClientName,
        response: oneshot::Sender<Result<History>>,
    },

    /// Issue a compaction token
    AuthorizeCompaction {
        kind: CompactionKind,
        response: oneshot::Sender<Result<CompactionToken>>,
    },

    /// Run a confirmed compaction
    Compact {
        kind: CompactionKind,
        token: CompactionToken,
        response: oneshot::Sender<Result<CompactionOutcome>>,
    },

    /// Compare stored balances with a fresh scan
    VerifyBalances {
        response: oneshot::Sender<Result<bool>>,
    },

    /// Check the administrative credential
    CheckCredentials {
        username: String,
        password: String,
        response: oneshot::Sender<Result<bool>>,
    },

    /// Shutdown actor, acknowledged once storage is closed
    Shutdown { response: oneshot::Sender<()> },
}

impl LedgerMessage {
    fn name(&self) -> &'static str {
        match self {
            LedgerMessage::AppendOperation { .. } => "append",
            LedgerMessage::Recompute { .. } => "recompute",
            LedgerMessage::GetBalance { .. } => "get_balance",
            LedgerMessage::ListClients { .. } => "list_clients",
            LedgerMessage::GetHistory { .. } => "get_history",
            LedgerMessage::AuthorizeCompaction { .. } => "authorize_compaction",
            LedgerMessage::Compact { .. } => "compact",
            LedgerMessage::VerifyBalances { .. } => "verify_balances",
            LedgerMessage::CheckCredentials { .. } => "check_credentials",
            LedgerMessage::Shutdown { .. } => "shutdown",
        }
    }
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    /// Storage backend
    storage: Storage,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Timestamp source for new log entries
    clock: Clock,

    /// Outstanding compaction confirmation
    pending_token: Option<CompactionToken>,

    /// History rendering offset
    offset: FixedOffset,

    /// Metrics
    metrics: Metrics,
}

impl LedgerActor {
    /// Create new actor
    ///
    /// Seeds the credential, resumes the clock after the newest logged
    /// operation and rebuilds balances once.
    pub fn new(
        storage: Storage,
        mailbox: mpsc::Receiver<LedgerMessage>,
        config: &Config,
        metrics: Metrics,
    ) -> Result<Self> {
        if storage.seed_credential(&Credential::new(
            config.admin.username.clone(),
            &config.admin.password,
        ))? {
            tracing::info!(username = %config.admin.username, "Seeded administrative credential");
        }

        let last = storage
            .scan_operations()?
            .iter()
            .map(|operation| operation.timestamp_nanos)
            .max()
            .unwrap_or(0);

        let mut actor = Self {
            storage,
            mailbox,
            clock: Clock::resume_after(last),
            pending_token: None,
            offset: config.display.offset()?,
            metrics,
        };
        actor.recompute()?;
        Ok(actor)
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut ack = None;

        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown { response } = msg {
                ack = Some(response);
                break;
            }

            self.handle_message(msg);
        }

        let LedgerActor { storage, .. } = self;
        drop(storage);
        tracing::info!("Ledger actor stopped");

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        let span = tracing::info_span!("ledger", op = msg.name());
        let _enter = span.enter();

        match msg {
            LedgerMessage::AppendOperation {
                client,
                amount,
                kind,
                response,
            } => {
                let result = self.append_operation(client, amount, kind);
                if let Err(ref e) = result {
                    tracing::error!("Append failed: {}", e);
                }
                let _ = response.send(result);
            }

            LedgerMessage::Recompute { response } => {
                let _ = response.send(self.recompute());
            }

            LedgerMessage::GetBalance { client, response } => {
                let result = self.storage.get_balance(&client).map(BalanceStatus::from);
                let _ = response.send(result);
            }

            LedgerMessage::ListClients { response } => {
                let result = self
                    .storage
                    .client_names()
                    .and_then(|names| names.collect::<Result<Vec<_>>>());
                let _ = response.send(result);
            }

            LedgerMessage::GetHistory { client, response } => {
                let _ = response.send(self.history(client));
            }

            LedgerMessage::AuthorizeCompaction { kind, response } => {
                let token = CompactionToken::issue(kind);
                if self.pending_token.replace(token).is_some() {
                    tracing::debug!("Replaced outstanding compaction token");
                }
                tracing::info!(kind = %kind, "Compaction authorized");
                let _ = response.send(Ok(token));
            }

            LedgerMessage::Compact {
                kind,
                token,
                response,
            } => {
                let result = self.compact(kind, token);
                if let Err(ref e) = result {
                    tracing::error!(kind = %kind, "Compaction failed: {}", e);
                }
                let _ = response.send(result);
            }

            LedgerMessage::VerifyBalances { response } => {
                let _ = response.send(balances::verify(&self.storage));
            }

            LedgerMessage::CheckCredentials {
                username,
                password,
                response,
            } => {
                let result = self
                    .storage
                    .get_credential()
                    .map(|stored| stored.is_some_and(|c| c.matches(&username, &password)));
                let _ = response.send(result);
            }

            LedgerMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }

    /// Append one operation and rebuild balances in the same batch
    fn append_operation(
        &mut self,
        client: ClientName,
        amount: Decimal,
        kind: OperationKind,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::Validation("Amount must not be zero".to_string()));
        }

        let started = Instant::now();
        let operation = Operation {
            client,
            amount: kind.signed(amount),
            timestamp_nanos: self.clock.stamp(),
        };

        let mut operations = self.storage.scan_operations()?;
        operations.push(operation.clone());
        let table = materialize(&operations)?;

        let mut tx = self.storage.transaction();
        tx.put_operation(&operation)?;
        tx.replace_balances(&table)?;
        tx.commit()?;

        self.metrics.record_operation(kind);
        self.metrics
            .record_recompute(started.elapsed().as_secs_f64(), table.len());

        tracing::debug!(
            client = %operation.client,
            amount = %operation.amount,
            "Operation appended"
        );
        Ok(())
    }

    fn recompute(&mut self) -> Result<BalanceTable> {
        let started = Instant::now();
        let table = balances::recompute(&self.storage)?;
        self.metrics
            .record_recompute(started.elapsed().as_secs_f64(), table.len());
        Ok(table)
    }

    fn history(&self, client: ClientName) -> Result<History> {
        let operations = self.storage.client_operations(&client)?;
        let balance = BalanceStatus::from(self.storage.get_balance(&client)?);
        Ok(history::build(client, &operations, balance, self.offset))
    }

    fn compact(&mut self, kind: CompactionKind, token: CompactionToken) -> Result<CompactionOutcome> {
        if token.kind() != kind {
            return Err(Error::Unauthorized(format!(
                "Token confirms {} compaction, not {}",
                token.kind(),
                kind
            )));
        }
        if self.pending_token != Some(token) {
            return Err(Error::Unauthorized(
                "Compaction token is unknown or already used".to_string(),
            ));
        }
        self.pending_token = None;

        let outcome = compaction::run(&self.storage, kind, &mut self.clock)?;
        self.metrics.record_compaction(&outcome);
        Ok(outcome)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Append an operation
    pub async fn append_operation(
        &self,
        client: ClientName,
        amount: Decimal,
        kind: OperationKind,
    ) -> Result<()> {
        self.request(|response| LedgerMessage::AppendOperation {
            client,
            amount,
            kind,
            response,
        })
        .await
    }

    /// Rebuild balances
    pub async fn recompute(&self) -> Result<BalanceTable> {
        self.request(|response| LedgerMessage::Recompute { response })
            .await
    }

    /// Get one materialized balance
    pub async fn get_balance(&self, client: ClientName) -> Result<BalanceStatus> {
        self.request(|response| LedgerMessage::GetBalance { client, response })
            .await
    }

    /// List client names
    pub async fn list_clients(&self) -> Result<Vec<ClientName>> {
        self.request(|response| LedgerMessage::ListClients { response })
            .await
    }

    /// Get client history
    pub async fn get_history(&self, client: ClientName) -> Result<History> {
        self.request(|response| LedgerMessage::GetHistory { client, response })
            .await
    }

    /// Issue a compaction token
    pub async fn authorize_compaction(&self, kind: CompactionKind) -> Result<CompactionToken> {
        self.request(|response| LedgerMessage::AuthorizeCompaction { kind, response })
            .await
    }

    /// Run a compaction
    pub async fn compact(
        &self,
        kind: CompactionKind,
        token: CompactionToken,
    ) -> Result<CompactionOutcome> {
        self.request(|response| LedgerMessage::Compact {
            kind,
            token,
            response,
        })
        .await
    }

    /// Verify stored balances
    pub async fn verify_balances(&self) -> Result<bool> {
        self.request(|response| LedgerMessage::VerifyBalances { response })
            .await
    }

    /// Check credentials
    pub async fn check_credentials(&self, username: String, password: String) -> Result<bool> {
        self.request(|response| LedgerMessage::CheckCredentials {
            username,
            password,
            response,
        })
        .await
    }

    /// Shutdown actor and wait until storage is closed
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Storage,
    config: &Config,
    metrics: Metrics,
) -> Result<LedgerHandle> {
    // Bounded channel for backpressure
    let (tx, rx) = mpsc::channel(config.actor.mailbox_capacity.max(1));
    let actor = LedgerActor::new(storage, rx, config, metrics)?;

    tokio::spawn(async move {
        actor.run().await;
    });

    Ok(LedgerHandle::new(tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(config: &Config) -> LedgerHandle {
        let storage = Storage::open(config).unwrap();
        spawn_ledger_actor(storage, config, Metrics::new().unwrap()).unwrap()
    }

    fn test_config() -> (Config, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (config, _temp) = test_config();
        let handle = open(&config);
        handle.shutdown().await.unwrap();

        // Storage lock released, so the same directory opens again
        let handle = open(&config);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_append_updates_balance() {
        let (config, _temp) = test_config();
        let handle = open(&config);
        let maria = ClientName::new("maria").unwrap();

        handle
            .append_operation(maria.clone(), Decimal::new(10000, 2), OperationKind::Debt)
            .await
            .unwrap();

        let balance = handle.get_balance(maria).await.unwrap();
        assert_eq!(balance, BalanceStatus::Outstanding(Decimal::new(-10000, 2)));
        assert!(handle.verify_balances().await.unwrap());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejects_zero_amount() {
        let (config, _temp) = test_config();
        let handle = open(&config);

        let result = handle
            .append_operation(ClientName::new("ana").unwrap(), Decimal::ZERO, OperationKind::Debt)
            .await;
        assert!(result.unwrap_err().is_validation());
        assert!(handle.list_clients().await.unwrap().is_empty());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_token_single_use() {
        let (config, _temp) = test_config();
        let handle = open(&config);

        let token = handle
            .authorize_compaction(CompactionKind::Partial)
            .await
            .unwrap();
        handle.compact(CompactionKind::Partial, token).await.unwrap();

        let reused = handle.compact(CompactionKind::Partial, token).await;
        assert!(matches!(reused, Err(Error::Unauthorized(_))));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_token_bound_to_kind() {
        let (config, _temp) = test_config();
        let handle = open(&config);

        let token = handle
            .authorize_compaction(CompactionKind::Partial)
            .await
            .unwrap();
        let wrong = handle.compact(CompactionKind::Total, token).await;
        assert!(matches!(wrong, Err(Error::Unauthorized(_))));

        // A mismatched attempt does not burn the token
        handle.compact(CompactionKind::Partial, token).await.unwrap();

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_mailbox() {
        let (config, _temp) = test_config();
        let handle = open(&config);
        handle.shutdown().await.unwrap();

        let result = handle.list_clients().await;
        assert!(matches!(result, Err(Error::Concurrency(_))));
    }
}
