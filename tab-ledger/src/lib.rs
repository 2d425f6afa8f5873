//! Tab Ledger Core
//!
//! Per-client debt and payment ledger with a materialized balance table.
//!
//! # Architecture
//!
//! - **Operation Log**: Signed entries (debt negative, payment positive)
//! - **Full Rebuild**: Balances are recomputed from the log, never patched
//! - **Single Writer**: One actor task serializes appends and compactions
//! - **Compaction**: Explicit, token-gated rewrites that collapse history
//!
//! # Invariants
//!
//! - Balance of a client == Σ(signed amounts) of its log entries
//! - Zero balances are never stored
//! - Compaction never changes any balance
//! - Log and balance table are written in the same batch

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod balances;
pub mod clock;
pub mod compaction;
pub mod config;
pub mod credentials;
pub mod error;
pub mod history;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use compaction::{CompactionOutcome, CompactionToken};
pub use config::Config;
pub use error::{Error, Result};
pub use history::{History, HistoryEntry};
pub use ledger::{parse_amount, Ledger};
pub use storage::Storage;
pub use types::{Balance, BalanceStatus, ClientName, CompactionKind, Operation, OperationKind};
