//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Normalized client identity (lowercase, trimmed)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized client name (lowercase, trimmed)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientName(String);

impl ClientName {
    /// Normalize and validate a raw name
    pub fn new(raw: &str) -> crate::Result<Self> {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            return Err(crate::Error::Validation(
                "Client name must not be empty".to_string(),
            ));
        }
        // NUL separates the name from the timestamp in storage keys
        if name.contains('\0') {
            return Err(crate::Error::Validation(
                "Client name must not contain NUL".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_normalized(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Operation kind, as chosen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Client took goods on credit (stored negative)
    Debt,
    /// Client paid back (stored positive)
    Payment,
}

impl OperationKind {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Debt => "debt",
            OperationKind::Payment => "payment",
        }
    }

    /// Apply the sign convention to an amount of either sign
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            OperationKind::Debt => -amount.abs(),
            OperationKind::Payment => amount.abs(),
        }
    }

    /// Kind implied by a stored amount; `None` for synthetic zero entries
    pub fn from_signed(amount: Decimal) -> Option<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            Some(OperationKind::Debt)
        } else if amount.is_zero() {
            None
        } else {
            Some(OperationKind::Payment)
        }
    }
}

impl FromStr for OperationKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "debt" => Ok(OperationKind::Debt),
            "payment" => Ok(OperationKind::Payment),
            other => Err(crate::Error::Validation(format!(
                "Unknown operation kind: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single entry in the operation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Client this operation belongs to
    pub client: ClientName,

    /// Signed amount: negative = debt, positive = payment, zero = compaction marker
    pub amount: Decimal,

    /// Timestamp (nanoseconds since Unix epoch)
    pub timestamp_nanos: i64,
}

impl Operation {
    /// Operation time as a UTC instant
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp_nanos)
    }

    /// Kind implied by the sign; `None` for synthetic zero entries
    pub fn kind(&self) -> Option<OperationKind> {
        OperationKind::from_signed(self.amount)
    }

    /// True for entries written by compaction to mark a settled client
    pub fn is_marker(&self) -> bool {
        self.amount.is_zero()
    }
}

/// Materialized balance of one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Client
    pub client: ClientName,

    /// Sum of signed amounts (never zero)
    pub amount: Decimal,
}

/// Balance lookup result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceStatus {
    /// Nonzero balance on record
    Outstanding(Decimal),
    /// No balance record (settled or never transacted)
    Settled,
}

impl BalanceStatus {
    /// Amount owed (negative) or in favour (positive); zero when settled
    pub fn amount(&self) -> Decimal {
        match self {
            BalanceStatus::Outstanding(amount) => *amount,
            BalanceStatus::Settled => Decimal::ZERO,
        }
    }

    /// True when no balance record exists
    pub fn is_settled(&self) -> bool {
        matches!(self, BalanceStatus::Settled)
    }
}

impl From<Option<Decimal>> for BalanceStatus {
    fn from(amount: Option<Decimal>) -> Self {
        match amount {
            Some(amount) if !amount.is_zero() => BalanceStatus::Outstanding(amount),
            _ => BalanceStatus::Settled,
        }
    }
}

impl fmt::Display for BalanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceStatus::Outstanding(amount) => write!(f, "${:.2}", amount),
            BalanceStatus::Settled => write!(f, "settled"),
        }
    }
}

/// Compaction procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactionKind {
    /// Collapse settled clients into a zero marker
    Partial,
    /// Partial, then collapse every other client into its balance
    Total,
}

impl CompactionKind {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            CompactionKind::Partial => "partial",
            CompactionKind::Total => "total",
        }
    }
}

impl FromStr for CompactionKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "partial" => Ok(CompactionKind::Partial),
            "total" => Ok(CompactionKind::Total),
            other => Err(crate::Error::Validation(format!(
                "Unknown compaction kind: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for CompactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
