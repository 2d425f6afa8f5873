//! Per-client history reporting
//!
//! History is always newest-first. Synthetic zero entries left by compaction
//! are hidden from the list but still tell us the client is known.

use crate::types::{BalanceStatus, ClientName, Operation, OperationKind};
use chrono::{FixedOffset, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One rendered history line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Debt or payment, from the sign
    pub kind: OperationKind,

    /// Absolute amount
    pub amount: Decimal,

    /// Local date
    pub date: NaiveDate,

    /// Local time of day
    pub time: NaiveTime,

    /// Original timestamp (nanoseconds since Unix epoch)
    pub timestamp_nanos: i64,
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ${:.2} on {} at {}",
            self.kind,
            self.amount,
            self.date.format("%d/%m/%Y"),
            self.time.format("%H:%M")
        )
    }
}

/// A client's history and current balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Client
    pub client: ClientName,

    /// Visible operations, newest first
    pub entries: Vec<HistoryEntry>,

    /// Materialized balance
    pub balance: BalanceStatus,

    known: bool,
}

impl History {
    /// True if the client has anything in the log, markers included
    pub fn is_known(&self) -> bool {
        self.known
    }

    /// True if there is nothing to show
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build a client's history from its chronological operations
pub fn build(
    client: ClientName,
    operations: &[Operation],
    balance: BalanceStatus,
    offset: FixedOffset,
) -> History {
    let entries = operations
        .iter()
        .rev()
        .filter_map(|operation| render(operation, offset))
        .collect();

    History {
        client,
        entries,
        balance,
        known: !operations.is_empty(),
    }
}

fn render(operation: &Operation, offset: FixedOffset) -> Option<HistoryEntry> {
    let kind = operation.kind()?;
    let local = operation.timestamp().with_timezone(&offset);
    Some(HistoryEntry {
        kind,
        amount: operation.amount.abs(),
        date: local.date_naive(),
        time: local.time(),
        timestamp_nanos: operation.timestamp_nanos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn op(cents: i64, secs: i64) -> Operation {
        Operation {
            client: ClientName::new("ana").unwrap(),
            amount: Decimal::new(cents, 2),
            timestamp_nanos: secs * 1_000_000_000,
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_newest_first_and_markers_hidden() {
        let ops = vec![op(-5000, 100), op(0, 150), op(2000, 200)];
        let history = build(
            ClientName::new("ana").unwrap(),
            &ops,
            BalanceStatus::Outstanding(Decimal::new(-3000, 2)),
            utc(),
        );

        assert!(history.is_known());
        assert_eq!(history.entries.len(), 2);
        assert_eq!(history.entries[0].kind, OperationKind::Payment);
        assert_eq!(history.entries[0].amount, Decimal::new(2000, 2));
        assert_eq!(history.entries[1].kind, OperationKind::Debt);
        assert_eq!(history.entries[1].amount, Decimal::new(5000, 2));
    }

    #[test]
    fn test_unknown_client() {
        let history = build(
            ClientName::new("nobody").unwrap(),
            &[],
            BalanceStatus::Settled,
            utc(),
        );
        assert!(!history.is_known());
        assert!(history.is_empty());
    }

    #[test]
    fn test_display_uses_offset() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 1, 30, 0).unwrap();
        let ops = vec![Operation {
            client: ClientName::new("ana").unwrap(),
            amount: Decimal::new(2000, 2),
            timestamp_nanos: at.timestamp_nanos_opt().unwrap(),
        }];
        let minus_three = FixedOffset::west_opt(3 * 3600).unwrap();
        let history = build(
            ClientName::new("ana").unwrap(),
            &ops,
            BalanceStatus::Settled,
            minus_three,
        );

        assert_eq!(
            history.entries[0].to_string(),
            "payment $20.00 on 17/10/2026 at 22:30"
        );
    }
}
