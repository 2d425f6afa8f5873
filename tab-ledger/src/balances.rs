//! Balance materializer
//!
//! The balance table is a pure function of the operation log: every
//! materialization sums each client's signed amounts from a full scan,
//! replaces the whole table and drops exact zeros. Nothing updates a
//! balance incrementally.

use crate::{
    error::{Error, Result},
    storage::{BalanceTable, Storage},
    types::{Balance, Operation},
};
use rust_decimal::Decimal;

/// Sum signed amounts per client, keeping only nonzero totals
pub fn materialize<'a, I>(operations: I) -> Result<BalanceTable>
where
    I: IntoIterator<Item = &'a Operation>,
{
    let mut table = BalanceTable::new();
    for operation in operations {
        let total = table.entry(operation.client.clone()).or_insert(Decimal::ZERO);
        *total = total.checked_add(operation.amount).ok_or_else(|| {
            Error::InvariantViolation(format!("Balance overflow for {}", operation.client))
        })?;
    }
    table.retain(|_, total| !total.is_zero());
    Ok(table)
}

/// Rebuild the stored balance table from the log
pub fn recompute(storage: &Storage) -> Result<BalanceTable> {
    let operations = storage.scan_operations()?;
    let table = materialize(&operations)?;

    let mut tx = storage.transaction();
    tx.replace_balances(&table)?;
    tx.commit()?;

    tracing::debug!(
        operations = operations.len(),
        outstanding = table.len(),
        "Balances recomputed"
    );

    Ok(table)
}

/// Check the stored table against a fresh scan, without writing
pub fn verify(storage: &Storage) -> Result<bool> {
    let expected = materialize(&storage.scan_operations()?)?;
    let stored = storage.balances()?;

    if expected != stored {
        tracing::warn!(
            expected = expected.len(),
            stored = stored.len(),
            "Balance table diverged from operation log"
        );
        return Ok(false);
    }
    Ok(true)
}

/// Ordered (by name) balance list
pub fn to_balances(table: &BalanceTable) -> Vec<Balance> {
    table
        .iter()
        .map(|(client, amount)| Balance {
            client: client.clone(),
            amount: *amount,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientName;
    use crate::Config;

    fn op(name: &str, cents: i64, timestamp_nanos: i64) -> Operation {
        Operation {
            client: ClientName::new(name).unwrap(),
            amount: Decimal::new(cents, 2),
            timestamp_nanos,
        }
    }

    #[test]
    fn test_materialize_sums_per_client() {
        let ops = vec![
            op("maria", -10000, 1),
            op("maria", 4000, 2),
            op("ana", -5000, 3),
        ];
        let table = materialize(&ops).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table[&ClientName::new("maria").unwrap()], Decimal::new(-6000, 2));
        assert_eq!(table[&ClientName::new("ana").unwrap()], Decimal::new(-5000, 2));
    }

    #[test]
    fn test_materialize_drops_settled() {
        let ops = vec![op("maria", -10000, 1), op("maria", 10000, 2), op("ana", 0, 3)];
        assert!(materialize(&ops).unwrap().is_empty());
    }

    #[test]
    fn test_materialize_overflow() {
        let ops = vec![
            Operation {
                client: ClientName::new("ana").unwrap(),
                amount: Decimal::MAX,
                timestamp_nanos: 1,
            },
            Operation {
                client: ClientName::new("ana").unwrap(),
                amount: Decimal::MAX,
                timestamp_nanos: 2,
            },
        ];
        assert!(matches!(materialize(&ops), Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Storage::open(&config).unwrap();

        let mut tx = storage.transaction();
        tx.put_operation(&op("maria", -10000, 1)).unwrap();
        tx.put_operation(&op("ana", -5000, 2)).unwrap();
        tx.put_operation(&op("ana", 5000, 3)).unwrap();
        tx.commit().unwrap();

        assert!(!verify(&storage).unwrap());

        let first = recompute(&storage).unwrap();
        let second = recompute(&storage).unwrap();
        assert_eq!(first, second);
        assert_eq!(storage.balances().unwrap(), first);
        assert!(verify(&storage).unwrap());

        let balances = to_balances(&first);
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].client.as_str(), "maria");
    }
}
