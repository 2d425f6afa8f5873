//! Maintenance compaction
//!
//! Both procedures destroy history. They only run on explicit administrative
//! request, behind a single-use [`CompactionToken`].
//!
//! - **Partial**: every settled client (no balance, at least one operation)
//!   collapses into one zero-amount marker.
//! - **Total**: partial, then every client with a balance collapses into one
//!   entry carrying exactly that balance.
//!
//! A compaction is planned in memory, checked to leave every balance
//! unchanged, and written as one atomic batch.

use crate::{
    balances::materialize,
    clock::Clock,
    error::{Error, Result},
    storage::{BalanceTable, Storage},
    types::{ClientName, CompactionKind, Operation},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Single-use confirmation for one compaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionToken {
    id: Uuid,
    kind: CompactionKind,
}

impl CompactionToken {
    pub(crate) fn issue(kind: CompactionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }

    /// Compaction this token confirms
    pub fn kind(&self) -> CompactionKind {
        self.kind
    }

    /// Token id
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// One client's rewrite
#[derive(Debug, Clone)]
pub struct Rewrite {
    /// Entries deleted
    pub removed: Vec<Operation>,
    /// Synthetic entry written instead
    pub replacement: Operation,
}

/// Planned compaction
#[derive(Debug, Clone)]
pub struct CompactionPlan {
    /// Procedure
    pub kind: CompactionKind,
    /// Per-client rewrites, in client order
    pub rewrites: Vec<Rewrite>,
}

/// What a compaction did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionOutcome {
    /// Procedure
    pub kind: CompactionKind,
    /// Settled clients collapsed into a zero marker
    pub settled: usize,
    /// Clients collapsed into their balance
    pub collapsed: usize,
    /// Log entries deleted
    pub removed: usize,
}

impl CompactionOutcome {
    /// True if any client qualified and was rewritten
    pub fn changed(&self) -> bool {
        self.settled + self.collapsed > 0
    }
}

impl CompactionPlan {
    /// Plan a compaction over the full log and its fresh balance table
    pub fn new(
        kind: CompactionKind,
        operations: &[Operation],
        balances: &BalanceTable,
        clock: &mut Clock,
    ) -> Self {
        let mut rewrites = Vec::new();

        for (client, ops) in group_by_client(operations) {
            let target = match balances.get(&client) {
                None => Decimal::ZERO,
                Some(_) if kind == CompactionKind::Partial => continue,
                Some(balance) => *balance,
            };

            rewrites.push(Rewrite {
                replacement: Operation {
                    client,
                    amount: target,
                    timestamp_nanos: clock.stamp(),
                },
                removed: ops,
            });
        }

        Self { kind, rewrites }
    }

    /// Log as it will look once the plan is applied
    pub fn apply(&self, operations: &[Operation]) -> Vec<Operation> {
        let rewritten: std::collections::BTreeSet<&ClientName> = self
            .rewrites
            .iter()
            .map(|rewrite| &rewrite.replacement.client)
            .collect();

        operations
            .iter()
            .filter(|operation| !rewritten.contains(&operation.client))
            .cloned()
            .chain(self.rewrites.iter().map(|rewrite| rewrite.replacement.clone()))
            .collect()
    }

    /// Summary counts
    pub fn outcome(&self) -> CompactionOutcome {
        let settled = self
            .rewrites
            .iter()
            .filter(|rewrite| rewrite.replacement.is_marker())
            .count();
        CompactionOutcome {
            kind: self.kind,
            settled,
            collapsed: self.rewrites.len() - settled,
            removed: self.rewrites.iter().map(|rewrite| rewrite.removed.len()).sum(),
        }
    }
}

fn group_by_client(operations: &[Operation]) -> BTreeMap<ClientName, Vec<Operation>> {
    let mut groups: BTreeMap<ClientName, Vec<Operation>> = BTreeMap::new();
    for operation in operations {
        groups
            .entry(operation.client.clone())
            .or_default()
            .push(operation.clone());
    }
    groups
}

/// Run a compaction against storage
///
/// Balances are recomputed from a full scan first. The rewritten log must
/// materialize to the same table, otherwise nothing is written.
pub fn run(storage: &Storage, kind: CompactionKind, clock: &mut Clock) -> Result<CompactionOutcome> {
    let operations = storage.scan_operations()?;
    let before = materialize(&operations)?;

    let plan = CompactionPlan::new(kind, &operations, &before, clock);
    let after = materialize(&plan.apply(&operations))?;
    if after != before {
        return Err(Error::InvariantViolation(format!(
            "{} compaction would change balances",
            kind
        )));
    }

    let mut tx = storage.transaction();
    for rewrite in &plan.rewrites {
        tx.delete_operations(&rewrite.removed)?;
        tx.put_operation(&rewrite.replacement)?;
    }
    tx.replace_balances(&after)?;
    tx.commit()?;

    let outcome = plan.outcome();
    tracing::info!(
        kind = %kind,
        settled = outcome.settled,
        collapsed = outcome.collapsed,
        removed = outcome.removed,
        "Compaction finished"
    );
    Ok(outcome)
}
