// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Write;

/// Static description of a persisted table: its name, the columns every row binds (in order),
/// and the rule that decides what happens when a row collides with one already stored.
#[derive(Debug, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub policy: WritePolicy,
}

/// How an incoming row that shares its key with a stored row is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// One row per key, replaced only by observations that are at least as recent.
    LatestState(MonotonicUpsert),

    /// Append-only. `key` includes the height, so replaying an observation is a no-op.
    History { key: &'static [&'static str] },
}

/// Height-gated upsert: the incoming row replaces the stored one only if its `height` column
/// compares favourably against the stored row's, according to `tie`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonotonicUpsert {
    pub key: &'static [&'static str],
    pub height: &'static str,
    pub tie: TieBreak,
}

/// What happens when the incoming and stored heights are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// The later write replaces the stored row.
    NewestWins,
    /// The stored row is kept.
    KeepExisting,
}

impl Table {
    /// Number of bound parameters a single row of this table needs.
    pub const fn field_count(&self) -> usize {
        self.columns.len()
    }

    pub fn key(&self) -> &'static [&'static str] {
        self.policy.key()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    /// Positions of the key columns within a row.
    pub fn key_indices(&self) -> Vec<usize> {
        self.key()
            .iter()
            .filter_map(|k| self.column_index(k))
            .collect()
    }

    /// The `ON CONFLICT` clause implementing this table's policy.
    pub fn conflict_clause(&self) -> String {
        let key = self.key();
        let updates: Vec<_> = self
            .columns
            .iter()
            .filter(|c| !key.contains(*c))
            .collect();

        let mut sql = format!("ON CONFLICT ({})", key.join(", "));
        let upsert = match &self.policy {
            // A table whose columns are all part of the key has nothing left to update.
            WritePolicy::LatestState(upsert) if !updates.is_empty() => upsert,
            _ => {
                sql.push_str(" DO NOTHING");
                return sql;
            }
        };

        sql.push_str(" DO UPDATE SET ");
        for (i, column) in updates.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let _ = write!(sql, "{column} = excluded.{column}");
        }

        let _ = write!(sql, " WHERE {}", upsert.predicate(self.name));
        sql
    }
}

impl WritePolicy {
    pub fn key(&self) -> &'static [&'static str] {
        match self {
            WritePolicy::LatestState(upsert) => upsert.key,
            WritePolicy::History { key } => *key,
        }
    }
}

impl MonotonicUpsert {
    pub const fn new(key: &'static [&'static str], height: &'static str) -> Self {
        Self {
            key,
            height,
            tie: TieBreak::NewestWins,
        }
    }

    pub const fn with_tie(self, tie: TieBreak) -> Self {
        Self { tie, ..self }
    }

    /// Whether an observation at height `incoming` replaces one stored at height `stored`.
    pub fn supersedes(&self, stored: i64, incoming: i64) -> bool {
        match self.tie {
            TieBreak::NewestWins => incoming >= stored,
            TieBreak::KeepExisting => incoming > stored,
        }
    }

    /// SQL predicate over the stored row (`table`) and the proposed row (`excluded`) that holds
    /// exactly when [Self::supersedes] does.
    pub fn predicate(&self, table: &str) -> String {
        let op = match self.tie {
            TieBreak::NewestWins => "<=",
            TieBreak::KeepExisting => "<",
        };

        format!("{table}.{h} {op} excluded.{h}", h = self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BALANCE: Table = Table {
        name: "account_balance",
        columns: &["address", "coins", "height"],
        policy: WritePolicy::LatestState(MonotonicUpsert::new(&["address"], "height")),
    };

    const STATUS_HISTORY: Table = Table {
        name: "validator_status_history",
        columns: &["consensus_address", "status", "height"],
        policy: WritePolicy::History {
            key: &["consensus_address", "height"],
        },
    };

    #[test]
    fn newest_wins_at_equal_height() {
        let policy = MonotonicUpsert::new(&["address"], "height");
        assert!(!policy.supersedes(10, 5));
        assert!(policy.supersedes(10, 10));
        assert!(policy.supersedes(10, 11));
    }

    #[test]
    fn keep_existing_at_equal_height() {
        let policy = MonotonicUpsert::new(&["address"], "height").with_tie(TieBreak::KeepExisting);
        assert!(!policy.supersedes(10, 5));
        assert!(!policy.supersedes(10, 10));
        assert!(policy.supersedes(10, 11));
    }

    #[test]
    fn latest_state_clause() {
        assert_eq!(
            BALANCE.conflict_clause(),
            "ON CONFLICT (address) DO UPDATE SET coins = excluded.coins, height = excluded.height \
             WHERE account_balance.height <= excluded.height",
        );
    }

    #[test]
    fn history_clause() {
        assert_eq!(
            STATUS_HISTORY.conflict_clause(),
            "ON CONFLICT (consensus_address, height) DO NOTHING",
        );
    }

    #[test]
    fn key_only_table_does_nothing() {
        const T: Table = Table {
            name: "t",
            columns: &["id"],
            policy: WritePolicy::LatestState(MonotonicUpsert::new(&["id"], "id")),
        };

        assert_eq!(T.conflict_clause(), "ON CONFLICT (id) DO NOTHING");
    }

    #[test]
    fn key_positions() {
        assert_eq!(BALANCE.key_indices(), vec![0]);
        assert_eq!(STATUS_HISTORY.key_indices(), vec![0, 2]);
        assert_eq!(BALANCE.field_count(), 3);
    }
}
