// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use anyhow::{bail, Context};
use async_trait::async_trait;

use crate::{
    policy::{Table, WritePolicy},
    record::Value,
    statement::Statement,
    store::{Connection, Store},
};

/// A store that keeps every table in memory and applies write policies by comparing heights
/// directly. Statements that succeed are logged, and failures can be injected per table or after
/// a number of statements, for testing.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

/// Connection to the in-memory store
pub struct InMemoryConnection<'a> {
    store: &'a InMemoryStore,
}

#[derive(Default)]
struct State {
    tables: Tables,
    log: Vec<Statement>,
    fail_on: HashSet<&'static str>,
    fail_after: Option<usize>,
}

type Tables = HashMap<&'static str, Rows>;

/// Rows in insertion order, indexed by their rendered key.
#[derive(Clone, Default)]
struct Rows {
    rows: Vec<Vec<Value>>,
    index: HashMap<String, usize>,
}

impl InMemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows of `table`, in the order they were first inserted.
    pub fn rows(&self, table: &Table) -> Vec<Vec<Value>> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table.name)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// The row of `table` whose key columns hold `key`.
    pub fn row(&self, table: &Table, key: &[Value]) -> Option<Vec<Value>> {
        let state = self.state.lock().unwrap();
        let rows = state.tables.get(table.name)?;
        let i = rows.index.get(&render_key(key.iter()))?;
        Some(rows.rows[*i].clone())
    }

    /// A single column of the row of `table` keyed by `key`.
    pub fn value(&self, table: &Table, key: &[Value], column: &str) -> Option<Value> {
        let row = self.row(table, key)?;
        Some(row[table.column_index(column)?].clone())
    }

    /// Every statement that took effect, in order.
    pub fn statements(&self) -> Vec<Statement> {
        self.state.lock().unwrap().log.clone()
    }

    /// Fail every subsequent statement that touches `table`.
    pub fn fail_on(&self, table: &'static str) {
        self.state.lock().unwrap().fail_on.insert(table);
    }

    /// Let `n` more statements succeed, then fail every statement after that.
    pub fn fail_after(&self, n: usize) {
        self.state.lock().unwrap().fail_after = Some(n);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_on.clear();
        state.fail_after = None;
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Connection<'c>
        = InMemoryConnection<'c>
    where
        Self: 'c;

    async fn connect<'c>(&'c self) -> anyhow::Result<Self::Connection<'c>> {
        Ok(InMemoryConnection { store: self })
    }
}

#[async_trait]
impl Connection for InMemoryConnection<'_> {
    async fn execute(&mut self, statement: &Statement) -> anyhow::Result<usize> {
        let mut state = self.store.state.lock().unwrap();
        state.check_failure(statement)?;

        let affected = apply(&mut state.tables, statement)?;
        state.log.push(statement.clone());
        Ok(affected)
    }

    async fn execute_atomic(&mut self, statements: &[Statement]) -> anyhow::Result<usize> {
        let mut state = self.store.state.lock().unwrap();

        // Apply to a copy, and only publish it once every statement has succeeded.
        let mut tables = state.tables.clone();
        let mut affected = 0;
        for statement in statements {
            state.check_failure(statement)?;
            affected += apply(&mut tables, statement)?;
        }

        state.tables = tables;
        state.log.extend(statements.iter().cloned());
        Ok(affected)
    }

    async fn select(
        &mut self,
        table: &'static Table,
        column: &str,
        filter: Option<(&str, &Value)>,
    ) -> anyhow::Result<Vec<String>> {
        let state = self.store.state.lock().unwrap();
        let Some(rows) = state.tables.get(table.name) else {
            return Ok(vec![]);
        };

        let idx = table
            .column_index(column)
            .with_context(|| format!("No column {column} in {}", table.name))?;

        let filter = match filter {
            None => None,
            Some((column, value)) => Some((
                table
                    .column_index(column)
                    .with_context(|| format!("No column {column} in {}", table.name))?,
                value,
            )),
        };

        Ok(rows
            .rows
            .iter()
            .filter(|row| filter.map_or(true, |(i, v)| row[i] == *v))
            .map(|row| row[idx].to_string())
            .collect())
    }
}

impl State {
    fn check_failure(&mut self, statement: &Statement) -> anyhow::Result<()> {
        let table = statement.table().name;
        if self.fail_on.contains(table) {
            bail!("Injected failure writing to {table}");
        }

        match &mut self.fail_after {
            Some(0) => bail!("Injected failure writing to {table}"),
            Some(n) => *n -= 1,
            None => {}
        }

        Ok(())
    }
}

fn render_key<'v>(values: impl Iterator<Item = &'v Value>) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

fn apply(tables: &mut Tables, statement: &Statement) -> anyhow::Result<usize> {
    match statement {
        Statement::Upsert { table, rows } => {
            let key_indices = table.key_indices();
            let height = match &table.policy {
                WritePolicy::LatestState(upsert) => Some((
                    upsert,
                    table
                        .column_index(upsert.height)
                        .with_context(|| format!("No height column in {}", table.name))?,
                )),
                WritePolicy::History { .. } => None,
            };

            // Postgres refuses to update the same row twice in one `ON CONFLICT DO UPDATE`.
            let updates_on_conflict =
                height.is_some() && table.field_count() > key_indices.len();

            // Validate every row before touching the table, so a rejected statement leaves no
            // trace.
            let mut seen = HashSet::new();
            let mut keys = Vec::with_capacity(rows.len());
            for row in rows {
                if row.len() != table.field_count() {
                    bail!(
                        "Row for {} has {} values, expected {}",
                        table.name,
                        row.len(),
                        table.field_count()
                    );
                }

                let key = render_key(key_indices.iter().map(|i| &row[*i]));
                if updates_on_conflict && !seen.insert(key.clone()) {
                    bail!(
                        "Statement on {} affects the row keyed by {key:?} more than once",
                        table.name
                    );
                }

                keys.push(key);
            }

            let stored = tables.entry(table.name).or_default();
            let mut affected = 0;

            for (row, key) in rows.iter().zip(keys) {
                let Some(&i) = stored.index.get(&key) else {
                    stored.index.insert(key, stored.rows.len());
                    stored.rows.push(row.clone());
                    affected += 1;
                    continue;
                };

                // History rows are never replaced.
                let replace = match height {
                    None => false,
                    Some((upsert, h)) => {
                        let (Some(old), Some(new)) = (stored.rows[i][h].as_i64(), row[h].as_i64())
                        else {
                            bail!("Non-integer height in {}", table.name);
                        };
                        upsert.supersedes(old, new)
                    }
                };

                if replace {
                    stored.rows[i] = row.clone();
                    affected += 1;
                }
            }

            Ok(affected)
        }

        Statement::Delete {
            table,
            column,
            keys,
        } => {
            let idx = table
                .column_index(column)
                .with_context(|| format!("No column {column} in {}", table.name))?;

            let Some(stored) = tables.get_mut(table.name) else {
                return Ok(0);
            };

            let before = stored.rows.len();
            stored.rows.retain(|row| !keys.contains(&row[idx]));

            let key_indices = table.key_indices();
            stored.index = stored
                .rows
                .iter()
                .enumerate()
                .map(|(i, row)| (render_key(key_indices.iter().map(|k| &row[*k])), i))
                .collect();

            Ok(before - stored.rows.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::MonotonicUpsert;

    static STATUS: Table = Table {
        name: "validator_status",
        columns: &["consensus_address", "status", "height"],
        policy: WritePolicy::LatestState(MonotonicUpsert::new(&["consensus_address"], "height")),
    };

    static STATUS_HISTORY: Table = Table {
        name: "validator_status_history",
        columns: &["consensus_address", "status", "height"],
        policy: WritePolicy::History {
            key: &["consensus_address", "height"],
        },
    };

    fn upsert(table: &'static Table, addr: &str, status: i32, height: i64) -> Statement {
        Statement::Upsert {
            table,
            rows: vec![vec![addr.into(), Value::Int(status), Value::BigInt(height)]],
        }
    }

    async fn status_of(store: &InMemoryStore, addr: &str) -> (Value, Value) {
        let row = store.row(&STATUS, &[addr.into()]).unwrap();
        (row[1].clone(), row[2].clone())
    }

    #[tokio::test]
    async fn monotonic_upsert() {
        let store = InMemoryStore::new();
        let mut conn = store.connect().await.unwrap();

        conn.execute(&upsert(&STATUS, "a", 1, 10)).await.unwrap();
        assert_eq!(conn.execute(&upsert(&STATUS, "a", 2, 5)).await.unwrap(), 0);
        assert_eq!(
            status_of(&store, "a").await,
            (Value::Int(1), Value::BigInt(10))
        );

        assert_eq!(conn.execute(&upsert(&STATUS, "a", 3, 10)).await.unwrap(), 1);
        assert_eq!(
            status_of(&store, "a").await,
            (Value::Int(3), Value::BigInt(10))
        );

        conn.execute(&upsert(&STATUS, "a", 4, 11)).await.unwrap();
        assert_eq!(
            status_of(&store, "a").await,
            (Value::Int(4), Value::BigInt(11))
        );
    }

    #[tokio::test]
    async fn first_observation_always_inserts() {
        let store = InMemoryStore::new();
        let mut conn = store.connect().await.unwrap();

        conn.execute(&upsert(&STATUS, "a", 1, 100)).await.unwrap();
        conn.execute(&upsert(&STATUS, "b", 1, 1)).await.unwrap();
        assert_eq!(store.rows(&STATUS).len(), 2);
    }

    #[tokio::test]
    async fn history_appends_and_replays_are_idempotent() {
        let store = InMemoryStore::new();
        let mut conn = store.connect().await.unwrap();

        for height in [1, 2, 3] {
            conn.execute(&upsert(&STATUS_HISTORY, "a", height as i32, height))
                .await
                .unwrap();
        }

        assert_eq!(
            conn.execute(&upsert(&STATUS_HISTORY, "a", 9, 2))
                .await
                .unwrap(),
            0
        );

        let heights: Vec<_> = store
            .rows(&STATUS_HISTORY)
            .into_iter()
            .map(|r| r[2].clone())
            .collect();
        assert_eq!(heights, vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)]);
        assert_eq!(
            store.value(&STATUS_HISTORY, &["a".into(), Value::BigInt(2)], "status"),
            Some(Value::Int(2))
        );
    }

    #[tokio::test]
    async fn repeated_key_in_one_upsert() {
        let store = InMemoryStore::new();
        let mut conn = store.connect().await.unwrap();

        let twice = Statement::Upsert {
            table: &STATUS,
            rows: vec![
                vec!["a".into(), Value::Int(1), Value::BigInt(1)],
                vec!["a".into(), Value::Int(2), Value::BigInt(2)],
            ],
        };

        let err = conn.execute(&twice).await.unwrap_err();
        assert!(err.to_string().contains("more than once"), "{err}");
        assert!(store.rows(&STATUS).is_empty());
        assert!(store.statements().is_empty());

        // Appending to a history table ignores the repeat instead.
        let twice = Statement::Upsert {
            table: &STATUS_HISTORY,
            rows: vec![
                vec!["a".into(), Value::Int(1), Value::BigInt(1)],
                vec!["a".into(), Value::Int(2), Value::BigInt(1)],
            ],
        };

        assert_eq!(conn.execute(&twice).await.unwrap(), 1);
        assert_eq!(
            store.value(&STATUS_HISTORY, &["a".into(), Value::BigInt(1)], "status"),
            Some(Value::Int(1))
        );
    }

    #[tokio::test]
    async fn atomic_rolls_back_on_failure() {
        let store = InMemoryStore::new();
        let mut conn = store.connect().await.unwrap();
        conn.execute(&upsert(&STATUS, "a", 1, 1)).await.unwrap();

        store.fail_on("validator_status_history");
        let delete = Statement::Delete {
            table: &STATUS,
            column: "consensus_address",
            keys: vec!["a".into()],
        };

        conn.execute_atomic(&[delete, upsert(&STATUS_HISTORY, "a", 1, 2)])
            .await
            .unwrap_err();

        assert_eq!(store.rows(&STATUS).len(), 1);
        assert!(store.rows(&STATUS_HISTORY).is_empty());
        assert_eq!(store.statements().len(), 1);
    }

    #[tokio::test]
    async fn delete_then_select() {
        let store = InMemoryStore::new();
        let mut conn = store.connect().await.unwrap();
        for addr in ["a", "b", "c"] {
            conn.execute(&upsert(&STATUS, addr, 1, 1)).await.unwrap();
        }

        let delete = Statement::Delete {
            table: &STATUS,
            column: "consensus_address",
            keys: vec!["b".into()],
        };
        assert_eq!(conn.execute(&delete).await.unwrap(), 1);

        let addrs = conn
            .select(&STATUS, "consensus_address", None)
            .await
            .unwrap();
        assert_eq!(addrs, vec!["a", "c"]);

        // The index is rebuilt, so a later upsert still finds "c".
        conn.execute(&upsert(&STATUS, "c", 2, 2)).await.unwrap();
        assert_eq!(store.rows(&STATUS).len(), 2);

        let filtered = conn
            .select(&STATUS, "status", Some(("consensus_address", &"c".into())))
            .await
            .unwrap();
        assert_eq!(filtered, vec!["2"]);
    }
}
