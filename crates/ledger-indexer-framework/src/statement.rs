// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Write;

use crate::{policy::Table, record::Value};

/// A single write against a [Table], with its parameters kept separate from its SQL so that
/// stores can bind them natively.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// Multi-row insert, resolved against existing rows by the table's write policy.
    Upsert {
        table: &'static Table,
        rows: Vec<Vec<Value>>,
    },

    /// Remove every row whose `column` matches one of `keys`.
    Delete {
        table: &'static Table,
        column: &'static str,
        keys: Vec<Value>,
    },
}

impl Statement {
    pub fn table(&self) -> &'static Table {
        match self {
            Statement::Upsert { table, .. } | Statement::Delete { table, .. } => *table,
        }
    }

    /// Number of rows inserted, or keys matched against.
    pub fn len(&self) -> usize {
        match self {
            Statement::Upsert { rows, .. } => rows.len(),
            Statement::Delete { keys, .. } => keys.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of parameters bound by [Self::sql].
    pub fn bind_count(&self) -> usize {
        match self {
            Statement::Upsert { rows, .. } => rows.iter().map(Vec::len).sum(),
            Statement::Delete { keys, .. } => keys.len(),
        }
    }

    /// Parameters in placeholder order.
    pub fn binds(&self) -> Box<dyn Iterator<Item = &Value> + Send + '_> {
        match self {
            Statement::Upsert { rows, .. } => Box::new(rows.iter().flatten()),
            Statement::Delete { keys, .. } => Box::new(keys.iter()),
        }
    }

    /// Postgres rendering of the statement, with `$n` placeholders for each bound value.
    pub fn sql(&self) -> String {
        match self {
            Statement::Upsert { table, rows } => {
                let mut sql = format!(
                    "INSERT INTO {} ({}) VALUES ",
                    table.name,
                    table.columns.join(", ")
                );

                let mut param = 0;
                for (i, row) in rows.iter().enumerate() {
                    sql.push_str(if i == 0 { "(" } else { ", (" });
                    for j in 0..row.len() {
                        param += 1;
                        let _ = write!(sql, "{}${param}", if j == 0 { "" } else { ", " });
                    }
                    sql.push(')');
                }

                sql.push(' ');
                sql.push_str(&table.conflict_clause());
                sql
            }

            Statement::Delete {
                table,
                column,
                keys,
            } => {
                let params: Vec<_> = (1..=keys.len()).map(|i| format!("${i}")).collect();
                format!(
                    "DELETE FROM {} WHERE {column} IN ({})",
                    table.name,
                    params.join(", ")
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{MonotonicUpsert, WritePolicy};

    static SUPPLY: Table = Table {
        name: "supply",
        columns: &["one_row_id", "coins", "height"],
        policy: WritePolicy::LatestState(MonotonicUpsert::new(&["one_row_id"], "height")),
    };

    #[test]
    fn upsert_placeholders() {
        let stmt = Statement::Upsert {
            table: &SUPPLY,
            rows: vec![
                vec![Value::Bool(true), Value::Json(serde_json::json!([])), Value::BigInt(1)],
                vec![Value::Bool(true), Value::Json(serde_json::json!([])), Value::BigInt(2)],
            ],
        };

        assert_eq!(stmt.bind_count(), 6);
        assert_eq!(stmt.binds().count(), 6);
        assert_eq!(
            stmt.sql(),
            "INSERT INTO supply (one_row_id, coins, height) VALUES ($1, $2, $3), ($4, $5, $6) \
             ON CONFLICT (one_row_id) DO UPDATE SET coins = excluded.coins, \
             height = excluded.height WHERE supply.height <= excluded.height",
        );
    }

    #[test]
    fn delete_in_list() {
        let stmt = Statement::Delete {
            table: &SUPPLY,
            column: "one_row_id",
            keys: vec![Value::Bool(true), Value::Bool(false)],
        };

        assert_eq!(stmt.sql(), "DELETE FROM supply WHERE one_row_id IN ($1, $2)");
        assert_eq!(stmt.len(), 2);
    }
}
