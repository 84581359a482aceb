// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use async_trait::async_trait;
use diesel::QueryableByName;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use ledger_indexer_framework::{
    policy::Table,
    record::Value,
    statement::Statement,
    store::{Connection as StoreConnection, Store},
};
use tracing::debug;

use crate::{bind, Connection as PgConnection, Db};

/// PostgreSQL implementation of [Store]. Latest-state policies are enforced by the `WHERE`
/// clause of each upsert's `ON CONFLICT` branch, so concurrent writers never need to read
/// before writing.
#[derive(Clone)]
pub struct PgStore {
    pub db: Db,
}

#[derive(QueryableByName)]
struct TextValue {
    #[diesel(sql_type = diesel::sql_types::Text)]
    value: String,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for PgStore {
    type Connection<'c> = PgConnection<'c>;

    async fn connect<'c>(&'c self) -> anyhow::Result<Self::Connection<'c>> {
        self.db.connect().await
    }
}

#[async_trait]
impl StoreConnection for PgConnection<'_> {
    async fn execute(&mut self, statement: &Statement) -> anyhow::Result<usize> {
        let table = statement.table().name;
        let rows = bind::statement(statement)
            .execute(self.pg())
            .await
            .with_context(|| format!("Failed to write {} rows to {table}", statement.len()))?;

        debug!(table, binds = statement.bind_count(), rows, "Executed statement");
        Ok(rows)
    }

    async fn execute_atomic(&mut self, statements: &[Statement]) -> anyhow::Result<usize> {
        AsyncConnection::transaction(self.pg(), |conn| {
            async move {
                let mut affected = 0;
                for statement in statements {
                    affected += bind::statement(statement)
                        .execute(conn)
                        .await
                        .with_context(|| {
                            format!(
                                "Failed to write {} rows to {} in transaction",
                                statement.len(),
                                statement.table().name
                            )
                        })?;
                }

                Ok::<_, anyhow::Error>(affected)
            }
            .scope_boxed()
        })
        .await
    }

    async fn select(
        &mut self,
        table: &'static Table,
        column: &str,
        filter: Option<(&str, &Value)>,
    ) -> anyhow::Result<Vec<String>> {
        let mut sql = format!("SELECT {column}::TEXT AS value FROM {}", table.name);
        let mut binds = vec![];
        if let Some((filter, value)) = filter {
            sql.push_str(&format!(" WHERE {filter} = $1"));
            binds.push(value);
        }

        let values: Vec<TextValue> = bind::query(sql, binds.into_iter())
            .load(self.pg())
            .await
            .with_context(|| format!("Failed to read {column} from {}", table.name))?;

        Ok(values.into_iter().map(|v| v.value).collect())
    }
}
