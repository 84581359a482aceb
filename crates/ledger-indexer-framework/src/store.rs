// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::{policy::Table, record::Value, statement::Statement};

/// A connection to a store that understands [Statement]s. Implementations apply each table's
/// write policy, either by running the statement's SQL or by comparing heights before writing.
#[async_trait]
pub trait Connection: Send {
    /// Run a single statement, returning the number of rows it inserted, updated or deleted.
    async fn execute(&mut self, statement: &Statement) -> anyhow::Result<usize>;

    /// Run `statements` in order inside one transaction. Either all of them take effect or none
    /// of them do.
    async fn execute_atomic(&mut self, statements: &[Statement]) -> anyhow::Result<usize>;

    /// Read `column` (rendered as text) from every row of `table`, optionally restricted to rows
    /// whose `filter.0` column equals `filter.1`.
    async fn select(
        &mut self,
        table: &'static Table,
        column: &str,
        filter: Option<(&str, &Value)>,
    ) -> anyhow::Result<Vec<String>>;
}

/// Public trait for storage-agnostic access to the persisted ledger state.
#[async_trait]
pub trait Store: Send + Sync + 'static + Clone {
    type Connection<'c>: Connection
    where
        Self: 'c;

    async fn connect<'c>(&'c self) -> anyhow::Result<Self::Connection<'c>>;
}
