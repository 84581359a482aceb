// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use diesel::pg::Pg;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_types::{BigInt, Bool, Integer, Jsonb, Nullable, Numeric, Text, Timestamp};
use ledger_indexer_framework::{record::Value, statement::Statement};

pub(crate) type Query = BoxedSqlQuery<'static, Pg, SqlQuery>;

/// Build the diesel query for `statement`, binding each of its values with the SQL type it
/// corresponds to.
pub(crate) fn statement(statement: &Statement) -> Query {
    query(statement.sql(), statement.binds())
}

pub(crate) fn query<'v>(sql: String, values: impl Iterator<Item = &'v Value>) -> Query {
    values.fold(diesel::sql_query(sql).into_boxed(), bind)
}

fn bind(query: Query, value: &Value) -> Query {
    match value.clone() {
        Value::Bool(v) => query.bind::<Bool, _>(v),
        Value::Int(v) => query.bind::<Integer, _>(v),
        Value::BigInt(v) => query.bind::<BigInt, _>(v),
        Value::Text(v) => query.bind::<Text, _>(v),
        Value::OptText(v) => query.bind::<Nullable<Text>, _>(v),
        Value::Numeric(v) => query.bind::<Numeric, _>(v),
        Value::Json(v) => query.bind::<Jsonb, _>(v),
        Value::Timestamp(v) => query.bind::<Timestamp, _>(v),
        Value::OptTimestamp(v) => query.bind::<Nullable<Timestamp>, _>(v),
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;
    use ledger_indexer_framework::policy::{MonotonicUpsert, Table, WritePolicy};

    use super::*;

    static COMMISSION: Table = Table {
        name: "validator_commission",
        columns: &[
            "operator_address",
            "commission_rate",
            "min_self_delegation",
            "height",
        ],
        policy: WritePolicy::LatestState(MonotonicUpsert::new(&["operator_address"], "height")),
    };

    #[test]
    fn binds_every_value() {
        let stmt = Statement::Upsert {
            table: &COMMISSION,
            rows: vec![vec![
                Value::Text("valoper1".to_string()),
                Value::Numeric(BigDecimal::from(1)),
                Value::Numeric(BigDecimal::from(100)),
                Value::BigInt(42),
            ]],
        };

        let query = statement(&stmt);
        let debug = diesel::debug_query::<Pg, _>(&query).to_string();

        assert!(debug.starts_with(
            "INSERT INTO validator_commission \
             (operator_address, commission_rate, min_self_delegation, height) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (operator_address) DO UPDATE SET"
        ));
        assert!(debug.contains("WHERE validator_commission.height <= excluded.height"));
        assert!(debug.contains("\"valoper1\""));
        assert!(debug.contains("42"));
    }

    #[test]
    fn binds_nulls() {
        let query = query(
            "SELECT $1, $2".to_string(),
            [Value::OptText(None), Value::OptTimestamp(None)].iter(),
        );

        let debug = diesel::debug_query::<Pg, _>(&query).to_string();
        assert!(debug.contains("None"));
    }
}
