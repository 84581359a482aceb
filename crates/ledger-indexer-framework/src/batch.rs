// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::slice::Chunks;

use anyhow::Context;
use tracing::debug;

use crate::{
    policy::Table,
    record::{Record, Value},
    statement::Statement,
    store::Connection,
};

/// Postgres encodes the number of bind parameters of a statement in 16 bits.
pub const MAX_BIND_PARAMETERS: usize = u16::MAX as usize;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum BatchError {
    #[error("Rows of {0} bind no parameters")]
    NoParameters(&'static str),

    #[error("Rows of {table} bind {params} parameters, over the limit of {max}")]
    TooWide {
        table: &'static str,
        params: usize,
        max: usize,
    },

    #[error("Row {row} of {table} has {actual} values, expected {expected}")]
    Arity {
        table: &'static str,
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Splits record collections into statements that each stay under a bind parameter ceiling.
#[derive(Debug, Clone, Copy)]
pub struct BatchWriter {
    max_params: usize,
}

impl BatchWriter {
    pub fn new(max_params: usize) -> Self {
        Self { max_params }
    }

    pub fn max_params(&self) -> usize {
        self.max_params
    }

    /// The most records that fit in one statement when each binds `params_per_record`
    /// parameters, or `None` if not even one does.
    pub fn capacity(&self, params_per_record: usize) -> Option<usize> {
        match params_per_record {
            0 => None,
            n if n > self.max_params => None,
            n => Some(self.max_params / n),
        }
    }

    /// Split `records` into consecutive chunks of [Self::capacity] records each, the last of
    /// which may be shorter.
    pub fn partition<'r, T>(
        &self,
        table: &'static Table,
        records: &'r [T],
    ) -> Result<Chunks<'r, T>, BatchError> {
        let params = table.field_count();
        let capacity = match self.capacity(params) {
            Some(capacity) => capacity,
            None if params == 0 => return Err(BatchError::NoParameters(table.name)),
            None => {
                return Err(BatchError::TooWide {
                    table: table.name,
                    params,
                    max: self.max_params,
                })
            }
        };

        Ok(records.chunks(capacity))
    }

    /// One upsert statement per chunk of `records`, in order. Empty input produces no
    /// statements.
    pub fn upserts<R: Record>(&self, records: &[R]) -> Result<Vec<Statement>, BatchError> {
        let table = R::TABLE;
        let expected = table.field_count();

        let mut offset = 0;
        let mut statements = vec![];
        for chunk in self.partition(table, records)? {
            let mut rows = Vec::with_capacity(chunk.len());
            for record in chunk {
                let values = record.values();
                if values.len() != expected {
                    return Err(BatchError::Arity {
                        table: table.name,
                        row: offset,
                        expected,
                        actual: values.len(),
                    });
                }

                rows.push(values);
                offset += 1;
            }

            statements.push(Statement::Upsert { table, rows });
        }

        Ok(statements)
    }

    /// One delete statement per chunk of `keys`, each key binding a single parameter.
    pub fn deletes(
        &self,
        table: &'static Table,
        column: &'static str,
        keys: &[Value],
    ) -> Result<Vec<Statement>, BatchError> {
        let capacity = self.capacity(1).ok_or(BatchError::NoParameters(table.name))?;
        Ok(keys
            .chunks(capacity)
            .map(|chunk| Statement::Delete {
                table,
                column,
                keys: chunk.to_vec(),
            })
            .collect())
    }

    /// Write `records` one chunk at a time. A failure aborts the remaining chunks, but chunks
    /// written before it stay written. Returns the number of rows affected.
    pub async fn write<R, C>(&self, conn: &mut C, records: &[R]) -> anyhow::Result<usize>
    where
        R: Record,
        C: Connection + ?Sized,
    {
        let statements = self.upserts(records)?;
        let total = statements.len();

        let mut affected = 0;
        for (i, statement) in statements.iter().enumerate() {
            affected += conn.execute(statement).await.with_context(|| {
                format!(
                    "Failed to write chunk {} of {total} to {}",
                    i + 1,
                    R::TABLE.name
                )
            })?;

            debug!(
                table = R::TABLE.name,
                chunk = i + 1,
                chunks = total,
                rows = statement.len(),
                "Wrote chunk"
            );
        }

        Ok(affected)
    }
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new(MAX_BIND_PARAMETERS)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{
        in_memory_store::InMemoryStore,
        policy::{MonotonicUpsert, WritePolicy},
        store::Store,
    };

    const PAIRS: Table = Table {
        name: "pairs",
        columns: &["id", "height"],
        policy: WritePolicy::LatestState(MonotonicUpsert::new(&["id"], "height")),
    };

    const EMPTY: Table = Table {
        name: "empty",
        columns: &[],
        policy: WritePolicy::History { key: &[] },
    };

    #[derive(Debug, Clone, PartialEq)]
    struct Pair(i64, i64);

    impl Record for Pair {
        const TABLE: &'static Table = &PAIRS;

        fn values(&self) -> Vec<Value> {
            vec![Value::BigInt(self.0), Value::BigInt(self.1)]
        }
    }

    fn pairs(n: i64) -> Vec<Pair> {
        (0..n).map(|i| Pair(i, 1)).collect()
    }

    #[test]
    fn capacity_bounds() {
        let writer = BatchWriter::default();
        assert_eq!(writer.capacity(0), None);
        assert_eq!(writer.capacity(2), Some(32767));
        assert_eq!(writer.capacity(MAX_BIND_PARAMETERS), Some(1));
        assert_eq!(writer.capacity(MAX_BIND_PARAMETERS + 1), None);
    }

    #[test]
    fn final_partial_chunk_is_kept() {
        let writer = BatchWriter::default();
        let records = pairs(40_000);
        let sizes: Vec<_> = writer
            .partition(&PAIRS, &records)
            .unwrap()
            .map(<[_]>::len)
            .collect();

        assert_eq!(sizes, vec![32767, 7233]);
    }

    #[test]
    fn chunks_are_exactly_capacity() {
        // Capacity 3: every chunk but the last holds exactly three records.
        let writer = BatchWriter::new(7);
        let records = pairs(10);
        let sizes: Vec<_> = writer
            .partition(&PAIRS, &records)
            .unwrap()
            .map(<[_]>::len)
            .collect();

        assert_eq!(sizes, vec![3, 3, 3, 1]);
    }

    #[test]
    fn rejects_parameterless_rows() {
        let writer = BatchWriter::default();
        let err = writer.partition(&EMPTY, &[(); 3]).unwrap_err();
        assert_eq!(err, BatchError::NoParameters("empty"));
    }

    #[test]
    fn rejects_rows_wider_than_ceiling() {
        let writer = BatchWriter::new(1);
        let err = writer.partition(&PAIRS, &pairs(1)).unwrap_err();
        assert!(matches!(err, BatchError::TooWide { params: 2, max: 1, .. }));
    }

    #[test]
    fn empty_input_has_no_statements() {
        let writer = BatchWriter::default();
        assert!(writer.upserts::<Pair>(&[]).unwrap().is_empty());
        assert!(writer.deletes(&PAIRS, "id", &[]).unwrap().is_empty());
    }

    #[test]
    fn deletes_are_chunked() {
        let writer = BatchWriter::new(2);
        let keys: Vec<_> = (0..5).map(Value::BigInt).collect();
        let sizes: Vec<_> = writer
            .deletes(&PAIRS, "id", &keys)
            .unwrap()
            .iter()
            .map(Statement::len)
            .collect();

        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn write_issues_one_statement_per_chunk() {
        let store = InMemoryStore::new();
        let mut conn = store.connect().await.unwrap();

        let writer = BatchWriter::new(6);
        let affected = writer.write(&mut conn, &pairs(7)).await.unwrap();

        assert_eq!(affected, 7);
        assert_eq!(store.statements().len(), 3);
        assert_eq!(store.rows(&PAIRS).len(), 7);
    }

    #[tokio::test]
    async fn earlier_chunks_stay_written_after_failure() {
        let store = InMemoryStore::new();
        store.fail_after(1);
        let mut conn = store.connect().await.unwrap();

        let writer = BatchWriter::new(6);
        writer.write(&mut conn, &pairs(7)).await.unwrap_err();

        assert_eq!(store.rows(&PAIRS).len(), 3);
    }

    proptest! {
        #[test]
        fn partition_is_lossless(
            len in 0usize..2000,
            max_params in 2usize..500,
        ) {
            let writer = BatchWriter::new(max_params);
            let records = pairs(len as i64);
            let capacity = writer.capacity(2).unwrap();
            let chunks: Vec<_> = writer.partition(&PAIRS, &records).unwrap().collect();

            let joined: Vec<Pair> = chunks.iter().flat_map(|c| c.iter().cloned()).collect();
            prop_assert_eq!(&joined, &records);
            prop_assert_eq!(chunks.len(), len.div_ceil(capacity));

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert!(chunk.len() <= capacity);
                if i + 1 < chunks.len() {
                    prop_assert_eq!(chunk.len(), capacity);
                }
            }
        }
    }
}
