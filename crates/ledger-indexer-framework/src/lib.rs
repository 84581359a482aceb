// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Building blocks for reconciling paginated ledger queries into a relational store: a
//! height-aware write policy per table, parameter-bounded batch statements, a cursor-draining
//! fetcher and a bounded worker pool.

pub mod batch;
pub mod dispatch;
pub mod in_memory_store;
pub mod pagination;
pub mod policy;
pub mod record;
pub mod statement;
pub mod store;

pub use batch::{BatchWriter, MAX_BIND_PARAMETERS};
pub use dispatch::{DispatchReport, Dispatcher};
pub use pagination::{fetch_all, Cursor, Page, PageRequest, PAGE_SIZE};
pub use policy::{MonotonicUpsert, Table, TieBreak, WritePolicy};
pub use record::{Record, Value};
pub use statement::Statement;
pub use store::{Connection, Store};
