// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;

use crate::policy::Table;

/// A single bound parameter of a statement. Each variant maps onto exactly one SQL type, so a
/// store can bind it without knowing which table it is destined for.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Text(String),
    OptText(Option<String>),
    Numeric(BigDecimal),
    Json(serde_json::Value),
    Timestamp(NaiveDateTime),
    OptTimestamp(Option<NaiveDateTime>),
}

/// A row destined for one table. `values` must produce one value per column of [Self::TABLE],
/// in column order.
pub trait Record: Send + Sync {
    const TABLE: &'static Table;

    fn values(&self) -> Vec<Value>;
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::BigInt(v) => Some(*v),
            Value::Int(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            Value::OptText(v) => v.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
            Value::OptText(Some(v)) => write!(f, "{v}"),
            Value::Numeric(v) => write!(f, "{v}"),
            Value::Json(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
            Value::OptTimestamp(Some(v)) => write!(f, "{v}"),
            Value::OptText(None) | Value::OptTimestamp(None) => write!(f, "NULL"),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
