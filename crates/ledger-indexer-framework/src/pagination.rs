// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::future::Future;

use futures::{stream, Stream, TryStreamExt};
use tracing::debug;

/// Number of records requested per page.
pub const PAGE_SIZE: u64 = 100;

/// Opaque pagination token handed back by the query service. Never empty: an exhausted query
/// is represented by the absence of a cursor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cursor(Vec<u8>);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Where to resume from, `None` for the first page.
    pub key: Option<Cursor>,
    pub limit: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub records: Vec<T>,
    /// Cursor for the next page, `None` once the query is exhausted.
    pub next_key: Option<Cursor>,
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Failed to fetch page {page}: {source:#}")]
    Query {
        page: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Cursor returned by page {page} was already visited, pagination is malformed")]
    RepeatedCursor { page: usize },
}

impl Cursor {
    /// Wrap raw cursor bytes, treating an empty token as "no more pages".
    pub fn new(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        (!bytes.is_empty()).then_some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl<T> Page<T> {
    pub fn last(records: Vec<T>) -> Self {
        Self {
            records,
            next_key: None,
        }
    }
}

struct Drain<F> {
    fetch: F,
    key: Option<Cursor>,
    seen: HashSet<Cursor>,
    page: usize,
}

/// Lazily drain a cursor-paginated query, `limit` records at a time. Pages are requested
/// strictly one after the other, each resuming from the cursor of the previous one, and the
/// stream ends after the first page that carries no cursor. The stream fails (and ends) on the
/// first failed request, or if the service hands back a cursor it has handed back before.
pub fn pages<T, E, F, Fut>(limit: u64, fetch: F) -> impl Stream<Item = Result<Page<T>, FetchError>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
    E: Into<anyhow::Error>,
{
    let drain = Drain {
        fetch,
        key: None,
        seen: HashSet::new(),
        page: 0,
    };

    stream::try_unfold(Some(drain), move |state| async move {
        let Some(mut drain) = state else {
            return Ok(None);
        };

        let request = PageRequest {
            key: drain.key.take(),
            limit,
        };

        let page = (drain.fetch)(request)
            .await
            .map_err(|e| FetchError::Query {
                page: drain.page,
                source: e.into(),
            })?;

        debug!(page = drain.page, records = page.records.len(), "Fetched page");

        let next = match page.next_key.clone() {
            None => None,
            Some(key) => {
                if !drain.seen.insert(key.clone()) {
                    return Err(FetchError::RepeatedCursor { page: drain.page });
                }

                drain.key = Some(key);
                drain.page += 1;
                Some(drain)
            }
        };

        Ok::<_, FetchError>(Some((page, next)))
    })
}

/// Drain a paginated query into memory. Nothing is returned unless every page was fetched
/// successfully.
pub async fn fetch_all<T, E, F, Fut>(limit: u64, fetch: F) -> Result<Vec<T>, FetchError>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
    E: Into<anyhow::Error>,
{
    pages(limit, fetch)
        .try_fold(vec![], |mut records, page| async move {
            records.extend(page.records);
            Ok(records)
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use futures::StreamExt;

    use super::*;

    fn cursor(i: u8) -> Option<Cursor> {
        Cursor::new(vec![i])
    }

    /// A query over `0..total`, served `limit` at a time, with the cursor encoding the offset.
    fn numbers(
        total: u8,
        requests: Arc<Mutex<Vec<PageRequest>>>,
    ) -> impl FnMut(PageRequest) -> futures::future::Ready<anyhow::Result<Page<u8>>> {
        move |req| {
            requests.lock().unwrap().push(req.clone());
            let start = req.key.map_or(0, |k| k.as_bytes()[0]);
            let end = total.min(start + req.limit as u8);
            let next_key = if end < total { cursor(end) } else { None };
            futures::future::ready(Ok(Page {
                records: (start..end).collect(),
                next_key,
            }))
        }
    }

    #[test]
    fn empty_cursor_is_exhaustion() {
        assert_eq!(Cursor::new(vec![]), None);
        assert!(Cursor::new("abc").is_some());
    }

    #[tokio::test]
    async fn drains_all_pages() {
        let requests = Arc::new(Mutex::new(vec![]));
        let records = fetch_all(10, numbers(25, requests.clone())).await.unwrap();

        assert_eq!(records, (0..25).collect::<Vec<_>>());

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].key, None);
        assert_eq!(requests[1].key, cursor(10));
        assert_eq!(requests[2].key, cursor(20));
        assert!(requests.iter().all(|r| r.limit == 10));
    }

    #[tokio::test]
    async fn single_empty_page() {
        let requests = Arc::new(Mutex::new(vec![]));
        let records = fetch_all(PAGE_SIZE, numbers(0, requests.clone()))
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failure_discards_accumulated_pages() {
        let mut calls = 0;
        let result = fetch_all(2, |_req| {
            calls += 1;
            let page = if calls < 3 {
                Ok(Page {
                    records: vec![calls],
                    next_key: cursor(calls as u8),
                })
            } else {
                Err(anyhow!("connection reset"))
            };
            futures::future::ready(page)
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, FetchError::Query { page: 2, .. }));
    }

    #[tokio::test]
    async fn repeated_cursor_is_malformed() {
        let result = fetch_all(2, |_req| {
            futures::future::ready(anyhow::Ok(Page {
                records: vec![1],
                next_key: cursor(7),
            }))
        })
        .await;

        assert!(matches!(
            result.unwrap_err(),
            FetchError::RepeatedCursor { page: 1 }
        ));
    }

    #[tokio::test]
    async fn pages_stream_in_order() {
        let requests = Arc::new(Mutex::new(vec![]));
        let sizes: Vec<_> = pages(4, numbers(10, requests))
            .map(|page| page.unwrap().records.len())
            .collect()
            .await;

        assert_eq!(sizes, vec![4, 4, 2]);
    }
}
