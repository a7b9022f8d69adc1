//! A paged account history held in memory.

use std::sync::atomic::{AtomicUsize, Ordering};

use ledger_netutils::feed::MSG_TYPE_INTERNAL;
use ledger_netutils::{Cursor, FeedPage, FetchError, PageQuery, Record};

/// Serves a fixed list of records, newest first, in pages of the query's size.
///
/// Cursors are opaque to callers but encode the offset of the next page.
#[derive(Debug)]
pub struct MockFeed {
    records: Vec<Record>,
    // the GraphQL feed answers `last: n` oldest first, imitate that
    ascending_pages: bool,
    fail_on_fetch: Option<usize>,
    fetches: AtomicUsize,
}

impl MockFeed {
    /// `total` records with logical times `total..=1`, each page served oldest first.
    pub fn new(total: usize) -> Self {
        let records = (1..=total)
            .rev()
            .map(|key| {
                Self::record(
                    &format!("msg-{key}"),
                    MSG_TYPE_INTERNAL,
                    &format!("0x{key:x}"),
                    None,
                )
            })
            .collect();
        MockFeed {
            records,
            ascending_pages: true,
            fail_on_fetch: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Serves `records` exactly in the given order.
    pub fn from_records(records: Vec<Record>) -> Self {
        MockFeed {
            records,
            ascending_pages: false,
            fail_on_fetch: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Fetch number `n` (1 based) fails with a transport error.
    pub fn fail_on_fetch(mut self, n: usize) -> Self {
        self.fail_on_fetch = Some(n);
        self
    }

    /// Shorthand for building a [`Record`].
    pub fn record(id: &str, msg_type: u8, created_lt: &str, body: Option<String>) -> Record {
        Record {
            id: id.to_string(),
            msg_type,
            created_lt: created_lt.to_string(),
            body,
        }
    }

    /// Fetches served so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// The page before `cursor`.
    pub fn page(&self, query: &PageQuery, cursor: Option<&Cursor>) -> Result<FeedPage, FetchError> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_fetch == Some(fetch) {
            return Err(FetchError::Transport(format!("fetch {fetch} failed")));
        }
        let start = match cursor {
            Some(Cursor(offset)) => offset
                .parse::<usize>()
                .map_err(|_| FetchError::Graphql(format!("bad cursor {offset:?}")))?,
            None => 0,
        }
        .min(self.records.len());
        let end = (start + query.page_size as usize).min(self.records.len());
        log::debug!("Serving records {start}..{end}");

        let mut records = self.records[start..end].to_vec();
        if self.ascending_pages {
            records.reverse();
        }
        Ok(FeedPage {
            records,
            start_cursor: (end > start).then(|| Cursor(end.to_string())),
            has_more: end < self.records.len(),
        })
    }
}
