//! Paging through an account's message feed.

use std::cmp::Reverse;
use std::time::Duration;

use ledger_netutils::{Cursor, FeedPage, FetchError, LedgerBoundary, PageQuery, Record};
use serde::{Deserialize, Serialize};

use crate::decode::{decode, BodyDecoder, DecodedBody};

/// Pause between two page fetches of one scan.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(300);

/// A feed record with its decoded body, if it decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedRecord {
    /// the record as fetched, body untouched
    pub message: Record,
    /// `None` when no decoder was given or the body did not decode
    pub decoded: Option<DecodedBody>,
}

impl ScannedRecord {
    fn new(message: Record, decoder: Option<&dyn BodyDecoder>) -> Self {
        let decoded =
            decoder.and_then(|decoder| decode(decoder, message.body.as_deref(), message.msg_type));
        ScannedRecord { message, decoded }
    }

    /// Name of the decoded function or event.
    pub fn decoded_name(&self) -> Option<&str> {
        self.decoded.as_ref().map(|decoded| decoded.name.as_str())
    }
}

/// What one scan produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanResult {
    /// Feed this back into [`Scanner::scan_from`] to continue with older records.
    pub cursor: Option<Cursor>,
    /// Whether the feed reported older records beyond `cursor`.
    pub has_more: bool,
    /// Newest first.
    pub records: Vec<ScannedRecord>,
    /// Number of fetches issued.
    pub pages_fetched: usize,
}

/// Keeps the records whose body decoded to `name`. Undecoded records never match.
pub fn filter_by_function(records: Vec<ScannedRecord>, name: &str) -> Vec<ScannedRecord> {
    records
        .into_iter()
        .filter(|record| record.decoded_name() == Some(name))
        .collect()
}

/// Walks the feed of one boundary.
pub struct Scanner<'a, B> {
    boundary: &'a B,
    page_delay: Duration,
}

impl<'a, B: LedgerBoundary> Scanner<'a, B> {
    /// Scanner with the default page delay.
    pub fn new(boundary: &'a B) -> Self {
        Scanner {
            boundary,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    /// Change the pause between fetches.
    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Scans from the newest record. See [`Scanner::scan_from`].
    pub async fn scan(
        &self,
        query: &PageQuery,
        decoder: Option<&dyn BodyDecoder>,
        fetch_all: bool,
    ) -> Result<ScanResult, FetchError> {
        self.scan_from(query, None, decoder, fetch_all).await
    }

    /// Fetches the page before `cursor` and, with `fetch_all`, every older page after it.
    ///
    /// Each page is sorted by descending ordering key before it is appended, so the result is
    /// newest first throughout. A failed fetch aborts the scan and drops what was gathered;
    /// resume from the cursor of the last successful call.
    pub async fn scan_from(
        &self,
        query: &PageQuery,
        start: Option<Cursor>,
        decoder: Option<&dyn BodyDecoder>,
        fetch_all: bool,
    ) -> Result<ScanResult, FetchError> {
        let mut cursor = start;
        let mut records = Vec::new();
        let mut pages_fetched = 0;
        loop {
            let FeedPage {
                records: mut page,
                start_cursor,
                has_more,
            } = self.boundary.fetch_page(query, cursor.as_ref()).await?;
            pages_fetched += 1;
            tracing::debug!(
                "Fetched page {} of {} with {} records",
                pages_fetched,
                query.address,
                page.len()
            );

            // stable, so equal keys keep feed order
            page.sort_by_key(|record| Reverse(record.ordering_key()));
            records.extend(
                page.into_iter()
                    .map(|record| ScannedRecord::new(record, decoder)),
            );
            cursor = start_cursor;

            let limit_reached = query
                .max_records
                .is_some_and(|max_records| records.len() >= max_records);
            if !fetch_all || !has_more || cursor.is_none() || limit_reached {
                tracing::info!(
                    "Scan of {} done: {} records in {} pages",
                    query.address,
                    records.len(),
                    pages_fetched
                );
                return Ok(ScanResult {
                    cursor,
                    has_more,
                    records,
                    pages_fetched,
                });
            }
            tokio::time::sleep(self.page_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{tests::COMMIT_ABI, Abi, AbiSchema};
    use ledger_netutils::feed::MSG_TYPE_INTERNAL;
    use ledger_testutils::{MockBoundary, MockFeed};

    fn keys(result: &ScanResult) -> Vec<u128> {
        result
            .records
            .iter()
            .map(|record| record.message.ordering_key())
            .collect()
    }

    fn assert_strictly_descending(keys: &[u128]) {
        assert!(keys.windows(2).all(|pair| pair[0] > pair[1]), "{keys:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_all_reads_every_page() {
        let boundary = MockBoundary::default().with_feed(MockFeed::new(120));
        let query = PageQuery::new("0:account").with_page_size(50);

        let result = Scanner::new(&boundary)
            .scan(&query, None, true)
            .await
            .unwrap();

        assert_eq!(boundary.fetch_count(), 3);
        assert_eq!(result.pages_fetched, 3);
        assert_eq!(result.records.len(), 120);
        assert!(!result.has_more);
        assert_strictly_descending(&keys(&result));
        assert!(result.records.iter().all(|record| record.decoded.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn exact_multiple_of_page_size_needs_no_extra_fetch() {
        let boundary = MockBoundary::default().with_feed(MockFeed::new(100));
        let query = PageQuery::new("0:account").with_page_size(50);

        let result = Scanner::new(&boundary)
            .scan(&query, None, true)
            .await
            .unwrap();

        assert_eq!(boundary.fetch_count(), 2);
        assert_eq!(result.pages_fetched, 2);
        assert_eq!(result.records.len(), 100);
        assert!(!result.has_more);
        assert_strictly_descending(&keys(&result));
    }

    #[tokio::test(start_paused = true)]
    async fn single_page_cursor_leads_to_older_page() {
        let boundary = MockBoundary::default().with_feed(MockFeed::new(120));
        let query = PageQuery::new("0:account").with_page_size(50);
        let scanner = Scanner::new(&boundary);

        let first = scanner.scan(&query, None, false).await.unwrap();
        assert_eq!(first.records.len(), 50);
        assert!(first.has_more);
        let second = scanner
            .scan_from(&query, first.cursor.clone(), None, false)
            .await
            .unwrap();

        assert_eq!(boundary.fetch_count(), 2);
        let first_min = keys(&first).into_iter().min().unwrap();
        let second_max = keys(&second).into_iter().max().unwrap();
        assert!(second_max < first_min);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_error_aborts_scan() {
        let boundary = MockBoundary::default().with_feed(MockFeed::new(120).fail_on_fetch(2));
        let query = PageQuery::new("0:account").with_page_size(50);

        let result = Scanner::new(&boundary).scan(&query, None, true).await;

        assert!(matches!(result, Err(FetchError::Transport(_))));
        assert_eq!(boundary.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn max_records_stops_paging() {
        let boundary = MockBoundary::default().with_feed(MockFeed::new(120));
        let query = PageQuery::new("0:account")
            .with_page_size(50)
            .with_max_records(60);

        let result = Scanner::new(&boundary)
            .scan(&query, None, true)
            .await
            .unwrap();

        assert_eq!(result.pages_fetched, 2);
        assert_eq!(result.records.len(), 100);
        assert!(result.has_more);
    }

    #[tokio::test(start_paused = true)]
    async fn equal_keys_keep_feed_order() {
        let records = ["first", "second", "third"]
            .into_iter()
            .zip(["0x5", "0x5", "0x9"])
            .map(|(id, created_lt)| MockFeed::record(id, MSG_TYPE_INTERNAL, created_lt, None))
            .collect();
        let boundary = MockBoundary::default().with_feed(MockFeed::from_records(records));

        let result = Scanner::new(&boundary)
            .scan(&PageQuery::new("0:account"), None, false)
            .await
            .unwrap();

        let ids = result
            .records
            .iter()
            .map(|record| record.message.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["third", "first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn decoded_records_filter_by_name() {
        let schema = AbiSchema::new(Abi::from_json(COMMIT_ABI).unwrap()).unwrap();
        let abort = schema.call_id("abortDiff").unwrap();
        let records = vec![
            MockFeed::record(
                "abort",
                MSG_TYPE_INTERNAL,
                "0x3",
                Some(base64::encode(abort.to_be_bytes())),
            ),
            MockFeed::record("garbage", MSG_TYPE_INTERNAL, "0x2", Some("%%%".to_string())),
            MockFeed::record("empty", MSG_TYPE_INTERNAL, "0x1", None),
        ];
        let boundary = MockBoundary::default().with_feed(MockFeed::from_records(records));

        let result = Scanner::new(&boundary)
            .scan(&PageQuery::new("0:account"), Some(&schema as &dyn BodyDecoder), true)
            .await
            .unwrap();

        assert_eq!(result.records.len(), 3);
        assert_eq!(result.records[1].decoded, None);
        assert_eq!(result.records[1].message.body.as_deref(), Some("%%%"));
        let matching = filter_by_function(result.records, "abortDiff");
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].message.id, "abort");
    }
}
