//! Building batches of requests.

use std::path::Path;

use ledger_netutils::Request;

/// One request per regular file in `dir`, labelled with the file stem, sorted by label.
///
/// The file contents are the already encoded payload.
pub fn requests_from_dir(dir: impl AsRef<Path>) -> std::io::Result<Vec<Request>> {
    let mut requests = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let label = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        requests.push(Request::new(label, std::fs::read(&path)?));
    }
    requests.sort_by(|a, b| a.label().cmp(b.label()));
    log::info!("Loaded {} requests", requests.len());
    Ok(requests)
}

/// `count` copies of `payload`, labelled `{prefix}-{unix millis}-{index}`.
pub fn labelled_batch(prefix: &str, payload: &[u8], count: usize) -> Vec<Request> {
    let stamp = chrono::Utc::now().timestamp_millis();
    (0..count)
        .map(|index| Request::new(format!("{prefix}-{stamp}-{index}"), payload))
        .collect()
}

/// Fresh copies of a request template, one batch per replay round.
///
/// Round `n` labels every request `{label}-{unix millis}-{n}` and stamps its body with that
/// time. Stamps strictly increase between rounds, so no two rounds share a message id.
#[derive(Clone, Debug)]
pub struct ReplayBatches {
    template: Vec<Request>,
    last_stamp: u64,
}

impl ReplayBatches {
    /// Rounds built from `template`.
    pub fn new(template: Vec<Request>) -> Self {
        ReplayBatches {
            template,
            last_stamp: 0,
        }
    }

    /// The batch of round `invocation`.
    pub fn round(&mut self, invocation: usize) -> Vec<Request> {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        let stamp = now.max(self.last_stamp + 1);
        self.last_stamp = stamp;
        self.template
            .iter()
            .map(|request| {
                Request::new(
                    format!("{}-{stamp}-{invocation}", request.label()),
                    request.payload().clone(),
                )
                .with_time(stamp)
            })
            .collect()
    }
}

/// Splits `requests` into groups of at most `size`. A `size` of 0 keeps one group.
pub fn chunk_requests(requests: Vec<Request>, size: usize) -> Vec<Vec<Request>> {
    if size == 0 {
        return if requests.is_empty() {
            Vec::new()
        } else {
            vec![requests]
        };
    }
    let mut chunks = Vec::with_capacity(requests.len().div_ceil(size));
    let mut rest = requests.into_iter().peekable();
    while rest.peek().is_some() {
        chunks.push(rest.by_ref().take(size).collect());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_netutils::{GraphqlConnector, LedgerBoundary};
    use ledgerconfig::LedgerConfig;
    use std::collections::HashSet;
    use test_case::test_case;

    #[test]
    fn labels_come_from_file_stems() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.boc"), b"second").unwrap();
        std::fs::write(dir.path().join("a.boc"), b"first").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let requests = requests_from_dir(dir.path()).unwrap();

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].label(), "a");
        assert_eq!(requests[0].payload(), b"first");
        assert_eq!(requests[1].label(), "b");
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(requests_from_dir(dir.path().join("absent")).is_err());
    }

    #[test]
    fn batch_labels_are_unique() {
        let batch = labelled_batch("deploy", b"payload", 3);
        assert_eq!(batch.len(), 3);
        assert!(batch[0].label().starts_with("deploy-"));
        assert!(batch[2].label().ends_with("-2"));
        assert_ne!(batch[0].label(), batch[1].label());
    }

    #[test]
    fn replay_rounds_get_fresh_labels_and_ids() {
        let connector = GraphqlConnector::new(LedgerConfig::create_unconnected(None).endpoints);
        let mut rounds = ReplayBatches::new(vec![Request::new("a", b"call".to_vec())]);

        let batches = (0..3).map(|round| rounds.round(round)).collect::<Vec<_>>();

        let labels = batches
            .iter()
            .flatten()
            .map(|request| request.label().clone())
            .collect::<HashSet<_>>();
        let ids = batches
            .iter()
            .flatten()
            .map(|request| connector.encode(request).unwrap().id().clone())
            .collect::<HashSet<_>>();
        assert_eq!(labels.len(), 3);
        assert_eq!(ids.len(), 3);
        assert!(batches[2][0].label().starts_with("a-"));
        assert!(batches[2][0].label().ends_with("-2"));
        assert_eq!(batches[1][0].payload(), b"call");
    }

    #[test_case(10, 3 => vec![3, 3, 3, 1] ; "uneven")]
    #[test_case(4, 2 => vec![2, 2] ; "even")]
    #[test_case(4, 0 => vec![4] ; "unchunked")]
    #[test_case(0, 3 => Vec::<usize>::new() ; "empty")]
    fn chunk_sizes(count: usize, size: usize) -> Vec<usize> {
        let requests = labelled_batch("r", b"", count);
        chunk_requests(requests, size)
            .iter()
            .map(Vec::len)
            .collect()
    }
}
