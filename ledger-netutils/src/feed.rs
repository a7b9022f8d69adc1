//! The account message feed: queries, cursors, records and pages.

use serde::{Deserialize, Serialize};

/// Message type discriminator of an internal message.
pub const MSG_TYPE_INTERNAL: u8 = 0;
/// Message type discriminator of an inbound external message.
pub const MSG_TYPE_EXTERNAL_IN: u8 = 1;
/// Message type discriminator of an outbound external message.
pub const MSG_TYPE_EXTERNAL_OUT: u8 = 2;

/// Which messages of the account the feed returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageTypeFilter {
    /// external messages sent to the account
    ExtIn,
    /// events emitted by the account
    ExtOut,
    /// internal messages received by the account
    IntIn,
    /// internal messages sent by the account
    IntOut,
}

impl std::str::FromStr for MessageTypeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ExtIn" => Ok(Self::ExtIn),
            "ExtOut" => Ok(Self::ExtOut),
            "IntIn" => Ok(Self::IntIn),
            "IntOut" => Ok(Self::IntOut),
            other => Err(format!(
                "unknown message type {other:?}, expected one of ExtIn, ExtOut, IntIn, IntOut"
            )),
        }
    }
}

/// Opaque position in the reverse chronological feed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target of a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageQuery {
    /// account whose history is read
    pub address: String,
    /// empty means every type
    pub msg_types: Vec<MessageTypeFilter>,
    /// records per page
    pub page_size: u32,
    /// read from blocks that are not final yet
    pub allow_latest_inconsistent_data: bool,
    /// stop paging once at least this many records are held
    pub max_records: Option<usize>,
}

impl PageQuery {
    /// Query for `address` with the default page size and no type filter.
    pub fn new(address: impl Into<String>) -> Self {
        PageQuery {
            address: address.into(),
            msg_types: Vec::new(),
            page_size: 50,
            allow_latest_inconsistent_data: false,
            max_records: None,
        }
    }

    /// Restrict to the given message types.
    pub fn with_msg_types(mut self, msg_types: Vec<MessageTypeFilter>) -> Self {
        self.msg_types = msg_types;
        self
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Stop after roughly `max_records`.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }
}

/// One history entry as the feed returns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// message id
    pub id: String,
    /// 0 internal, 1 external in, 2 external out
    pub msg_type: u8,
    /// logical time, hex with or without a `0x` prefix
    pub created_lt: String,
    /// base64 body, absent for messages without one
    pub body: Option<String>,
}

impl Record {
    /// Numeric ordering key. Keys that do not parse order before everything else, i.e. last
    /// in a descending sort.
    pub fn ordering_key(&self) -> u128 {
        let hex = self
            .created_lt
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        u128::from_str_radix(hex, 16).unwrap_or(0)
    }
}

/// One fetched page. Only lives for one fetch iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedPage {
    /// records in the order the feed returned them
    pub records: Vec<Record>,
    /// cursor for the next older page
    pub start_cursor: Option<Cursor>,
    /// whether older records exist
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(created_lt: &str) -> Record {
        Record {
            id: "id".to_string(),
            msg_type: MSG_TYPE_INTERNAL,
            created_lt: created_lt.to_string(),
            body: None,
        }
    }

    #[test]
    fn ordering_key_accepts_both_prefixes() {
        assert_eq!(record("0x1a").ordering_key(), 26);
        assert_eq!(record("1a").ordering_key(), 26);
        assert_eq!(record("zz").ordering_key(), 0);
    }

    #[test]
    fn message_type_filter_parses() {
        assert_eq!("IntIn".parse::<MessageTypeFilter>(), Ok(MessageTypeFilter::IntIn));
        assert!("Internal".parse::<MessageTypeFilter>().is_err());
    }
}
