use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const BLOCK_NUMBER_FIELD: &str = "blockNumber";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Normal,
    Internal,
    Erc20,
    Erc721,
    MinedBlock,
}

impl EventKind {
    // Sync order used by `sync_all`
    pub const ALL: [EventKind; 5] = [
        EventKind::Normal,
        EventKind::Internal,
        EventKind::Erc20,
        EventKind::Erc721,
        EventKind::MinedBlock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Normal => "normal",
            EventKind::Internal => "internal",
            EventKind::Erc20 => "erc20",
            EventKind::Erc721 => "erc721",
            EventKind::MinedBlock => "mined_block",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "normal" => Ok(EventKind::Normal),
            "internal" => Ok(EventKind::Internal),
            "erc20" => Ok(EventKind::Erc20),
            "erc721" => Ok(EventKind::Erc721),
            "mined_block" | "mined_blocks" | "mined" => Ok(EventKind::MinedBlock),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// A single ledger event as returned by the indexing API.
///
/// Values are kept as opaque text; numeric fields are only parsed where a
/// computation needs them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventRecord(BTreeMap<String, String>);

impl EventRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn block_number(&self) -> Option<u64> {
        self.get(BLOCK_NUMBER_FIELD)
            .and_then(|v| v.trim().parse::<u64>().ok())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EventRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// The API occasionally returns numbers or nulls where strings are documented
impl From<serde_json::Map<String, serde_json::Value>> for EventRecord {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((k, s)),
                other => Some((k, other.to_string())),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    #[default]
    Reject,
    Overwrite,
}
