pub mod sqlite;

use crate::models::common::Network;
use crate::models::errors::StorageError;
use crate::models::events::EventKind;

pub use sqlite::EventStore;

/// Names one collection: the events of one kind for one address on one network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    network: Network,
    address: String,
    kind: EventKind,
}

impl CollectionKey {
    pub fn new(network: Network, address: &str, kind: EventKind) -> Result<Self, StorageError> {
        // Addresses are case-insensitive hex; anything else could collide once embedded in a table name
        if address.is_empty() || !address.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StorageError::InvalidAddress {
                address: address.to_string(),
            });
        }
        Ok(Self {
            network,
            address: address.to_ascii_lowercase(),
            kind,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn with_kind(&self, kind: EventKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    // `{family}_{variant}_{address}_{kind}`: family, variant and address never contain '_'
    pub fn table_name(&self) -> String {
        format!("{}_{}_{}", self.network, self.address, self.kind)
    }
}
