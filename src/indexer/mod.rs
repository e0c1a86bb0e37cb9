use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{error, info, warn};

use crate::gateway::LedgerApi;
use crate::holdings::{self, Amount, Erc721Holding};
use crate::metrics::Metrics;
use crate::models::common::{DEFAULT_PAGE_SIZE, Network};
use crate::models::errors::{GatewayError, HoldingsError, StorageError, SyncError};
use crate::models::events::{EventKind, EventRecord, OnConflict};
use crate::storage::{CollectionKey, EventStore};

/// Keeps the local store of one address on one network up to date.
///
/// No state is held between calls: every sync starts from the highest block
/// already stored for the kind. A single writer per collection is assumed.
pub struct AddressIndexer<G> {
    network: Network,
    address: String,
    collection: CollectionKey,
    gateway: G,
    store: EventStore,
    page_size: usize,
    metrics: Option<Metrics>,
}

/// Outcome of one `sync` call for a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KindSync {
    pub kind: EventKind,
    pub start_block: u64,
    pub pages: u32,
    pub stored: usize,
}

/// Per-kind outcomes of `sync_all`, in sync order.
#[derive(Debug)]
pub struct SyncReport {
    pub outcomes: Vec<(EventKind, Result<KindSync, SyncError>)>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }

    pub fn failed_kinds(&self) -> Vec<EventKind> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn stored(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|(_, outcome)| outcome.as_ref().ok())
            .map(|sync| sync.stored)
            .sum()
    }

    pub fn get(&self, kind: EventKind) -> Option<&Result<KindSync, SyncError>> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (kind, outcome) in &self.outcomes {
            match outcome {
                Ok(sync) => writeln!(f, "{kind}: {} new events", sync.stored)?,
                Err(e) => writeln!(f, "{kind}: failed: {e}")?,
            }
        }
        Ok(())
    }
}

impl<G: LedgerApi> AddressIndexer<G> {
    pub fn new(
        network: Network,
        address: &str,
        gateway: G,
        store: EventStore,
    ) -> Result<Self, StorageError> {
        let collection = CollectionKey::new(network.clone(), address, EventKind::Normal)?;
        Ok(Self {
            network,
            address: address.to_string(),
            collection,
            gateway,
            store,
            page_size: DEFAULT_PAGE_SIZE,
            metrics: None,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn collection(&self, kind: EventKind) -> CollectionKey {
        self.collection.with_kind(kind)
    }

    /// Fetch every event of `kind` newer than the stored ones and append them.
    pub async fn sync(&self, kind: EventKind) -> Result<KindSync, SyncError> {
        let key = self.collection(kind);
        let storage_err = |source| SyncError::Storage { kind, source };

        let last_block = self.store.max_block(&key).await.map_err(storage_err)?;
        let start_block = last_block + 1;

        let (events, pages) = self.fetch_from(kind, start_block).await?;

        let stored = self
            .store
            .append(&key, &events, OnConflict::Reject)
            .await
            .map_err(storage_err)?;

        if let Some(metrics) = &self.metrics {
            let labels = metrics.labels("kind", kind.as_str());
            metrics.events_stored.add(stored as u64, &labels);
            // The batch is committed; a failed read only costs the gauge update
            match self.store.max_block(&key).await {
                Ok(max_block) => metrics.last_synced_block.record(max_block, &labels),
                Err(e) => warn!("Could not read max block of {} for metrics: {}", kind, e),
            }
        }

        if stored > 0 {
            info!(
                "Stored {} new {} events for {} on {} from block {}",
                stored, kind, self.address, self.network, start_block
            );
        }

        Ok(KindSync {
            kind,
            start_block,
            pages,
            stored,
        })
    }

    async fn fetch_from(
        &self,
        kind: EventKind,
        start_block: u64,
    ) -> Result<(Vec<EventRecord>, u32), SyncError> {
        let mut events = Vec::new();
        let mut page = 1;

        loop {
            let batch = match self
                .gateway
                .fetch_page(
                    &self.network,
                    &self.address,
                    kind,
                    start_block,
                    page,
                    self.page_size,
                )
                .await
            {
                Ok(batch) => batch,
                // Mined blocks are not served on every network
                Err(GatewayError::Api { message, .. }) if kind == EventKind::MinedBlock => {
                    warn!("No mined blocks available for {}: {}", self.address, message);
                    Vec::new()
                }
                Err(source) => return Err(SyncError::Gateway { kind, source }),
            };

            let is_last = batch.len() < self.page_size;
            events.extend(batch);
            if is_last {
                return Ok((events, page));
            }
            page += 1;
        }
    }

    /// Sync every kind in turn. A failing kind does not stop the others.
    pub async fn sync_all(&self) -> SyncReport {
        let mut outcomes = Vec::with_capacity(EventKind::ALL.len());

        for kind in EventKind::ALL {
            let outcome = self.sync(kind).await;
            if let Err(e) = &outcome {
                error!("Sync of {} events for {} failed: {}", kind, self.address, e);
                if let Some(metrics) = &self.metrics {
                    metrics
                        .sync_failures
                        .add(1, &metrics.labels("kind", kind.as_str()));
                }
            }
            outcomes.push((kind, outcome));
        }

        SyncReport { outcomes }
    }

    pub async fn get_cached_events(&self, kind: EventKind) -> Result<Vec<EventRecord>, StorageError> {
        self.store.all(&self.collection(kind)).await
    }

    pub async fn get_erc20_holdings(&self) -> Result<BTreeMap<String, Amount>, HoldingsError> {
        let events = self.get_cached_events(EventKind::Erc20).await?;
        holdings::erc20_holdings(&self.address, &events)
    }

    pub async fn get_erc721_holdings(&self) -> Result<Vec<Erc721Holding>, HoldingsError> {
        let events = self.get_cached_events(EventKind::Erc721).await?;
        holdings::erc721_holdings(&self.address, &events)
    }

    pub async fn get_balance(&self) -> Result<Amount, GatewayError> {
        self.gateway
            .fetch_balance(&self.network, &self.address)
            .await
    }

    pub async fn drop(&self, kind: EventKind) -> Result<(), StorageError> {
        self.store.drop_collection(&self.collection(kind)).await
    }

    // Only this address's collections on this network
    pub async fn drop_all(&self) -> Result<(), StorageError> {
        for kind in EventKind::ALL {
            self.drop(kind).await?;
        }
        Ok(())
    }
}
