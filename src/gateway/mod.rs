pub mod etherscan;

use async_trait::async_trait;

use crate::holdings::Amount;
use crate::models::common::Network;
use crate::models::errors::GatewayError;
use crate::models::events::{EventKind, EventRecord};

pub use etherscan::EtherscanClient;

/// Remote source of an address's ledger activity.
///
/// Pages are 1-based and ordered by ascending block number. A page shorter
/// than `page_size` is the last one.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    async fn fetch_page(
        &self,
        network: &Network,
        address: &str,
        kind: EventKind,
        start_block: u64,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<EventRecord>, GatewayError>;

    /// Native-currency balance at the latest block.
    async fn fetch_balance(&self, network: &Network, address: &str)
    -> Result<Amount, GatewayError>;
}
