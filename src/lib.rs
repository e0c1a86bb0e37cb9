pub mod gateway;
pub mod holdings;
pub mod indexer;
pub mod metrics;
pub mod models;
pub mod storage;
pub mod utils;
