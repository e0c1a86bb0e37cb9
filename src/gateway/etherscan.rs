use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

use crate::gateway::LedgerApi;
use crate::holdings::Amount;
use crate::metrics::Metrics;
use crate::models::common::{Config, Network};
use crate::models::errors::{GatewayError, NetworkError};
use crate::models::events::{EventKind, EventRecord};
use crate::utils::retry::{RetryConfig, retry};
use crate::utils::strip_html;

// Etherscan's range end for "up to the chain tip"
const END_BLOCK: u64 = 99_999_999;
const NATIVE_DECIMALS: u32 = 18;

// Messages that come with status "0" but only mean the query matched nothing
const EMPTY_RESULT_MESSAGES: [&str; 3] = [
    "no transactions found",
    "no records found",
    "no data found",
];

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Value,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Value,
}

impl Envelope {
    fn is_ok(&self) -> bool {
        let status = match &self.status {
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        };
        status.is_some_and(|s| s > 0)
    }

    fn is_empty_result(&self) -> bool {
        let message = self.message.trim();
        EMPTY_RESULT_MESSAGES
            .iter()
            .any(|m| message.eq_ignore_ascii_case(m))
    }

    // Throttling arrives as a normal envelope, e.g. "Max rate limit reached"
    fn rate_limit_detail(&self) -> Option<String> {
        if self.is_ok() {
            return None;
        }
        let detail = match &self.result {
            Value::String(detail) if !detail.is_empty() => detail.as_str(),
            _ => self.message.as_str(),
        };
        detail
            .to_ascii_lowercase()
            .contains("rate limit")
            .then(|| detail.to_string())
    }

    fn into_api_error(self) -> GatewayError {
        let status = match self.status {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let message = match self.result {
            Value::String(detail) if !detail.is_empty() => format!("{} ({})", self.message, detail),
            _ => self.message,
        };
        GatewayError::Api { status, message }
    }
}

fn action(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Normal => "txlist",
        EventKind::Internal => "txlistinternal",
        EventKind::Erc20 => "tokentx",
        EventKind::Erc721 => "tokennfttx",
        EventKind::MinedBlock => "getminedblocks",
    }
}

/// Client for the Etherscan API family (Etherscan, BscScan, PolygonScan).
pub struct EtherscanClient {
    client: reqwest::Client,
    api_key: String,
    base_url: Option<Url>,
    retry_config: RetryConfig,
    metrics: Option<Metrics>,
}

impl EtherscanClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: None,
            retry_config: RetryConfig::default(),
            metrics: None,
        })
    }

    pub fn from_config(config: &Config, metrics: Option<Metrics>) -> Result<Self, GatewayError> {
        let mut client = Self::new(
            config.api_key.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_retry_config(config.retry.clone())
        .with_metrics(metrics);
        if let Some(api_url) = &config.api_url {
            client = client.with_base_url(api_url)?;
        }
        Ok(client)
    }

    /// Send every request to `base_url` instead of the network's public endpoint.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, GatewayError> {
        let url = Url::parse(base_url)
            .map_err(|e| GatewayError::Transport(format!("invalid API url '{base_url}': {e}")))?;
        self.base_url = Some(url);
        Ok(self)
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    fn endpoint(&self, network: &Network) -> Result<Url, GatewayError> {
        if let Some(url) = &self.base_url {
            return Ok(url.clone());
        }
        let unknown = || NetworkError::UnknownEndpoint {
            network: network.to_string(),
        };
        let url = network.api_url().ok_or_else(unknown)?;
        Url::parse(url).map_err(|_| unknown().into())
    }

    async fn request(
        &self,
        url: &Url,
        params: &[(&str, String)],
        method: &str,
    ) -> Result<Envelope, GatewayError> {
        let start = Instant::now();

        if let Some(metrics) = &self.metrics {
            metrics
                .api_requests
                .add(1, &metrics.labels("method", method));
        }

        let result = self.send(url, params).await;

        if let Some(metrics) = &self.metrics {
            metrics.api_latency.record(
                start.elapsed().as_secs_f64(),
                &metrics.labels("method", method),
            );
            if result.is_err() {
                metrics.api_errors.add(1, &metrics.labels("method", method));
            }
        }

        result
    }

    async fn send(&self, url: &Url, params: &[(&str, String)]) -> Result<Envelope, GatewayError> {
        let response = self.client.get(url.clone()).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Transport(format!(
                "HTTP {}: {}",
                status,
                strip_html(&body)
            )));
        }

        let envelope = response.json::<Envelope>().await?;
        if let Some(detail) = envelope.rate_limit_detail() {
            return Err(GatewayError::RateLimited(detail));
        }
        Ok(envelope)
    }

    async fn request_with_retry(
        &self,
        url: &Url,
        params: &[(&str, String)],
        method: &str,
    ) -> Result<Envelope, GatewayError> {
        retry(
            || self.request(url, params, method),
            GatewayError::is_retryable,
            &self.retry_config,
            method,
        )
        .await
    }

    async fn fetch_raw_page(
        &self,
        network: &Network,
        address: &str,
        kind: EventKind,
        start_block: u64,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<EventRecord>, GatewayError> {
        let url = self.endpoint(network)?;
        let mut params = vec![
            ("module", "account".to_string()),
            ("action", action(kind).to_string()),
            ("address", address.to_string()),
            ("startblock", start_block.to_string()),
            ("endblock", END_BLOCK.to_string()),
            ("page", page.to_string()),
            ("offset", page_size.to_string()),
            ("sort", "asc".to_string()),
            ("apikey", self.api_key.clone()),
        ];
        if kind == EventKind::MinedBlock {
            params.push(("blocktype", "blocks".to_string()));
        }

        debug!(
            "Fetching {} page {} for {} on {} from block {}",
            kind, page, address, network, start_block
        );

        let envelope = self.request_with_retry(&url, &params, action(kind)).await?;

        if envelope.is_empty_result() {
            return Ok(Vec::new());
        }
        if !envelope.is_ok() {
            let err = envelope.into_api_error();
            // Mined blocks are not served on every network
            if kind == EventKind::MinedBlock {
                warn!("Treating mined block query error as empty: {}", err);
                return Ok(Vec::new());
            }
            return Err(err);
        }

        match envelope.result {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(EventRecord::from(map)),
                    other => Err(GatewayError::Decode(format!(
                        "expected an event object, got {other}"
                    ))),
                })
                .collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(GatewayError::Decode(format!(
                "expected a list of events, got {other}"
            ))),
        }
    }

    /// `getminedblocks` has no block range and no sort order, so the whole
    /// listing is walked and filtered here. Everything is returned on page 1.
    async fn fetch_mined_blocks(
        &self,
        network: &Network,
        address: &str,
        start_block: u64,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<EventRecord>, GatewayError> {
        if page > 1 {
            return Ok(Vec::new());
        }

        let mut blocks = Vec::new();
        let mut raw_page = 1;
        loop {
            let batch = self
                .fetch_raw_page(
                    network,
                    address,
                    EventKind::MinedBlock,
                    start_block,
                    raw_page,
                    page_size,
                )
                .await?;
            let is_last = batch.len() < page_size;
            blocks.extend(batch);
            if is_last {
                break;
            }
            raw_page += 1;
        }

        let total = blocks.len();
        blocks.retain(|b| b.block_number().is_some_and(|n| n >= start_block));
        blocks.sort_by_key(|b| b.block_number());
        debug!(
            "Kept {} of {} mined blocks from block {}",
            blocks.len(),
            total,
            start_block
        );
        Ok(blocks)
    }
}

#[async_trait]
impl LedgerApi for EtherscanClient {
    async fn fetch_page(
        &self,
        network: &Network,
        address: &str,
        kind: EventKind,
        start_block: u64,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<EventRecord>, GatewayError> {
        if kind == EventKind::MinedBlock {
            return self
                .fetch_mined_blocks(network, address, start_block, page, page_size)
                .await;
        }
        self.fetch_raw_page(network, address, kind, start_block, page, page_size)
            .await
    }

    async fn fetch_balance(
        &self,
        network: &Network,
        address: &str,
    ) -> Result<Amount, GatewayError> {
        let url = self.endpoint(network)?;
        let params = [
            ("module", "account".to_string()),
            ("action", "balance".to_string()),
            ("address", address.to_string()),
            ("tag", "latest".to_string()),
            ("apikey", self.api_key.clone()),
        ];

        let envelope = self.request_with_retry(&url, &params, "balance").await?;
        if !envelope.is_ok() {
            return Err(envelope.into_api_error());
        }

        let raw = match &envelope.result {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(GatewayError::Decode(format!(
                    "expected a balance, got {other}"
                )));
            }
        };
        Amount::from_raw(&raw, NATIVE_DECIMALS)
            .ok_or_else(|| GatewayError::Decode(format!("invalid balance '{raw}'")))
    }
}
