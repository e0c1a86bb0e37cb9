use thiserror::Error;

use crate::models::events::{EventKind, EventRecord};

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Unsupported network family: {name}")]
    UnsupportedFamily { name: String },
    #[error("Invalid network variant '{variant}': expected lowercase letters and digits only")]
    InvalidVariant { variant: String },
    #[error("No known API endpoint for network {network}; set `api_url` in the config")]
    UnknownEndpoint { network: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("Page size must be greater than zero")]
    ZeroPageSize,
    #[error(transparent)]
    Network(#[from] NetworkError),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Rate limited by the API: {0}")]
    RateLimited(String),
    #[error("API error (status {status}): {message}")]
    Api { status: String, message: String },
    #[error("Unexpected API response: {0}")]
    Decode(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl GatewayError {
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_))
    }

    // Worth another attempt after a backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::RateLimited(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Row with key '{key}' already exists in table {table}: {existing:?}")]
    Conflict {
        table: String,
        key: String,
        existing: EventRecord,
    },
    #[error("Address '{address}' cannot name a collection")]
    InvalidAddress { address: String },
    #[error("Record for table {table} is missing key field '{field}'")]
    MissingKeyField { table: String, field: &'static str },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum HoldingsError {
    #[error("First operation on asset '{asset}' is a removal: {event:?}")]
    InvariantViolation { asset: String, event: EventRecord },
    #[error("Malformed field '{field}' = '{value}' in {kind} event")]
    MalformedField {
        kind: EventKind,
        field: &'static str,
        value: String,
    },
    #[error("Amount overflow while replaying asset '{asset}'")]
    Overflow { asset: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to fetch {kind} events: {source}")]
    Gateway {
        kind: EventKind,
        #[source]
        source: GatewayError,
    },
    #[error("Failed to store {kind} events: {source}")]
    Storage {
        kind: EventKind,
        #[source]
        source: StorageError,
    },
}

impl SyncError {
    pub fn kind(&self) -> EventKind {
        match self {
            SyncError::Gateway { kind, .. } | SyncError::Storage { kind, .. } => *kind,
        }
    }
}
