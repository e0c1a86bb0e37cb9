//! Replays cached transfer events into current holdings.
//!
//! Only `Transfer` events reported by the indexing API are replayed. Tokens
//! that move balances through other mechanisms (rebasing, fee-on-transfer,
//! internal exchange fees) end up with skewed amounts, and a first event that
//! removes an asset is reported as an invariant violation instead of being
//! clamped to zero.

pub mod amount;

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::models::errors::HoldingsError;
use crate::models::events::{EventKind, EventRecord};

pub use amount::Amount;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Erc721Holding {
    pub contract_address: String,
    pub token_id: String,
    pub token_name: String,
    pub token_symbol: String,
    pub count: i64,
}

fn required<'a>(
    event: &'a EventRecord,
    kind: EventKind,
    field: &'static str,
) -> Result<&'a str, HoldingsError> {
    event.get(field).ok_or_else(|| HoldingsError::MalformedField {
        kind,
        field,
        value: String::new(),
    })
}

fn is_sender(address: &str, event: &EventRecord) -> bool {
    event
        .get("from")
        .is_some_and(|from| from.eq_ignore_ascii_case(address))
}

/// Net ERC20 balance per token name. Tokens netting to zero are left out.
pub fn erc20_holdings(
    address: &str,
    events: &[EventRecord],
) -> Result<BTreeMap<String, Amount>, HoldingsError> {
    let kind = EventKind::Erc20;
    let mut holdings: BTreeMap<String, Amount> = BTreeMap::new();

    for event in events {
        let token_name = required(event, kind, "tokenName")?;
        let decimals = required(event, kind, "tokenDecimal")?;
        let value = required(event, kind, "value")?;

        let scale = decimals
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|d| *d <= 77)
            .ok_or_else(|| HoldingsError::MalformedField {
                kind,
                field: "tokenDecimal",
                value: decimals.to_string(),
            })?;
        let mut delta =
            Amount::from_raw(value, scale).ok_or_else(|| HoldingsError::MalformedField {
                kind,
                field: "value",
                value: value.to_string(),
            })?;

        let overflow = || HoldingsError::Overflow {
            asset: token_name.to_string(),
        };
        if is_sender(address, event) {
            delta = delta.checked_neg().ok_or_else(overflow)?;
        }

        match holdings.get_mut(token_name) {
            Some(balance) => *balance = balance.checked_add(delta).ok_or_else(overflow)?,
            None => {
                if delta.is_negative() {
                    return Err(HoldingsError::InvariantViolation {
                        asset: token_name.to_string(),
                        event: event.clone(),
                    });
                }
                holdings.insert(token_name.to_string(), delta);
            }
        }
    }

    holdings.retain(|_, amount| !amount.is_zero());
    Ok(holdings)
}

/// ERC721 tokens currently owned, in order of first appearance.
pub fn erc721_holdings(
    address: &str,
    events: &[EventRecord],
) -> Result<Vec<Erc721Holding>, HoldingsError> {
    let kind = EventKind::Erc721;
    let mut holdings: Vec<Erc721Holding> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for event in events {
        let contract_address = required(event, kind, "contractAddress")?;
        let token_id = required(event, kind, "tokenID")?;
        let delta = if is_sender(address, event) { -1 } else { 1 };

        let asset = (contract_address.to_string(), token_id.to_string());
        match index.get(&asset) {
            Some(&i) => holdings[i].count += delta,
            None => {
                if delta < 0 {
                    return Err(HoldingsError::InvariantViolation {
                        asset: format!("{contract_address}:{token_id}"),
                        event: event.clone(),
                    });
                }
                index.insert(asset, holdings.len());
                holdings.push(Erc721Holding {
                    contract_address: contract_address.to_string(),
                    token_id: token_id.to_string(),
                    token_name: event.get("tokenName").unwrap_or_default().to_string(),
                    token_symbol: event.get("tokenSymbol").unwrap_or_default().to_string(),
                    count: delta,
                });
            }
        }
    }

    holdings.retain(|holding| holding.count != 0);
    Ok(holdings)
}
