use crate::models::events::{EventKind, EventRecord};

// Every column is stored as TEXT; values are opaque until a computation needs them
pub const ROW_KEY_COLUMN: &str = "row_key";
const KEY_SEPARATOR: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub description: &'static str,
}

const fn field(name: &'static str, description: &'static str) -> FieldDef {
    FieldDef { name, description }
}

/// Fixed column layout of one event kind.
///
/// `key_fields` make up the natural primary key of a row. The first one is
/// mandatory; the others default to an empty string when the provider omits
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub kind: EventKind,
    pub fields: &'static [FieldDef],
    pub key_fields: &'static [&'static str],
}

impl TableSchema {
    pub fn row_key(&self, record: &EventRecord) -> Result<String, &'static str> {
        let mut parts = Vec::with_capacity(self.key_fields.len());
        for (i, name) in self.key_fields.iter().enumerate() {
            match record.get(name) {
                Some(value) if !value.is_empty() => parts.push(value.to_string()),
                _ if i == 0 => return Err(*name),
                _ => parts.push(String::new()),
            }
        }
        Ok(parts.join(KEY_SEPARATOR))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }

    // Fields of `record` that have no column and are not stored
    pub fn unknown_fields<'a>(&self, record: &'a EventRecord) -> impl Iterator<Item = &'a str> {
        record
            .fields()
            .map(|(name, _)| name)
            .filter(|name| !self.has_field(name))
    }
}

pub fn table_schema(kind: EventKind) -> &'static TableSchema {
    match kind {
        EventKind::Normal => &NORMAL_SCHEMA,
        EventKind::Internal => &INTERNAL_SCHEMA,
        EventKind::Erc20 => &ERC20_SCHEMA,
        EventKind::Erc721 => &ERC721_SCHEMA,
        EventKind::MinedBlock => &MINED_BLOCK_SCHEMA,
    }
}

pub static NORMAL_SCHEMA: TableSchema = TableSchema {
    kind: EventKind::Normal,
    fields: &[
        field("blockNumber", "Number of the block including the transaction"),
        field("timeStamp", "Unix timestamp of the block"),
        field("hash", "Transaction hash"),
        field("nonce", "Sender nonce"),
        field("blockHash", "Hash of the block including the transaction"),
        field("transactionIndex", "Position of the transaction in the block"),
        field("from", "Sender address"),
        field("to", "Recipient address, empty for contract creation"),
        field("value", "Transferred amount in wei"),
        field("gas", "Gas limit provided by the sender"),
        field("gasPrice", "Gas price in wei"),
        field("isError", "1 if the execution failed"),
        field("txreceipt_status", "Receipt status, 1 for success"),
        field("input", "Call data"),
        field("contractAddress", "Created contract address, if any"),
        field("cumulativeGasUsed", "Gas used in the block up to this transaction"),
        field("gasUsed", "Gas used by the transaction"),
        field("confirmations", "Confirmations at fetch time"),
        field("methodId", "4-byte selector of the call"),
        field("functionName", "Decoded function signature, if known"),
    ],
    key_fields: &["hash"],
};

pub static INTERNAL_SCHEMA: TableSchema = TableSchema {
    kind: EventKind::Internal,
    fields: &[
        field("blockNumber", "Number of the block including the call"),
        field("timeStamp", "Unix timestamp of the block"),
        field("hash", "Hash of the parent transaction"),
        field("from", "Caller address"),
        field("to", "Callee address"),
        field("value", "Transferred amount in wei"),
        field("contractAddress", "Created contract address, if any"),
        field("input", "Call data"),
        field("type", "Call type (call, create, ...)"),
        field("gas", "Gas provided to the call"),
        field("gasUsed", "Gas used by the call"),
        field("traceId", "Position of the call in the trace tree"),
        field("isError", "1 if the call failed"),
        field("errCode", "Error description for failed calls"),
    ],
    key_fields: &["hash", "traceId"],
};

pub static ERC20_SCHEMA: TableSchema = TableSchema {
    kind: EventKind::Erc20,
    fields: &[
        field("blockNumber", "Number of the block including the transfer"),
        field("timeStamp", "Unix timestamp of the block"),
        field("hash", "Hash of the transaction emitting the transfer"),
        field("nonce", "Sender nonce"),
        field("blockHash", "Hash of the block"),
        field("from", "Token sender"),
        field("contractAddress", "Token contract address"),
        field("to", "Token recipient"),
        field("value", "Transferred amount in the token's smallest unit"),
        field("tokenName", "Token name"),
        field("tokenSymbol", "Token symbol"),
        field("tokenDecimal", "Token decimals"),
        field("transactionIndex", "Position of the transaction in the block"),
        field("gas", "Gas limit of the transaction"),
        field("gasPrice", "Gas price in wei"),
        field("gasUsed", "Gas used by the transaction"),
        field("cumulativeGasUsed", "Gas used in the block up to this transaction"),
        field("input", "Call data"),
        field("confirmations", "Confirmations at fetch time"),
    ],
    key_fields: &["hash", "contractAddress", "from", "to", "value"],
};

pub static ERC721_SCHEMA: TableSchema = TableSchema {
    kind: EventKind::Erc721,
    fields: &[
        field("blockNumber", "Number of the block including the transfer"),
        field("timeStamp", "Unix timestamp of the block"),
        field("hash", "Hash of the transaction emitting the transfer"),
        field("nonce", "Sender nonce"),
        field("blockHash", "Hash of the block"),
        field("from", "Token sender"),
        field("contractAddress", "Collection contract address"),
        field("to", "Token recipient"),
        field("tokenID", "Identifier of the token within the collection"),
        field("tokenName", "Collection name"),
        field("tokenSymbol", "Collection symbol"),
        field("tokenDecimal", "Always 0 for ERC721"),
        field("transactionIndex", "Position of the transaction in the block"),
        field("gas", "Gas limit of the transaction"),
        field("gasPrice", "Gas price in wei"),
        field("gasUsed", "Gas used by the transaction"),
        field("cumulativeGasUsed", "Gas used in the block up to this transaction"),
        field("input", "Call data"),
        field("confirmations", "Confirmations at fetch time"),
    ],
    key_fields: &["hash", "contractAddress", "tokenID", "from", "to"],
};

pub static MINED_BLOCK_SCHEMA: TableSchema = TableSchema {
    kind: EventKind::MinedBlock,
    fields: &[
        field("blockNumber", "Number of the mined block"),
        field("timeStamp", "Unix timestamp of the block"),
        field("blockReward", "Block reward in wei"),
    ],
    key_fields: &["blockNumber"],
};
