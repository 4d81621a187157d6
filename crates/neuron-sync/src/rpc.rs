//! JSON-RPC node client over HTTP

use crate::config::NodeConfig;
use crate::node::NodeClient;
use crate::{Error, Result};
use async_trait::async_trait;
use neuron_core::{
    decode_hex_bytes, Block, Capacity, Cell, CellInput, CellOutput, CellStatus, Header, HashType,
    LockHash, OutPoint, Script, Transaction, H256,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Block span per `get_cells_by_lock_hash` request
pub const CELLS_PAGE_BLOCKS: u64 = 100;

/// HTTP JSON-RPC client
pub struct HttpNodeClient {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpNodeClient {
    /// Build a client for `config.url`
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "id": id,
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc request");

        let response: RpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(Error::Fetch(format!(
                "{} failed ({}): {}",
                method, err.code, err.message
            )));
        }
        Ok(response.result)
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn get_tip_header(&self) -> Result<Header> {
        let header: RpcHeader = self
            .call("get_tip_header", json!([]))
            .await?
            .ok_or_else(|| Error::Decode("get_tip_header returned null".into()))?;
        header.into_header()
    }

    async fn get_header_by_number(&self, number: u64) -> Result<Option<Header>> {
        let header: Option<RpcHeader> = self
            .call("get_header_by_number", json!([to_hex(number)]))
            .await?;
        header.map(RpcHeader::into_header).transpose()
    }

    async fn get_block_by_number(&self, number: u64) -> Result<Option<Block>> {
        let block: Option<RpcBlock> = self
            .call("get_block_by_number", json!([to_hex(number)]))
            .await?;
        block.map(RpcBlock::into_block).transpose()
    }

    /// Only live cells are indexed by the node; other statuses return nothing.
    /// Returned cells carry no block number.
    async fn get_cells_by_lock_hash(
        &self,
        lock_hash: &LockHash,
        status: CellStatus,
    ) -> Result<Vec<Cell>> {
        if status != CellStatus::Live {
            return Ok(Vec::new());
        }

        let tip = self.get_tip_header().await?.number;
        let mut cells = Vec::new();
        let mut from = 0u64;
        while from <= tip {
            let to = (from + CELLS_PAGE_BLOCKS - 1).min(tip);
            let page: Vec<RpcCell> = self
                .call(
                    "get_cells_by_lock_hash",
                    json!([lock_hash.to_string(), to_hex(from), to_hex(to)]),
                )
                .await?
                .unwrap_or_default();
            for cell in page {
                cells.push(cell.into_cell(*lock_hash)?);
            }
            from = to + 1;
        }
        Ok(cells)
    }
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcHeader {
    number: String,
    hash: H256,
    parent_hash: H256,
    timestamp: String,
}

impl RpcHeader {
    fn into_header(self) -> Result<Header> {
        Ok(Header {
            number: parse_hex_u64(&self.number)?,
            hash: self.hash,
            parent_hash: self.parent_hash,
            timestamp: parse_hex_u64(&self.timestamp)?,
        })
    }
}

#[derive(Deserialize)]
struct RpcBlock {
    header: RpcHeader,
    transactions: Vec<RpcTransaction>,
}

impl RpcBlock {
    fn into_block(self) -> Result<Block> {
        Ok(Block {
            header: self.header.into_header()?,
            transactions: self
                .transactions
                .into_iter()
                .map(RpcTransaction::into_transaction)
                .collect::<Result<_>>()?,
        })
    }
}

#[derive(Deserialize)]
struct RpcTransaction {
    hash: H256,
    inputs: Vec<RpcInput>,
    outputs: Vec<RpcOutput>,
}

impl RpcTransaction {
    fn into_transaction(self) -> Result<Transaction> {
        Ok(Transaction {
            hash: self.hash,
            inputs: self
                .inputs
                .into_iter()
                .map(|i| -> Result<CellInput> {
                    Ok(CellInput {
                        previous_output: i.previous_output.into_out_point()?,
                    })
                })
                .collect::<Result<_>>()?,
            outputs: self
                .outputs
                .into_iter()
                .map(|o| -> Result<CellOutput> {
                    Ok(CellOutput {
                        capacity: Capacity::from_hex_str(&o.capacity)?,
                        lock: o.lock.into_script()?,
                    })
                })
                .collect::<Result<_>>()?,
        })
    }
}

#[derive(Deserialize)]
struct RpcInput {
    previous_output: RpcOutPoint,
}

#[derive(Deserialize)]
struct RpcOutPoint {
    tx_hash: H256,
    index: String,
}

impl RpcOutPoint {
    fn into_out_point(self) -> Result<OutPoint> {
        let index = parse_hex_u64(&self.index)?;
        let index = u32::try_from(index)
            .map_err(|_| Error::Decode(format!("output index out of range: {}", self.index)))?;
        Ok(OutPoint::new(self.tx_hash, index))
    }
}

#[derive(Deserialize)]
struct RpcOutput {
    capacity: String,
    lock: RpcScript,
}

#[derive(Deserialize)]
struct RpcScript {
    code_hash: H256,
    hash_type: String,
    args: String,
}

impl RpcScript {
    fn into_script(self) -> Result<Script> {
        Ok(Script {
            code_hash: self.code_hash,
            hash_type: self.hash_type.parse::<HashType>()?,
            args: decode_hex_bytes(&self.args)?,
        })
    }
}

#[derive(Deserialize)]
struct RpcCell {
    out_point: RpcOutPoint,
    capacity: String,
}

impl RpcCell {
    fn into_cell(self, lock_hash: LockHash) -> Result<Cell> {
        Ok(Cell {
            out_point: self.out_point.into_out_point()?,
            lock_hash,
            capacity: Capacity::from_hex_str(&self.capacity)?,
            status: CellStatus::Live,
            block_number: None,
            spent_block_number: None,
        })
    }
}

fn to_hex(n: u64) -> String {
    format!("0x{:x}", n)
}

fn parse_hex_u64(s: &str) -> Result<u64> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| Error::Decode(format!("expected 0x-prefixed number: {}", s)))?;
    u64::from_str_radix(digits, 16).map_err(|e| Error::Decode(format!("{}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: &str) -> String {
        format!("0x{}", byte.repeat(32))
    }

    #[test]
    fn test_hex_numbers() {
        assert_eq!(to_hex(0), "0x0");
        assert_eq!(to_hex(255), "0xff");
        assert_eq!(parse_hex_u64("0x3e8").unwrap(), 1000);
        assert!(matches!(parse_hex_u64("1000"), Err(Error::Decode(_))));
        assert!(matches!(parse_hex_u64("0xzz"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_decode_block() {
        let raw = json!({
            "header": {
                "number": "0xc",
                "hash": hash("0c"),
                "parent_hash": hash("0b"),
                "timestamp": "0x16e70e6985c"
            },
            "transactions": [{
                "hash": hash("aa"),
                "inputs": [{"previous_output": {"tx_hash": hash("00"), "index": "0xffffffff"}, "since": "0xc"}],
                "outputs": [{
                    "capacity": "0x2540be400",
                    "lock": {
                        "code_hash": hash("9b"),
                        "hash_type": "type",
                        "args": "0x36c329ed630d6ce750712a477543672adab57f4c"
                    },
                    "type": null
                }],
                "outputs_data": ["0x"]
            }]
        });

        let block: RpcBlock = serde_json::from_value(raw).unwrap();
        let block = block.into_block().unwrap();
        assert_eq!(block.number(), 12);
        assert_eq!(block.transactions.len(), 1);
        let tx = &block.transactions[0];
        assert!(tx.is_cellbase());
        assert_eq!(tx.outputs[0].capacity, Capacity::from(10_000_000_000));
        assert_eq!(tx.outputs[0].lock.args.len(), 20);
    }

    #[test]
    fn test_decode_rejects_bad_capacity() {
        let output = RpcTransaction {
            hash: H256::zero(),
            inputs: vec![],
            outputs: vec![RpcOutput {
                capacity: "100".into(),
                lock: RpcScript {
                    code_hash: H256::zero(),
                    hash_type: "data".into(),
                    args: "0x".into(),
                },
            }],
        };
        assert!(matches!(output.into_transaction(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_error_response() {
        let response: RpcResponse<RpcHeader> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32601);
    }
}
